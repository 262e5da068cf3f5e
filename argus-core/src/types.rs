//! Event model shared by every layer.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::clock::Millis;
use crate::error::{ArgusError, ArgusResult};
use crate::{MAX_ATTRIBUTES_BYTES, MAX_ATTRIBUTE_ENTRIES};

/// Stable wire tags for security event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    LoginSuccess,
    LoginFailure,
    Logout,
    PasswordChange,
    PasswordReset,
    MfaEnabled,
    MfaDisabled,
    MfaFailure,
    SessionCreated,
    SessionExpired,
    SessionRevoked,
    ApiAccess,
    RateLimited,
    SuspiciousActivity,
    SecurityAlert,
    DataAccess,
    DataModification,
    Encryption,
    Decryption,
}

impl EventKind {
    pub fn wire_tag(&self) -> &'static str {
        match self {
            EventKind::LoginSuccess => "login_success",
            EventKind::LoginFailure => "login_failure",
            EventKind::Logout => "logout",
            EventKind::PasswordChange => "password_change",
            EventKind::PasswordReset => "password_reset",
            EventKind::MfaEnabled => "mfa_enabled",
            EventKind::MfaDisabled => "mfa_disabled",
            EventKind::MfaFailure => "mfa_failure",
            EventKind::SessionCreated => "session_created",
            EventKind::SessionExpired => "session_expired",
            EventKind::SessionRevoked => "session_revoked",
            EventKind::ApiAccess => "api_access",
            EventKind::RateLimited => "rate_limited",
            EventKind::SuspiciousActivity => "suspicious_activity",
            EventKind::SecurityAlert => "security_alert",
            EventKind::DataAccess => "data_access",
            EventKind::DataModification => "data_modification",
            EventKind::Encryption => "encryption",
            EventKind::Decryption => "decryption",
        }
    }

    pub fn all() -> &'static [EventKind] {
        &[
            EventKind::LoginSuccess,
            EventKind::LoginFailure,
            EventKind::Logout,
            EventKind::PasswordChange,
            EventKind::PasswordReset,
            EventKind::MfaEnabled,
            EventKind::MfaDisabled,
            EventKind::MfaFailure,
            EventKind::SessionCreated,
            EventKind::SessionExpired,
            EventKind::SessionRevoked,
            EventKind::ApiAccess,
            EventKind::RateLimited,
            EventKind::SuspiciousActivity,
            EventKind::SecurityAlert,
            EventKind::DataAccess,
            EventKind::DataModification,
            EventKind::Encryption,
            EventKind::Decryption,
        ]
    }
}

/// Whether the observed operation succeeded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    #[default]
    Success,
    Failure,
}

/// Producer-supplied severity hint. Scoring may disagree with it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityHint {
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

/// A single observed security-relevant occurrence. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    /// Globally unique identifier, assigned by the producer.
    pub id: String,
    /// Occurrence time, milliseconds since epoch.
    pub timestamp_ms: Millis,
    pub kind: EventKind,
    /// User identity, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    /// Network origin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_address: Option<String>,
    /// Free-form client descriptor (user agent or similar).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_fingerprint: Option<String>,
    /// Logical endpoint or action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default)]
    pub outcome: Outcome,
    #[serde(default)]
    pub severity_hint: SeverityHint,
    /// Bounded free-form context.
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl SecurityEvent {
    /// Minimal well-formed event, for builders and tests.
    pub fn new(id: impl Into<String>, timestamp_ms: Millis, kind: EventKind) -> Self {
        Self {
            id: id.into(),
            timestamp_ms,
            kind,
            actor_id: None,
            source_address: None,
            agent_fingerprint: None,
            target: None,
            outcome: Outcome::Success,
            severity_hint: SeverityHint::Info,
            attributes: HashMap::new(),
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor_id = Some(actor.into());
        self
    }

    pub fn with_source(mut self, addr: impl Into<String>) -> Self {
        self.source_address = Some(addr.into());
        self
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent_fingerprint = Some(agent.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_severity(mut self, hint: SeverityHint) -> Self {
        self.severity_hint = hint;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Schema validation applied at ingest. Rejects empty ids, unset
    /// timestamps and oversized attribute bags.
    pub fn validate(&self) -> ArgusResult<()> {
        if self.id.trim().is_empty() {
            return Err(ArgusError::SchemaInvalid("empty event id".into()));
        }
        if self.timestamp_ms <= 0 {
            return Err(ArgusError::SchemaInvalid(format!(
                "event '{}' has no timestamp",
                self.id
            )));
        }
        if self.attributes.len() > MAX_ATTRIBUTE_ENTRIES {
            return Err(ArgusError::SchemaInvalid(format!(
                "event '{}' carries {} attributes (max {})",
                self.id,
                self.attributes.len(),
                MAX_ATTRIBUTE_ENTRIES
            )));
        }
        let serialized: usize = self
            .attributes
            .iter()
            .map(|(k, v)| k.len() + v.len() + 6)
            .sum();
        if serialized > MAX_ATTRIBUTES_BYTES {
            return Err(ArgusError::SchemaInvalid(format!(
                "event '{}' attribute payload is {} bytes (max {})",
                self.id, serialized, MAX_ATTRIBUTES_BYTES
            )));
        }
        Ok(())
    }
}
