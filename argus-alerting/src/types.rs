//! Alerting data model: rules, alerts, channel outcomes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use argus_core::clock::Millis;
use argus_core::config::RuleConfig;
use argus_core::error::{ArgusError, ArgusResult};
use argus_core::types::{EventKind, Outcome};

use argus_anomaly::DetectorId;

/// Alert urgency, ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertPriority {
    pub fn parse(s: &str) -> ArgusResult<Self> {
        match s {
            "low" => Ok(AlertPriority::Low),
            "medium" => Ok(AlertPriority::Medium),
            "high" => Ok(AlertPriority::High),
            "critical" => Ok(AlertPriority::Critical),
            other => Err(ArgusError::Config(format!("unknown priority '{other}'"))),
        }
    }

    pub fn wire_tag(&self) -> &'static str {
        match self {
            AlertPriority::Low => "low",
            AlertPriority::Medium => "medium",
            AlertPriority::High => "high",
            AlertPriority::Critical => "critical",
        }
    }
}

/// Grouping function over the triggering event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    Source,
    Actor,
}

/// What makes a rule fire.
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// At least this many matching events inside the rule window.
    Count(u32),
    /// The event's anomaly score total reached this value.
    Score(f64),
}

/// Compiled alert rule. Built from [`RuleConfig`] or the standard set.
#[derive(Debug, Clone)]
pub struct AlertRule {
    pub id: String,
    /// Empty set matches every kind.
    pub kinds: Vec<EventKind>,
    pub outcome: Option<Outcome>,
    /// Attribute key → required substring.
    pub attribute_patterns: HashMap<String, String>,
    pub group_by: GroupBy,
    pub window_ms: Option<i64>,
    pub trigger: Trigger,
    /// Score rules may additionally require a specific detector component.
    pub requires_detector: Option<DetectorId>,
    pub priority: AlertPriority,
    pub channels: Vec<String>,
    pub message_template: String,
    pub cooldown_ms: i64,
    pub enabled: bool,
}

impl AlertRule {
    /// Compile a declarative rule. Cooldown defaults to the rule window.
    pub fn from_config(cfg: &RuleConfig) -> ArgusResult<Self> {
        let kinds = cfg
            .kinds
            .iter()
            .map(|tag| parse_kind(tag))
            .collect::<ArgusResult<Vec<_>>>()?;
        let outcome = match cfg.outcome.as_deref() {
            None => None,
            Some("success") => Some(Outcome::Success),
            Some("failure") => Some(Outcome::Failure),
            Some(other) => {
                return Err(ArgusError::Config(format!(
                    "rule '{}': unknown outcome '{other}'",
                    cfg.id
                )))
            }
        };
        let group_by = match cfg.group_by.as_str() {
            "source" => GroupBy::Source,
            "actor" => GroupBy::Actor,
            other => {
                return Err(ArgusError::Config(format!(
                    "rule '{}': unknown group_by '{other}'",
                    cfg.id
                )))
            }
        };
        let trigger = match (cfg.threshold, cfg.min_score) {
            (Some(n), None) => Trigger::Count(n),
            (None, Some(s)) => Trigger::Score(s),
            _ => {
                return Err(ArgusError::Config(format!(
                    "rule '{}': exactly one of threshold or min_score required",
                    cfg.id
                )))
            }
        };
        let requires_detector = cfg
            .requires_detector
            .as_deref()
            .map(parse_detector)
            .transpose()?;
        let window_ms = cfg.window_secs.map(|s| s as i64 * 1000);
        let cooldown_ms = cfg
            .cooldown_secs
            .map(|s| s as i64 * 1000)
            .or(window_ms)
            .unwrap_or(300_000);
        Ok(Self {
            id: cfg.id.clone(),
            kinds,
            outcome,
            attribute_patterns: cfg.attribute_patterns.clone(),
            group_by,
            window_ms,
            trigger,
            requires_detector,
            priority: AlertPriority::parse(&cfg.priority)?,
            channels: cfg.channels.clone(),
            message_template: cfg.message_template.clone(),
            cooldown_ms,
            enabled: cfg.enabled,
        })
    }
}

fn parse_kind(tag: &str) -> ArgusResult<EventKind> {
    EventKind::all()
        .iter()
        .copied()
        .find(|k| k.wire_tag() == tag)
        .ok_or_else(|| ArgusError::Config(format!("unknown event kind '{tag}'")))
}

fn parse_detector(tag: &str) -> ArgusResult<DetectorId> {
    use DetectorId::*;
    let all = [
        UnusualLoginTime,
        UnusualSource,
        RapidRequests,
        FailedAttempts,
        SuspiciousPattern,
        BehaviorChange,
        BurstActivity,
        GeographicAnomaly,
    ];
    all.into_iter()
        .find(|d| d.wire_tag() == tag)
        .ok_or_else(|| ArgusError::Config(format!("unknown detector '{tag}'")))
}

/// Terminal state of one channel delivery attempt sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    Sent,
    RateLimited,
    FailedTransient,
    FailedPermanent,
    /// Channel disabled or unknown at dispatch time.
    Skipped,
    /// Evicted from a saturated queue before any attempt.
    Dropped,
}

/// Per-channel delivery record attached to the alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResult {
    pub channel: String,
    pub status: SendStatus,
    pub attempts: u32,
    pub completed_at_ms: Millis,
}

/// Immutable alert produced by the rule engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub rule_id: String,
    pub grouping_key: String,
    pub timestamp_ms: Millis,
    pub priority: AlertPriority,
    pub channels: Vec<String>,
    pub rendered_message: String,
    /// Ids of the events that justified the firing.
    pub evidence: Vec<String>,
    /// Filled in as dispatch resolves.
    pub send_results: Vec<SendResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_parse_and_order() {
        assert_eq!(AlertPriority::parse("high").unwrap(), AlertPriority::High);
        assert!(AlertPriority::parse("urgent").is_err());
        assert!(AlertPriority::Critical > AlertPriority::Low);
    }

    #[test]
    fn test_rule_compile_defaults_cooldown_to_window() {
        let cfg = RuleConfig {
            id: "r1".into(),
            kinds: vec!["login_failure".into()],
            outcome: Some("failure".into()),
            attribute_patterns: HashMap::new(),
            group_by: "source".into(),
            window_secs: Some(300),
            threshold: Some(5),
            min_score: None,
            requires_detector: None,
            priority: "high".into(),
            channels: vec!["dashboard".into()],
            message_template: "failures from {key}".into(),
            cooldown_secs: None,
            enabled: true,
        };
        let rule = AlertRule::from_config(&cfg).unwrap();
        assert_eq!(rule.cooldown_ms, 300_000);
        assert_eq!(rule.trigger, Trigger::Count(5));
        assert_eq!(rule.kinds, vec![EventKind::LoginFailure]);
    }

    #[test]
    fn test_rule_compile_rejects_bad_kind() {
        let cfg = RuleConfig {
            id: "r1".into(),
            kinds: vec!["logon_failure".into()],
            outcome: None,
            attribute_patterns: HashMap::new(),
            group_by: "source".into(),
            window_secs: Some(300),
            threshold: Some(5),
            min_score: None,
            requires_detector: None,
            priority: "high".into(),
            channels: vec![],
            message_template: String::new(),
            cooldown_secs: None,
            enabled: true,
        };
        assert!(AlertRule::from_config(&cfg).is_err());
    }
}
