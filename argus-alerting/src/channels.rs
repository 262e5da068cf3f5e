//! Channel adapter contract.
//!
//! Adapters for real transports (email, SMS, Telegram, Slack, webhooks) live
//! outside this crate; the dispatcher only sees `send → ok|transient|permanent`.
//! The dashboard channel is in-process and ships built in.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

use crate::types::Alert;

/// Transport family of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Email,
    Sms,
    Telegram,
    Slack,
    Webhook,
    Dashboard,
}

impl ChannelKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email" => Some(ChannelKind::Email),
            "sms" => Some(ChannelKind::Sms),
            "telegram" => Some(ChannelKind::Telegram),
            "slack" => Some(ChannelKind::Slack),
            "webhook" => Some(ChannelKind::Webhook),
            "dashboard" => Some(ChannelKind::Dashboard),
            _ => None,
        }
    }
}

/// Result of a single send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Ok,
    /// Worth retrying with backoff.
    Transient,
    /// Retrying cannot help.
    Permanent,
}

/// One notification transport. `send` must respect the deadline; the
/// dispatcher treats an overrun like a transient failure.
pub trait AlertChannel: Send + Sync {
    fn id(&self) -> &str;
    fn kind(&self) -> ChannelKind;
    fn send(&self, alert: &Alert, timeout: Duration) -> SendOutcome;
}

/// In-process channel: keeps the most recent rendered messages for UI
/// consumption. Never fails.
pub struct DashboardChannel {
    id: String,
    capacity: usize,
    messages: Mutex<VecDeque<(String, String)>>,
}

impl DashboardChannel {
    pub fn new(id: impl Into<String>, capacity: usize) -> Self {
        Self {
            id: id.into(),
            capacity,
            messages: Mutex::new(VecDeque::new()),
        }
    }

    /// Newest-first list of (alert id, rendered message).
    pub fn recent(&self) -> Vec<(String, String)> {
        self.messages.lock().iter().rev().cloned().collect()
    }
}

impl AlertChannel for DashboardChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Dashboard
    }

    fn send(&self, alert: &Alert, _timeout: Duration) -> SendOutcome {
        let mut messages = self.messages.lock();
        messages.push_back((alert.id.clone(), alert.rendered_message.clone()));
        while messages.len() > self.capacity {
            messages.pop_front();
        }
        SendOutcome::Ok
    }
}
