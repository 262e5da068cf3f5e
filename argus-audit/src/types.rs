//! Audit query filters and statistics shapes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use argus_core::clock::Millis;
use argus_core::types::{EventKind, SecurityEvent};

use argus_alerting::{Alert, AlertPriority};

/// Hard ceiling for a single page; larger requests are invalid.
pub const MAX_PAGE_LIMIT: usize = 1_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    pub actor_id: Option<String>,
    pub source_address: Option<String>,
    pub kind: Option<EventKind>,
    pub since_ms: Option<Millis>,
    pub until_ms: Option<Millis>,
    pub limit: usize,
    pub offset: usize,
}

impl EventFilter {
    pub fn matches(&self, event: &SecurityEvent) -> bool {
        if let Some(actor) = &self.actor_id {
            if event.actor_id.as_deref() != Some(actor.as_str()) {
                return false;
            }
        }
        if let Some(addr) = &self.source_address {
            if event.source_address.as_deref() != Some(addr.as_str()) {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if event.kind != kind {
                return false;
            }
        }
        if let Some(since) = self.since_ms {
            if event.timestamp_ms < since {
                return false;
            }
        }
        if let Some(until) = self.until_ms {
            if event.timestamp_ms > until {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertFilter {
    pub rule_id: Option<String>,
    pub priority: Option<AlertPriority>,
    pub channel: Option<String>,
    pub since_ms: Option<Millis>,
    pub until_ms: Option<Millis>,
    pub limit: usize,
    pub offset: usize,
}

impl AlertFilter {
    pub fn matches(&self, alert: &Alert) -> bool {
        if let Some(rule) = &self.rule_id {
            if &alert.rule_id != rule {
                return false;
            }
        }
        if let Some(priority) = self.priority {
            if alert.priority != priority {
                return false;
            }
        }
        if let Some(channel) = &self.channel {
            if !alert.channels.contains(channel) {
                return false;
            }
        }
        if let Some(since) = self.since_ms {
            if alert.timestamp_ms < since {
                return false;
            }
        }
        if let Some(until) = self.until_ms {
            if alert.timestamp_ms > until {
                return false;
            }
        }
        true
    }
}

/// Per-day materialized counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DayStats {
    pub day: String,
    pub events: u64,
    pub alerts: u64,
    pub anomalies: u64,
    pub anomaly_score_sum: f64,
}

/// Aggregated view over a day range.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Statistics {
    pub range_days: u32,
    pub total_events: u64,
    pub total_alerts: u64,
    pub events_by_kind: HashMap<String, u64>,
    pub events_by_severity: HashMap<String, u64>,
    pub alerts_by_priority: HashMap<String, u64>,
    /// Descending by count, bounded by configuration.
    pub top_sources: Vec<(String, u64)>,
    pub days: Vec<DayStats>,
    /// Persistence operations that could not be completed.
    pub storage_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_core::types::Outcome;

    #[test]
    fn test_event_filter_bounds() {
        let event = SecurityEvent::new("e1", 5_000, EventKind::ApiAccess)
            .with_actor("u1")
            .with_outcome(Outcome::Success);
        let mut filter = EventFilter {
            actor_id: Some("u1".into()),
            since_ms: Some(5_000),
            until_ms: Some(5_000),
            ..Default::default()
        };
        assert!(filter.matches(&event));
        filter.since_ms = Some(5_001);
        assert!(!filter.matches(&event));
    }

    #[test]
    fn test_alert_filter_channel() {
        let alert = Alert {
            id: "a1".into(),
            rule_id: "r1".into(),
            grouping_key: "k".into(),
            timestamp_ms: 0,
            priority: AlertPriority::High,
            channels: vec!["email".into(), "dashboard".into()],
            rendered_message: String::new(),
            evidence: Vec::new(),
            send_results: Vec::new(),
        };
        let filter = AlertFilter {
            channel: Some("email".into()),
            ..Default::default()
        };
        assert!(filter.matches(&alert));
        let other = AlertFilter {
            channel: Some("sms".into()),
            ..Default::default()
        };
        assert!(!other.matches(&alert));
    }
}
