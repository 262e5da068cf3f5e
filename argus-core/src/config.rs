//! Configuration for all pipeline stages.
//!
//! One toml file, one section per stage. Sections interpret their own
//! settings; this crate only defines the shapes and defaults. All defaults
//! here are the authoritative knob values for the standard deployment.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use crate::error::{ArgusError, ArgusResult};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ArgusConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub windows: WindowsConfig,
    #[serde(default)]
    pub profiles: ProfileConfig,
    #[serde(default)]
    pub detectors: DetectorConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    /// Alert rules. Empty list means "use the standard rule set".
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
    /// Notification channels. Empty list means "dashboard only".
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub log_level: String,
    /// Ingest-side rate limit, events per second. 0 disables the limiter.
    pub ingest_rate_limit: u32,
    /// Detector worker pool size.
    pub detector_workers: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            ingest_rate_limit: 0,
            detector_workers: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub event_ring_capacity: usize,
    /// Events older than this are swept from the ring.
    pub event_retention_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            event_ring_capacity: 10_000,
            event_retention_secs: 86_400,
        }
    }
}

/// Named window durations in seconds. Missing names fall back to the
/// standard registry values.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WindowsConfig {
    #[serde(flatten)]
    pub durations_secs: HashMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub known_sources_cap: usize,
    pub recent_failures_cap: usize,
    pub recent_failures_max_age_secs: u64,
    pub recent_activity_cap: usize,
    pub recent_activity_max_age_secs: u64,
    /// Profiles idle longer than this are evicted.
    pub idle_eviction_secs: u64,
    /// Exponential decay applied to the hour histogram on each update.
    pub hour_decay: f64,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            known_sources_cap: 16,
            recent_failures_cap: 64,
            recent_failures_max_age_secs: 3_600,
            recent_activity_cap: 256,
            recent_activity_max_age_secs: 600,
            idle_eviction_secs: 7 * 86_400,
            hour_decay: 0.98,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub unusual_login_time_weight: f64,
    pub unusual_source_weight: f64,
    pub rapid_requests_weight: f64,
    pub rapid_requests_max_per_minute: usize,
    pub failed_attempts_weight: f64,
    pub failed_attempts_max_per_hour: usize,
    pub suspicious_pattern_weight: f64,
    pub behavior_change_weight: f64,
    pub behavior_change_learning_period_secs: u64,
    pub burst_activity_weight: f64,
    pub burst_activity_threshold: usize,
    pub geographic_weight: f64,
    /// Country codes treated as anomalous origins.
    pub geo_denylist: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            unusual_login_time_weight: 0.30,
            unusual_source_weight: 0.50,
            rapid_requests_weight: 0.40,
            rapid_requests_max_per_minute: 60,
            failed_attempts_weight: 0.60,
            failed_attempts_max_per_hour: 5,
            suspicious_pattern_weight: 0.70,
            behavior_change_weight: 0.50,
            behavior_change_learning_period_secs: 7 * 86_400,
            burst_activity_weight: 0.40,
            burst_activity_threshold: 10,
            geographic_weight: 0.60,
            geo_denylist: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Scores at or above this synthesize a `suspicious_activity` event.
    /// 0.0 emits for every nonzero score.
    pub emit_threshold: f64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self { emit_threshold: 0.0 }
    }
}

/// Declarative alert rule; interpreted by the rule engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    pub id: String,
    /// Event kind wire tags to match; empty matches any kind.
    #[serde(default)]
    pub kinds: Vec<String>,
    /// "success" | "failure"; unset matches both.
    #[serde(default)]
    pub outcome: Option<String>,
    /// Attribute key → substring that must be present.
    #[serde(default)]
    pub attribute_patterns: HashMap<String, String>,
    /// "source" | "actor" — grouping key for dedup and cooldown.
    pub group_by: String,
    #[serde(default)]
    pub window_secs: Option<u64>,
    /// Count threshold; mutually exclusive with `min_score`.
    #[serde(default)]
    pub threshold: Option<u32>,
    /// Score threshold for anomaly rules.
    #[serde(default)]
    pub min_score: Option<f64>,
    /// Fires only when this detector contributed a nonzero component.
    #[serde(default)]
    pub requires_detector: Option<String>,
    pub priority: String,
    pub channels: Vec<String>,
    pub message_template: String,
    #[serde(default)]
    pub cooldown_secs: Option<u64>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub id: String,
    /// "email" | "sms" | "telegram" | "slack" | "webhook" | "dashboard".
    pub kind: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub rate_limit_max: u32,
    pub rate_limit_window_secs: u64,
    pub retries: u32,
    pub backoff_base_ms: u64,
    pub send_timeout_secs: u64,
}

impl ChannelConfig {
    pub fn named(id: &str, kind: &str) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            enabled: true,
            rate_limit_max: 30,
            rate_limit_window_secs: 3_600,
            retries: 3,
            backoff_base_ms: 1_000,
            send_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Bounded queue depth per channel; oldest pending alert is dropped on
    /// overflow.
    pub queue_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { queue_capacity: 256 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub max_event_records: usize,
    pub max_alert_records: usize,
    /// Bounded export page size used by the streaming exporter.
    pub export_page_size: usize,
    pub top_sources_tracked: usize,
    /// Budget for one backend write; an overrun surfaces as a transient
    /// storage failure.
    pub persist_timeout_ms: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_event_records: 100_000,
            max_alert_records: 10_000,
            export_page_size: 500,
            top_sources_tracked: 64,
            persist_timeout_ms: 2_000,
        }
    }
}

fn default_true() -> bool {
    true
}

impl ArgusConfig {
    pub fn load(path: impl AsRef<Path>) -> ArgusResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: ArgusConfig = toml::from_str(&content)
            .map_err(|e| ArgusError::Config(format!("failed to parse {}: {e}", path.display())))?;
        config.validate()?;
        info!(
            path = %path.display(),
            ring = config.store.event_ring_capacity,
            rules = config.rules.len(),
            channels = config.channels.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> ArgusResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ArgusError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> ArgusResult<()> {
        if self.store.event_ring_capacity == 0 {
            return Err(ArgusError::Config("event_ring_capacity must be > 0".into()));
        }
        if self.general.detector_workers == 0 {
            return Err(ArgusError::Config("detector_workers must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.aggregator.emit_threshold) {
            return Err(ArgusError::Config(
                "aggregator.emit_threshold must be within [0, 1]".into(),
            ));
        }
        if self.profiles.hour_decay <= 0.0 || self.profiles.hour_decay > 1.0 {
            return Err(ArgusError::Config("profiles.hour_decay must be within (0, 1]".into()));
        }
        for rule in &self.rules {
            if rule.threshold.is_none() && rule.min_score.is_none() {
                return Err(ArgusError::Config(format!(
                    "rule '{}' needs a count threshold or a min_score",
                    rule.id
                )));
            }
            if rule.group_by != "source" && rule.group_by != "actor" {
                return Err(ArgusError::Config(format!(
                    "rule '{}': group_by must be 'source' or 'actor'",
                    rule.id
                )));
            }
        }
        for channel in &self.channels {
            if channel.rate_limit_window_secs == 0 {
                return Err(ArgusError::Config(format!(
                    "channel '{}': rate_limit_window_secs must be > 0",
                    channel.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(ArgusConfig::default().validate().is_ok());
    }

    #[test]
    fn test_roundtrip_toml() {
        let mut config = ArgusConfig::default();
        config.channels.push(ChannelConfig::named("email", "email"));
        let text = toml::to_string_pretty(&config).unwrap();
        let back: ArgusConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.channels.len(), 1);
        assert_eq!(back.channels[0].id, "email");
        assert_eq!(back.detectors.failed_attempts_max_per_hour, 5);
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let mut config = ArgusConfig::default();
        config.store.event_ring_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_rule_without_trigger() {
        let mut config = ArgusConfig::default();
        config.rules.push(RuleConfig {
            id: "broken".into(),
            kinds: vec![],
            outcome: None,
            attribute_patterns: HashMap::new(),
            group_by: "source".into(),
            window_secs: Some(60),
            threshold: None,
            min_score: None,
            requires_detector: None,
            priority: "high".into(),
            channels: vec!["dashboard".into()],
            message_template: "x".into(),
            cooldown_secs: None,
            enabled: true,
        });
        assert!(config.validate().is_err());
    }
}
