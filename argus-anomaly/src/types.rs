//! Shared types for the anomaly layer.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifies one of the built-in detectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorId {
    UnusualLoginTime,
    UnusualSource,
    RapidRequests,
    FailedAttempts,
    SuspiciousPattern,
    BehaviorChange,
    BurstActivity,
    GeographicAnomaly,
}

impl DetectorId {
    pub fn wire_tag(&self) -> &'static str {
        match self {
            DetectorId::UnusualLoginTime => "unusual_login_time",
            DetectorId::UnusualSource => "unusual_source",
            DetectorId::RapidRequests => "rapid_requests",
            DetectorId::FailedAttempts => "failed_attempts",
            DetectorId::SuspiciousPattern => "suspicious_pattern",
            DetectorId::BehaviorChange => "behavior_change",
            DetectorId::BurstActivity => "burst_activity",
            DetectorId::GeographicAnomaly => "geographic_anomaly",
        }
    }
}

/// One detector's contribution to an anomaly score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreComponent {
    pub detector: DetectorId,
    /// Raw score in [0, 1] before weighting.
    pub raw: f64,
    pub weight: f64,
    pub details: HashMap<String, String>,
}

impl ScoreComponent {
    pub fn weighted(&self) -> f64 {
        self.raw * self.weight
    }
}

/// Severity derived from the aggregated total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalySeverity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl AnomalySeverity {
    /// Deterministic mapping from total score: ≥0.8 critical, ≥0.6 high,
    /// ≥0.4 medium, >0 low, =0 none.
    pub fn for_total(total: f64) -> Self {
        if total >= 0.8 {
            AnomalySeverity::Critical
        } else if total >= 0.6 {
            AnomalySeverity::High
        } else if total >= 0.4 {
            AnomalySeverity::Medium
        } else if total > 0.0 {
            AnomalySeverity::Low
        } else {
            AnomalySeverity::None
        }
    }
}

/// Weighted, normalized multi-detector score for one event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyScore {
    /// Clamped to [0, 1].
    pub total: f64,
    pub severity: AnomalySeverity,
    /// Nonzero components, ordered by descending weight then detector id.
    pub components: Vec<ScoreComponent>,
    /// Detectors that failed on this event; their contribution is 0.
    pub failed_detectors: Vec<DetectorId>,
}

impl AnomalyScore {
    pub fn zero() -> Self {
        Self {
            total: 0.0,
            severity: AnomalySeverity::None,
            components: Vec::new(),
            failed_detectors: Vec::new(),
        }
    }

    pub fn component(&self, id: DetectorId) -> Option<&ScoreComponent> {
        self.components.iter().find(|c| c.detector == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_mapping() {
        assert_eq!(AnomalySeverity::for_total(0.0), AnomalySeverity::None);
        assert_eq!(AnomalySeverity::for_total(0.05), AnomalySeverity::Low);
        assert_eq!(AnomalySeverity::for_total(0.4), AnomalySeverity::Medium);
        assert_eq!(AnomalySeverity::for_total(0.6), AnomalySeverity::High);
        assert_eq!(AnomalySeverity::for_total(0.79), AnomalySeverity::High);
        assert_eq!(AnomalySeverity::for_total(0.8), AnomalySeverity::Critical);
        assert_eq!(AnomalySeverity::for_total(1.0), AnomalySeverity::Critical);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(AnomalySeverity::Critical > AnomalySeverity::High);
        assert!(AnomalySeverity::Low > AnomalySeverity::None);
    }
}
