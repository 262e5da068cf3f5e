//! Folds detector components into one weighted anomaly score.

use tracing::{debug, warn};

use argus_core::config::AggregatorConfig;
use argus_core::error::ArgusError;
use argus_core::types::{EventKind, Outcome, SecurityEvent, SeverityHint};

use crate::types::{AnomalyScore, AnomalySeverity, DetectorId, ScoreComponent};

/// Result of one detector run, tagged so failures stay attributable.
pub type DetectorOutcome = (DetectorId, Result<Option<ScoreComponent>, ArgusError>);

/// Aggregation result: the score plus, when the emit threshold is met, a
/// synthetic `suspicious_activity` event for rule evaluation.
pub struct AggregateOutcome {
    pub score: AnomalyScore,
    pub synthetic: Option<SecurityEvent>,
}

pub struct AnomalyAggregator {
    cfg: AggregatorConfig,
}

impl AnomalyAggregator {
    pub fn new(cfg: AggregatorConfig) -> Self {
        Self { cfg }
    }

    /// Combine detector outcomes for one event. A failed detector
    /// contributes 0 and is recorded; it never fails the event.
    pub fn aggregate(&self, event: &SecurityEvent, outcomes: Vec<DetectorOutcome>) -> AggregateOutcome {
        let mut components: Vec<ScoreComponent> = Vec::new();
        let mut failed: Vec<DetectorId> = Vec::new();

        for (id, outcome) in outcomes {
            match outcome {
                Ok(Some(c)) if c.raw > 0.0 => components.push(c),
                Ok(_) => {}
                Err(e) => {
                    warn!(detector = id.wire_tag(), event = %event.id, error = %e,
                        "Detector failed, contribution treated as zero");
                    failed.push(id);
                }
            }
        }

        let total: f64 = components
            .iter()
            .map(ScoreComponent::weighted)
            .sum::<f64>()
            .min(1.0);
        let severity = AnomalySeverity::for_total(total);

        // Deterministic breakdown order: heaviest weight first, detector id
        // breaks ties.
        components.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.detector.cmp(&b.detector))
        });
        failed.sort();

        let score = AnomalyScore {
            total,
            severity,
            components,
            failed_detectors: failed,
        };

        let synthetic = if total > 0.0 && total >= self.cfg.emit_threshold {
            debug!(event = %event.id, total, severity = ?severity, "Anomaly emitted");
            Some(self.synthesize(event, &score))
        } else {
            None
        };

        AggregateOutcome { score, synthetic }
    }

    fn synthesize(&self, event: &SecurityEvent, score: &AnomalyScore) -> SecurityEvent {
        let hint = match score.severity {
            AnomalySeverity::Critical => SeverityHint::Critical,
            AnomalySeverity::High => SeverityHint::Error,
            AnomalySeverity::Medium => SeverityHint::Warning,
            _ => SeverityHint::Info,
        };
        let detectors = score
            .components
            .iter()
            .map(|c| c.detector.wire_tag())
            .collect::<Vec<_>>()
            .join(",");
        let mut synthetic = SecurityEvent::new(
            format!("anomaly-{}", event.id),
            event.timestamp_ms,
            EventKind::SuspiciousActivity,
        )
        .with_outcome(Outcome::Failure)
        .with_severity(hint)
        .with_attribute("anomaly_score", format!("{:.4}", score.total))
        .with_attribute("source_event", event.id.clone())
        .with_attribute("detectors", detectors);
        if let Some(actor) = &event.actor_id {
            synthetic = synthetic.with_actor(actor.clone());
        }
        if let Some(addr) = &event.source_address {
            synthetic = synthetic.with_source(addr.clone());
        }
        synthetic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn event() -> SecurityEvent {
        SecurityEvent::new("e1", 1_000, EventKind::LoginSuccess)
            .with_actor("u1")
            .with_source("198.51.100.1")
    }

    fn comp(id: DetectorId, raw: f64, weight: f64) -> ScoreComponent {
        ScoreComponent {
            detector: id,
            raw,
            weight,
            details: HashMap::new(),
        }
    }

    fn aggregator() -> AnomalyAggregator {
        AnomalyAggregator::new(AggregatorConfig::default())
    }

    #[test]
    fn test_weighted_sum_and_clamp() {
        let outcomes = vec![
            (
                DetectorId::UnusualSource,
                Ok(Some(comp(DetectorId::UnusualSource, 0.8, 0.5))),
            ),
            (
                DetectorId::FailedAttempts,
                Ok(Some(comp(DetectorId::FailedAttempts, 1.0, 0.6))),
            ),
            (
                DetectorId::SuspiciousPattern,
                Ok(Some(comp(DetectorId::SuspiciousPattern, 1.0, 0.7))),
            ),
        ];
        let out = aggregator().aggregate(&event(), outcomes);
        // 0.4 + 0.6 + 0.7 = 1.7, clamped.
        assert_eq!(out.score.total, 1.0);
        assert_eq!(out.score.severity, AnomalySeverity::Critical);
        assert!(out.synthetic.is_some());
    }

    #[test]
    fn test_component_ordering() {
        let outcomes = vec![
            (
                DetectorId::RapidRequests,
                Ok(Some(comp(DetectorId::RapidRequests, 0.5, 0.4))),
            ),
            (
                DetectorId::SuspiciousPattern,
                Ok(Some(comp(DetectorId::SuspiciousPattern, 0.3, 0.7))),
            ),
            (
                DetectorId::BurstActivity,
                Ok(Some(comp(DetectorId::BurstActivity, 0.6, 0.4))),
            ),
        ];
        let out = aggregator().aggregate(&event(), outcomes);
        let ids: Vec<_> = out.score.components.iter().map(|c| c.detector).collect();
        // Descending weight, then detector id for the 0.4 pair.
        assert_eq!(
            ids,
            vec![
                DetectorId::SuspiciousPattern,
                DetectorId::RapidRequests,
                DetectorId::BurstActivity,
            ]
        );
    }

    #[test]
    fn test_failure_isolation() {
        let outcomes = vec![
            (
                DetectorId::SuspiciousPattern,
                Err(ArgusError::DetectorFailure {
                    detector: "suspicious_pattern".into(),
                    reason: "boom".into(),
                }),
            ),
            (
                DetectorId::UnusualSource,
                Ok(Some(comp(DetectorId::UnusualSource, 0.8, 0.5))),
            ),
        ];
        let out = aggregator().aggregate(&event(), outcomes);
        assert_eq!(out.score.failed_detectors, vec![DetectorId::SuspiciousPattern]);
        assert!((out.score.total - 0.4).abs() < 1e-9);
        assert_eq!(out.score.severity, AnomalySeverity::Medium);
    }

    #[test]
    fn test_zero_score_emits_nothing() {
        let out = aggregator().aggregate(&event(), vec![(DetectorId::UnusualSource, Ok(None))]);
        assert_eq!(out.score.total, 0.0);
        assert_eq!(out.score.severity, AnomalySeverity::None);
        assert!(out.synthetic.is_none());
    }

    #[test]
    fn test_emit_threshold_gates_synthetic() {
        let agg = AnomalyAggregator::new(AggregatorConfig { emit_threshold: 0.5 });
        let outcomes = vec![(
            DetectorId::UnusualSource,
            Ok(Some(comp(DetectorId::UnusualSource, 0.8, 0.5))),
        )];
        let out = agg.aggregate(&event(), outcomes);
        assert!((out.score.total - 0.4).abs() < 1e-9);
        assert!(out.synthetic.is_none());
    }

    #[test]
    fn test_synthetic_event_shape() {
        let outcomes = vec![(
            DetectorId::UnusualSource,
            Ok(Some(comp(DetectorId::UnusualSource, 0.8, 0.5))),
        )];
        let out = aggregator().aggregate(&event(), outcomes);
        let synthetic = out.synthetic.unwrap();
        assert_eq!(synthetic.id, "anomaly-e1");
        assert_eq!(synthetic.kind, EventKind::SuspiciousActivity);
        assert_eq!(synthetic.actor_id.as_deref(), Some("u1"));
        assert_eq!(synthetic.source_address.as_deref(), Some("198.51.100.1"));
        assert_eq!(
            synthetic.attributes.get("detectors").map(String::as_str),
            Some("unusual_source")
        );
    }
}
