//! Composite drift score for actors past their learning period.
//!
//! Actors younger than the learning period are still building a baseline and
//! always score 0. Afterwards, drift combines the two strongest individual
//! signals: a never-seen source address and an off-hours login.

use std::collections::HashMap;

use argus_core::error::ArgusResult;
use argus_core::types::SecurityEvent;

use super::{component, event_hour, Detector, DetectorContext};
use crate::types::{DetectorId, ScoreComponent};

const SOURCE_DRIFT: f64 = 0.6;
const HOURS_DRIFT: f64 = 0.4;

pub struct BehaviorChange;

impl Detector for BehaviorChange {
    fn id(&self) -> DetectorId {
        DetectorId::BehaviorChange
    }

    fn score(
        &self,
        event: &SecurityEvent,
        ctx: &DetectorContext<'_>,
    ) -> ArgusResult<Option<ScoreComponent>> {
        if event.actor_id.is_none() {
            return Ok(None);
        }
        let Some(first_seen) = ctx.receipt.actor_first_seen else {
            return Ok(None);
        };
        let learning_ms = ctx.cfg.behavior_change_learning_period_secs as i64 * 1000;
        if ctx.now - first_seen < learning_ms {
            return Ok(None);
        }

        let source_drift = if ctx.receipt.actor_had_sources
            && !ctx.receipt.source_known_before
            && event.source_address.is_some()
        {
            1.0
        } else {
            0.0
        };
        let hours_drift = match ctx.receipt.prior_hour_stats {
            Some((mean, std)) if std > 0.0 => {
                let z = (event_hour(event.timestamp_ms) - mean).abs() / std;
                if z > 2.0 {
                    (z / 4.0).min(1.0)
                } else {
                    0.0
                }
            }
            _ => 0.0,
        };

        let raw = (SOURCE_DRIFT * source_drift + HOURS_DRIFT * hours_drift).min(1.0);
        if raw <= 0.0 {
            return Ok(None);
        }
        let details = HashMap::from([
            ("source_drift".into(), format!("{source_drift:.2}")),
            ("hours_drift".into(), format!("{hours_drift:.2}")),
            ("profile_age_ms".into(), (ctx.now - first_seen).to_string()),
        ]);
        Ok(Some(component(
            self.id(),
            raw,
            ctx.cfg.behavior_change_weight,
            details,
        )))
    }
}
