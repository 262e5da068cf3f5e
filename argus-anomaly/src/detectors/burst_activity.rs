//! Flags actors whose short-term event rate spikes past the burst threshold.

use std::collections::HashMap;
use std::time::Duration;

use argus_core::error::ArgusResult;
use argus_core::types::SecurityEvent;
use argus_core::windows::USER_BURST_WINDOW;

use super::{component, Detector, DetectorContext};
use crate::profile::ProfileKey;
use crate::types::{DetectorId, ScoreComponent};

pub struct BurstActivity;

impl Detector for BurstActivity {
    fn id(&self) -> DetectorId {
        DetectorId::BurstActivity
    }

    fn score(
        &self,
        event: &SecurityEvent,
        ctx: &DetectorContext<'_>,
    ) -> ArgusResult<Option<ScoreComponent>> {
        let Some(actor) = &event.actor_id else {
            return Ok(None);
        };
        let window_ms = ctx
            .windows
            .get_ms_or(USER_BURST_WINDOW, Duration::from_secs(600));
        let count = ctx
            .profiles
            .activity_count(ProfileKey::Actor(actor), window_ms, ctx.now);
        let threshold = ctx.cfg.burst_activity_threshold;
        if count <= threshold {
            return Ok(None);
        }
        let raw = (count as f64 / (threshold as f64 * 2.0)).min(1.0);
        let details = HashMap::from([
            ("activity_count".into(), count.to_string()),
            ("burst_threshold".into(), threshold.to_string()),
            ("window_ms".into(), window_ms.to_string()),
        ]);
        Ok(Some(component(
            self.id(),
            raw,
            ctx.cfg.burst_activity_weight,
            details,
        )))
    }
}
