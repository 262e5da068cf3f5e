//! Flags sources accumulating login failures beyond the hourly allowance.

use std::collections::HashMap;

use argus_core::error::ArgusResult;
use argus_core::types::{EventKind, SecurityEvent};

use super::{component, Detector, DetectorContext};
use crate::profile::ProfileKey;
use crate::types::{DetectorId, ScoreComponent};

const HOUR_MS: i64 = 3_600_000;

pub struct FailedAttempts;

impl Detector for FailedAttempts {
    fn id(&self) -> DetectorId {
        DetectorId::FailedAttempts
    }

    fn score(
        &self,
        event: &SecurityEvent,
        ctx: &DetectorContext<'_>,
    ) -> ArgusResult<Option<ScoreComponent>> {
        if event.kind != EventKind::LoginFailure {
            return Ok(None);
        }
        let Some(addr) = &event.source_address else {
            return Ok(None);
        };
        let count = ctx
            .profiles
            .failure_count(ProfileKey::Source(addr), HOUR_MS, ctx.now);
        let max = ctx.cfg.failed_attempts_max_per_hour;
        if count <= max {
            return Ok(None);
        }
        let raw = (count as f64 / (max as f64 * 2.0)).min(1.0);
        let details = HashMap::from([
            ("failed_count".into(), count.to_string()),
            ("max_allowed".into(), max.to_string()),
            ("window_ms".into(), HOUR_MS.to_string()),
        ]);
        Ok(Some(component(
            self.id(),
            raw,
            ctx.cfg.failed_attempts_weight,
            details,
        )))
    }
}
