//! Flags sources producing more events per minute than the allowance.

use std::collections::HashMap;
use std::time::Duration;

use argus_core::error::ArgusResult;
use argus_core::types::SecurityEvent;
use argus_core::windows::RAPID_REQUEST_WINDOW;

use super::{component, Detector, DetectorContext};
use crate::types::{DetectorId, ScoreComponent};

pub struct RapidRequests;

impl Detector for RapidRequests {
    fn id(&self) -> DetectorId {
        DetectorId::RapidRequests
    }

    fn score(
        &self,
        event: &SecurityEvent,
        ctx: &DetectorContext<'_>,
    ) -> ArgusResult<Option<ScoreComponent>> {
        let Some(addr) = &event.source_address else {
            return Ok(None);
        };
        let window_ms = ctx
            .windows
            .get_ms_or(RAPID_REQUEST_WINDOW, Duration::from_secs(60));
        let count = ctx.store.count_in_window(
            |e| e.source_address.as_deref() == Some(addr.as_str()),
            window_ms,
            ctx.now,
        );
        let max = ctx.cfg.rapid_requests_max_per_minute;
        if count <= max {
            return Ok(None);
        }
        let raw = (count as f64 / (max as f64 * 2.0)).min(1.0);
        let details = HashMap::from([
            ("requests_count".into(), count.to_string()),
            ("max_allowed".into(), max.to_string()),
            ("window_ms".into(), window_ms.to_string()),
        ]);
        Ok(Some(component(
            self.id(),
            raw,
            ctx.cfg.rapid_requests_weight,
            details,
        )))
    }
}
