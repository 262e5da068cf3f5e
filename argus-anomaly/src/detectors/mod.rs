//! Detector capability set.
//!
//! A detector is a pure scorer: it reads the event, the store, and the
//! profile receipt, and returns at most one score component. Detectors never
//! mutate state, so a single event can be scored by all of them in parallel.
//!
//! A detector that returns `Err` is isolated by the aggregator: its
//! contribution is 0 and the failure is recorded on the score.

use std::collections::HashMap;
use std::sync::Arc;

use argus_core::clock::Millis;
use argus_core::config::DetectorConfig;
use argus_core::error::ArgusResult;
use argus_core::event_store::EventStore;
use argus_core::types::SecurityEvent;
use argus_core::windows::WindowRegistry;

use crate::profile::{ProfileTracker, UpdateReceipt};
use crate::types::{DetectorId, ScoreComponent};

mod behavior_change;
mod burst_activity;
mod failed_attempts;
mod geographic;
mod login_time;
mod rapid_requests;
mod suspicious_pattern;
mod unusual_source;

pub use behavior_change::BehaviorChange;
pub use burst_activity::BurstActivity;
pub use failed_attempts::FailedAttempts;
pub use geographic::GeographicAnomaly;
pub use login_time::UnusualLoginTime;
pub use rapid_requests::RapidRequests;
pub use suspicious_pattern::SuspiciousPattern;
pub use unusual_source::UnusualSource;

/// Read-only view handed to each detector for one event.
pub struct DetectorContext<'a> {
    pub store: &'a EventStore,
    pub profiles: &'a ProfileTracker,
    /// Profile state snapshot taken while this event was applied.
    pub receipt: &'a UpdateReceipt,
    pub cfg: &'a DetectorConfig,
    pub windows: &'a WindowRegistry,
    pub now: Millis,
}

pub trait Detector: Send + Sync {
    fn id(&self) -> DetectorId;

    /// `Ok(None)` means "nothing anomalous here"; `Err` is a detector
    /// failure, never a verdict.
    fn score(
        &self,
        event: &SecurityEvent,
        ctx: &DetectorContext<'_>,
    ) -> ArgusResult<Option<ScoreComponent>>;
}

/// The standard eight-detector set in evaluation order.
pub fn standard_detectors() -> Vec<Arc<dyn Detector>> {
    vec![
        Arc::new(UnusualLoginTime),
        Arc::new(UnusualSource),
        Arc::new(RapidRequests),
        Arc::new(FailedAttempts),
        Arc::new(SuspiciousPattern),
        Arc::new(BehaviorChange),
        Arc::new(BurstActivity),
        Arc::new(GeographicAnomaly),
    ]
}

/// UTC hour of day for an epoch-milliseconds timestamp.
pub(crate) fn event_hour(ts_ms: Millis) -> f64 {
    ((ts_ms / 1000 % 86_400 + 86_400) % 86_400 / 3_600) as f64
}

pub(crate) fn component(
    detector: DetectorId,
    raw: f64,
    weight: f64,
    details: HashMap<String, String>,
) -> ScoreComponent {
    ScoreComponent {
        detector,
        raw: raw.clamp(0.0, 1.0),
        weight,
        details,
    }
}
