//! Abstract time source.
//!
//! Every component that reasons about windows takes a `&dyn Clock` instead of
//! calling `chrono::Utc::now()` directly, so tests can drive a `ManualClock`
//! through window boundaries deterministically.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Milliseconds since the Unix epoch.
pub type Millis = i64;

/// A monotonic wall-clock source with single-writer semantics: only the
/// process advances it, readers only observe.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> Millis;
}

/// UTC day key ("YYYY-MM-DD"), used by the per-day statistics counters.
pub fn day_key_for(ts_ms: Millis) -> String {
    chrono::DateTime::from_timestamp_millis(ts_ms)
        .unwrap_or_default()
        .format("%Y-%m-%d")
        .to_string()
}

/// Production clock backed by the system wall clock.
#[derive(Debug, Default, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> Millis {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Test clock advanced explicitly. Never moves backwards.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: Millis) -> Arc<Self> {
        Arc::new(Self {
            now_ms: AtomicI64::new(start_ms),
        })
    }

    pub fn advance_ms(&self, delta: Millis) {
        self.now_ms.fetch_add(delta.max(0), Ordering::SeqCst);
    }

    pub fn advance_secs(&self, delta: i64) {
        self.advance_ms(delta * 1000);
    }

    pub fn set_ms(&self, ts: Millis) {
        // Single-writer semantics: only ever move forward.
        self.now_ms.fetch_max(ts, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Millis {
        self.now_ms.load(Ordering::SeqCst)
    }
}
