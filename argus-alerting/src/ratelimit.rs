//! Fixed-window token buckets for channel sends.
//!
//! The budget is shared per channel across grouping keys: a burst of alerts
//! about many different sources still cannot flood a single channel.

use parking_lot::Mutex;
use std::collections::HashMap;

use argus_core::clock::Millis;

#[derive(Debug, Clone)]
struct Bucket {
    tokens: u32,
    window_start: Millis,
}

#[derive(Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take one token from the channel's bucket. Tokens refill to `max` when
    /// the window rolls over; the count never exceeds `max` and never goes
    /// negative.
    pub fn acquire(&self, channel: &str, max: u32, window_ms: i64, now: Millis) -> bool {
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(channel.to_string()).or_insert(Bucket {
            tokens: max,
            window_start: now,
        });
        if now - bucket.window_start >= window_ms {
            bucket.tokens = max;
            bucket.window_start = now;
        }
        if bucket.tokens == 0 {
            return false;
        }
        bucket.tokens -= 1;
        true
    }

    pub fn tokens_remaining(&self, channel: &str) -> Option<u32> {
        self.buckets.lock().get(channel).map(|b| b.tokens)
    }
}
