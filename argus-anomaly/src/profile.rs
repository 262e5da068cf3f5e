//! Profile Tracker — short-term behavioral profiles.
//!
//! Two independent profile families are kept, one keyed by actor and one by
//! source address. Every retained structure is bounded by configuration
//! (capped LRU source set, capped and age-trimmed deques, decayed hour
//! histogram), so memory per profile is O(1) regardless of ingest volume.
//!
//! Profiles are stored as `Arc<Mutex<_>>` entries under an outer RwLock map:
//! unrelated keys update in parallel, the same key serializes.

use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

use argus_core::clock::Millis;
use argus_core::config::ProfileConfig;
use argus_core::types::{EventKind, SecurityEvent};

/// Snapshot of profile state taken while applying one event. Detectors read
/// the receipt instead of re-querying the tracker so that "was this source
/// known before this event" stays answerable after the update.
#[derive(Debug, Clone, Default)]
pub struct UpdateReceipt {
    /// Hour-histogram mean/std of the actor profile before this event, when
    /// the profile had any login history.
    pub prior_hour_stats: Option<(f64, f64)>,
    /// The event's source address was already in the actor's known set.
    pub source_known_before: bool,
    /// The actor profile had at least one known source before this event.
    pub actor_had_sources: bool,
    /// First time the actor profile was ever seen, if it existed before.
    pub actor_first_seen: Option<Millis>,
    /// Country resolved for the event's source address, if any.
    pub country: Option<String>,
}

/// Per-key short-term behavioral profile.
#[derive(Debug, Clone)]
pub struct BehavioralProfile {
    pub first_seen: Millis,
    pub last_seen: Millis,
    /// Exponentially decayed histogram of login-success hours.
    pub hour_histogram: [f64; 24],
    /// LRU of source addresses, most recent at the back.
    pub known_sources: VecDeque<String>,
    /// (timestamp, source) of recent login/MFA failures.
    pub recent_failures: VecDeque<(Millis, Option<String>)>,
    /// Timestamps of recent events of any kind.
    pub recent_activity: VecDeque<Millis>,
    pub country_last_seen: Option<String>,
}

impl BehavioralProfile {
    fn new(now: Millis) -> Self {
        Self {
            first_seen: now,
            last_seen: now,
            hour_histogram: [0.0; 24],
            known_sources: VecDeque::new(),
            recent_failures: VecDeque::new(),
            recent_activity: VecDeque::new(),
            country_last_seen: None,
        }
    }

    /// Weighted mean and standard deviation of login hours. `None` until the
    /// histogram holds any mass.
    pub fn hour_mean_std(&self) -> Option<(f64, f64)> {
        let mass: f64 = self.hour_histogram.iter().sum();
        if mass <= f64::EPSILON {
            return None;
        }
        let mean: f64 = self
            .hour_histogram
            .iter()
            .enumerate()
            .map(|(h, w)| h as f64 * w)
            .sum::<f64>()
            / mass;
        let var: f64 = self
            .hour_histogram
            .iter()
            .enumerate()
            .map(|(h, w)| (h as f64 - mean).powi(2) * w)
            .sum::<f64>()
            / mass;
        // Concentrated histories get a std floor so z-scores stay finite.
        Some((mean, var.sqrt().max(2.0)))
    }

    fn touch_source(&mut self, addr: &str, cap: usize) -> bool {
        let known = if let Some(pos) = self.known_sources.iter().position(|s| s == addr) {
            self.known_sources.remove(pos);
            true
        } else {
            false
        };
        self.known_sources.push_back(addr.to_string());
        while self.known_sources.len() > cap {
            self.known_sources.pop_front();
        }
        known
    }

    fn trim(&mut self, cfg: &ProfileConfig, now: Millis) {
        let fail_cutoff = now - cfg.recent_failures_max_age_secs as i64 * 1000;
        while self
            .recent_failures
            .front()
            .is_some_and(|(ts, _)| *ts < fail_cutoff)
        {
            self.recent_failures.pop_front();
        }
        while self.recent_failures.len() > cfg.recent_failures_cap {
            self.recent_failures.pop_front();
        }
        let act_cutoff = now - cfg.recent_activity_max_age_secs as i64 * 1000;
        while self.recent_activity.front().is_some_and(|ts| *ts < act_cutoff) {
            self.recent_activity.pop_front();
        }
        while self.recent_activity.len() > cfg.recent_activity_cap {
            self.recent_activity.pop_front();
        }
    }
}

/// Which profile family a read targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKey<'a> {
    Actor(&'a str),
    Source(&'a str),
}

type ProfileMap = RwLock<HashMap<String, Arc<Mutex<BehavioralProfile>>>>;

/// Owns all behavioral profiles.
pub struct ProfileTracker {
    cfg: ProfileConfig,
    actors: ProfileMap,
    sources: ProfileMap,
}

impl ProfileTracker {
    pub fn new(cfg: ProfileConfig) -> Self {
        Self {
            cfg,
            actors: RwLock::new(HashMap::new()),
            sources: RwLock::new(HashMap::new()),
        }
    }

    fn entry(map: &ProfileMap, key: &str, now: Millis) -> Arc<Mutex<BehavioralProfile>> {
        if let Some(profile) = map.read().get(key) {
            return profile.clone();
        }
        map.write()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(BehavioralProfile::new(now))))
            .clone()
    }

    /// Apply one event to both profile families. Deterministic: driven by the
    /// event timestamp, not the wall clock.
    pub fn update(&self, event: &SecurityEvent, country: Option<String>) -> UpdateReceipt {
        let now = event.timestamp_ms;
        let hour = ((now / 1000 % 86_400 + 86_400) % 86_400 / 3600) as usize;
        let is_login_success = event.kind == EventKind::LoginSuccess;
        let is_failure =
            matches!(event.kind, EventKind::LoginFailure | EventKind::MfaFailure);

        let mut receipt = UpdateReceipt {
            country: country.clone(),
            ..Default::default()
        };

        if let Some(actor) = &event.actor_id {
            let profile = Self::entry(&self.actors, actor, now);
            let mut p = profile.lock();
            receipt.prior_hour_stats = p.hour_mean_std();
            receipt.actor_had_sources = !p.known_sources.is_empty();
            receipt.actor_first_seen = Some(p.first_seen);

            if let Some(addr) = &event.source_address {
                receipt.source_known_before = p.touch_source(addr, self.cfg.known_sources_cap);
            }
            if is_login_success {
                p.hour_histogram[hour] = p.hour_histogram[hour] * self.cfg.hour_decay + 1.0;
            }
            if is_failure {
                p.recent_failures
                    .push_back((now, event.source_address.clone()));
            }
            p.recent_activity.push_back(now);
            if country.is_some() {
                p.country_last_seen = country.clone();
            }
            p.last_seen = p.last_seen.max(now);
            p.trim(&self.cfg, now);
        }

        if let Some(addr) = &event.source_address {
            let profile = Self::entry(&self.sources, addr, now);
            let mut p = profile.lock();
            if is_login_success {
                p.hour_histogram[hour] = p.hour_histogram[hour] * self.cfg.hour_decay + 1.0;
            }
            if is_failure {
                p.recent_failures
                    .push_back((now, event.source_address.clone()));
            }
            p.recent_activity.push_back(now);
            if country.is_some() {
                p.country_last_seen = country;
            }
            p.last_seen = p.last_seen.max(now);
            p.trim(&self.cfg, now);
        }

        receipt
    }

    fn with_profile<T>(
        &self,
        key: ProfileKey<'_>,
        f: impl FnOnce(&BehavioralProfile) -> T,
    ) -> Option<T> {
        let (map, name) = match key {
            ProfileKey::Actor(a) => (&self.actors, a),
            ProfileKey::Source(s) => (&self.sources, s),
        };
        let profile = map.read().get(name)?.clone();
        let p = profile.lock();
        Some(f(&p))
    }

    pub fn hour_mean_std(&self, actor: &str) -> Option<(f64, f64)> {
        self.with_profile(ProfileKey::Actor(actor), |p| p.hour_mean_std())?
    }

    /// True when the actor has login history from other sources and this
    /// address is not among them.
    pub fn is_new_source(&self, actor: &str, addr: &str) -> bool {
        self.with_profile(ProfileKey::Actor(actor), |p| {
            !p.known_sources.is_empty() && !p.known_sources.iter().any(|s| s == addr)
        })
        .unwrap_or(false)
    }

    /// Failures recorded for the key with `timestamp ∈ (now−window, now]`.
    pub fn failure_count(&self, key: ProfileKey<'_>, window_ms: i64, now: Millis) -> usize {
        self.with_profile(key, |p| {
            let cutoff = now - window_ms;
            p.recent_failures
                .iter()
                .filter(|(ts, _)| *ts > cutoff && *ts <= now)
                .count()
        })
        .unwrap_or(0)
    }

    /// Events of any kind recorded for the key inside the window.
    pub fn activity_count(&self, key: ProfileKey<'_>, window_ms: i64, now: Millis) -> usize {
        self.with_profile(key, |p| {
            let cutoff = now - window_ms;
            p.recent_activity
                .iter()
                .filter(|ts| **ts > cutoff && **ts <= now)
                .count()
        })
        .unwrap_or(0)
    }

    pub fn country_last_seen(&self, key: ProfileKey<'_>) -> Option<String> {
        self.with_profile(key, |p| p.country_last_seen.clone())?
    }

    pub fn known_sources(&self, actor: &str) -> Vec<String> {
        self.with_profile(ProfileKey::Actor(actor), |p| {
            p.known_sources.iter().cloned().collect()
        })
        .unwrap_or_default()
    }

    pub fn first_seen(&self, key: ProfileKey<'_>) -> Option<Millis> {
        self.with_profile(key, |p| p.first_seen)
    }

    /// Drop profiles idle past the configured horizon. Returns evicted count.
    pub fn evict_idle(&self, now: Millis) -> usize {
        let cutoff = now - self.cfg.idle_eviction_secs as i64 * 1000;
        let mut evicted = 0usize;
        for map in [&self.actors, &self.sources] {
            let mut m = map.write();
            let before = m.len();
            m.retain(|_, p| p.lock().last_seen >= cutoff);
            evicted += before - m.len();
        }
        if evicted > 0 {
            debug!(evicted, "Idle profiles evicted");
        }
        evicted
    }

    pub fn profile_count(&self) -> (usize, usize) {
        (self.actors.read().len(), self.sources.read().len())
    }
}
