//! Pipeline orchestrator: the single ingest entry point.
//!
//! Stage order per event: validate, append, profile update, parallel detector
//! scoring, aggregation, optional synthetic append, rule evaluation, dispatch
//! enqueue, audit append. Everything after the append is recovered locally;
//! producers only ever see schema, duplicate, or ingest-rate rejections.
//!
//! Detection and rule windows are event-time driven (the event's own
//! timestamp), which keeps scoring deterministic under replay; the wall
//! clock only stamps dispatch and maintenance.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use argus_core::clock::{Clock, Millis, SystemClock};
use argus_core::config::{ArgusConfig, DetectorConfig};
use argus_core::error::ArgusError;
use argus_core::event_store::EventStore;
use argus_core::types::{EventKind, SecurityEvent};
use argus_core::windows::WindowRegistry;

use argus_anomaly::{
    standard_detectors, AnomalyAggregator, AnomalyScore, Detector, DetectorContext,
    GeoResolver, NullGeoResolver, ProfileTracker,
};

use argus_alerting::{
    standard_rules, Alert, AlertChannel, AlertDispatcher, AlertRule, DashboardChannel,
    DispatchSink, DispatcherReport, RuleEngine, RuleEngineReport,
};

use argus_audit::{AuditBackend, AuditLog, MemoryBackend};

use crate::workers::{DetectorPool, JobFn};

/// Why an event was not ingested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    SchemaInvalid(String),
    DuplicateId,
    RateLimited,
}

/// Producer-visible result of `ingest`.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    Accepted {
        event_id: String,
        score: AnomalyScore,
        alert_ids: Vec<String>,
    },
    Rejected(RejectReason),
}

impl IngestOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, IngestOutcome::Accepted { .. })
    }

    pub fn score(&self) -> Option<&AnomalyScore> {
        match self {
            IngestOutcome::Accepted { score, .. } => Some(score),
            IngestOutcome::Rejected(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PipelineReport {
    pub accepted: u64,
    pub rejected: u64,
    pub events_stored: usize,
    pub events_appended: u64,
    pub events_dropped: u64,
    pub duplicate_rejections: u64,
    pub actor_profiles: usize,
    pub source_profiles: usize,
    pub rules: RuleEngineReport,
    pub dispatcher: DispatcherReport,
}

#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub evicted_events: usize,
    pub evicted_profiles: usize,
    pub pruned_cooldowns: usize,
}

/// Wires dispatch results back into the audit log.
struct AuditSink {
    audit: Arc<AuditLog>,
    clock: Arc<dyn Clock>,
}

impl DispatchSink for AuditSink {
    fn alert_resolved(&self, alert: Alert) {
        self.audit.append_alert(&alert);
    }

    fn dispatch_dropped(&self, alert_id: &str, channel: &str) {
        let event = SecurityEvent::new(
            format!("dispatch-drop-{alert_id}-{channel}"),
            self.clock.now_ms(),
            EventKind::SecurityAlert,
        )
        .with_attribute("dispatch_dropped", channel)
        .with_attribute("alert_id", alert_id);
        self.audit.append_event(&event);
    }
}

/// Fixed one-second window ingest limiter.
struct IngestLimiter {
    per_second: u32,
    state: Mutex<(Millis, u32)>,
}

impl IngestLimiter {
    fn allow(&self, now: Millis) -> bool {
        let mut state = self.state.lock();
        if now - state.0 >= 1_000 {
            *state = (now, 0);
        }
        if state.1 >= self.per_second {
            return false;
        }
        state.1 += 1;
        true
    }
}

pub struct Pipeline {
    clock: Arc<dyn Clock>,
    windows: Arc<WindowRegistry>,
    store: Arc<EventStore>,
    profiles: Arc<ProfileTracker>,
    geo: Arc<dyn GeoResolver>,
    detectors: Vec<Arc<dyn Detector>>,
    detector_cfg: Arc<DetectorConfig>,
    aggregator: AnomalyAggregator,
    rules: Arc<RuleEngine>,
    dispatcher: AlertDispatcher,
    audit: Arc<AuditLog>,
    pool: DetectorPool,
    limiter: Option<IngestLimiter>,
    retention_ms: i64,
    accepted: AtomicU64,
    rejected: AtomicU64,
}

impl Pipeline {
    pub fn builder(cfg: ArgusConfig) -> PipelineBuilder {
        PipelineBuilder {
            cfg,
            clock: None,
            geo: None,
            detectors: None,
            adapters: Vec::new(),
            backend: None,
        }
    }

    /// Validate, score, evaluate and dispatch one event.
    pub fn ingest(&self, event: SecurityEvent) -> IngestOutcome {
        if let Err(e) = event.validate() {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return IngestOutcome::Rejected(RejectReason::SchemaInvalid(e.to_string()));
        }
        if let Some(limiter) = &self.limiter {
            if !limiter.allow(self.clock.now_ms()) {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                return IngestOutcome::Rejected(RejectReason::RateLimited);
            }
        }
        match self.store.append(event.clone()) {
            Ok(_) => {}
            Err(ArgusError::DuplicateId(_)) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                return IngestOutcome::Rejected(RejectReason::DuplicateId);
            }
            Err(e) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                return IngestOutcome::Rejected(RejectReason::SchemaInvalid(e.to_string()));
            }
        }

        let now = event.timestamp_ms;
        let country = event
            .source_address
            .as_deref()
            .and_then(|addr| self.geo.country_for(addr));
        let receipt = Arc::new(self.profiles.update(&event, country));

        let shared = Arc::new(event.clone());
        let jobs: Vec<(argus_anomaly::DetectorId, JobFn)> = self
            .detectors
            .iter()
            .map(|detector| {
                let detector = detector.clone();
                let event = shared.clone();
                let store = self.store.clone();
                let profiles = self.profiles.clone();
                let receipt = receipt.clone();
                let cfg = self.detector_cfg.clone();
                let windows = self.windows.clone();
                let detector_id = detector.id();
                let job: JobFn = Box::new(move || {
                    let ctx = DetectorContext {
                        store: &store,
                        profiles: &profiles,
                        receipt: &receipt,
                        cfg: &cfg,
                        windows: &windows,
                        now,
                    };
                    detector.score(&event, &ctx)
                });
                (detector_id, job)
            })
            .collect();
        let outcomes = self.pool.run(jobs);
        let aggregated = self.aggregator.aggregate(&event, outcomes);

        if let Some(synthetic) = &aggregated.synthetic {
            match self.store.append(synthetic.clone()) {
                Ok(_) => self.audit.append_event(synthetic),
                Err(e) => warn!(id = %synthetic.id, error = %e, "Synthetic event not appended"),
            }
        }

        let alerts = self
            .rules
            .evaluate(&event, &aggregated.score, &self.store, now);
        let alert_ids: Vec<String> = alerts.iter().map(|a| a.id.clone()).collect();
        for alert in alerts {
            self.dispatcher.enqueue(alert);
        }

        self.audit.append_event(&event);
        self.accepted.fetch_add(1, Ordering::Relaxed);
        IngestOutcome::Accepted {
            event_id: event.id,
            score: aggregated.score,
            alert_ids,
        }
    }

    /// Periodic housekeeping: retention sweep, idle profile eviction,
    /// cooldown pruning.
    pub fn maintain(&self) -> MaintenanceReport {
        let now = self.clock.now_ms();
        let report = MaintenanceReport {
            evicted_events: self.store.evict_before(now - self.retention_ms),
            evicted_profiles: self.profiles.evict_idle(now),
            pruned_cooldowns: self.rules.prune_cooldowns(now),
        };
        if report.evicted_events > 0 || report.evicted_profiles > 0 {
            info!(
                events = report.evicted_events,
                profiles = report.evicted_profiles,
                "Maintenance sweep"
            );
        }
        report
    }

    pub fn report(&self) -> PipelineReport {
        let (actor_profiles, source_profiles) = self.profiles.profile_count();
        PipelineReport {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            events_stored: self.store.len(),
            events_appended: self.store.total_appended(),
            events_dropped: self.store.total_dropped(),
            duplicate_rejections: self.store.total_duplicates(),
            actor_profiles,
            source_profiles,
            rules: self.rules.report(),
            dispatcher: self.dispatcher.report(),
        }
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn profiles(&self) -> &ProfileTracker {
        &self.profiles
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    /// Stop workers after draining the dispatch queues.
    pub fn shutdown(&self) {
        self.dispatcher.shutdown();
        self.pool.shutdown();
        info!("Pipeline stopped");
    }
}

pub struct PipelineBuilder {
    cfg: ArgusConfig,
    clock: Option<Arc<dyn Clock>>,
    geo: Option<Arc<dyn GeoResolver>>,
    detectors: Option<Vec<Arc<dyn Detector>>>,
    adapters: Vec<Arc<dyn AlertChannel>>,
    backend: Option<Arc<dyn AuditBackend>>,
}

impl PipelineBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn geo(mut self, geo: Arc<dyn GeoResolver>) -> Self {
        self.geo = Some(geo);
        self
    }

    pub fn detectors(mut self, detectors: Vec<Arc<dyn Detector>>) -> Self {
        self.detectors = Some(detectors);
        self
    }

    pub fn channel(mut self, adapter: Arc<dyn AlertChannel>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn AuditBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn build(self) -> argus_core::error::ArgusResult<Pipeline> {
        let cfg = self.cfg;
        cfg.validate()?;

        let windows = Arc::new(WindowRegistry::standard());
        for (name, secs) in &cfg.windows.durations_secs {
            windows.set(name, std::time::Duration::from_secs(*secs));
        }

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let geo: Arc<dyn GeoResolver> = self.geo.unwrap_or_else(|| Arc::new(NullGeoResolver));
        let detectors = self.detectors.unwrap_or_else(standard_detectors);

        let rules = if cfg.rules.is_empty() {
            standard_rules(&windows)
        } else {
            cfg.rules
                .iter()
                .map(AlertRule::from_config)
                .collect::<Result<Vec<_>, _>>()?
        };

        let backend: Arc<dyn AuditBackend> = self.backend.unwrap_or_else(|| {
            Arc::new(MemoryBackend::new(
                cfg.audit.max_event_records,
                cfg.audit.max_alert_records,
            ))
        });
        let audit = Arc::new(AuditLog::new(backend, cfg.audit.clone()));

        let adapters = if self.adapters.is_empty() {
            vec![Arc::new(DashboardChannel::new("dashboard", 256)) as Arc<dyn AlertChannel>]
        } else {
            self.adapters
        };
        let sink = Arc::new(AuditSink {
            audit: audit.clone(),
            clock: clock.clone(),
        });
        let dispatcher = AlertDispatcher::new(
            adapters,
            &cfg.channels,
            &cfg.dispatcher,
            clock.clone(),
            sink,
        );

        let limiter = (cfg.general.ingest_rate_limit > 0).then(|| IngestLimiter {
            per_second: cfg.general.ingest_rate_limit,
            state: Mutex::new((0, 0)),
        });

        info!(
            detectors = detectors.len(),
            workers = cfg.general.detector_workers,
            ring = cfg.store.event_ring_capacity,
            "Pipeline assembled"
        );
        Ok(Pipeline {
            clock,
            windows,
            store: Arc::new(EventStore::new(cfg.store.event_ring_capacity)),
            profiles: Arc::new(ProfileTracker::new(cfg.profiles.clone())),
            geo,
            detectors,
            detector_cfg: Arc::new(cfg.detectors.clone()),
            aggregator: AnomalyAggregator::new(cfg.aggregator.clone()),
            rules: Arc::new(RuleEngine::new(rules)),
            dispatcher,
            audit,
            pool: DetectorPool::new(cfg.general.detector_workers),
            limiter,
            retention_ms: cfg.store.event_retention_secs as i64 * 1000,
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_core::clock::ManualClock;
    use argus_core::types::Outcome;

    fn pipeline() -> Pipeline {
        Pipeline::builder(ArgusConfig::default())
            .clock(ManualClock::new(1_000))
            .build()
            .unwrap()
    }

    #[test]
    fn test_accept_and_duplicate() {
        let pipeline = pipeline();
        let event = SecurityEvent::new("e1", 1_000, EventKind::ApiAccess).with_source("10.0.0.1");
        assert!(pipeline.ingest(event.clone()).is_accepted());
        match pipeline.ingest(event) {
            IngestOutcome::Rejected(RejectReason::DuplicateId) => {}
            other => panic!("expected duplicate rejection, got {other:?}"),
        }
        let report = pipeline.report();
        assert_eq!(report.accepted, 1);
        assert_eq!(report.rejected, 1);
        pipeline.shutdown();
    }

    #[test]
    fn test_schema_rejection() {
        let pipeline = pipeline();
        let bad = SecurityEvent::new("", 1_000, EventKind::ApiAccess);
        assert!(matches!(
            pipeline.ingest(bad),
            IngestOutcome::Rejected(RejectReason::SchemaInvalid(_))
        ));
        pipeline.shutdown();
    }

    #[test]
    fn test_ingest_rate_limit() {
        let mut cfg = ArgusConfig::default();
        cfg.general.ingest_rate_limit = 2;
        let clock = ManualClock::new(1_000);
        let pipeline = Pipeline::builder(cfg).clock(clock.clone()).build().unwrap();
        for i in 0..2 {
            let ev = SecurityEvent::new(format!("e{i}"), 1_000 + i, EventKind::ApiAccess);
            assert!(pipeline.ingest(ev).is_accepted());
        }
        let third = SecurityEvent::new("e9", 1_003, EventKind::ApiAccess);
        assert!(matches!(
            pipeline.ingest(third),
            IngestOutcome::Rejected(RejectReason::RateLimited)
        ));
        // Next second refills the window.
        clock.advance_ms(1_000);
        let ev = SecurityEvent::new("e10", 2_100, EventKind::ApiAccess);
        assert!(pipeline.ingest(ev).is_accepted());
        pipeline.shutdown();
    }

    #[test]
    fn test_audit_records_ingested_events() {
        let pipeline = pipeline();
        let event = SecurityEvent::new("e1", 1_000, EventKind::LoginSuccess)
            .with_actor("u1")
            .with_outcome(Outcome::Success);
        pipeline.ingest(event);
        let listed = pipeline
            .audit()
            .list_events(argus_audit::EventFilter::default())
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "e1");
        pipeline.shutdown();
    }
}
