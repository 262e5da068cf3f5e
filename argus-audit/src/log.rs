//! Audit log: durable record of events and alerts plus materialized
//! statistics.
//!
//! Counters are updated on append, so `statistics` never scans the backend.
//! Persistence failures are recovered locally: the failure is counted and
//! surfaced through statistics, never propagated into ingest.

use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use argus_core::clock::{day_key_for, Millis};
use argus_core::config::AuditConfig;
use argus_core::error::{ArgusError, ArgusResult};
use argus_core::types::{EventKind, SecurityEvent};

use argus_alerting::Alert;

use crate::backend::AuditBackend;
use crate::types::{AlertFilter, DayStats, EventFilter, Statistics, MAX_PAGE_LIMIT};

const DEFAULT_PAGE_LIMIT: usize = 100;
/// Day buckets retained for statistics; older ones are swept.
const DAY_RETENTION: usize = 400;

#[derive(Default)]
struct StatsInner {
    total_events: u64,
    total_alerts: u64,
    events_by_kind: HashMap<String, u64>,
    events_by_severity: HashMap<String, u64>,
    alerts_by_priority: HashMap<String, u64>,
    source_counts: HashMap<String, u64>,
    days: BTreeMap<String, DayStats>,
}

pub struct AuditLog {
    backend: Arc<dyn AuditBackend>,
    cfg: AuditConfig,
    stats: RwLock<StatsInner>,
    /// Insertion-ordered so the oldest acknowledgements age out first.
    acked: Mutex<(VecDeque<String>, HashSet<String>)>,
    storage_failures: AtomicU64,
}

impl AuditLog {
    pub fn new(backend: Arc<dyn AuditBackend>, cfg: AuditConfig) -> Self {
        Self {
            backend,
            cfg,
            stats: RwLock::new(StatsInner::default()),
            acked: Mutex::new((VecDeque::new(), HashSet::new())),
            storage_failures: AtomicU64::new(0),
        }
    }

    /// Record one event. Statistics update unconditionally; a failing
    /// backend is retried once for transient faults, then counted.
    pub fn append_event(&self, event: &SecurityEvent) {
        {
            let mut stats = self.stats.write();
            stats.total_events += 1;
            *stats
                .events_by_kind
                .entry(event.kind.wire_tag().to_string())
                .or_default() += 1;
            *stats
                .events_by_severity
                .entry(format!("{:?}", event.severity_hint).to_lowercase())
                .or_default() += 1;
            if let Some(addr) = &event.source_address {
                bump_source(&mut stats.source_counts, addr, self.cfg.top_sources_tracked);
            }
            let day = stats
                .days
                .entry(day_key_for(event.timestamp_ms))
                .or_insert_with(|| DayStats {
                    day: day_key_for(event.timestamp_ms),
                    ..Default::default()
                });
            day.events += 1;
            if event.kind == EventKind::SuspiciousActivity {
                day.anomalies += 1;
                if let Some(score) = event
                    .attributes
                    .get("anomaly_score")
                    .and_then(|s| s.parse::<f64>().ok())
                {
                    day.anomaly_score_sum += score;
                }
            }
            while stats.days.len() > DAY_RETENTION {
                stats.days.pop_first();
            }
        }
        let deadline = self.persist_deadline();
        self.persist(|| self.backend.persist_event(event, deadline), "event", &event.id);
    }

    pub fn append_alert(&self, alert: &Alert) {
        {
            let mut stats = self.stats.write();
            stats.total_alerts += 1;
            *stats
                .alerts_by_priority
                .entry(alert.priority.wire_tag().to_string())
                .or_default() += 1;
            if let Some(day) = stats.days.get_mut(&day_key_for(alert.timestamp_ms)) {
                day.alerts += 1;
            }
        }
        let deadline = self.persist_deadline();
        self.persist(|| self.backend.persist_alert(alert, deadline), "alert", &alert.id);
    }

    /// Budget for one backend write, from `persist_timeout_ms`.
    fn persist_deadline(&self) -> Duration {
        Duration::from_millis(self.cfg.persist_timeout_ms.max(1))
    }

    fn persist(&self, op: impl Fn() -> ArgusResult<()>, record: &str, id: &str) {
        let result = match op() {
            Err(e) if e.is_transient() => op(),
            other => other,
        };
        if let Err(e) = result {
            self.storage_failures.fetch_add(1, Ordering::Relaxed);
            warn!(%record, %id, error = %e, "Audit persistence failed");
        }
    }

    pub fn list_events(&self, mut filter: EventFilter) -> ArgusResult<Vec<SecurityEvent>> {
        filter.limit = normalize_limit(filter.limit)?;
        self.backend.events(&filter)
    }

    pub fn list_alerts(&self, mut filter: AlertFilter) -> ArgusResult<Vec<Alert>> {
        filter.limit = normalize_limit(filter.limit)?;
        self.backend.alerts(&filter)
    }

    /// Mark an alert as handled by an operator.
    pub fn acknowledge(&self, alert_id: &str) -> ArgusResult<()> {
        if self.backend.alert_by_id(alert_id)?.is_none() {
            return Err(ArgusError::NotFound(format!("alert '{alert_id}'")));
        }
        let mut acked = self.acked.lock();
        if acked.1.insert(alert_id.to_string()) {
            acked.0.push_back(alert_id.to_string());
            while acked.0.len() > self.cfg.max_alert_records {
                if let Some(old) = acked.0.pop_front() {
                    acked.1.remove(&old);
                }
            }
            debug!(alert = alert_id, "Alert acknowledged");
        }
        Ok(())
    }

    pub fn is_acknowledged(&self, alert_id: &str) -> bool {
        self.acked.lock().1.contains(alert_id)
    }

    /// Alerts matching the filter that no operator has acknowledged yet.
    pub fn list_unacknowledged(&self, filter: AlertFilter) -> ArgusResult<Vec<Alert>> {
        let alerts = self.list_alerts(filter)?;
        let acked = self.acked.lock();
        Ok(alerts
            .into_iter()
            .filter(|a| !acked.1.contains(&a.id))
            .collect())
    }

    /// Aggregate over the trailing `range_days` ending at `now_ms`.
    pub fn statistics(&self, range_days: u32, now_ms: Millis) -> Statistics {
        let stats = self.stats.read();
        let cutoff = day_key_for(now_ms - range_days.max(1) as i64 * 86_400_000 + 86_400_000);
        let days: Vec<DayStats> = stats
            .days
            .range(cutoff..)
            .map(|(_, d)| d.clone())
            .collect();
        let mut top_sources: Vec<(String, u64)> = stats
            .source_counts
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        top_sources.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        Statistics {
            range_days,
            total_events: stats.total_events,
            total_alerts: stats.total_alerts,
            events_by_kind: stats.events_by_kind.clone(),
            events_by_severity: stats.events_by_severity.clone(),
            alerts_by_priority: stats.alerts_by_priority.clone(),
            top_sources,
            days,
            storage_failures: self.storage_failures.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn backend(&self) -> &Arc<dyn AuditBackend> {
        &self.backend
    }

    pub(crate) fn export_page_size(&self) -> usize {
        self.cfg.export_page_size.max(1)
    }
}

/// Track at most `cap` distinct sources; a newcomer evicts the current
/// minimum so heavy hitters survive.
fn bump_source(counts: &mut HashMap<String, u64>, addr: &str, cap: usize) {
    if let Some(count) = counts.get_mut(addr) {
        *count += 1;
        return;
    }
    if counts.len() >= cap.max(1) {
        if let Some(min_key) = counts
            .iter()
            .min_by_key(|(_, v)| **v)
            .map(|(k, _)| k.clone())
        {
            counts.remove(&min_key);
        }
    }
    counts.insert(addr.to_string(), 1);
}

fn normalize_limit(limit: usize) -> ArgusResult<usize> {
    if limit == 0 {
        return Ok(DEFAULT_PAGE_LIMIT);
    }
    if limit > MAX_PAGE_LIMIT {
        return Err(ArgusError::InvalidArgument(format!(
            "limit {limit} exceeds maximum {MAX_PAGE_LIMIT}"
        )));
    }
    Ok(limit)
}
