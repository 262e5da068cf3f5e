//! Asynchronous alert dispatch.
//!
//! One worker thread and one bounded queue per channel. Enqueueing never
//! blocks the caller: a saturated queue evicts its oldest pending alert and
//! the eviction is reported through the sink. Channels are fully independent,
//! one stalled transport never delays another.

use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, warn};

use argus_core::clock::Clock;
use argus_core::config::{ChannelConfig, DispatcherConfig};

use crate::channels::{AlertChannel, SendOutcome};
use crate::ratelimit::RateLimiter;
use crate::types::{Alert, SendResult, SendStatus};

/// Receives dispatch outcomes. The pipeline wires this to the audit log.
pub trait DispatchSink: Send + Sync {
    /// Called exactly once per enqueued alert, after every target channel
    /// has a terminal result.
    fn alert_resolved(&self, alert: Alert);
    /// Called when a pending delivery is evicted from a saturated queue.
    fn dispatch_dropped(&self, alert_id: &str, channel: &str);
}

struct ChannelRuntime {
    cfg: ChannelConfig,
    adapter: Arc<dyn AlertChannel>,
    queue: Mutex<VecDeque<Arc<Alert>>>,
    signal: Condvar,
}

struct Pending {
    alert: Alert,
    remaining: usize,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DispatcherReport {
    pub enqueued: u64,
    pub sent: u64,
    pub rate_limited: u64,
    pub failed: u64,
    pub dropped: u64,
}

struct DispatcherInner {
    channels: HashMap<String, ChannelRuntime>,
    queue_capacity: usize,
    limiter: RateLimiter,
    pendings: Mutex<HashMap<String, Pending>>,
    sink: Arc<dyn DispatchSink>,
    clock: Arc<dyn Clock>,
    shutdown: AtomicBool,
    enqueued: AtomicU64,
    sent: AtomicU64,
    rate_limited: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

pub struct AlertDispatcher {
    inner: Arc<DispatcherInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl AlertDispatcher {
    /// Adapters without an explicit config entry run with default knobs.
    pub fn new(
        adapters: Vec<Arc<dyn AlertChannel>>,
        channel_cfgs: &[ChannelConfig],
        dispatcher_cfg: &DispatcherConfig,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn DispatchSink>,
    ) -> Self {
        let mut channels = HashMap::new();
        for adapter in adapters {
            let id = adapter.id().to_string();
            let cfg = channel_cfgs
                .iter()
                .find(|c| c.id == id)
                .cloned()
                .unwrap_or_else(|| ChannelConfig::named(&id, "dashboard"));
            channels.insert(
                id,
                ChannelRuntime {
                    cfg,
                    adapter,
                    queue: Mutex::new(VecDeque::new()),
                    signal: Condvar::new(),
                },
            );
        }
        let inner = Arc::new(DispatcherInner {
            channels,
            queue_capacity: dispatcher_cfg.queue_capacity,
            limiter: RateLimiter::new(),
            pendings: Mutex::new(HashMap::new()),
            sink,
            clock,
            shutdown: AtomicBool::new(false),
            enqueued: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        });
        let mut workers = Vec::new();
        for channel_id in inner.channels.keys().cloned().collect::<Vec<_>>() {
            let inner = inner.clone();
            workers.push(
                std::thread::Builder::new()
                    .name(format!("dispatch-{channel_id}"))
                    .spawn(move || worker_loop(inner, channel_id))
                    .unwrap_or_else(|e| panic!("failed to spawn dispatch worker: {e}")),
            );
        }
        info!(
            channels = inner.channels.len(),
            queue_capacity = dispatcher_cfg.queue_capacity,
            "Dispatcher started"
        );
        Self {
            inner,
            workers: Mutex::new(workers),
        }
    }

    /// Route an alert to its target channels. Never blocks on delivery.
    pub fn enqueue(&self, alert: Alert) {
        self.inner.enqueue(alert);
    }

    pub fn report(&self) -> DispatcherReport {
        DispatcherReport {
            enqueued: self.inner.enqueued.load(Ordering::Relaxed),
            sent: self.inner.sent.load(Ordering::Relaxed),
            rate_limited: self.inner.rate_limited.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
            dropped: self.inner.dropped.load(Ordering::Relaxed),
        }
    }

    /// Drain queues and stop the workers. Idempotent.
    pub fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        for rt in self.inner.channels.values() {
            let _q = rt.queue.lock();
            rt.signal.notify_all();
        }
        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
        info!("Dispatcher stopped");
    }
}

impl Drop for AlertDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl DispatcherInner {
    fn enqueue(&self, alert: Alert) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now_ms();

        // Unknown or disabled channels resolve immediately as skipped.
        let mut skipped: Vec<SendResult> = Vec::new();
        let mut targets: Vec<&ChannelRuntime> = Vec::new();
        for name in &alert.channels {
            match self.channels.get(name) {
                Some(rt) if rt.cfg.enabled => targets.push(rt),
                _ => skipped.push(SendResult {
                    channel: name.clone(),
                    status: SendStatus::Skipped,
                    attempts: 0,
                    completed_at_ms: now,
                }),
            }
        }

        let alert_id = alert.id.clone();
        {
            let mut pendings = self.pendings.lock();
            let mut pending = Pending {
                alert,
                remaining: targets.len(),
            };
            pending.alert.send_results.extend(skipped);
            if pending.remaining == 0 {
                drop(pendings);
                self.sink.alert_resolved(pending.alert);
                return;
            }
            let shared = Arc::new(pending.alert.clone());
            pendings.insert(alert_id.clone(), pending);
            drop(pendings);

            for rt in targets {
                self.push_bounded(rt, shared.clone(), now);
            }
        }
    }

    /// Push to one channel queue, evicting the oldest entry on overflow.
    fn push_bounded(&self, rt: &ChannelRuntime, alert: Arc<Alert>, now: i64) {
        let evicted = {
            let mut queue = rt.queue.lock();
            let evicted = if queue.len() >= self.queue_capacity {
                queue.pop_front()
            } else {
                None
            };
            queue.push_back(alert);
            rt.signal.notify_one();
            evicted
        };
        if let Some(old) = evicted {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(channel = rt.adapter.id(), alert = %old.id, "Queue full, oldest alert dropped");
            self.sink.dispatch_dropped(&old.id, rt.adapter.id());
            self.complete(
                &old.id,
                SendResult {
                    channel: rt.adapter.id().to_string(),
                    status: SendStatus::Dropped,
                    attempts: 0,
                    completed_at_ms: now,
                },
            );
        }
    }

    fn deliver(&self, rt: &ChannelRuntime, alert: Arc<Alert>) {
        let channel_id = rt.adapter.id().to_string();
        let now = self.clock.now_ms();
        if !self.limiter.acquire(
            &channel_id,
            rt.cfg.rate_limit_max,
            rt.cfg.rate_limit_window_secs as i64 * 1000,
            now,
        ) {
            self.rate_limited.fetch_add(1, Ordering::Relaxed);
            debug!(channel = %channel_id, alert = %alert.id, "Channel rate limited");
            self.complete(
                &alert.id,
                SendResult {
                    channel: channel_id,
                    status: SendStatus::RateLimited,
                    attempts: 0,
                    completed_at_ms: now,
                },
            );
            return;
        }

        let timeout = Duration::from_secs(rt.cfg.send_timeout_secs);
        let mut attempts = 0u32;
        let status = loop {
            attempts += 1;
            match rt.adapter.send(&alert, timeout) {
                SendOutcome::Ok => break SendStatus::Sent,
                SendOutcome::Permanent => break SendStatus::FailedPermanent,
                SendOutcome::Transient => {
                    if attempts > rt.cfg.retries {
                        break SendStatus::FailedTransient;
                    }
                    let backoff = rt.cfg.backoff_base_ms.saturating_mul(1 << (attempts - 1));
                    std::thread::sleep(Duration::from_millis(backoff));
                }
            }
        };
        match status {
            SendStatus::Sent => {
                self.sent.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(channel = %channel_id, alert = %alert.id, ?status, attempts, "Delivery failed");
            }
        }
        self.complete(
            &alert.id,
            SendResult {
                channel: channel_id,
                status,
                attempts,
                completed_at_ms: self.clock.now_ms(),
            },
        );
    }

    fn complete(&self, alert_id: &str, result: SendResult) {
        let resolved = {
            let mut pendings = self.pendings.lock();
            let Some(pending) = pendings.get_mut(alert_id) else {
                return;
            };
            pending.alert.send_results.push(result);
            pending.remaining -= 1;
            if pending.remaining == 0 {
                pendings.remove(alert_id).map(|p| p.alert)
            } else {
                None
            }
        };
        if let Some(alert) = resolved {
            self.sink.alert_resolved(alert);
        }
    }
}

fn worker_loop(inner: Arc<DispatcherInner>, channel_id: String) {
    let rt = match inner.channels.get(&channel_id) {
        Some(rt) => rt,
        None => return,
    };
    loop {
        let item = {
            let mut queue = rt.queue.lock();
            loop {
                if let Some(alert) = queue.pop_front() {
                    break Some(alert);
                }
                if inner.shutdown.load(Ordering::SeqCst) {
                    break None;
                }
                rt.signal.wait(&mut queue);
            }
        };
        match item {
            Some(alert) => inner.deliver(rt, alert),
            None => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::ChannelKind;
    use crate::types::AlertPriority;
    use argus_core::clock::ManualClock;

    struct ScriptedChannel {
        id: String,
        script: Mutex<Vec<SendOutcome>>,
        calls: AtomicU64,
    }

    impl ScriptedChannel {
        fn new(id: &str, script: Vec<SendOutcome>) -> Arc<Self> {
            Arc::new(Self {
                id: id.into(),
                script: Mutex::new(script),
                calls: AtomicU64::new(0),
            })
        }
    }

    impl AlertChannel for ScriptedChannel {
        fn id(&self) -> &str {
            &self.id
        }
        fn kind(&self) -> ChannelKind {
            ChannelKind::Webhook
        }
        fn send(&self, _alert: &Alert, _timeout: Duration) -> SendOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock();
            if script.is_empty() {
                SendOutcome::Ok
            } else {
                script.remove(0)
            }
        }
    }

    /// Blocks sends until the gate opens; lets tests fill a queue.
    struct GatedChannel {
        id: String,
        gate: Mutex<bool>,
        opened: Condvar,
    }

    impl GatedChannel {
        fn new(id: &str) -> Arc<Self> {
            Arc::new(Self {
                id: id.into(),
                gate: Mutex::new(false),
                opened: Condvar::new(),
            })
        }
        fn open(&self) {
            *self.gate.lock() = true;
            self.opened.notify_all();
        }
    }

    impl AlertChannel for GatedChannel {
        fn id(&self) -> &str {
            &self.id
        }
        fn kind(&self) -> ChannelKind {
            ChannelKind::Webhook
        }
        fn send(&self, _alert: &Alert, _timeout: Duration) -> SendOutcome {
            let mut open = self.gate.lock();
            while !*open {
                self.opened.wait(&mut open);
            }
            SendOutcome::Ok
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        resolved: Mutex<Vec<Alert>>,
        drops: Mutex<Vec<(String, String)>>,
        signal: Condvar,
    }

    impl CollectingSink {
        fn wait_resolved(&self, n: usize) -> Vec<Alert> {
            let mut resolved = self.resolved.lock();
            while resolved.len() < n {
                if self
                    .signal
                    .wait_for(&mut resolved, Duration::from_secs(5))
                    .timed_out()
                {
                    panic!("timed out waiting for {n} resolved alerts");
                }
            }
            resolved.clone()
        }
    }

    impl DispatchSink for CollectingSink {
        fn alert_resolved(&self, alert: Alert) {
            self.resolved.lock().push(alert);
            self.signal.notify_all();
        }
        fn dispatch_dropped(&self, alert_id: &str, channel: &str) {
            self.drops.lock().push((alert_id.into(), channel.into()));
        }
    }

    fn alert(id: &str, channels: &[&str]) -> Alert {
        Alert {
            id: id.into(),
            rule_id: "r".into(),
            grouping_key: "k".into(),
            timestamp_ms: 0,
            priority: AlertPriority::High,
            channels: channels.iter().map(|s| s.to_string()).collect(),
            rendered_message: "m".into(),
            evidence: Vec::new(),
            send_results: Vec::new(),
        }
    }

    fn fast_cfg(id: &str) -> ChannelConfig {
        ChannelConfig {
            backoff_base_ms: 1,
            ..ChannelConfig::named(id, "webhook")
        }
    }

    #[test]
    fn test_single_send_resolves() {
        let sink = Arc::new(CollectingSink::default());
        let channel = ScriptedChannel::new("webhook", vec![SendOutcome::Ok]);
        let dispatcher = AlertDispatcher::new(
            vec![channel],
            &[fast_cfg("webhook")],
            &DispatcherConfig::default(),
            ManualClock::new(0),
            sink.clone(),
        );
        dispatcher.enqueue(alert("a1", &["webhook"]));
        let resolved = sink.wait_resolved(1);
        assert_eq!(resolved[0].send_results.len(), 1);
        assert_eq!(resolved[0].send_results[0].status, SendStatus::Sent);
        assert_eq!(resolved[0].send_results[0].attempts, 1);
        dispatcher.shutdown();
    }

    #[test]
    fn test_transient_retry_then_success() {
        let sink = Arc::new(CollectingSink::default());
        let channel = ScriptedChannel::new(
            "webhook",
            vec![SendOutcome::Transient, SendOutcome::Transient, SendOutcome::Ok],
        );
        let dispatcher = AlertDispatcher::new(
            vec![channel.clone()],
            &[fast_cfg("webhook")],
            &DispatcherConfig::default(),
            ManualClock::new(0),
            sink.clone(),
        );
        dispatcher.enqueue(alert("a1", &["webhook"]));
        let resolved = sink.wait_resolved(1);
        assert_eq!(resolved[0].send_results[0].status, SendStatus::Sent);
        assert_eq!(resolved[0].send_results[0].attempts, 3);
        assert_eq!(channel.calls.load(Ordering::SeqCst), 3);
        dispatcher.shutdown();
    }

    #[test]
    fn test_permanent_failure_stops_immediately() {
        let sink = Arc::new(CollectingSink::default());
        let channel = ScriptedChannel::new("webhook", vec![SendOutcome::Permanent]);
        let dispatcher = AlertDispatcher::new(
            vec![channel.clone()],
            &[fast_cfg("webhook")],
            &DispatcherConfig::default(),
            ManualClock::new(0),
            sink.clone(),
        );
        dispatcher.enqueue(alert("a1", &["webhook"]));
        let resolved = sink.wait_resolved(1);
        assert_eq!(resolved[0].send_results[0].status, SendStatus::FailedPermanent);
        assert_eq!(channel.calls.load(Ordering::SeqCst), 1);
        dispatcher.shutdown();
    }

    #[test]
    fn test_exhausted_retries_is_transient_failure() {
        let sink = Arc::new(CollectingSink::default());
        let channel = ScriptedChannel::new("webhook", vec![SendOutcome::Transient; 10]);
        let mut cfg = fast_cfg("webhook");
        cfg.retries = 2;
        let dispatcher = AlertDispatcher::new(
            vec![channel.clone()],
            &[cfg],
            &DispatcherConfig::default(),
            ManualClock::new(0),
            sink.clone(),
        );
        dispatcher.enqueue(alert("a1", &["webhook"]));
        let resolved = sink.wait_resolved(1);
        assert_eq!(resolved[0].send_results[0].status, SendStatus::FailedTransient);
        // Initial attempt plus two retries.
        assert_eq!(resolved[0].send_results[0].attempts, 3);
        dispatcher.shutdown();
    }

    #[test]
    fn test_unknown_channel_skipped() {
        let sink = Arc::new(CollectingSink::default());
        let dispatcher = AlertDispatcher::new(
            vec![ScriptedChannel::new("webhook", vec![])],
            &[fast_cfg("webhook")],
            &DispatcherConfig::default(),
            ManualClock::new(0),
            sink.clone(),
        );
        dispatcher.enqueue(alert("a1", &["pager"]));
        let resolved = sink.wait_resolved(1);
        assert_eq!(resolved[0].send_results[0].status, SendStatus::Skipped);
        assert_eq!(resolved[0].send_results[0].channel, "pager");
        dispatcher.shutdown();
    }

    #[test]
    fn test_rate_limit_budget_shared_across_keys() {
        let sink = Arc::new(CollectingSink::default());
        let mut cfg = fast_cfg("email");
        cfg.rate_limit_max = 2;
        let dispatcher = AlertDispatcher::new(
            vec![ScriptedChannel::new("email", vec![])],
            &[cfg],
            &DispatcherConfig::default(),
            ManualClock::new(0),
            sink.clone(),
        );
        for id in ["a1", "a2", "a3"] {
            dispatcher.enqueue(alert(id, &["email"]));
        }
        let resolved = sink.wait_resolved(3);
        let mut statuses: Vec<_> = resolved
            .iter()
            .map(|a| a.send_results[0].status)
            .collect();
        statuses.sort_by_key(|s| format!("{s:?}"));
        assert_eq!(
            statuses.iter().filter(|s| **s == SendStatus::Sent).count(),
            2
        );
        assert_eq!(
            statuses
                .iter()
                .filter(|s| **s == SendStatus::RateLimited)
                .count(),
            1
        );
        dispatcher.shutdown();
    }

    #[test]
    fn test_queue_overflow_drops_oldest() {
        let sink = Arc::new(CollectingSink::default());
        let gated = GatedChannel::new("webhook");
        let dispatcher = AlertDispatcher::new(
            vec![gated.clone()],
            &[fast_cfg("webhook")],
            &DispatcherConfig { queue_capacity: 1 },
            ManualClock::new(0),
            sink.clone(),
        );
        // a1 occupies the worker (blocked at the gate), a2 fills the queue,
        // a3 evicts a2.
        dispatcher.enqueue(alert("a1", &["webhook"]));
        std::thread::sleep(Duration::from_millis(50));
        dispatcher.enqueue(alert("a2", &["webhook"]));
        dispatcher.enqueue(alert("a3", &["webhook"]));
        gated.open();
        let resolved = sink.wait_resolved(3);
        let a2 = resolved.iter().find(|a| a.id == "a2").unwrap();
        assert_eq!(a2.send_results[0].status, SendStatus::Dropped);
        assert_eq!(sink.drops.lock().as_slice(), &[("a2".into(), "webhook".into())]);
        dispatcher.shutdown();
    }
}
