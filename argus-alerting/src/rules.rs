//! Rule engine: ordered rule list, cooldown table, alert production.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use argus_core::clock::Millis;
use argus_core::event_store::EventStore;
use argus_core::types::{EventKind, SecurityEvent};
use argus_core::windows::{
    WindowRegistry, API_BURST_WINDOW, LOGIN_FAILURE_WINDOW, MFA_FAIL_WINDOW, SUSPICIOUS_IP_WINDOW,
};

use argus_anomaly::{AnomalyScore, DetectorId};

use crate::types::{Alert, AlertPriority, AlertRule, GroupBy, Trigger};

/// Counters reported by [`RuleEngine::report`].
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RuleEngineReport {
    pub evaluated: u64,
    pub fired: u64,
    pub debounced: u64,
    pub eval_failures: u64,
}

pub struct RuleEngine {
    /// Immutable snapshot, swapped wholesale on mutation; evaluation clones
    /// only the `Arc`.
    rules: RwLock<Arc<Vec<AlertRule>>>,
    /// (rule_id, grouping_key) → last firing time.
    cooldowns: Mutex<HashMap<(String, String), Millis>>,
    alert_seq: AtomicU64,
    evaluated: AtomicU64,
    fired: AtomicU64,
    debounced: AtomicU64,
    eval_failures: AtomicU64,
}

impl RuleEngine {
    pub fn new(rules: Vec<AlertRule>) -> Self {
        info!(rules = rules.len(), "Rule engine initialized");
        Self {
            rules: RwLock::new(Arc::new(rules)),
            cooldowns: Mutex::new(HashMap::new()),
            alert_seq: AtomicU64::new(0),
            evaluated: AtomicU64::new(0),
            fired: AtomicU64::new(0),
            debounced: AtomicU64::new(0),
            eval_failures: AtomicU64::new(0),
        }
    }

    /// Evaluate every enabled rule against one scored event. Rules are
    /// isolated: one rule's failure never stops the rest.
    pub fn evaluate(
        &self,
        event: &SecurityEvent,
        score: &AnomalyScore,
        store: &EventStore,
        now: Millis,
    ) -> Vec<Alert> {
        self.evaluated.fetch_add(1, Ordering::Relaxed);
        let rules = Arc::clone(&self.rules.read());
        let mut alerts = Vec::new();
        for rule in rules.iter() {
            if !rule.enabled || !event_matches(rule, event) {
                continue;
            }
            let Some(key) = grouping_key(rule.group_by, event) else {
                continue;
            };
            match self.evaluate_rule(rule, event, score, store, &key, now) {
                Ok(Some(alert)) => alerts.push(alert),
                Ok(None) => {}
                Err(reason) => {
                    self.eval_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(rule = %rule.id, %reason, "Rule evaluation failed");
                }
            }
        }
        alerts
    }

    fn evaluate_rule(
        &self,
        rule: &AlertRule,
        event: &SecurityEvent,
        score: &AnomalyScore,
        store: &EventStore,
        key: &str,
        now: Millis,
    ) -> Result<Option<Alert>, String> {
        let (triggered, count, evidence) = match &rule.trigger {
            Trigger::Count(threshold) => {
                let window_ms = rule
                    .window_ms
                    .ok_or_else(|| "count rule without a window".to_string())?;
                let predicate =
                    |e: &SecurityEvent| event_matches(rule, e) && key_matches(rule.group_by, e, key);
                let count = store.count_in_window(predicate, window_ms, now);
                if count as u32 >= *threshold {
                    let evidence = store.ids_in_window(predicate, window_ms, now);
                    (true, count, evidence)
                } else {
                    (false, count, Vec::new())
                }
            }
            Trigger::Score(min) => {
                let detector_ok = match rule.requires_detector {
                    Some(id) => score.component(id).is_some(),
                    None => true,
                };
                let triggered = detector_ok && score.total >= *min;
                (triggered, 1, vec![event.id.clone()])
            }
        };
        if !triggered {
            return Ok(None);
        }

        // Cooldown: a second firing for the same key inside the window is
        // debounced, never dispatched.
        {
            let mut cooldowns = self.cooldowns.lock();
            let entry = (rule.id.clone(), key.to_string());
            if let Some(last) = cooldowns.get(&entry) {
                if now - last < rule.cooldown_ms {
                    self.debounced.fetch_add(1, Ordering::Relaxed);
                    debug!(rule = %rule.id, key, "Firing debounced by cooldown");
                    return Ok(None);
                }
            }
            cooldowns.insert(entry, now);
        }

        self.fired.fetch_add(1, Ordering::Relaxed);
        let seq = self.alert_seq.fetch_add(1, Ordering::Relaxed);
        let message = render_template(&rule.message_template, event, key, count, score.total);
        info!(rule = %rule.id, key, priority = rule.priority.wire_tag(), "Alert fired");
        Ok(Some(Alert {
            id: format!("al-{now}-{seq}"),
            rule_id: rule.id.clone(),
            grouping_key: key.to_string(),
            timestamp_ms: now,
            priority: rule.priority,
            channels: rule.channels.clone(),
            rendered_message: message,
            evidence,
            send_results: Vec::new(),
        }))
    }

    pub fn set_enabled(&self, rule_id: &str, enabled: bool) -> bool {
        let mut guard = self.rules.write();
        let mut rules = guard.as_ref().clone();
        match rules.iter_mut().find(|r| r.id == rule_id) {
            Some(rule) => {
                rule.enabled = enabled;
                *guard = Arc::new(rules);
                info!(rule = rule_id, enabled, "Rule toggled");
                true
            }
            None => false,
        }
    }

    /// Drop cooldown entries older than the longest rule cooldown.
    pub fn prune_cooldowns(&self, now: Millis) -> usize {
        let horizon = self
            .rules
            .read()
            .iter()
            .map(|r| r.cooldown_ms)
            .max()
            .unwrap_or(0);
        let mut cooldowns = self.cooldowns.lock();
        let before = cooldowns.len();
        cooldowns.retain(|_, last| now - *last < horizon);
        before - cooldowns.len()
    }

    pub fn report(&self) -> RuleEngineReport {
        RuleEngineReport {
            evaluated: self.evaluated.load(Ordering::Relaxed),
            fired: self.fired.load(Ordering::Relaxed),
            debounced: self.debounced.load(Ordering::Relaxed),
            eval_failures: self.eval_failures.load(Ordering::Relaxed),
        }
    }
}

fn event_matches(rule: &AlertRule, event: &SecurityEvent) -> bool {
    if !rule.kinds.is_empty() && !rule.kinds.contains(&event.kind) {
        return false;
    }
    if let Some(outcome) = rule.outcome {
        if event.outcome != outcome {
            return false;
        }
    }
    rule.attribute_patterns
        .iter()
        .all(|(k, pat)| event.attributes.get(k).is_some_and(|v| v.contains(pat)))
}

/// Primary grouping identity with a fallback so events carrying only the
/// other identity still group deterministically.
fn grouping_key(group_by: GroupBy, event: &SecurityEvent) -> Option<String> {
    match group_by {
        GroupBy::Source => event
            .source_address
            .clone()
            .or_else(|| event.actor_id.clone()),
        GroupBy::Actor => event
            .actor_id
            .clone()
            .or_else(|| event.source_address.clone()),
    }
}

fn key_matches(group_by: GroupBy, event: &SecurityEvent, key: &str) -> bool {
    grouping_key(group_by, event).as_deref() == Some(key)
}

fn render_template(
    template: &str,
    event: &SecurityEvent,
    key: &str,
    count: usize,
    score: f64,
) -> String {
    template
        .replace("{key}", key)
        .replace("{count}", &count.to_string())
        .replace("{score}", &format!("{score:.2}"))
        .replace("{kind}", event.kind.wire_tag())
        .replace("{source}", event.source_address.as_deref().unwrap_or("-"))
        .replace("{actor}", event.actor_id.as_deref().unwrap_or("-"))
}

/// The six built-in rules. Window durations come from the registry so they
/// follow configuration overrides.
pub fn standard_rules(windows: &WindowRegistry) -> Vec<AlertRule> {
    let window = |name: &str, default_secs: u64| {
        windows.get_ms_or(name, Duration::from_secs(default_secs))
    };
    vec![
        AlertRule {
            id: "multiple_failed_logins".into(),
            kinds: vec![EventKind::LoginFailure],
            outcome: None,
            attribute_patterns: HashMap::new(),
            group_by: GroupBy::Source,
            window_ms: Some(window(LOGIN_FAILURE_WINDOW, 300)),
            trigger: Trigger::Count(5),
            requires_detector: None,
            priority: AlertPriority::High,
            channels: vec!["email".into(), "dashboard".into()],
            message_template: "{count} failed logins from {key} in the last window".into(),
            cooldown_ms: window(LOGIN_FAILURE_WINDOW, 300),
            enabled: true,
        },
        AlertRule {
            id: "suspicious_ip".into(),
            kinds: Vec::new(),
            outcome: None,
            attribute_patterns: HashMap::new(),
            group_by: GroupBy::Source,
            window_ms: Some(window(SUSPICIOUS_IP_WINDOW, 3_600)),
            trigger: Trigger::Count(10),
            requires_detector: None,
            priority: AlertPriority::Critical,
            channels: vec!["email".into(), "slack".into(), "dashboard".into()],
            message_template: "suspicious volume from {key}: {count} events in the last hour"
                .into(),
            cooldown_ms: window(SUSPICIOUS_IP_WINDOW, 3_600),
            enabled: true,
        },
        AlertRule {
            id: "api_rate_limit_exceeded".into(),
            kinds: vec![EventKind::RateLimited],
            outcome: None,
            attribute_patterns: HashMap::new(),
            group_by: GroupBy::Source,
            window_ms: Some(window(API_BURST_WINDOW, 60)),
            trigger: Trigger::Count(3),
            requires_detector: None,
            priority: AlertPriority::Medium,
            channels: vec!["dashboard".into()],
            message_template: "API rate limit exceeded by {key}: {count} hits".into(),
            cooldown_ms: window(API_BURST_WINDOW, 60),
            enabled: true,
        },
        AlertRule {
            id: "mfa_failures".into(),
            kinds: vec![EventKind::MfaFailure],
            outcome: None,
            attribute_patterns: HashMap::new(),
            group_by: GroupBy::Actor,
            window_ms: Some(window(MFA_FAIL_WINDOW, 300)),
            trigger: Trigger::Count(3),
            requires_detector: None,
            priority: AlertPriority::High,
            channels: vec!["email".into(), "dashboard".into()],
            message_template: "{count} MFA failures for {key}".into(),
            cooldown_ms: window(MFA_FAIL_WINDOW, 300),
            enabled: true,
        },
        AlertRule {
            id: "anomaly_score".into(),
            kinds: Vec::new(),
            outcome: None,
            attribute_patterns: HashMap::new(),
            group_by: GroupBy::Source,
            window_ms: None,
            trigger: Trigger::Score(0.7),
            requires_detector: None,
            priority: AlertPriority::High,
            channels: vec!["slack".into(), "dashboard".into()],
            message_template: "anomaly score {score} for {key} ({kind})".into(),
            cooldown_ms: 300_000,
            enabled: true,
        },
        AlertRule {
            id: "geographic_anomaly".into(),
            kinds: Vec::new(),
            outcome: None,
            attribute_patterns: HashMap::new(),
            group_by: GroupBy::Source,
            window_ms: None,
            trigger: Trigger::Score(0.0),
            requires_detector: Some(DetectorId::GeographicAnomaly),
            priority: AlertPriority::Critical,
            channels: vec!["email".into(), "slack".into(), "dashboard".into()],
            message_template: "access from denylisted location for {key}".into(),
            cooldown_ms: 3_600_000,
            enabled: true,
        },
    ]
}
