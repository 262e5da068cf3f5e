//! End-to-end pipeline scenarios with literal values.

use std::sync::Arc;
use std::time::Duration;

use argus_core::clock::ManualClock;
use argus_core::config::{ArgusConfig, ChannelConfig};
use argus_core::event_store::EventQuery;
use argus_core::types::{EventKind, Outcome, SecurityEvent};

use argus_anomaly::{
    standard_detectors, AnomalySeverity, Detector, DetectorContext, DetectorId,
    StaticGeoResolver,
};
use argus_core::error::{ArgusError, ArgusResult};

use argus_alerting::{
    Alert, AlertChannel, AlertPriority, ChannelKind, DashboardChannel, SendOutcome, SendStatus,
};

use argus_audit::{export_events, AlertFilter, EventFilter, ExportFormat};

use argus_pipeline::{IngestOutcome, Pipeline};

const T0: i64 = 1_700_000_000_000;

fn failure(id: &str, ts: i64, addr: &str) -> SecurityEvent {
    SecurityEvent::new(id, ts, EventKind::LoginFailure)
        .with_source(addr)
        .with_outcome(Outcome::Failure)
}

fn wait_alerts(pipeline: &Pipeline, n: usize) -> Vec<Alert> {
    for _ in 0..500 {
        let alerts = pipeline
            .audit()
            .list_alerts(AlertFilter::default())
            .unwrap();
        if alerts.len() >= n {
            return alerts;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("timed out waiting for {n} audited alerts");
}

#[test]
fn s1_five_failed_logins_trigger_one_alert() {
    let pipeline = Pipeline::builder(ArgusConfig::default())
        .clock(ManualClock::new(T0))
        .build()
        .unwrap();

    let mut fired: Vec<String> = Vec::new();
    for i in 0..5i64 {
        let outcome = pipeline.ingest(failure(
            &format!("e{}", i + 1),
            T0 + i * 10_000,
            "203.0.113.7",
        ));
        match outcome {
            IngestOutcome::Accepted { alert_ids, .. } => {
                if i < 4 {
                    assert!(alert_ids.is_empty(), "no alert before the fifth failure");
                } else {
                    assert_eq!(alert_ids.len(), 1, "fifth failure fires exactly one alert");
                    fired = alert_ids;
                }
            }
            other => panic!("unexpected rejection: {other:?}"),
        }
    }

    let alerts = wait_alerts(&pipeline, 1);
    let alert = &alerts[0];
    assert_eq!(alert.id, fired[0]);
    assert_eq!(alert.rule_id, "multiple_failed_logins");
    assert_eq!(alert.priority, AlertPriority::High);
    assert_eq!(alert.grouping_key, "203.0.113.7");
    let mut evidence = alert.evidence.clone();
    evidence.sort();
    assert_eq!(evidence, vec!["e1", "e2", "e3", "e4", "e5"]);
    assert!(alert
        .send_results
        .iter()
        .any(|r| r.channel == "dashboard" && r.status == SendStatus::Sent));

    // Sixth failure inside the cooldown produces nothing new.
    let outcome = pipeline.ingest(failure("e6", T0 + 50_000, "203.0.113.7"));
    match outcome {
        IngestOutcome::Accepted { alert_ids, .. } => assert!(alert_ids.is_empty()),
        other => panic!("unexpected rejection: {other:?}"),
    }
    assert_eq!(pipeline.rules().report().debounced, 1);
    pipeline.shutdown();
}

#[test]
fn s2_unknown_source_scores_medium() {
    let pipeline = Pipeline::builder(ArgusConfig::default())
        .clock(ManualClock::new(T0))
        .build()
        .unwrap();

    let known = SecurityEvent::new("s2-base", T0, EventKind::LoginSuccess)
        .with_actor("u1")
        .with_source("198.51.100.1")
        .with_outcome(Outcome::Success);
    assert!(pipeline.ingest(known).is_accepted());

    let fresh = SecurityEvent::new("s2-new", T0 + 60_000, EventKind::LoginSuccess)
        .with_actor("u1")
        .with_source("198.51.100.9")
        .with_outcome(Outcome::Success);
    let outcome = pipeline.ingest(fresh);
    let score = outcome.score().expect("accepted");
    let component = score
        .component(DetectorId::UnusualSource)
        .expect("unusual source component present");
    assert!((component.raw - 0.8).abs() < 1e-9);
    assert!((component.weight - 0.5).abs() < 1e-9);
    assert!(score.total >= 0.40);
    assert_eq!(score.severity, AnomalySeverity::Medium);

    let mut sources = pipeline.profiles().known_sources("u1");
    sources.sort();
    assert_eq!(sources, vec!["198.51.100.1", "198.51.100.9"]);
    pipeline.shutdown();
}

struct RecordingChannel {
    id: String,
    kind: ChannelKind,
}

impl AlertChannel for RecordingChannel {
    fn id(&self) -> &str {
        &self.id
    }
    fn kind(&self) -> ChannelKind {
        self.kind
    }
    fn send(&self, _alert: &Alert, _timeout: Duration) -> SendOutcome {
        SendOutcome::Ok
    }
}

#[test]
fn s3_email_rate_limit_leaves_dashboard_working() {
    let mut cfg = ArgusConfig::default();
    cfg.channels.push(ChannelConfig {
        rate_limit_max: 2,
        rate_limit_window_secs: 3_600,
        ..ChannelConfig::named("email", "email")
    });
    let pipeline = Pipeline::builder(cfg)
        .clock(ManualClock::new(T0))
        .channel(Arc::new(RecordingChannel {
            id: "email".into(),
            kind: ChannelKind::Email,
        }))
        .channel(Arc::new(DashboardChannel::new("dashboard", 64)))
        .build()
        .unwrap();

    for (n, addr) in ["10.1.0.1", "10.1.0.2", "10.1.0.3"].iter().enumerate() {
        for i in 0..5i64 {
            let id = format!("s3-{n}-{i}");
            assert!(pipeline
                .ingest(failure(&id, T0 + (n as i64 * 60_000) + i * 1_000, addr))
                .is_accepted());
        }
    }

    let alerts = wait_alerts(&pipeline, 3);
    let email_sent = alerts
        .iter()
        .flat_map(|a| &a.send_results)
        .filter(|r| r.channel == "email" && r.status == SendStatus::Sent)
        .count();
    let email_limited = alerts
        .iter()
        .flat_map(|a| &a.send_results)
        .filter(|r| r.channel == "email" && r.status == SendStatus::RateLimited)
        .count();
    let dashboard_sent = alerts
        .iter()
        .flat_map(|a| &a.send_results)
        .filter(|r| r.channel == "dashboard" && r.status == SendStatus::Sent)
        .count();
    assert_eq!(email_sent, 2);
    assert_eq!(email_limited, 1);
    assert_eq!(dashboard_sent, 3, "dashboard keeps its own headroom");
    pipeline.shutdown();
}

struct FailingPatternDetector;

impl Detector for FailingPatternDetector {
    fn id(&self) -> DetectorId {
        DetectorId::SuspiciousPattern
    }
    fn score(
        &self,
        _event: &SecurityEvent,
        _ctx: &DetectorContext<'_>,
    ) -> ArgusResult<Option<argus_anomaly::ScoreComponent>> {
        Err(ArgusError::DetectorFailure {
            detector: "suspicious_pattern".into(),
            reason: "induced fault".into(),
        })
    }
}

#[test]
fn s4_detector_failure_is_isolated() {
    let mut detectors: Vec<Arc<dyn Detector>> = standard_detectors()
        .into_iter()
        .filter(|d| d.id() != DetectorId::SuspiciousPattern)
        .collect();
    detectors.push(Arc::new(FailingPatternDetector));

    let pipeline = Pipeline::builder(ArgusConfig::default())
        .clock(ManualClock::new(T0))
        .detectors(detectors)
        .build()
        .unwrap();

    let base = SecurityEvent::new("s4-base", T0, EventKind::LoginSuccess)
        .with_actor("u1")
        .with_source("198.51.100.1")
        .with_outcome(Outcome::Success);
    assert!(pipeline.ingest(base).is_accepted());

    let probe = SecurityEvent::new("s4-probe", T0 + 1_000, EventKind::LoginSuccess)
        .with_actor("u1")
        .with_source("198.51.100.9")
        .with_agent("curl/8.0")
        .with_target("/admin")
        .with_outcome(Outcome::Success);
    let outcome = pipeline.ingest(probe);
    let score = outcome.score().expect("event still accepted");
    assert_eq!(score.failed_detectors, vec![DetectorId::SuspiciousPattern]);
    assert!(score.component(DetectorId::SuspiciousPattern).is_none());
    // The other detectors are untouched.
    assert!(score.component(DetectorId::UnusualSource).is_some());
    assert!(pipeline.store().get("s4-probe").is_some());
    pipeline.shutdown();
}

#[test]
fn s5_ring_overflow_drops_oldest() {
    let mut cfg = ArgusConfig::default();
    cfg.store.event_ring_capacity = 3;
    let pipeline = Pipeline::builder(cfg)
        .clock(ManualClock::new(T0))
        .build()
        .unwrap();

    for i in 1..=4i64 {
        let ev = SecurityEvent::new(format!("e{i}"), T0 + i * 1_000, EventKind::ApiAccess);
        assert!(pipeline.ingest(ev).is_accepted());
    }

    let page = pipeline.store().query(&EventQuery {
        limit: 10,
        ..EventQuery::any()
    });
    let ids: Vec<_> = page.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["e4", "e3", "e2"]);
    assert_eq!(
        pipeline
            .store()
            .count_in_window(|_| true, 3_600_000, T0 + 4_000),
        3
    );
    pipeline.shutdown();
}

#[test]
fn s6_export_matches_paging() {
    let pipeline = Pipeline::builder(ArgusConfig::default())
        .clock(ManualClock::new(T0))
        .build()
        .unwrap();

    for i in 0..25i64 {
        let kind = if i % 2 == 0 {
            EventKind::ApiAccess
        } else {
            EventKind::DataAccess
        };
        let ev = SecurityEvent::new(format!("e{i}"), T0 + i * 1_000, kind);
        assert!(pipeline.ingest(ev).is_accepted());
    }

    let filter = EventFilter {
        kind: Some(EventKind::ApiAccess),
        ..Default::default()
    };

    // Page through the listing.
    let mut paged: Vec<String> = Vec::new();
    let mut offset = 0;
    loop {
        let page = pipeline
            .audit()
            .list_events(EventFilter {
                limit: 4,
                offset,
                ..filter.clone()
            })
            .unwrap();
        if page.is_empty() {
            break;
        }
        offset += page.len();
        paged.extend(page.into_iter().map(|e| e.id));
    }

    let mut buf = Vec::new();
    let written = export_events(pipeline.audit(), ExportFormat::Json, &filter, &mut buf).unwrap();
    let mut exported: Vec<String> = std::str::from_utf8(&buf)
        .unwrap()
        .lines()
        .map(|line| {
            let ev: SecurityEvent = serde_json::from_str(line).unwrap();
            ev.id
        })
        .collect();

    assert_eq!(written as usize, paged.len());
    let mut paged_sorted = paged.clone();
    paged_sorted.sort();
    exported.sort();
    assert_eq!(exported, paged_sorted);
    pipeline.shutdown();
}

#[test]
fn geographic_denylist_fires_critical_rule() {
    let mut cfg = ArgusConfig::default();
    cfg.detectors.geo_denylist = vec!["KP".into()];
    let geo = Arc::new(StaticGeoResolver::new());
    geo.insert("203.0.113.66", "KP");
    let pipeline = Pipeline::builder(cfg)
        .clock(ManualClock::new(T0))
        .geo(geo)
        .build()
        .unwrap();

    let ev = SecurityEvent::new("g1", T0, EventKind::LoginSuccess)
        .with_actor("u1")
        .with_source("203.0.113.66")
        .with_outcome(Outcome::Success);
    let outcome = pipeline.ingest(ev);
    let score = outcome.score().expect("accepted");
    assert!(score.component(DetectorId::GeographicAnomaly).is_some());

    let alerts = wait_alerts(&pipeline, 1);
    assert!(alerts
        .iter()
        .any(|a| a.rule_id == "geographic_anomaly" && a.priority == AlertPriority::Critical));
    pipeline.shutdown();
}
