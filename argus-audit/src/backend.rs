//! Audit persistence abstraction.
//!
//! The log talks to storage through [`AuditBackend`]; deployments can plug a
//! database adapter, tests and the default wiring use the bounded in-memory
//! backend.

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::time::Duration;

use argus_core::error::ArgusResult;
use argus_core::types::SecurityEvent;

use argus_alerting::Alert;

use crate::types::{AlertFilter, EventFilter};

pub trait AuditBackend: Send + Sync {
    /// Durable write of one event. A backend that cannot complete inside
    /// `deadline` must abandon the write and return `StorageTransient`.
    fn persist_event(&self, event: &SecurityEvent, deadline: Duration) -> ArgusResult<()>;
    /// Durable write of one alert, same deadline contract as events.
    fn persist_alert(&self, alert: &Alert, deadline: Duration) -> ArgusResult<()>;
    /// Newest-first page.
    fn events(&self, filter: &EventFilter) -> ArgusResult<Vec<SecurityEvent>>;
    /// Newest-first page.
    fn alerts(&self, filter: &AlertFilter) -> ArgusResult<Vec<Alert>>;
    fn alert_by_id(&self, id: &str) -> ArgusResult<Option<Alert>>;
}

/// Bounded in-memory backend; oldest records give way on overflow.
pub struct MemoryBackend {
    max_events: usize,
    max_alerts: usize,
    events: RwLock<VecDeque<SecurityEvent>>,
    alerts: RwLock<VecDeque<Alert>>,
}

impl MemoryBackend {
    pub fn new(max_events: usize, max_alerts: usize) -> Self {
        Self {
            max_events,
            max_alerts,
            events: RwLock::new(VecDeque::new()),
            alerts: RwLock::new(VecDeque::new()),
        }
    }

    pub fn event_count(&self) -> usize {
        self.events.read().len()
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.read().len()
    }
}

fn page<T: Clone>(
    items: impl DoubleEndedIterator<Item = T>,
    matches: impl Fn(&T) -> bool,
    offset: usize,
    limit: usize,
) -> Vec<T> {
    items
        .rev()
        .filter(|item| matches(item))
        .skip(offset)
        .take(limit)
        .collect()
}

impl AuditBackend for MemoryBackend {
    fn persist_event(&self, event: &SecurityEvent, _deadline: Duration) -> ArgusResult<()> {
        let mut events = self.events.write();
        events.push_back(event.clone());
        while events.len() > self.max_events {
            events.pop_front();
        }
        Ok(())
    }

    fn persist_alert(&self, alert: &Alert, _deadline: Duration) -> ArgusResult<()> {
        let mut alerts = self.alerts.write();
        alerts.push_back(alert.clone());
        while alerts.len() > self.max_alerts {
            alerts.pop_front();
        }
        Ok(())
    }

    fn events(&self, filter: &EventFilter) -> ArgusResult<Vec<SecurityEvent>> {
        let events = self.events.read();
        Ok(page(
            events.iter().cloned(),
            |e| filter.matches(e),
            filter.offset,
            filter.limit,
        ))
    }

    fn alerts(&self, filter: &AlertFilter) -> ArgusResult<Vec<Alert>> {
        let alerts = self.alerts.read();
        Ok(page(
            alerts.iter().cloned(),
            |a| filter.matches(a),
            filter.offset,
            filter.limit,
        ))
    }

    fn alert_by_id(&self, id: &str) -> ArgusResult<Option<Alert>> {
        Ok(self.alerts.read().iter().find(|a| a.id == id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_core::types::EventKind;

    fn event(id: &str, ts: i64) -> SecurityEvent {
        SecurityEvent::new(id, ts, EventKind::ApiAccess)
    }

    #[test]
    fn test_bounded_overflow() {
        let backend = MemoryBackend::new(2, 2);
        for i in 0..3 {
            backend
                .persist_event(&event(&format!("e{i}"), i + 1), Duration::from_secs(1))
                .unwrap();
        }
        assert_eq!(backend.event_count(), 2);
        let page = backend
            .events(&EventFilter {
                limit: 10,
                ..Default::default()
            })
            .unwrap();
        // Newest first, e0 evicted.
        assert_eq!(page[0].id, "e2");
        assert_eq!(page[1].id, "e1");
    }

    #[test]
    fn test_paging() {
        let backend = MemoryBackend::new(100, 10);
        for i in 0..10 {
            backend
                .persist_event(&event(&format!("e{i}"), i + 1), Duration::from_secs(1))
                .unwrap();
        }
        let page2 = backend
            .events(&EventFilter {
                limit: 3,
                offset: 3,
                ..Default::default()
            })
            .unwrap();
        let ids: Vec<_> = page2.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["e6", "e5", "e4"]);
    }
}
