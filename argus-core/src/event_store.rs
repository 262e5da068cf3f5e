//! Event Store — bounded ring of recent events with secondary indices.
//!
//! A fixed-capacity ring keyed by insertion order. Secondary indices map
//! actor, source address and kind to ordered sequences of event refs. All
//! state lives behind a single RwLock so every read observes a consistent
//! snapshot: an index entry never outlives its event and capacity overflow
//! drops the oldest event and compacts its index entries in one step.

use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::clock::Millis;
use crate::error::{ArgusError, ArgusResult};
use crate::types::{EventKind, SecurityEvent};

/// Query parameters for `EventStore::query`. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub actor_id: Option<String>,
    pub source_address: Option<String>,
    pub kind: Option<EventKind>,
    pub since_ms: Option<Millis>,
    pub until_ms: Option<Millis>,
    pub limit: usize,
    pub offset: usize,
}

impl EventQuery {
    pub fn any() -> Self {
        Self {
            limit: 100,
            ..Default::default()
        }
    }

    fn matches(&self, ev: &SecurityEvent) -> bool {
        if let Some(ref actor) = self.actor_id {
            if ev.actor_id.as_deref() != Some(actor.as_str()) {
                return false;
            }
        }
        if let Some(ref source) = self.source_address {
            if ev.source_address.as_deref() != Some(source.as_str()) {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if ev.kind != kind {
                return false;
            }
        }
        if let Some(since) = self.since_ms {
            if ev.timestamp_ms < since {
                return false;
            }
        }
        if let Some(until) = self.until_ms {
            if ev.timestamp_ms > until {
                return false;
            }
        }
        true
    }
}

struct Indexed {
    seq: u64,
    event: SecurityEvent,
}

#[derive(Default)]
struct Indices {
    by_actor: HashMap<String, VecDeque<u64>>,
    by_source: HashMap<String, VecDeque<u64>>,
    by_kind: HashMap<EventKind, VecDeque<u64>>,
}

impl Indices {
    fn insert(&mut self, ev: &SecurityEvent, seq: u64) {
        if let Some(actor) = &ev.actor_id {
            self.by_actor.entry(actor.clone()).or_default().push_back(seq);
        }
        if let Some(source) = &ev.source_address {
            self.by_source.entry(source.clone()).or_default().push_back(seq);
        }
        self.by_kind.entry(ev.kind).or_default().push_back(seq);
    }

    /// Remove the entries for one event. Refs are appended in seq order so
    /// the dropped event's refs always sit at the front of each deque.
    fn remove(&mut self, ev: &SecurityEvent, seq: u64) {
        if let Some(actor) = &ev.actor_id {
            Self::drop_ref(&mut self.by_actor, actor, seq);
        }
        if let Some(source) = &ev.source_address {
            Self::drop_ref(&mut self.by_source, source, seq);
        }
        if let Some(refs) = self.by_kind.get_mut(&ev.kind) {
            refs.retain(|&s| s != seq);
            if refs.is_empty() {
                self.by_kind.remove(&ev.kind);
            }
        }
    }

    fn drop_ref(map: &mut HashMap<String, VecDeque<u64>>, key: &str, seq: u64) {
        if let Some(refs) = map.get_mut(key) {
            refs.retain(|&s| s != seq);
            if refs.is_empty() {
                map.remove(key);
            }
        }
    }
}

struct StoreInner {
    /// Events in append order; `seq` values are contiguous.
    ring: VecDeque<Indexed>,
    /// id → seq for every retained event; drives DuplicateId rejection.
    by_id: HashMap<String, u64>,
    indices: Indices,
    next_seq: u64,
}

/// Bounded store of recent events. Owns the ring exclusively.
pub struct EventStore {
    inner: RwLock<StoreInner>,
    capacity: usize,
    total_appended: AtomicU64,
    total_dropped: AtomicU64,
    total_duplicates: AtomicU64,
}

impl EventStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                ring: VecDeque::with_capacity(capacity.min(4096)),
                by_id: HashMap::new(),
                indices: Indices::default(),
                next_seq: 1,
            }),
            capacity: capacity.max(1),
            total_appended: AtomicU64::new(0),
            total_dropped: AtomicU64::new(0),
            total_duplicates: AtomicU64::new(0),
        }
    }

    /// Append an event. Rejects a previously seen id with `DuplicateId`
    /// without any state change. On capacity overflow the oldest event and
    /// its index entries are removed under the same lock.
    pub fn append(&self, event: SecurityEvent) -> ArgusResult<u64> {
        let mut inner = self.inner.write();
        if inner.by_id.contains_key(&event.id) {
            self.total_duplicates.fetch_add(1, Ordering::Relaxed);
            return Err(ArgusError::DuplicateId(event.id));
        }

        while inner.ring.len() >= self.capacity {
            if let Some(oldest) = inner.ring.pop_front() {
                inner.by_id.remove(&oldest.event.id);
                inner.indices.remove(&oldest.event, oldest.seq);
                self.total_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.by_id.insert(event.id.clone(), seq);
        inner.indices.insert(&event, seq);
        inner.ring.push_back(Indexed { seq, event });
        self.total_appended.fetch_add(1, Ordering::Relaxed);
        Ok(seq)
    }

    /// Query events, newest first, with offset/limit paging.
    pub fn query(&self, q: &EventQuery) -> Vec<SecurityEvent> {
        let inner = self.inner.read();
        let limit = if q.limit == 0 { usize::MAX } else { q.limit };

        // Walk the narrowest index when one is available, otherwise the ring.
        let seqs: Option<&VecDeque<u64>> = if let Some(ref actor) = q.actor_id {
            inner.indices.by_actor.get(actor)
        } else if let Some(ref source) = q.source_address {
            inner.indices.by_source.get(source)
        } else if let Some(kind) = q.kind {
            inner.indices.by_kind.get(&kind)
        } else {
            None
        };

        let mut out = Vec::new();
        let mut skipped = 0usize;
        let mut push = |ev: &SecurityEvent| -> bool {
            if !q.matches(ev) {
                return true;
            }
            if skipped < q.offset {
                skipped += 1;
                return true;
            }
            out.push(ev.clone());
            out.len() < limit
        };

        match seqs {
            Some(refs) => {
                let first_seq = inner.ring.front().map(|e| e.seq).unwrap_or(1);
                for &seq in refs.iter().rev() {
                    let idx = (seq - first_seq) as usize;
                    if let Some(entry) = inner.ring.get(idx) {
                        if !push(&entry.event) {
                            break;
                        }
                    }
                }
            }
            None => {
                for entry in inner.ring.iter().rev() {
                    if !push(&entry.event) {
                        break;
                    }
                }
            }
        }
        out
    }

    /// Count events matching `predicate` with `timestamp ∈ (now−window, now]`.
    /// The lower boundary is exclusive, the upper inclusive.
    pub fn count_in_window<F>(&self, predicate: F, window_ms: i64, now_ms: Millis) -> usize
    where
        F: Fn(&SecurityEvent) -> bool,
    {
        let cutoff = now_ms - window_ms;
        let inner = self.inner.read();
        inner
            .ring
            .iter()
            .filter(|e| e.event.timestamp_ms > cutoff && e.event.timestamp_ms <= now_ms)
            .filter(|e| predicate(&e.event))
            .count()
    }

    /// Event ids matching `predicate` inside the window, oldest first.
    /// Used by the rule engine to attach evidence to alerts.
    pub fn ids_in_window<F>(&self, predicate: F, window_ms: i64, now_ms: Millis) -> Vec<String>
    where
        F: Fn(&SecurityEvent) -> bool,
    {
        let cutoff = now_ms - window_ms;
        let inner = self.inner.read();
        inner
            .ring
            .iter()
            .filter(|e| e.event.timestamp_ms > cutoff && e.event.timestamp_ms <= now_ms)
            .filter(|e| predicate(&e.event))
            .map(|e| e.event.id.clone())
            .collect()
    }

    /// Retention sweep in append order: pops front entries with
    /// `timestamp < cutoff` and compacts the indices. The sweep stops at
    /// the first surviving entry, so an event stamped older than a
    /// neighbor appended before it is kept until that neighbor ages out.
    pub fn evict_before(&self, cutoff_ms: Millis) -> usize {
        let mut inner = self.inner.write();
        let mut evicted = 0usize;
        while inner
            .ring
            .front()
            .is_some_and(|f| f.event.timestamp_ms < cutoff_ms)
        {
            if let Some(oldest) = inner.ring.pop_front() {
                inner.by_id.remove(&oldest.event.id);
                inner.indices.remove(&oldest.event, oldest.seq);
                evicted += 1;
            }
        }
        if evicted > 0 {
            self.total_dropped.fetch_add(evicted as u64, Ordering::Relaxed);
            debug!(evicted, cutoff_ms, "Event store retention sweep");
        }
        evicted
    }

    pub fn get(&self, id: &str) -> Option<SecurityEvent> {
        let inner = self.inner.read();
        let seq = *inner.by_id.get(id)?;
        let first_seq = inner.ring.front().map(|e| e.seq)?;
        inner
            .ring
            .get((seq - first_seq) as usize)
            .map(|e| e.event.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.read().ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_appended(&self) -> u64 {
        self.total_appended.load(Ordering::Relaxed)
    }

    pub fn total_dropped(&self) -> u64 {
        self.total_dropped.load(Ordering::Relaxed)
    }

    pub fn total_duplicates(&self) -> u64 {
        self.total_duplicates.load(Ordering::Relaxed)
    }
}
