//! Bounded worker pool with barrier join.
//!
//! One batch per event: every detector becomes a job, `run` blocks until the
//! whole batch has resolved. Jobs from concurrent ingest calls interleave on
//! the same threads; batches never nest, so the pool cannot deadlock.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::info;

use argus_core::error::{ArgusError, ArgusResult};
use argus_anomaly::{DetectorId, DetectorOutcome, ScoreComponent};

pub type JobFn = Box<dyn FnOnce() -> ArgusResult<Option<ScoreComponent>> + Send>;

struct Batch {
    results: Mutex<Vec<DetectorOutcome>>,
    remaining: Mutex<usize>,
    done: Condvar,
}

struct PoolInner {
    queue: Mutex<VecDeque<(DetectorId, JobFn, Arc<Batch>)>>,
    available: Condvar,
    shutdown: AtomicBool,
}

pub struct DetectorPool {
    inner: Arc<PoolInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl DetectorPool {
    pub fn new(worker_count: usize) -> Self {
        let inner = Arc::new(PoolInner {
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });
        let workers = (0..worker_count.max(1))
            .map(|i| {
                let inner = inner.clone();
                std::thread::Builder::new()
                    .name(format!("detector-{i}"))
                    .spawn(move || worker_loop(inner))
                    .unwrap_or_else(|e| panic!("failed to spawn detector worker: {e}"))
            })
            .collect();
        info!(workers = worker_count.max(1), "Detector pool started");
        Self {
            inner,
            workers: Mutex::new(workers),
        }
    }

    /// Run one batch of tagged jobs and wait for all of them.
    pub fn run(&self, jobs: Vec<(DetectorId, JobFn)>) -> Vec<DetectorOutcome> {
        if jobs.is_empty() {
            return Vec::new();
        }
        let batch = Arc::new(Batch {
            results: Mutex::new(Vec::with_capacity(jobs.len())),
            remaining: Mutex::new(jobs.len()),
            done: Condvar::new(),
        });
        {
            let mut queue = self.inner.queue.lock();
            for (id, job) in jobs {
                queue.push_back((id, job, batch.clone()));
            }
            self.inner.available.notify_all();
        }
        let mut remaining = batch.remaining.lock();
        while *remaining > 0 {
            batch.done.wait(&mut remaining);
        }
        drop(remaining);
        let results = std::mem::take(&mut *batch.results.lock());
        results
    }

    pub fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let _queue = self.inner.queue.lock();
            self.inner.available.notify_all();
        }
        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
        info!("Detector pool stopped");
    }
}

impl Drop for DetectorPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(inner: Arc<PoolInner>) {
    loop {
        let item = {
            let mut queue = inner.queue.lock();
            loop {
                if let Some(item) = queue.pop_front() {
                    break Some(item);
                }
                if inner.shutdown.load(Ordering::SeqCst) {
                    break None;
                }
                inner.available.wait(&mut queue);
            }
        };
        let Some((id, job, batch)) = item else { return };

        // A panicking job must not strand the barrier.
        let result = catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|_| {
            Err(ArgusError::DetectorFailure {
                detector: id.wire_tag().to_string(),
                reason: "panicked".into(),
            })
        });
        batch.results.lock().push((id, result));
        let mut remaining = batch.remaining.lock();
        *remaining -= 1;
        if *remaining == 0 {
            batch.done.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_runs_all_jobs() {
        let pool = DetectorPool::new(3);
        let jobs: Vec<(DetectorId, JobFn)> = (0..8)
            .map(|_| {
                (
                    DetectorId::UnusualSource,
                    Box::new(|| Ok(None)) as JobFn,
                )
            })
            .collect();
        let results = pool.run(jobs);
        assert_eq!(results.len(), 8);
        pool.shutdown();
    }

    #[test]
    fn test_empty_batch() {
        let pool = DetectorPool::new(1);
        assert!(pool.run(Vec::new()).is_empty());
    }

    #[test]
    fn test_panicking_job_does_not_strand_batch() {
        let pool = DetectorPool::new(2);
        let jobs: Vec<(DetectorId, JobFn)> = vec![
            (
                DetectorId::SuspiciousPattern,
                Box::new(|| panic!("detector exploded")),
            ),
            (DetectorId::UnusualSource, Box::new(|| Ok(None))),
        ];
        let results = pool.run(jobs);
        assert_eq!(results.len(), 2);
        let failed = results
            .iter()
            .find(|(id, _)| *id == DetectorId::SuspiciousPattern)
            .unwrap();
        assert!(failed.1.is_err());
        pool.shutdown();
    }
}
