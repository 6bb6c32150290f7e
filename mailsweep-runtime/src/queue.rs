//! Work queue and worker pool
//!
//! The queue is pre-loaded with every verified candidate before any worker
//! starts, so a worker that finds it empty is done. Workers observe the
//! cancellation token only between candidates; a fetch in flight always runs
//! to completion or to its own request timeout.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::StatsStore;
use mailsweep_core::ScanResult;
use mailsweep_net::FetchExtractor;

/// Scans one candidate. Implementations absorb their own failures.
#[async_trait]
pub trait SiteScanner: Send + Sync {
    async fn scan(&self, domain: &str) -> ScanResult;
}

#[async_trait]
impl SiteScanner for FetchExtractor {
    async fn scan(&self, domain: &str) -> ScanResult {
        FetchExtractor::scan(self, domain).await
    }
}

/// FIFO of candidates, each handed out at most once
#[derive(Debug)]
pub struct WorkQueue {
    items: Mutex<VecDeque<String>>,
    total: usize,
    dispatched: AtomicUsize,
}

impl WorkQueue {
    pub fn new<I: IntoIterator<Item = String>>(items: I) -> Self {
        let items: VecDeque<String> = items.into_iter().collect();
        let total = items.len();
        Self {
            items: Mutex::new(items),
            total,
            dispatched: AtomicUsize::new(0),
        }
    }

    /// Take the next candidate, or `None` once exhausted
    pub fn pop(&self) -> Option<String> {
        let item = self.items.lock().pop_front();
        if item.is_some() {
            self.dispatched.fetch_add(1, Ordering::SeqCst);
        }
        item
    }

    /// Candidates the queue was loaded with
    pub fn total(&self) -> usize {
        self.total
    }

    /// Candidates handed to a worker so far
    pub fn dispatched(&self) -> usize {
        self.dispatched.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

/// Everything a worker needs, passed explicitly
#[derive(Clone)]
pub struct WorkerHandle {
    pub queue: Arc<WorkQueue>,
    pub scanner: Arc<dyn SiteScanner>,
    pub stats: Arc<StatsStore>,
    pub cancel: CancellationToken,
}

/// One worker: pop, scan, record, until cancelled or out of work
pub async fn run_worker(id: usize, handle: WorkerHandle) -> usize {
    let mut processed = 0;

    while !handle.cancel.is_cancelled() {
        let Some(domain) = handle.queue.pop() else {
            break;
        };
        let result = handle.scanner.scan(&domain).await;
        handle.stats.record(&result);
        processed += 1;
    }

    debug!("Worker {} finished after {} sites", id, processed);
    processed
}

/// Fixed set of spawned workers
pub struct WorkerPool {
    workers: Vec<JoinHandle<usize>>,
}

impl WorkerPool {
    /// Spawn `size` workers (at least one) on the current runtime
    pub fn spawn(size: usize, handle: WorkerHandle) -> Self {
        let workers = (0..size.max(1))
            .map(|id| tokio::spawn(run_worker(id + 1, handle.clone())))
            .collect();
        Self { workers }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// True once every worker has returned
    pub fn is_finished(&self) -> bool {
        self.workers.iter().all(|w| w.is_finished())
    }

    /// Wait for every worker. Returns the number of sites they processed.
    pub async fn join(self) -> usize {
        let mut total = 0;
        for worker in self.workers {
            match worker.await {
                Ok(processed) => total += processed,
                Err(e) => error!("Worker task failed: {}", e),
            }
        }
        total
    }
}
