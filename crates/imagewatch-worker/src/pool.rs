//! Fixed-size worker pool draining the task queue.
//!
//! Every worker is symmetric and owns its own rate limiter and dedup set.
//! Dedup is therefore per worker: the same image routed to two workers is
//! submitted twice.

use std::collections::HashSet;
use std::ops::AddAssign;
use std::sync::Arc;

use imagewatch_core::ScanRequest;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

use crate::config::RunConfig;
use crate::queue::TaskReceiver;
use crate::rate_limit::TokenBucket;
use crate::retry::{process, ProcessError, RetryPolicy};
use crate::scan_client::ScanClient;

/// What happened to one dequeued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Submitted successfully and recorded in the dedup set.
    Scanned,
    /// Already submitted by this worker; discarded.
    Duplicate,
    /// Retries exhausted; not recorded, may be retried if seen again.
    Failed,
    /// Shutdown interrupted processing.
    Cancelled,
}

/// Per-worker counters, summed across the pool on shutdown.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub scanned: u64,
    pub duplicates: u64,
    pub failed: u64,
}

impl WorkerStats {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Scanned => self.scanned += 1,
            Outcome::Duplicate => self.duplicates += 1,
            Outcome::Failed => self.failed += 1,
            Outcome::Cancelled => {}
        }
    }
}

impl AddAssign for WorkerStats {
    fn add_assign(&mut self, other: Self) {
        self.scanned += other.scanned;
        self.duplicates += other.duplicates;
        self.failed += other.failed;
    }
}

/// A single queue consumer.
pub struct Worker {
    id: usize,
    client: Arc<dyn ScanClient>,
    limiter: TokenBucket,
    policy: RetryPolicy,
    scanned: HashSet<String>,
    stats: WorkerStats,
}

impl Worker {
    /// Create a worker with a full token bucket and an empty dedup set.
    pub fn new(id: usize, client: Arc<dyn ScanClient>, config: &RunConfig) -> Self {
        Self {
            id,
            client,
            limiter: TokenBucket::new(config.rate, config.burst),
            policy: RetryPolicy::from_config(config),
            scanned: HashSet::new(),
            stats: WorkerStats::default(),
        }
    }

    /// Whether this worker has already submitted `image`.
    pub fn has_scanned(&self, image: &str) -> bool {
        self.scanned.contains(image)
    }

    /// Counters so far.
    pub fn stats(&self) -> WorkerStats {
        self.stats
    }

    /// Process one request: dedup, then submit under the retry policy.
    pub async fn handle(&mut self, request: ScanRequest, shutdown: &CancellationToken) -> Outcome {
        if self.scanned.contains(&request.image) {
            self.stats.record(Outcome::Duplicate);
            return Outcome::Duplicate;
        }

        let result = process(
            &request,
            self.client.as_ref(),
            &mut self.limiter,
            &self.policy,
            shutdown,
        )
        .await;

        let outcome = match result {
            Ok(attempts) => {
                debug!(image = %request.image, attempts, "Image submitted for monitoring");
                self.scanned.insert(request.image);
                Outcome::Scanned
            }
            Err(ProcessError::Cancelled) => Outcome::Cancelled,
            Err(e) => {
                error!(image = %request.image, error = %e, "Scan failed");
                Outcome::Failed
            }
        };

        self.stats.record(outcome);
        outcome
    }

    /// Drain the queue until it is closed and empty, or shutdown fires.
    pub async fn run(mut self, tasks: TaskReceiver, shutdown: CancellationToken) -> WorkerStats {
        info!(id = self.id, "Worker started");

        loop {
            let request = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = tasks.recv() => match next {
                    Some(request) => request,
                    None => break,
                },
            };
            self.handle(request, &shutdown).await;
        }

        info!(
            id = self.id,
            scanned = self.stats.scanned,
            duplicates = self.stats.duplicates,
            failed = self.stats.failed,
            "Worker stopped"
        );
        self.stats
    }
}

/// Handles to the spawned workers.
pub struct WorkerPool {
    handles: Vec<JoinHandle<WorkerStats>>,
}

impl WorkerPool {
    /// Spawn `config.concurrency` workers sharing one receiver.
    pub fn spawn(
        config: &RunConfig,
        client: Arc<dyn ScanClient>,
        tasks: TaskReceiver,
        shutdown: CancellationToken,
    ) -> Self {
        let handles = (0..config.concurrency)
            .map(|id| {
                let worker = Worker::new(id, client.clone(), config);
                tokio::spawn(
                    worker
                        .run(tasks.clone(), shutdown.clone())
                        .instrument(info_span!("worker", id)),
                )
            })
            .collect();

        Self { handles }
    }

    /// Number of workers.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether the pool has no workers.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker to exit and sum their counters.
    ///
    /// Only returns once the queue is closed (or shutdown fired), so callers
    /// must drop all senders first.
    pub async fn join(self) -> WorkerStats {
        let mut total = WorkerStats::default();
        for handle in self.handles {
            match handle.await {
                Ok(stats) => total += stats,
                Err(e) => error!(error = %e, "Worker task panicked"),
            }
        }
        total
    }
}
