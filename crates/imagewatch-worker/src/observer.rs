//! Cluster observers: one task per cluster turning workload events into
//! scan requests on the task queue.
//!
//! The subscription itself sits behind [`WorkloadSubscriber`], which yields
//! a pull-based stream of events. The observer consumes that stream and is
//! the only producer on the queue for its cluster.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use imagewatch_core::{ClusterTarget, WorkloadEvent};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::queue::{SendOutcome, TaskSender};

/// Errors produced by a cluster subscription.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Failed to load kubeconfig: {0}")]
    Kubeconfig(String),

    #[error("Failed to build cluster client: {0}")]
    Client(String),

    #[error("Watch failed: {0}")]
    Watch(String),
}

/// Stream of workload events for one cluster.
pub type WorkloadStream = BoxStream<'static, Result<WorkloadEvent, WatchError>>;

/// Source of workload change events.
///
/// Implementations must emit [`WorkloadEvent::Synced`] once the initial
/// listing has been delivered.
#[async_trait]
pub trait WorkloadSubscriber: Send + Sync {
    /// Connect to the cluster and start a change subscription.
    async fn subscribe(&self, target: &ClusterTarget) -> Result<WorkloadStream, WatchError>;
}

/// Fatal-to-observer failures. Other observers and the workers keep running.
#[derive(Debug, Error)]
pub enum ObserverError {
    #[error("Failed to connect: {0}")]
    Connect(#[source] WatchError),

    #[error("Initial sync failed: {0}")]
    SyncFailed(#[source] WatchError),

    #[error("Subscription ended unexpectedly")]
    StreamEnded,

    #[error("Task queue closed")]
    QueueClosed,
}

/// Watches one cluster and publishes a scan request per container image.
pub struct ClusterObserver {
    target: ClusterTarget,
    org_id: String,
    subscriber: Arc<dyn WorkloadSubscriber>,
}

impl ClusterObserver {
    /// Create a new observer for `target`.
    pub fn new(
        target: ClusterTarget,
        org_id: impl Into<String>,
        subscriber: Arc<dyn WorkloadSubscriber>,
    ) -> Self {
        Self {
            target,
            org_id: org_id.into(),
            subscriber,
        }
    }

    /// The cluster this observer watches.
    pub fn target(&self) -> &ClusterTarget {
        &self.target
    }

    /// Run until `shutdown` fires.
    ///
    /// Events seen before the initial sync completes are published like any
    /// other; an error or end of stream before that point is fatal. After
    /// sync, subscription errors are logged and the subscription is expected
    /// to recover on its own. Returns the number of requests published.
    pub async fn run(self, tasks: TaskSender, shutdown: CancellationToken) -> Result<u64, ObserverError> {
        info!(
            kubeconfig = %self.target.kubeconfig.display(),
            context = self.target.context_name(),
            "Watcher start"
        );

        let subscribed = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Ok(0),
            subscribed = self.subscriber.subscribe(&self.target) => subscribed,
        };
        let mut events = subscribed.map_err(ObserverError::Connect)?;

        let mut synced = false;
        let mut published = 0u64;

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = events.next() => next,
            };

            match next {
                None => return Err(ObserverError::StreamEnded),
                Some(Err(e)) if !synced => return Err(ObserverError::SyncFailed(e)),
                Some(Err(e)) => {
                    warn!(error = %e, "Watch error, waiting for subscription to recover");
                }
                Some(Ok(WorkloadEvent::Synced)) => {
                    if !synced {
                        info!(published, "Watcher synced");
                    } else {
                        debug!("Watcher resynced");
                    }
                    synced = true;
                }
                Some(Ok(event)) => {
                    for request in event.scan_requests(&self.org_id) {
                        match tasks.send(request, &shutdown).await {
                            SendOutcome::Sent => published += 1,
                            SendOutcome::Cancelled => break,
                            SendOutcome::Closed => return Err(ObserverError::QueueClosed),
                        }
                    }
                }
            }
        }

        info!(
            kubeconfig = %self.target.kubeconfig.display(),
            context = self.target.context_name(),
            published,
            "Watcher stop"
        );
        Ok(published)
    }
}
