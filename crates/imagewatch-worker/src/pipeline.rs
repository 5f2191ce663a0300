//! Lifecycle coordination for the observer → queue → worker pipeline.
//!
//! Shutdown order is fixed: wait for every observer, drop the last queue
//! sender (closing the queue), then wait for the workers to drain what is
//! still buffered. Cancellation short-circuits every wait along the way.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info_span, Instrument};

use crate::config::RunConfig;
use crate::observer::{ClusterObserver, ObserverError, WorkloadSubscriber};
use crate::pool::{WorkerPool, WorkerStats};
use crate::queue::{task_queue, TaskSender};
use crate::scan_client::ScanClient;

/// Totals reported when the pipeline finishes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSummary {
    /// Requests published by observers.
    pub published: u64,
    /// Observers that stopped with an error.
    pub observers_failed: usize,
    /// Worker counters summed over the pool.
    pub workers: WorkerStats,
}

/// The whole scan pipeline for one run.
pub struct Pipeline {
    config: RunConfig,
    subscriber: Arc<dyn WorkloadSubscriber>,
    client: Arc<dyn ScanClient>,
}

impl Pipeline {
    /// Create a new Pipeline.
    pub fn new(
        config: RunConfig,
        subscriber: Arc<dyn WorkloadSubscriber>,
        client: Arc<dyn ScanClient>,
    ) -> Self {
        Self {
            config,
            subscriber,
            client,
        }
    }

    /// Run until every observer has stopped and the workers have drained.
    pub async fn run(self, shutdown: CancellationToken) -> PipelineSummary {
        let (tasks_tx, tasks_rx) = task_queue(self.config.queue_capacity);

        let pool = WorkerPool::spawn(&self.config, self.client.clone(), tasks_rx, shutdown.clone());
        let observers = self.spawn_observers(&tasks_tx, &shutdown);

        let mut summary = PipelineSummary::default();
        for handle in observers {
            match handle.await {
                Ok(Ok(published)) => summary.published += published,
                Ok(Err(_)) => summary.observers_failed += 1,
                Err(e) => {
                    error!(error = %e, "Watcher task panicked");
                    summary.observers_failed += 1;
                }
            }
        }

        // Last sender: the queue closes here and workers drain the rest.
        drop(tasks_tx);

        summary.workers = pool.join().await;
        summary
    }

    fn spawn_observers(
        &self,
        tasks: &TaskSender,
        shutdown: &CancellationToken,
    ) -> Vec<JoinHandle<Result<u64, ObserverError>>> {
        self.config
            .clusters
            .iter()
            .map(|target| {
                let observer = ClusterObserver::new(
                    target.clone(),
                    self.config.org_id.clone(),
                    self.subscriber.clone(),
                );
                let span = info_span!(
                    "observer",
                    kubeconfig = %target.kubeconfig.display(),
                    context = target.context_name(),
                );
                let tasks = tasks.clone();
                let shutdown = shutdown.clone();

                tokio::spawn(
                    async move {
                        let target = observer.target().clone();
                        let result = observer.run(tasks, shutdown).await;
                        if let Err(e) = &result {
                            error!(
                                kubeconfig = %target.kubeconfig.display(),
                                context = target.context_name(),
                                error = %e,
                                "Watcher error"
                            );
                        }
                        result
                    }
                    .instrument(span),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use imagewatch_core::{ClusterTarget, Workload, WorkloadEvent};

    use crate::observer::WatchError;
    use crate::testing::{FakeScanClient, FakeSubscriber, Script};

    fn config(clusters: usize, concurrency: usize) -> RunConfig {
        RunConfig {
            org_id: "org".to_string(),
            token: "t".to_string(),
            clusters: (0..clusters)
                .map(|i| ClusterTarget::new(format!("kubeconfig-{i}")))
                .collect(),
            concurrency,
            rate: 50.0,
            burst: 5,
            queue_capacity: 2,
            backoff_base: Duration::from_millis(10),
            ..RunConfig::default()
        }
    }

    fn created(images: &[&str]) -> Result<WorkloadEvent, WatchError> {
        Ok(WorkloadEvent::Created(
            images
                .iter()
                .fold(Workload::new("default", "pod"), |w, i| w.with_image(*i)),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_everything_published_is_processed_before_exit() {
        // The stream ends after these events, which stops the observer and
        // closes the queue; the small capacity forces backpressure.
        let subscriber = FakeSubscriber::finite(vec![
            created(&["a:1", "b:1"]),
            Ok(WorkloadEvent::Synced),
            created(&["a:1", "c:1", "d:1"]),
            Ok(WorkloadEvent::Deleted(Workload::new("default", "gone").with_image("z:1"))),
        ]);
        let client = Arc::new(FakeScanClient::succeeding());

        let summary = Pipeline::new(config(1, 1), Arc::new(subscriber), client.clone())
            .run(CancellationToken::new())
            .await;

        assert_eq!(summary.observers_failed, 1);
        assert_eq!(summary.workers.scanned, 4);
        assert_eq!(summary.workers.duplicates, 1);
        assert_eq!(client.total_calls(), 4);
        assert_eq!(client.calls_for("z:1"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_long_running_pipeline() {
        let subscriber = FakeSubscriber::new(vec![created(&["a:1"]), Ok(WorkloadEvent::Synced)]);
        let client = Arc::new(FakeScanClient::succeeding());
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(
            Pipeline::new(config(1, 2), Arc::new(subscriber), client.clone()).run(shutdown.clone()),
        );

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!handle.is_finished());
        assert_eq!(client.calls_for("a:1"), 1);

        shutdown.cancel();
        let summary = handle.await.unwrap();
        assert_eq!(summary.published, 1);
        assert_eq!(summary.observers_failed, 0);
        assert_eq!(summary.workers.scanned, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_observer_does_not_stop_the_others() {
        let subscriber = FakeSubscriber::new(Vec::new())
            .with_target(
                "kubeconfig-0",
                Script::Finite(vec![Err(WatchError::Watch("forbidden".into()))]),
            )
            .with_target(
                "kubeconfig-1",
                Script::Open(vec![created(&["a:1"]), Ok(WorkloadEvent::Synced)]),
            );
        let client = Arc::new(FakeScanClient::succeeding());
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(
            Pipeline::new(config(2, 1), Arc::new(subscriber), client.clone()).run(shutdown.clone()),
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!handle.is_finished());
        assert_eq!(client.calls_for("a:1"), 1);

        shutdown.cancel();
        let summary = handle.await.unwrap();
        assert_eq!(summary.observers_failed, 1);
        assert_eq!(summary.published, 1);
    }

    #[tokio::test]
    async fn test_unreachable_clusters_end_the_run() {
        let client = Arc::new(FakeScanClient::succeeding());
        let summary = Pipeline::new(
            config(3, 2),
            Arc::new(FakeSubscriber::unreachable()),
            client.clone(),
        )
        .run(CancellationToken::new())
        .await;

        assert_eq!(summary.observers_failed, 3);
        assert_eq!(summary.workers, WorkerStats::default());
        assert_eq!(client.total_calls(), 0);
    }
}
