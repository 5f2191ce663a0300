//! Bounded multi-producer, multi-consumer task queue.
//!
//! Observers hold [`TaskSender`] clones and workers share one
//! [`TaskReceiver`]. The queue closes when the last sender is dropped;
//! buffered requests are still delivered after closure, and each request
//! goes to exactly one worker.

use std::sync::Arc;

use imagewatch_core::ScanRequest;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Outcome of a send attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Request was enqueued.
    Sent,
    /// Cancellation fired while waiting for capacity.
    Cancelled,
    /// All receivers are gone.
    Closed,
}

/// Create a queue with the given capacity.
pub fn task_queue(capacity: usize) -> (TaskSender, TaskReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        TaskSender { tx },
        TaskReceiver {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

/// Producer handle. Cloned once per observer.
#[derive(Debug, Clone)]
pub struct TaskSender {
    tx: mpsc::Sender<ScanRequest>,
}

impl TaskSender {
    /// Enqueue a request, waiting for capacity when the queue is full.
    pub async fn send(&self, request: ScanRequest, shutdown: &CancellationToken) -> SendOutcome {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => SendOutcome::Cancelled,
            result = self.tx.send(request) => match result {
                Ok(()) => SendOutcome::Sent,
                Err(_) => SendOutcome::Closed,
            },
        }
    }
}

/// Consumer handle shared by all workers.
#[derive(Debug, Clone)]
pub struct TaskReceiver {
    rx: Arc<Mutex<mpsc::Receiver<ScanRequest>>>,
}

impl TaskReceiver {
    /// Take the next request.
    ///
    /// Returns `None` once every sender is dropped and the buffer is empty.
    /// Dropping the returned future releases the lock, so it is safe to
    /// race against cancellation.
    pub async fn recv(&self) -> Option<ScanRequest> {
        self.rx.lock().await.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    #[tokio::test]
    async fn test_buffered_items_drain_after_close() {
        let (tx, rx) = task_queue(4);
        let shutdown = CancellationToken::new();
        for i in 0..3 {
            let outcome = tx.send(ScanRequest::new(format!("img-{i}"), "org"), &shutdown).await;
            assert_eq!(outcome, SendOutcome::Sent);
        }
        drop(tx);

        let mut images = Vec::new();
        while let Some(req) = rx.recv().await {
            images.push(req.image);
        }
        assert_eq!(images, vec!["img-0", "img-1", "img-2"]);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_each_item_delivered_once_across_consumers() {
        let (tx, rx) = task_queue(8);
        let shutdown = CancellationToken::new();

        let mut consumers = Vec::new();
        for _ in 0..4 {
            let rx = rx.clone();
            consumers.push(tokio::spawn(async move {
                let mut got = Vec::new();
                while let Some(req) = rx.recv().await {
                    got.push(req.image);
                }
                got
            }));
        }

        for i in 0..100 {
            tx.send(ScanRequest::new(format!("img-{i}"), "org"), &shutdown).await;
        }
        drop(tx);

        let mut all = Vec::new();
        for handle in consumers {
            all.extend(handle.await.unwrap());
        }
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_blocks_until_cancelled() {
        let (tx, _rx) = task_queue(1);
        let shutdown = CancellationToken::new();
        assert_eq!(
            tx.send(ScanRequest::new("a", "org"), &shutdown).await,
            SendOutcome::Sent
        );

        let canceller = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        assert_eq!(
            tx.send(ScanRequest::new("b", "org"), &shutdown).await,
            SendOutcome::Cancelled
        );
    }

    #[tokio::test]
    async fn test_send_after_receivers_dropped() {
        let (tx, rx) = task_queue(1);
        drop(rx);
        let outcome = tx
            .send(ScanRequest::new("a", "org"), &CancellationToken::new())
            .await;
        assert_eq!(outcome, SendOutcome::Closed);
    }
}
