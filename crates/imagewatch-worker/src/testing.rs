//! In-memory fakes shared by unit tests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use imagewatch_core::{ClusterTarget, ScanRequest, WorkloadEvent};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::observer::{WatchError, WorkloadStream, WorkloadSubscriber};
use crate::scan_client::{ScanClient, ScanError};

/// Scan client that fails a configured number of times per image before
/// succeeding, and records every call.
#[derive(Default)]
pub struct FakeScanClient {
    failures: Mutex<HashMap<String, u32>>,
    always_fail: bool,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl FakeScanClient {
    /// Client that succeeds on every call.
    pub fn succeeding() -> Self {
        Self::default()
    }

    /// Client that fails every call with a 500.
    pub fn failing() -> Self {
        Self {
            always_fail: true,
            ..Self::default()
        }
    }

    /// Fail `count` times for `image` before succeeding.
    pub fn with_failures(self, image: &str, count: u32) -> Self {
        self.failures.lock().unwrap().insert(image.to_string(), count);
        self
    }

    /// Number of calls made for `image`.
    pub fn calls_for(&self, image: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(i, _)| i == image)
            .count()
    }

    /// Total calls made.
    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Instants of every call for `image`.
    pub fn call_times(&self, image: &str) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(i, _)| i == image)
            .map(|(_, t)| *t)
            .collect()
    }
}

#[async_trait]
impl ScanClient for FakeScanClient {
    async fn monitor_image(
        &self,
        request: &ScanRequest,
        shutdown: &CancellationToken,
    ) -> Result<(), ScanError> {
        if shutdown.is_cancelled() {
            return Err(ScanError::Cancelled);
        }
        self.calls
            .lock()
            .unwrap()
            .push((request.image.clone(), Instant::now()));

        if self.always_fail {
            return Err(ScanError::Status {
                status: 500,
                body: "internal error".to_string(),
            });
        }

        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(&request.image) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Err(ScanError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Scripted events for one subscription.
pub enum Script {
    /// Replay the events, then stay open without further events.
    Open(Vec<Result<WorkloadEvent, WatchError>>),
    /// Replay the events, then end the stream.
    Finite(Vec<Result<WorkloadEvent, WatchError>>),
}

/// Subscriber replaying scripted events, optionally per cluster.
///
/// Targets without a script of their own take the fallback script once;
/// after that they get a quiet, open stream.
pub struct FakeSubscriber {
    scripts: Mutex<HashMap<PathBuf, Script>>,
    fallback: Mutex<Option<Script>>,
    reachable: bool,
}

impl FakeSubscriber {
    /// Replay `events`, then stay open.
    pub fn new(events: Vec<Result<WorkloadEvent, WatchError>>) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback: Mutex::new(Some(Script::Open(events))),
            reachable: true,
        }
    }

    /// Replay `events`, then end the stream.
    pub fn finite(events: Vec<Result<WorkloadEvent, WatchError>>) -> Self {
        Self {
            fallback: Mutex::new(Some(Script::Finite(events))),
            ..Self::new(Vec::new())
        }
    }

    /// Fail every connection attempt.
    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::new(Vec::new())
        }
    }

    /// Use `script` for the cluster whose kubeconfig is `kubeconfig`.
    pub fn with_target(self, kubeconfig: impl Into<PathBuf>, script: Script) -> Self {
        self.scripts.lock().unwrap().insert(kubeconfig.into(), script);
        self
    }
}

#[async_trait]
impl WorkloadSubscriber for FakeSubscriber {
    async fn subscribe(&self, target: &ClusterTarget) -> Result<WorkloadStream, WatchError> {
        if !self.reachable {
            return Err(WatchError::Client(format!("{} unreachable", target)));
        }

        let script = self
            .scripts
            .lock()
            .unwrap()
            .remove(&target.kubeconfig)
            .or_else(|| self.fallback.lock().unwrap().take());

        let stream = match script {
            Some(Script::Open(events)) => stream::iter(events).chain(stream::pending()).boxed(),
            Some(Script::Finite(events)) => stream::iter(events).boxed(),
            None => stream::pending().boxed(),
        };
        Ok(stream)
    }
}
