//! imagewatch worker
//!
//! Watches workloads across one or more clusters and submits every distinct
//! container image to the scanning service.
//!
//! Data flows one way:
//!
//! ```text
//! ClusterObserver ──► task queue ──► WorkerPool ──► TokenBucket ──► ScanClient
//! ```
//!
//! [`Pipeline`] owns the queue and sequences shutdown.

pub mod config;
pub mod kube_source;
pub mod observer;
pub mod pipeline;
pub mod pool;
pub mod queue;
pub mod rate_limit;
pub mod retry;
pub mod scan_client;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::{Args, ConfigError, RunConfig};
pub use kube_source::KubeSubscriber;
pub use observer::{ClusterObserver, ObserverError, WatchError, WorkloadSubscriber};
pub use pipeline::{Pipeline, PipelineSummary};
pub use pool::{Worker, WorkerPool, WorkerStats};
pub use scan_client::{ScanClient, ScanError, SnykClient};
