//! imagewatch core domain types
//!
//! This crate contains pure domain types with no dependencies on:
//! - HTTP clients
//! - Kubernetes client libraries
//! - Runtime specifics
//!
//! All types here describe what flows through the scan pipeline.

pub mod cluster;
pub mod error;
pub mod request;
pub mod workload;

// Re-export commonly used types
pub use cluster::ClusterTarget;
pub use error::CoreError;
pub use request::ScanRequest;
pub use workload::{Workload, WorkloadEvent};
