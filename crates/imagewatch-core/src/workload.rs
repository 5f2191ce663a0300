//! Workload and workload change event types.

use serde::{Deserialize, Serialize};

use crate::ScanRequest;

/// A container-bearing resource observed in a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    /// Namespace the workload lives in.
    pub namespace: String,

    /// Workload name.
    pub name: String,

    /// Image reference of every declared container, in declaration order.
    pub images: Vec<String>,
}

impl Workload {
    /// Create a new Workload with no containers.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            images: Vec::new(),
        }
    }

    /// Builder method to add a container image.
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.images.push(image.into());
        self
    }
}

/// A change notification from a cluster subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkloadEvent {
    /// Workload appeared (including those listed during the initial sync).
    Created(Workload),
    /// Workload changed after the initial sync.
    Updated(Workload),
    /// Workload went away.
    Deleted(Workload),
    /// The subscription's local view is now consistent with the cluster.
    Synced,
}

impl WorkloadEvent {
    /// Translate this event into scan requests.
    ///
    /// Create and update events yield one request per container, duplicates
    /// included; delete and sync events yield none.
    pub fn scan_requests(&self, org_id: &str) -> Vec<ScanRequest> {
        match self {
            WorkloadEvent::Created(w) | WorkloadEvent::Updated(w) => w
                .images
                .iter()
                .map(|image| ScanRequest::new(image.clone(), org_id))
                .collect(),
            WorkloadEvent::Deleted(_) | WorkloadEvent::Synced => Vec::new(),
        }
    }
}
