//! Scan request value type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A unit of work: submit this image reference for monitoring.
///
/// Two requests with the same `image` are duplicates for dedup purposes;
/// the organization is constant for a given run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanRequest {
    /// Container image reference as declared by the workload.
    pub image: String,

    /// Organization the image is monitored under.
    pub org_id: String,
}

impl ScanRequest {
    /// Create a new ScanRequest.
    pub fn new(image: impl Into<String>, org_id: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            org_id: org_id.into(),
        }
    }
}

impl fmt::Display for ScanRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (org {})", self.image, self.org_id)
    }
}
