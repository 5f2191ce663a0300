//! Cluster target configuration value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::CoreError;

/// One configured cluster: where its kubeconfig lives and which context to use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterTarget {
    /// Path to the kubeconfig file.
    pub kubeconfig: PathBuf,

    /// Context name inside the kubeconfig. `None` means the current context.
    pub context: Option<String>,
}

impl ClusterTarget {
    /// Create a new ClusterTarget.
    pub fn new(kubeconfig: impl Into<PathBuf>) -> Self {
        Self {
            kubeconfig: kubeconfig.into(),
            context: None,
        }
    }

    /// Builder method to set the context.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Context name for logging; empty when the current context is used.
    pub fn context_name(&self) -> &str {
        self.context.as_deref().unwrap_or("")
    }
}

impl fmt::Display for ClusterTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(ctx) => write!(f, "{}@{}", ctx, self.kubeconfig.display()),
            None => write!(f, "{}", self.kubeconfig.display()),
        }
    }
}

/// Parses `<kubeconfig_path>[,<context>]`.
///
/// An empty path is accepted here so callers can filter it out; anything
/// beyond the second comma-separated field is rejected.
impl FromStr for ClusterTarget {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(',');
        let path = parts.next().unwrap_or_default().trim();
        let context = parts.next().map(str::trim).filter(|c| !c.is_empty());

        if parts.next().is_some() {
            return Err(CoreError::InvalidClusterTarget(s.to_string()));
        }

        Ok(Self {
            kubeconfig: PathBuf::from(path),
            context: context.map(str::to_string),
        })
    }
}
