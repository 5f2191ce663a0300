//! Core domain errors.

use thiserror::Error;

/// Core domain errors for imagewatch.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// A cluster target string could not be parsed.
    #[error("Invalid cluster target '{0}': expected <kubeconfig_path>[,<context>]")]
    InvalidClusterTarget(String),
}
