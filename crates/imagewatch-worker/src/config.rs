//! Daemon configuration.
//!
//! Command-line flags and environment variables are parsed into [`Args`],
//! then resolved once into an immutable [`RunConfig`] that every component
//! reads from.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use imagewatch_core::ClusterTarget;
use thiserror::Error;

/// Default scanning service base URL.
pub const DEFAULT_API_URL: &str = "https://snyk.io/api/v1";

/// Environment variable holding the scanning service API token.
///
/// Read from the environment only, so the token never appears on argv.
pub const TOKEN_ENV: &str = "SNYK_API_TOKEN";

/// Errors found while validating configuration at startup.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing configuration: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration: {field} must be {expected}")]
    Invalid {
        field: &'static str,
        expected: &'static str,
    },
}

/// Watch clusters and submit every running image for monitoring.
#[derive(Parser, Debug)]
#[command(name = "imagewatch", about = "Watch clusters and submit running images for monitoring")]
pub struct Args {
    /// Organization ID images are monitored under
    #[arg(long, env = "IMAGEWATCH_ORG_ID")]
    pub org: Option<String>,

    /// Cluster in the format <kubeconfig_path>[,<context>]. Can be provided multiple times
    #[arg(long = "cluster", value_name = "KUBECONFIG[,CONTEXT]")]
    pub clusters: Vec<ClusterTarget>,

    /// API request rate limit per worker (requests per second)
    #[arg(long, default_value_t = 2.0)]
    pub rate: f64,

    /// API request burst limit per worker
    #[arg(long, default_value_t = 2)]
    pub burst: u32,

    /// Number of concurrent workers
    #[arg(long, default_value_t = 5)]
    pub concurrency: usize,

    /// Maximum attempts per image before giving up
    #[arg(long, default_value_t = 3)]
    pub retries: u32,

    /// Capacity of the task queue between watchers and workers
    #[arg(long, default_value_t = 1000)]
    pub queue_capacity: usize,

    /// Base retry backoff in milliseconds (doubles after each failure)
    #[arg(long, default_value_t = 1000)]
    pub backoff_base_ms: u64,

    /// Scanning service base URL
    #[arg(long, env = "IMAGEWATCH_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,
}

/// Resolved run configuration. Read-only once built.
#[derive(Clone)]
pub struct RunConfig {
    /// Organization ID.
    pub org_id: String,

    /// Scanning service API token.
    pub token: String,

    /// Clusters to watch, one observer each.
    pub clusters: Vec<ClusterTarget>,

    /// Steady token rate per worker (tokens/second).
    pub rate: f64,

    /// Token bucket capacity per worker.
    pub burst: u32,

    /// Worker pool size.
    pub concurrency: usize,

    /// Maximum attempts per scan request.
    pub max_retries: u32,

    /// Task queue capacity.
    pub queue_capacity: usize,

    /// Backoff time-unit; the delay before attempt k is `2^(k-2)` units.
    pub backoff_base: Duration,

    /// Scanning service base URL.
    pub api_url: String,
}

impl RunConfig {
    /// Resolve parsed arguments and the token from [`TOKEN_ENV`] into a run
    /// configuration.
    ///
    /// Cluster entries with an empty kubeconfig path are dropped. When none
    /// remain, `<home>/.kube/config` with its current context is used.
    pub fn from_args(args: Args, home: Option<PathBuf>, token: Option<String>) -> Self {
        let mut clusters: Vec<ClusterTarget> = args
            .clusters
            .into_iter()
            .filter(|c| !c.kubeconfig.as_os_str().is_empty())
            .collect();

        if clusters.is_empty() {
            let home = home.unwrap_or_default();
            clusters.push(ClusterTarget::new(home.join(".kube").join("config")));
        }

        Self {
            org_id: args.org.unwrap_or_default(),
            token: token.unwrap_or_default(),
            clusters,
            rate: args.rate,
            burst: args.burst,
            concurrency: args.concurrency,
            max_retries: args.retries,
            queue_capacity: args.queue_capacity,
            backoff_base: Duration::from_millis(args.backoff_base_ms),
            api_url: args.api_url,
        }
    }

    /// Check that everything the pipeline needs is present and positive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.org_id.trim().is_empty() {
            return Err(ConfigError::Missing("organization ID (--org)"));
        }
        if self.token.trim().is_empty() {
            return Err(ConfigError::Missing("API token (SNYK_API_TOKEN)"));
        }
        if self.clusters.is_empty() {
            return Err(ConfigError::Missing("at least one cluster (--cluster)"));
        }
        if !(self.rate.is_finite() && self.rate > 0.0) {
            return Err(ConfigError::Invalid {
                field: "rate",
                expected: "a positive number",
            });
        }
        if self.burst == 0 {
            return Err(ConfigError::Invalid {
                field: "burst",
                expected: "at least 1",
            });
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "concurrency",
                expected: "at least 1",
            });
        }
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid {
                field: "retries",
                expected: "at least 1",
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "queue-capacity",
                expected: "at least 1",
            });
        }
        Ok(())
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            org_id: String::new(),
            token: String::new(),
            clusters: Vec::new(),
            rate: 2.0,
            burst: 2,
            concurrency: 5,
            max_retries: 3,
            queue_capacity: 1000,
            backoff_base: Duration::from_secs(1),
            api_url: DEFAULT_API_URL.to_string(),
        }
    }
}

// Keeps the token out of logs.
impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("org_id", &self.org_id)
            .field("token", &"<redacted>")
            .field("clusters", &self.clusters)
            .field("rate", &self.rate)
            .field("burst", &self.burst)
            .field("concurrency", &self.concurrency)
            .field("max_retries", &self.max_retries)
            .field("queue_capacity", &self.queue_capacity)
            .field("backoff_base", &self.backoff_base)
            .field("api_url", &self.api_url)
            .finish()
    }
}
