//! imagewatch daemon

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use imagewatch_worker::config::TOKEN_ENV;
use imagewatch_worker::{Args, KubeSubscriber, Pipeline, RunConfig, SnykClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    // Load config
    let args = Args::parse();
    let config = RunConfig::from_args(
        args,
        std::env::var_os("HOME").map(PathBuf::from),
        std::env::var(TOKEN_ENV).ok(),
    );

    if let Err(e) = config.validate() {
        error!(error = %e, "Missing configuration");
        std::process::exit(1);
    }

    info!(
        org = %config.org_id,
        clusters = config.clusters.len(),
        concurrency = config.concurrency,
        rate = config.rate,
        burst = config.burst,
        retries = config.max_retries,
        "Starting imagewatch"
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let client = Arc::new(SnykClient::new(config.api_url.clone(), config.token.clone()));
    let summary = Pipeline::new(config, Arc::new(KubeSubscriber), client)
        .run(shutdown)
        .await;

    info!(
        published = summary.published,
        scanned = summary.workers.scanned,
        duplicates = summary.workers.duplicates,
        failed = summary.workers.failed,
        watchers_failed = summary.observers_failed,
        "Done."
    );

    Ok(())
}

/// Cancel `shutdown` on Ctrl+C or SIGTERM.
async fn cancel_on_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler, listening for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Shutdown requested");
    shutdown.cancel();
}
