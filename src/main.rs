//! GitHub App Token Refresh Sidecar
//!
//! Runs alongside a main container, refreshing a GitHub App installation
//! token and writing it to a shared tmpfs volume until SIGTERM or SIGINT.

use anyhow::{Context, Result};
use clap::Parser;
use github_token_sidecar::{logging, Args, Config, RefreshLoop};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cancel `token` on the first SIGTERM or SIGINT
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }

    token.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.log_format);

    info!("GitHub App token refresh sidecar starting");

    let config = Config::load(&args).context("Failed to load configuration")?;

    info!(
        app_id = config.app_id,
        installation_id = config.installation_id,
        token_path = ?config.token_path,
        refresh_interval_secs = config.refresh_interval.as_secs(),
        "Configuration loaded"
    );

    if config.scopes.is_empty() {
        warn!("No repository scoping configured - token will have access to all repos in installation");
    } else {
        info!(repositories = %config.scopes, "Repository scoping enabled");
    }

    let source = config
        .token_source()
        .context("Failed to create token generator")?;

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let mut refresh = RefreshLoop::new(source, config.publisher(), config.refresh_settings());
    let stats = refresh.run(&cancel).await;

    info!(
        refreshes = stats.refreshes,
        acquisition_failures = stats.acquisition_failures,
        publish_failures = stats.publish_failures,
        "Sidecar shut down successfully"
    );

    Ok(())
}
