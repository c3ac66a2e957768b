//! GitHub App Installation Token Generator
//!
//! Acquires one installation token and publishes it the same way the sidecar
//! does, then exits. Useful for init containers and for checking credentials.
//!
//! ## Usage
//! ```bash
//! get-token --secrets-path ./secrets --token-path ./token
//!
//! # Print a JSON summary (never the token itself)
//! get-token --secrets-path ./secrets --token-path ./token --format json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use github_token_sidecar::{logging, Args, Config, RefreshLoop};
use serde::Serialize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// GitHub App Installation Token Generator
#[derive(Parser, Debug)]
#[command(name = "get-token")]
#[command(about = "Generate and publish a single GitHub App installation token")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    config: Args,

    /// Output format for the summary on stdout
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    /// Nothing on stdout; progress goes to the log
    Text,
    /// JSON summary
    Json,
}

#[derive(Serialize)]
struct TokenOutput {
    path: PathBuf,
    installation_id: u64,
    repositories: Vec<String>,
    expires_at: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.config.log_format);

    let config = Config::load(&cli.config).context("Failed to load configuration")?;
    let source = config
        .token_source()
        .context("Failed to create token generator")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    info!(
        installation_id = config.installation_id,
        "Exchanging JWT for installation token"
    );
    let refresh = RefreshLoop::new(source, config.publisher(), config.refresh_settings());
    let credential = refresh
        .run_once(&cancel)
        .await
        .context("Failed to generate token")?;

    info!(
        path = ?config.token_path,
        expires_at = ?credential.expires_at(),
        "Token saved"
    );

    if let OutputFormat::Json = cli.format {
        let output = TokenOutput {
            path: config.token_path.clone(),
            installation_id: config.installation_id,
            repositories: config.scopes.as_slice().to_vec(),
            expires_at: credential.expires_at().map(|t| t.to_rfc3339()),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    Ok(())
}
