//! Sidecar configuration
//!
//! GitHub App credentials come from files mounted out of a Kubernetes secret:
//!
//! - `<secrets>/app-id`: GitHub App ID
//! - `<secrets>/installation-id`: Installation ID
//! - `<secrets>/private-key`: Private key in PEM format
//!
//! Everything else comes from flags or environment variables, chiefly
//! `WORKSPACE_REPOS` (space-separated repository URLs to scope tokens to) and
//! `REFRESH_INTERVAL_MINUTES` (default: 45).

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;

use crate::auth::parse_private_key;
use crate::backoff::Backoff;
use crate::error::ConfigError;
use crate::logging::LogFormat;
use crate::publisher::TokenPublisher;
use crate::refresh::{PublishFailurePolicy, RefreshSettings, DEFAULT_REFRESH_INTERVAL};
use crate::source::{GitHubAppTokenSource, ScopeSet, DEFAULT_API_URL};

/// Shared volume (tmpfs) mounted in both the sidecar and the main container
pub const DEFAULT_TOKEN_PATH: &str = "/var/run/github/token";

/// Directory containing the GitHub App credentials
pub const DEFAULT_SECRETS_PATH: &str = "/var/run/secrets/github-app";

/// Command line and environment settings
#[derive(Parser, Debug, Clone)]
pub struct Args {
    /// Directory holding app-id, installation-id and private-key
    #[arg(long, env = "GITHUB_APP_SECRETS_PATH", default_value = DEFAULT_SECRETS_PATH)]
    pub secrets_path: PathBuf,

    /// Where the token is published
    #[arg(long, env = "GITHUB_TOKEN_PATH", default_value = DEFAULT_TOKEN_PATH)]
    pub token_path: PathBuf,

    /// Space-separated repository URLs to scope tokens to
    #[arg(long, env = "WORKSPACE_REPOS")]
    pub workspace_repos: Option<String>,

    /// Minutes between token refreshes
    #[arg(long, env = "REFRESH_INTERVAL_MINUTES")]
    pub refresh_interval_minutes: Option<String>,

    /// GitHub REST API base URL
    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Timeout for a single GitHub API request, in seconds
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value_t = 30)]
    pub http_timeout_secs: u64,

    /// Behaviour after a token could not be written
    #[arg(long, env = "PUBLISH_FAILURE_POLICY", value_enum, default_value = "immediate")]
    pub publish_failure: PublishFailurePolicy,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,
}

/// Immutable configuration, loaded once at startup
#[derive(Clone)]
pub struct Config {
    pub app_id: u64,
    pub installation_id: u64,
    pub private_key: Vec<u8>,
    pub scopes: ScopeSet,
    pub refresh_interval: Duration,
    pub token_path: PathBuf,
    pub api_url: String,
    pub http_timeout: Duration,
    pub publish_failure: PublishFailurePolicy,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("app_id", &self.app_id)
            .field("installation_id", &self.installation_id)
            .field("private_key", &"<redacted>")
            .field("scopes", &self.scopes)
            .field("refresh_interval", &self.refresh_interval)
            .field("token_path", &self.token_path)
            .field("api_url", &self.api_url)
            .field("http_timeout", &self.http_timeout)
            .field("publish_failure", &self.publish_failure)
            .finish()
    }
}

impl Config {
    /// Read mounted secrets and combine them with `args`
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let app_id = read_u64_file(&args.secrets_path.join("app-id"))?;
        let installation_id = read_u64_file(&args.secrets_path.join("installation-id"))?;

        let key_path = args.secrets_path.join("private-key");
        let private_key = fs::read(&key_path).map_err(|source| ConfigError::Read {
            path: key_path,
            source,
        })?;

        let scopes = args
            .workspace_repos
            .as_deref()
            .map(parse_repository_names)
            .unwrap_or_default();

        let refresh_interval = match args.refresh_interval_minutes.as_deref() {
            Some(raw) if !raw.is_empty() => parse_refresh_interval(raw)?,
            _ => DEFAULT_REFRESH_INTERVAL,
        };

        Ok(Self {
            app_id,
            installation_id,
            private_key,
            scopes: ScopeSet::new(scopes),
            refresh_interval,
            token_path: args.token_path.clone(),
            api_url: args.api_url.clone(),
            http_timeout: parse_http_timeout(args.http_timeout_secs)?,
            publish_failure: args.publish_failure,
        })
    }

    /// Build a config directly, using defaults for everything optional
    pub fn from_parts(app_id: u64, installation_id: u64, private_key: Vec<u8>) -> Self {
        Self {
            app_id,
            installation_id,
            private_key,
            scopes: ScopeSet::default(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            token_path: PathBuf::from(DEFAULT_TOKEN_PATH),
            api_url: DEFAULT_API_URL.to_string(),
            http_timeout: Duration::from_secs(30),
            publish_failure: PublishFailurePolicy::default(),
        }
    }

    /// Create the GitHub token source described by this config
    pub fn token_source(&self) -> Result<GitHubAppTokenSource, ConfigError> {
        let key = parse_private_key(&self.private_key)?;
        let client = reqwest::Client::builder()
            .timeout(self.http_timeout)
            .build()?;

        Ok(GitHubAppTokenSource::new(
            client,
            self.api_url.clone(),
            self.app_id,
            self.installation_id,
            key,
        ))
    }

    pub fn publisher(&self) -> TokenPublisher {
        TokenPublisher::new(&self.token_path)
    }

    pub fn refresh_settings(&self) -> RefreshSettings {
        RefreshSettings {
            refresh_interval: self.refresh_interval,
            scopes: self.scopes.clone(),
            backoff: Backoff::default(),
            publish_failure: self.publish_failure,
        }
    }
}

/// Extract repository names from git URLs.
///
/// `"https://github.com/owner/repo1.git https://github.com/owner/repo2"`
/// becomes `["repo1", "repo2"]`. The GitHub API wants names, not URLs.
pub fn parse_repository_names(repos: &str) -> Vec<String> {
    repos
        .split_whitespace()
        .filter_map(|url| {
            let (_, last) = url.rsplit_once('/')?;
            let name = last.strip_suffix(".git").unwrap_or(last);
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}

fn parse_refresh_interval(raw: &str) -> Result<Duration, ConfigError> {
    let minutes: i64 = raw
        .trim()
        .parse()
        .map_err(|e| ConfigError::InvalidRefreshInterval(format!("{raw:?}: {e}")))?;

    if minutes <= 0 {
        return Err(ConfigError::InvalidRefreshInterval(format!(
            "must be positive, got {minutes}"
        )));
    }

    let secs = (minutes as u64).checked_mul(60).ok_or_else(|| {
        ConfigError::InvalidRefreshInterval(format!("{minutes} minutes is too large"))
    })?;

    Ok(Duration::from_secs(secs))
}

fn parse_http_timeout(secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::InvalidHttpTimeout);
    }
    Ok(Duration::from_secs(secs))
}

/// Read a file holding a single integer, surrounding whitespace allowed
fn read_u64_file(path: &Path) -> Result<u64, ConfigError> {
    let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    data.trim().parse().map_err(|source| ConfigError::ParseInt {
        path: path.to_path_buf(),
        source,
    })
}
