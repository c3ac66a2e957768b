//! GitHub App Token Refresh Sidecar
//!
//! Keeps a GitHub App installation access token fresh on a shared volume so
//! a neighbouring container can read it.
//!
//! ## Binaries
//!
//! - `github-token-sidecar`: refreshes the token until SIGTERM/SIGINT
//! - `get-token`: acquires and publishes a single token, then exits
//!
//! ## How it works
//!
//! 1. Configuration is loaded once from mounted secrets and the environment
//! 2. An RS256 JWT is exchanged for a (optionally repository-scoped)
//!    installation token
//! 3. The token is written atomically to the shared volume with 0600
//!    permissions
//! 4. The loop sleeps for the refresh interval (45 minutes by default,
//!    tokens live for an hour) and repeats
//! 5. Failed acquisitions back off exponentially from 1 second to 5 minutes
//!
//! ## Example
//!
//! ```bash
//! WORKSPACE_REPOS="https://github.com/lornu-ai/lornu.ai.git" \
//! REFRESH_INTERVAL_MINUTES=30 \
//! github-token-sidecar --token-path /var/run/github/token
//! ```

pub mod auth;
pub mod backoff;
pub mod config;
pub mod error;
pub mod logging;
pub mod publisher;
pub mod refresh;
pub mod source;

pub use backoff::Backoff;
pub use config::{Args, Config};
pub use error::{AcquisitionError, ConfigError, CycleError, PublishError};
pub use publisher::TokenPublisher;
pub use refresh::{PublishFailurePolicy, RefreshLoop, RefreshSettings, RefreshStats};
pub use source::{Credential, CredentialSource, GitHubAppTokenSource, ScopeSet};
