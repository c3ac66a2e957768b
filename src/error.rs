//! Error types for the token sidecar
//!
//! Acquisition and publish failures are never fatal to the refresh loop;
//! configuration errors only surface at startup.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while obtaining an installation token
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// The app JWT could not be built or signed
    #[error("Failed to sign GitHub App JWT: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// Transport-level failure talking to the GitHub API
    #[error("Request to GitHub API failed: {0}")]
    Http(#[from] reqwest::Error),

    /// GitHub answered with a non-success status
    #[error("GitHub API error ({status}): {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },

    /// The response body did not contain a usable token
    #[error("Failed to parse installation token response: {0}")]
    Decode(String),

    /// Shutdown was requested while the request was in flight
    #[error("Token acquisition cancelled")]
    Cancelled,
}

/// Errors raised while publishing a token to disk
///
/// Every variant is an I/O failure against a specific path.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Failed to create token directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write temp token file {path:?}: {source}")]
    WriteTemp {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to rename token file into {path:?}: {source}")]
    Rename {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PublishError {
    /// The underlying I/O error
    pub fn io_error(&self) -> &std::io::Error {
        match self {
            PublishError::CreateDir { source, .. }
            | PublishError::WriteTemp { source, .. }
            | PublishError::Rename { source, .. } => source,
        }
    }
}

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path:?} as an integer: {source}")]
    ParseInt {
        path: PathBuf,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("Invalid REFRESH_INTERVAL_MINUTES: {0}")]
    InvalidRefreshInterval(String),

    #[error("HTTP_TIMEOUT_SECS must be positive")]
    InvalidHttpTimeout,

    #[error("Failed to parse private key as RSA PEM: {0}")]
    InvalidPrivateKey(#[from] jsonwebtoken::errors::Error),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Failure of a single acquire-then-publish cycle
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_publish_error_keeps_path_and_cause() {
        let err = PublishError::Rename {
            path: PathBuf::from("/var/run/github/token"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };

        let display = err.to_string();
        assert!(display.contains("/var/run/github/token"));
        assert!(display.contains("denied"));
        assert_eq!(err.io_error().kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_cycle_error_is_transparent() {
        let err: CycleError = AcquisitionError::Decode("missing token".into()).into();
        assert_eq!(
            err.to_string(),
            "Failed to parse installation token response: missing token"
        );
    }
}
