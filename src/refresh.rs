//! Token refresh loop
//!
//! Drives acquire → publish → wait until cancelled. Acquisition failures are
//! retried with exponential backoff; publish failures are retried straight
//! away by default. Nothing short of cancellation stops the loop.

use std::time::Duration;

use clap::ValueEnum;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::backoff::Backoff;
use crate::error::CycleError;
use crate::publisher::TokenPublisher;
use crate::source::{Credential, CredentialSource, ScopeSet};

/// Default time between successful refreshes.
///
/// Installation tokens expire after an hour, so refresh with margin.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(45 * 60);

/// What to do after a token was acquired but could not be published
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum PublishFailurePolicy {
    /// Go straight back to acquiring a new token
    #[default]
    Immediate,
    /// Wait out an exponential backoff of its own before retrying
    Backoff,
}

/// Loop parameters, fixed for the life of the process
#[derive(Debug, Clone)]
pub struct RefreshSettings {
    pub refresh_interval: Duration,
    pub scopes: ScopeSet,
    pub backoff: Backoff,
    pub publish_failure: PublishFailurePolicy,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            scopes: ScopeSet::default(),
            backoff: Backoff::default(),
            publish_failure: PublishFailurePolicy::default(),
        }
    }
}

/// Counters reported when the loop exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStats {
    pub refreshes: u64,
    pub acquisition_failures: u64,
    pub publish_failures: u64,
}

/// Keeps a published token fresh
pub struct RefreshLoop<S> {
    source: S,
    publisher: TokenPublisher,
    settings: RefreshSettings,
    backoff: Backoff,
    publish_backoff: Backoff,
}

impl<S: CredentialSource> RefreshLoop<S> {
    pub fn new(source: S, publisher: TokenPublisher, settings: RefreshSettings) -> Self {
        let backoff = settings.backoff.clone();
        Self {
            source,
            publisher,
            publish_backoff: backoff.clone(),
            backoff,
            settings,
        }
    }

    /// Current acquisition backoff state
    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn publisher(&self) -> &TokenPublisher {
        &self.publisher
    }

    /// Acquire and publish a single token, without retries
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<Credential, CycleError> {
        let credential = self.source.acquire(&self.settings.scopes, cancel).await?;
        self.publisher.publish(credential.as_bytes())?;
        Ok(credential)
    }

    /// Run until `cancel` fires.
    pub async fn run(&mut self, cancel: &CancellationToken) -> RefreshStats {
        let mut stats = RefreshStats::default();

        loop {
            if cancel.is_cancelled() {
                return stats;
            }

            let credential = match self.source.acquire(&self.settings.scopes, cancel).await {
                Ok(credential) => credential,
                Err(_) if cancel.is_cancelled() => return stats,
                Err(e) => {
                    stats.acquisition_failures += 1;
                    let delay = self.backoff.current();
                    error!(
                        error = %e,
                        retry_in = ?delay,
                        "Failed to generate token"
                    );

                    if sleep_or_cancel(cancel, delay).await {
                        return stats;
                    }
                    self.backoff.advance();
                    continue;
                }
            };

            self.backoff.reset();

            if let Err(e) = self.publisher.publish(credential.as_bytes()) {
                stats.publish_failures += 1;
                match self.settings.publish_failure {
                    PublishFailurePolicy::Immediate => {
                        error!(
                            error = %e,
                            path = ?self.publisher.path(),
                            "Failed to write token, retrying immediately"
                        );
                    }
                    PublishFailurePolicy::Backoff => {
                        let delay = self.publish_backoff.current();
                        error!(
                            error = %e,
                            path = ?self.publisher.path(),
                            retry_in = ?delay,
                            "Failed to write token"
                        );
                        if sleep_or_cancel(cancel, delay).await {
                            return stats;
                        }
                        self.publish_backoff.advance();
                    }
                }
                continue;
            }

            self.publish_backoff.reset();
            stats.refreshes += 1;
            info!(
                path = ?self.publisher.path(),
                expires_at = ?credential.expires_at(),
                next_refresh_secs = self.settings.refresh_interval.as_secs(),
                "Token refreshed successfully"
            );

            if sleep_or_cancel(cancel, self.settings.refresh_interval).await {
                return stats;
            }
        }
    }
}

/// Sleep for `dur` unless cancelled first. Returns `true` when cancelled.
pub async fn sleep_or_cancel(cancel: &CancellationToken, dur: Duration) -> bool {
    tokio::select! {
        () = cancel.cancelled() => {
            debug!("Wait interrupted by shutdown");
            true
        }
        () = sleep(dur) => false,
    }
}
