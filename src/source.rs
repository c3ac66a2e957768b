//! Credential Sources
//!
//! The refresh loop only depends on [`CredentialSource`]. The production
//! implementation, [`GitHubAppTokenSource`], signs an app JWT and exchanges
//! it for an installation access token over the GitHub REST API.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::EncodingKey;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::auth::generate_jwt;
use crate::error::AcquisitionError;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const USER_AGENT: &str = "lornu-ai-github-token-sidecar";
const GITHUB_API_VERSION: &str = "2022-11-28";

/// A short-lived access token.
///
/// The secret is never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn secret(&self) -> &str {
        &self.token
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.token.as_bytes()
    }

    /// Expiry reported by the provider, if any
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Repository names a token is limited to.
///
/// Empty means every repository in the installation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeSet(Vec<String>);

impl ScopeSet {
    pub fn new(repositories: Vec<String>) -> Self {
        Self(repositories)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "<all repositories>")
        } else {
            write!(f, "{}", self.0.join(","))
        }
    }
}

/// Something that can hand out fresh credentials
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Obtain a new credential limited to `scopes`.
    ///
    /// Implementations must return promptly once `cancel` fires.
    async fn acquire(
        &self,
        scopes: &ScopeSet,
        cancel: &CancellationToken,
    ) -> Result<Credential, AcquisitionError>;
}

/// Request body for the installation access token endpoint
#[derive(Debug, Serialize)]
struct AccessTokenRequest<'a> {
    repositories: &'a [String],
}

/// Response from GitHub installation token endpoint
#[derive(Debug, Deserialize)]
struct InstallationToken {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

/// Issues installation tokens for a GitHub App
pub struct GitHubAppTokenSource {
    client: reqwest::Client,
    api_url: String,
    app_id: u64,
    installation_id: u64,
    key: EncodingKey,
}

impl GitHubAppTokenSource {
    pub fn new(
        client: reqwest::Client,
        api_url: impl Into<String>,
        app_id: u64,
        installation_id: u64,
        key: EncodingKey,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            app_id,
            installation_id,
            key,
        }
    }

    fn token_url(&self) -> String {
        format!(
            "{}/app/installations/{}/access_tokens",
            self.api_url, self.installation_id
        )
    }

    /// Exchange a fresh JWT for an installation access token
    async fn exchange(&self, scopes: &ScopeSet) -> Result<Credential, AcquisitionError> {
        let jwt = generate_jwt(self.app_id, &self.key)?;

        debug!(
            installation_id = self.installation_id,
            repositories = scopes.len(),
            "Requesting installation token"
        );

        let mut request = self
            .client
            .post(self.token_url())
            .header("Authorization", format!("Bearer {}", jwt))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION);

        if !scopes.is_empty() {
            request = request.json(&AccessTokenRequest {
                repositories: scopes.as_slice(),
            });
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AcquisitionError::Api { status, body });
        }

        let body = response.text().await?;
        let parsed: InstallationToken =
            serde_json::from_str(&body).map_err(|e| AcquisitionError::Decode(e.to_string()))?;

        if parsed.token.is_empty() {
            return Err(AcquisitionError::Decode("empty token".to_string()));
        }

        let mut credential = Credential::new(parsed.token);
        if let Some(expires_at) = parsed.expires_at {
            credential = credential.with_expiry(expires_at);
        }
        Ok(credential)
    }
}

#[async_trait]
impl CredentialSource for GitHubAppTokenSource {
    async fn acquire(
        &self,
        scopes: &ScopeSet,
        cancel: &CancellationToken,
    ) -> Result<Credential, AcquisitionError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(AcquisitionError::Cancelled),
            result = self.exchange(scopes) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::parse_private_key;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_json, body_string, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PRIVATE_KEY: &[u8] = include_bytes!("../testdata/app-key.pem");

    fn source_for(server: &MockServer) -> GitHubAppTokenSource {
        GitHubAppTokenSource::new(
            reqwest::Client::new(),
            format!("{}/", server.uri()),
            123456,
            78901234,
            parse_private_key(PRIVATE_KEY).unwrap(),
        )
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = Credential::new("ghs_supersecret");
        let debug = format!("{:?}", credential);
        assert!(!debug.contains("ghs_supersecret"));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn test_scope_set_display() {
        assert_eq!(ScopeSet::default().to_string(), "<all repositories>");
        let scopes = ScopeSet::new(vec!["repo1".into(), "repo2".into()]);
        assert_eq!(scopes.to_string(), "repo1,repo2");
    }

    #[tokio::test]
    async fn test_acquire_scoped_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/app/installations/78901234/access_tokens"))
            .and(header("accept", "application/vnd.github+json"))
            .and(header("x-github-api-version", "2022-11-28"))
            .and(header_exists("authorization"))
            .and(body_json(json!({ "repositories": ["repo1", "repo2"] })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "token": "ghs_scoped",
                "expires_at": "2026-10-19T14:00:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let scopes = ScopeSet::new(vec!["repo1".into(), "repo2".into()]);
        let credential = source_for(&server)
            .acquire(&scopes, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(credential.secret(), "ghs_scoped");
        assert_eq!(
            credential.expires_at().unwrap().to_rfc3339(),
            "2026-10-19T14:00:00+00:00"
        );
    }

    #[tokio::test]
    async fn test_acquire_unscoped_sends_no_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/app/installations/78901234/access_tokens"))
            .and(body_string(""))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "token": "ghs_all"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let credential = source_for(&server)
            .acquire(&ScopeSet::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(credential.secret(), "ghs_all");
        assert!(credential.expires_at().is_none());
    }

    #[tokio::test]
    async fn test_acquire_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Bad credentials"))
            .mount(&server)
            .await;

        let err = source_for(&server)
            .acquire(&ScopeSet::default(), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            AcquisitionError::Api { status, body } => {
                assert_eq!(status.as_u16(), 401);
                assert_eq!(body, "Bad credentials");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_acquire_malformed_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_string("{\"nope\": true}"))
            .mount(&server)
            .await;

        let err = source_for(&server)
            .acquire(&ScopeSet::default(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AcquisitionError::Decode(_)));
    }

    #[tokio::test]
    async fn test_acquire_honors_cancellation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!({ "token": "ghs_late" }))
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = source_for(&server)
            .acquire(&ScopeSet::default(), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, AcquisitionError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
