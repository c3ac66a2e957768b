//! GitHub App Authentication
//!
//! Builds the short-lived RS256 JWT used to authenticate as a GitHub App
//! before exchanging it for an installation token.

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::AcquisitionError;

/// Backdating applied to `iat` to tolerate clock skew with GitHub
pub const JWT_CLOCK_SKEW_SECS: u64 = 60;

/// JWT lifetime; GitHub rejects anything longer than 10 minutes
pub const JWT_TTL_SECS: u64 = 600;

/// JWT claims for GitHub App authentication
#[derive(Debug, Serialize, Deserialize)]
pub struct GitHubAppClaims {
    /// Issued at time (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issuer (GitHub App ID)
    pub iss: String,
}

impl GitHubAppClaims {
    pub fn new(app_id: u64, now: u64) -> Self {
        Self {
            iat: now.saturating_sub(JWT_CLOCK_SKEW_SECS),
            exp: now + JWT_TTL_SECS,
            iss: app_id.to_string(),
        }
    }
}

/// Parse an RSA private key in PEM format (PKCS#1 or PKCS#8)
pub fn parse_private_key(private_key_pem: &[u8]) -> Result<EncodingKey, jsonwebtoken::errors::Error> {
    EncodingKey::from_rsa_pem(private_key_pem)
}

/// Generate a JWT for GitHub App authentication
///
/// # Arguments
/// * `app_id` - The GitHub App ID
/// * `key` - The app's RSA signing key
///
/// # Returns
/// A JWT string valid for 10 minutes
pub fn generate_jwt(app_id: u64, key: &EncodingKey) -> Result<String, AcquisitionError> {
    // A clock before the epoch is not worth failing over; the API will
    // reject the token and the loop backs off.
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    let claims = GitHubAppClaims::new(app_id, now);
    let header = Header::new(Algorithm::RS256);

    Ok(encode(&header, &claims, key)?)
}
