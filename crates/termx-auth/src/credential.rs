//! Credential and token data model
//!
//! `Credential` is immutable once constructed and owned by the
//! `TokenManager`. `TokenInfo` is created on each successful exchange and
//! superseded (never mutated) on refresh, so concurrent readers can share
//! one instance until it is replaced.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use common::SecretString;
use sha2::{Digest, Sha256};
use std::time::Duration;

/// OAuth2 client credentials plus the token endpoint they authenticate against.
#[derive(Debug, Clone)]
pub struct Credential {
    pub client_id: String,
    pub client_secret: SecretString,
    pub token_url: String,
}

impl Credential {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: SecretString,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
            token_url: token_url.into(),
        }
    }

    /// Deterministic cache key for this credential.
    ///
    /// `BASE64URL(SHA256(client_id \n token_url))` — the secret is
    /// deliberately excluded so rotating it does not orphan cached tokens.
    /// Keys the token cache, which keeps the single-credential case simple
    /// while leaving room for multiple credentials later.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.client_id.as_bytes());
        hasher.update(b"\n");
        hasher.update(self.token_url.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }
}

/// A minted access token with its validity window.
///
/// Timestamps are absolute unix milliseconds, computed at mint time from
/// the token endpoint's `expires_in` seconds delta.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub access_token: String,
    pub token_type: String,
    pub issued_at_millis: u64,
    pub expires_at_millis: u64,
}

impl TokenInfo {
    /// Whether the token is expired, or will expire within `buffer` of now.
    pub fn expires_within(&self, buffer: Duration) -> bool {
        let now = now_millis();
        self.expires_at_millis <= now + buffer.as_millis() as u64
    }
}

/// Current unix time in milliseconds.
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
