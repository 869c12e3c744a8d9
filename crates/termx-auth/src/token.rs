//! Client-credentials token exchange
//!
//! One interaction with the token endpoint: POST a form-encoded
//! `grant_type=client_credentials` request and parse the JSON response.
//! Retry policy belongs to the caller — a failed exchange surfaces
//! immediately as `AuthenticationFailed`.

use serde::Deserialize;

use crate::credential::Credential;
use crate::error::{Error, Result};

/// Response from the token endpoint.
///
/// `expires_in` is a delta in seconds from the response time. The caller
/// converts this to an absolute unix millisecond timestamp when caching
/// the token.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Seconds until the access token expires (delta, not absolute)
    pub expires_in: u64,
}

fn default_token_type() -> String {
    "Bearer".into()
}

/// Perform one client-credentials exchange against the token endpoint.
pub async fn request_token(
    client: &reqwest::Client,
    credential: &Credential,
) -> Result<TokenResponse> {
    let response = client
        .post(&credential.token_url)
        .form(&[
            ("grant_type", "client_credentials"),
            ("client_id", credential.client_id.as_str()),
            ("client_secret", credential.client_secret.expose()),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::AuthenticationFailed(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::MalformedResponse(e.to_string()))
}
