//! Thread-safe token cache with single-flight refresh
//!
//! The cache is a map keyed by credential fingerprint so the behavior of the
//! single-credential case extends unchanged to multiple credentials later.
//! Two locks with distinct jobs:
//!
//! - `tokens` (std RwLock): guards the cached `TokenInfo` map. Held only for
//!   reads and inserts, never across I/O.
//! - `refresh_gate` (tokio Mutex): serializes the check-then-refresh
//!   sequence. The one caller holding it performs the network exchange;
//!   everyone else queues on the gate, re-checks the cache, and leaves with
//!   the freshly minted token instead of issuing their own exchange.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::credential::{Credential, TokenInfo, now_millis};
use crate::error::Result;
use crate::token::request_token;

/// Acquires and caches bearer tokens via the client-credentials grant.
pub struct TokenManager {
    credential: Credential,
    refresh_buffer: Duration,
    http_client: reqwest::Client,
    tokens: RwLock<HashMap<String, Arc<TokenInfo>>>,
    refresh_gate: Mutex<()>,
}

impl TokenManager {
    /// Create a manager for one credential.
    ///
    /// `refresh_buffer` is how far before expiry a token is treated as
    /// stale: a token expiring within the buffer triggers a refresh before
    /// any request uses it.
    pub fn new(credential: Credential, refresh_buffer: Duration, http_client: reqwest::Client) -> Self {
        Self {
            credential,
            refresh_buffer,
            http_client,
            tokens: RwLock::new(HashMap::new()),
            refresh_gate: Mutex::new(()),
        }
    }

    /// Return a bearer token that is valid for at least the refresh buffer.
    ///
    /// Callable concurrently from any worker. When the cached token is
    /// absent or expiring, exactly one authentication exchange occurs; all
    /// concurrent callers observe the same resulting token.
    pub async fn get_valid_token(&self) -> Result<String> {
        let key = self.credential.fingerprint();

        if let Some(info) = self.cached(&key)
            && !info.expires_within(self.refresh_buffer)
        {
            return Ok(info.access_token.clone());
        }

        let _gate = self.refresh_gate.lock().await;

        // Another caller may have refreshed while we waited on the gate
        if let Some(info) = self.cached(&key)
            && !info.expires_within(self.refresh_buffer)
        {
            debug!(client_id = %self.credential.client_id, "token refreshed by concurrent caller");
            return Ok(info.access_token.clone());
        }

        debug!(client_id = %self.credential.client_id, "token absent or expiring, authenticating");
        let response = request_token(&self.http_client, &self.credential)
            .await
            .inspect_err(
                |e| warn!(client_id = %self.credential.client_id, error = %e, "token exchange failed"),
            )?;

        let now = now_millis();
        let info = Arc::new(TokenInfo {
            access_token: response.access_token,
            token_type: response.token_type,
            issued_at_millis: now,
            expires_at_millis: now + response.expires_in * 1000,
        });
        info!(
            client_id = %self.credential.client_id,
            expires_in_secs = response.expires_in,
            "token minted"
        );

        let access_token = info.access_token.clone();
        self.tokens
            .write()
            .expect("token cache lock poisoned")
            .insert(key, info);
        Ok(access_token)
    }

    /// Forcibly expire the cached token so the next call re-authenticates.
    ///
    /// Called after the expansion endpoint rejects a request with 401.
    pub fn invalidate(&self) {
        let key = self.credential.fingerprint();
        let removed = self
            .tokens
            .write()
            .expect("token cache lock poisoned")
            .remove(&key);
        if removed.is_some() {
            info!(client_id = %self.credential.client_id, "cached token invalidated");
        }
    }

    /// Snapshot of the cached token, if any. Exposed for expiry assertions.
    pub fn cached_token(&self) -> Option<Arc<TokenInfo>> {
        let key = self.credential.fingerprint();
        self.cached(&key)
    }

    fn cached(&self, key: &str) -> Option<Arc<TokenInfo>> {
        self.tokens
            .read()
            .expect("token cache lock poisoned")
            .get(key)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::SecretString;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn manager_for(server: &MockServer, refresh_buffer: Duration) -> TokenManager {
        let credential = Credential::new(
            "expansion-core",
            SecretString::new("s3cr3t"),
            format!("{}/oauth/token", server.uri()),
        );
        TokenManager::new(credential, refresh_buffer, reqwest::Client::new())
    }

    fn token_body(access_token: &str, expires_in: u64) -> serde_json::Value {
        serde_json::json!({
            "access_token": access_token,
            "token_type": "Bearer",
            "expires_in": expires_in
        })
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("at_shared", 3600)))
            .expect(1)
            .mount(&server)
            .await;

        let manager = Arc::new(manager_for(&server, Duration::from_secs(300)));

        let mut handles = vec![];
        for _ in 0..10 {
            let manager = manager.clone();
            handles.push(tokio::spawn(
                async move { manager.get_valid_token().await },
            ));
        }

        for h in handles {
            let token = h.await.unwrap().unwrap();
            assert_eq!(token, "at_shared", "all callers must see the same token");
        }
        // MockServer verifies expect(1) on drop: exactly one exchange occurred
    }

    #[tokio::test]
    async fn valid_token_is_reused_without_io() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("at_1", 3600)))
            .expect(1)
            .mount(&server)
            .await;

        let manager = manager_for(&server, Duration::from_secs(300));
        let first = manager.get_valid_token().await.unwrap();
        let second = manager.get_valid_token().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn token_expiring_within_buffer_is_refreshed() {
        let server = MockServer::start().await;
        // First token expires in 4 minutes; the 5-minute buffer makes it stale
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("at_short", 240)))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("at_long", 3600)))
            .mount(&server)
            .await;

        let manager = manager_for(&server, Duration::from_secs(300));
        let first = manager.get_valid_token().await.unwrap();
        assert_eq!(first, "at_short");
        let first_expiry = manager.cached_token().unwrap().expires_at_millis;

        let second = manager.get_valid_token().await.unwrap();
        assert_eq!(second, "at_long", "stale token must be refreshed");
        let second_expiry = manager.cached_token().unwrap().expires_at_millis;
        assert!(
            second_expiry > first_expiry,
            "refreshed token must expire strictly later ({second_expiry} <= {first_expiry})"
        );
    }

    #[tokio::test]
    async fn invalidate_forces_reauthentication() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("at_a", 3600)))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("at_b", 3600)))
            .expect(1)
            .mount(&server)
            .await;

        let manager = manager_for(&server, Duration::from_secs(300));
        assert_eq!(manager.get_valid_token().await.unwrap(), "at_a");

        manager.invalidate();
        assert!(manager.cached_token().is_none());

        assert_eq!(manager.get_valid_token().await.unwrap(), "at_b");
    }

    #[tokio::test]
    async fn exchange_failure_surfaces_authentication_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
            .mount(&server)
            .await;

        let manager = manager_for(&server, Duration::from_secs(300));
        let err = manager.get_valid_token().await.unwrap_err();
        assert!(matches!(err, crate::Error::AuthenticationFailed(_)));
        assert!(
            manager.cached_token().is_none(),
            "a failed exchange must not populate the cache"
        );
    }
}
