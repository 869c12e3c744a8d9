//! Paginated `$expand` requests against the terminology server
//!
//! One `expand()` call retrieves the full descendant set of a code: the ECL
//! "descendants of" constraint goes out as the `url` query parameter, and
//! follow-up requests advance `offset` until the server-reported total is
//! reached or the configured page ceiling cuts the loop.
//!
//! A 401 invalidates the cached token and retries the current page once
//! with fresh credentials; a second 401 is terminal. All other failures are
//! classified and returned inside the `ExpansionResult` — nothing here
//! aborts sibling tasks.

use std::sync::Arc;
use std::time::Duration;

use common::HttpConfig;
use serde::Deserialize;
use termx_auth::TokenManager;
use tracing::{debug, warn};

use crate::classify::{ClassifiedError, ErrorKind, classify_status, classify_transport};
use crate::model::{DescendantEntry, ExpansionOptions, ExpansionResult};

/// Wire shape of a FHIR ValueSet expansion response (the fields we read).
#[derive(Debug, Deserialize)]
struct ExpandResponse {
    expansion: Expansion,
}

#[derive(Debug, Deserialize)]
struct Expansion {
    #[serde(default)]
    total: u32,
    #[serde(default)]
    contains: Vec<ContainsEntry>,
}

#[derive(Debug, Deserialize)]
struct ContainsEntry {
    code: String,
    #[serde(default)]
    display: String,
}

/// Issues authenticated expansion requests for single codes.
pub struct ExpansionClient {
    http_client: reqwest::Client,
    tokens: Arc<TokenManager>,
    base_url: String,
    timeout: Duration,
    max_page_count: u32,
}

impl ExpansionClient {
    pub fn new(
        http_client: reqwest::Client,
        tokens: Arc<TokenManager>,
        base_url: impl Into<String>,
        config: &HttpConfig,
    ) -> Self {
        Self {
            http_client,
            tokens,
            base_url: base_url.into(),
            timeout: Duration::from_secs(config.timeout_secs),
            max_page_count: config.max_page_count,
        }
    }

    /// Expand one code into its full descendant set.
    ///
    /// Always returns a terminal `ExpansionResult`; failures carry a
    /// `ClassifiedError` instead of propagating.
    pub async fn expand(&self, code: &str, options: &ExpansionOptions) -> ExpansionResult {
        let ecl = format!("http://snomed.info/sct?fhir_vs=ecl/<{code}");
        let active_only = if options.include_inactive {
            "false"
        } else {
            "true"
        };
        let endpoint = format!("{}/ValueSet/$expand", self.base_url.trim_end_matches('/'));

        let mut descendants: Vec<DescendantEntry> = Vec::new();
        let mut offset = options.offset;
        let mut pages = 0u32;
        let mut reauthenticated = false;

        loop {
            let token = match self.tokens.get_valid_token().await {
                Ok(t) => t,
                Err(e) => {
                    return ExpansionResult::failed(
                        code,
                        ClassifiedError::new(ErrorKind::AuthenticationFailed, e.to_string()),
                    );
                }
            };

            let count = options.page_size.to_string();
            let offset_param = offset.to_string();
            let response = self
                .http_client
                .get(&endpoint)
                .bearer_auth(&token)
                .query(&[
                    ("url", ecl.as_str()),
                    ("_format", "json"),
                    ("count", count.as_str()),
                    ("offset", offset_param.as_str()),
                    ("activeOnly", active_only),
                ])
                .timeout(self.timeout)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => return ExpansionResult::failed(code, classify_transport(&e)),
            };

            let status = response.status().as_u16();

            // One re-authenticated retry of the current page; a second 401
            // is a credential-level failure, not a stale token.
            if status == 401 && !reauthenticated {
                warn!(code, "expansion rejected with 401, invalidating token");
                self.tokens.invalidate();
                reauthenticated = true;
                continue;
            }

            if !(200..300).contains(&status) {
                let body = response.text().await.unwrap_or_default();
                return ExpansionResult::failed(code, classify_status(status, &body));
            }

            let page: ExpandResponse = match response.json().await {
                Ok(p) => p,
                Err(e) => {
                    return ExpansionResult::failed(
                        code,
                        ClassifiedError::new(ErrorKind::MalformedResponse, e.to_string()),
                    );
                }
            };

            let received = page.expansion.contains.len() as u32;
            let total = page.expansion.total;
            descendants.extend(
                page.expansion
                    .contains
                    .into_iter()
                    .map(|entry| DescendantEntry {
                        code: entry.code,
                        display: entry.display,
                    }),
            );
            pages += 1;
            offset += received;
            debug!(code, page = pages, received, total, "expansion page retrieved");

            // Some servers omit `total`; there a full page means more may
            // exist and only a short or empty page ends the loop.
            let retrieved_all = if total > 0 {
                received == 0 || offset >= total
            } else {
                received < options.page_size
            };
            if retrieved_all {
                break;
            }
            if pages >= self.max_page_count {
                warn!(
                    code,
                    pages,
                    total,
                    retrieved = descendants.len(),
                    "expansion truncated at page ceiling"
                );
                break;
            }
        }

        ExpansionResult::ok(code, descendants)
    }
}
