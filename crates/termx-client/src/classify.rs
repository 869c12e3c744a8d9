//! Error taxonomy and classification
//!
//! Maps transport and HTTP outcomes to a closed set of semantic error kinds
//! with recovery guidance. The closed enum drives retry policy downstream:
//! transient kinds re-enter the rate limiter's backoff path, permanent ones
//! surface immediately, and `AuthenticationFailed` escalates to batch-level
//! fail-fast.

use serde::{Deserialize, Serialize};

/// Semantic error kinds (closed set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// 401/403 or a failed token exchange
    AuthenticationFailed,
    /// 404: the code does not exist on the server
    NotFound,
    /// 400/422: the server rejected the request shape
    InvalidRequest,
    /// 429: pacing violation
    RateLimited,
    /// 5xx
    ServerError,
    /// Connection refused, DNS failure, broken transport
    NetworkError,
    /// Request exceeded its deadline
    Timeout,
    /// 2xx body that does not parse as an expansion
    MalformedResponse,
}

impl ErrorKind {
    /// Whether the scheduler may retry this item with backoff.
    ///
    /// Permanent per-item errors (`NotFound`, `InvalidRequest`) and
    /// credential-level failures are surfaced immediately; only the
    /// transient set re-enters the retry path.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited
                | ErrorKind::ServerError
                | ErrorKind::NetworkError
                | ErrorKind::Timeout
        )
    }

    /// Stable label for logging and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::AuthenticationFailed => "authentication_failed",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::ServerError => "server_error",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::MalformedResponse => "malformed_response",
        }
    }

    /// Actionable recovery guidance, where any exists.
    fn guidance(&self) -> Option<&'static str> {
        match self {
            ErrorKind::AuthenticationFailed => {
                Some("verify the client credentials and token endpoint URL")
            }
            ErrorKind::NotFound => Some("check the concept code against the release in use"),
            ErrorKind::InvalidRequest => Some("check the expansion options for this request"),
            ErrorKind::RateLimited => Some("reduce the request rate or batch size"),
            ErrorKind::ServerError => Some("retry later; the server reported an internal fault"),
            ErrorKind::NetworkError => Some("check connectivity to the terminology server"),
            ErrorKind::Timeout => Some("retry later or raise the request timeout"),
            ErrorKind::MalformedResponse => None,
        }
    }
}

/// A classified failure: kind + message + optional raw detail and guidance.
///
/// Immutable once constructed and serializable, so cached failed results
/// survive round-trips through the persistent cache tier unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{}: {message}", kind.label())]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
    /// Raw response body excerpt, when one was available
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub guidance: Option<String>,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
            guidance: kind.guidance().map(str::to_owned),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Cap on how much of a response body is kept as error detail.
const DETAIL_LIMIT: usize = 512;

/// Classify a non-2xx HTTP response.
///
/// 401/403 → AuthenticationFailed, 404 → NotFound, 400/422 → InvalidRequest,
/// 429 → RateLimited, 5xx → ServerError. Unlisted 4xx fall back to
/// InvalidRequest, anything else to ServerError.
pub fn classify_status(status: u16, body: &str) -> ClassifiedError {
    let kind = match status {
        // 403 rejects the principal, not the item, so it carries the same
        // credential-level semantics as 401 (including batch fail-fast)
        401 | 403 => ErrorKind::AuthenticationFailed,
        404 => ErrorKind::NotFound,
        400 | 422 => ErrorKind::InvalidRequest,
        429 => ErrorKind::RateLimited,
        500..=599 => ErrorKind::ServerError,
        400..=499 => ErrorKind::InvalidRequest,
        _ => ErrorKind::ServerError,
    };
    let error = ClassifiedError::new(kind, format!("server returned HTTP {status}"));
    if body.is_empty() {
        error
    } else {
        error.with_detail(body.chars().take(DETAIL_LIMIT).collect::<String>())
    }
}

/// Classify a transport-level failure (no HTTP status available).
pub fn classify_transport(err: &reqwest::Error) -> ClassifiedError {
    let kind = if err.is_timeout() {
        ErrorKind::Timeout
    } else {
        ErrorKind::NetworkError
    };
    ClassifiedError::new(kind, err.to_string())
}
