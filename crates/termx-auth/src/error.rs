//! Error types for token acquisition

/// Errors from token endpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("malformed token response: {0}")]
    MalformedResponse(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
