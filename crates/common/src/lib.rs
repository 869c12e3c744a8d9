//! Shared foundation for the terminology expansion workspace
//!
//! Holds the pieces every other crate needs: the configuration surface
//! (`CoreConfig` and its sections), the common error type, and the
//! `SecretString` wrapper that keeps the OAuth client secret out of logs.

pub mod config;
pub mod error;
pub mod secret;

pub use config::{
    AuthConfig, CacheConfig, CoreConfig, EndpointConfig, HttpConfig, ProgressConfig,
    RateLimitConfig,
};
pub use error::{Error, Result};
pub use secret::SecretString;
