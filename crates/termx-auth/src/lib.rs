//! OAuth2 client-credentials authentication for the terminology server
//!
//! Provides the credential/token data model, the token endpoint exchange,
//! and `TokenManager` — a thread-safe token cache with single-flight
//! refresh-on-expiry. This crate is a standalone library with no knowledge
//! of the expansion client or worker pool.
//!
//! Token flow:
//! 1. A worker calls `TokenManager::get_valid_token()`
//! 2. A cached, non-expiring token is returned without I/O
//! 3. Otherwise exactly one caller performs `token::request_token()`;
//!    concurrent callers wait and receive the same minted token
//! 4. After a 401 from the expansion endpoint, `TokenManager::invalidate()`
//!    forces the next call to re-authenticate

pub mod credential;
pub mod error;
pub mod manager;
pub mod token;

pub use credential::{Credential, TokenInfo};
pub use error::{Error, Result};
pub use manager::TokenManager;
pub use token::{TokenResponse, request_token};
