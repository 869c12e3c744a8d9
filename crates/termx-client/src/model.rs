//! Expansion data model
//!
//! Value types that cross the crate boundary: request options, descendant
//! entries, per-item results, and the deterministic cache key derived from
//! (code, options). Everything here is serde-serializable so results can
//! live in the persistent cache tier.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::classify::ClassifiedError;

/// Flags controlling one expansion request. Value type, never shared state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpansionOptions {
    /// Include inactive descendants in the result set
    pub include_inactive: bool,
    /// Result-page size sent as the `count` query parameter
    pub page_size: u32,
    /// Starting pagination offset
    pub offset: u32,
}

impl Default for ExpansionOptions {
    fn default() -> Self {
        Self {
            include_inactive: false,
            page_size: 1000,
            offset: 0,
        }
    }
}

/// Deterministic cache key for (code, options).
///
/// `BASE64URL(SHA256(code \n include_inactive \n page_size \n offset))` —
/// URL-safe and filename-safe, so the same key addresses every cache tier.
pub fn cache_key(code: &str, options: &ExpansionOptions) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    hasher.update(b"\n");
    hasher.update(u32::from(options.include_inactive).to_le_bytes());
    hasher.update(options.page_size.to_le_bytes());
    hasher.update(options.offset.to_le_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// One descendant concept: code plus its preferred display term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescendantEntry {
    pub code: String,
    pub display: String,
}

/// Outcome of one expansion task. Written exactly once, on completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionResult {
    /// The source code that was expanded
    pub code: String,
    /// Ordered descendant set; empty on failure
    pub descendants: Vec<DescendantEntry>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<ClassifiedError>,
    /// Completion time, unix milliseconds
    pub completed_at_millis: u64,
}

impl ExpansionResult {
    pub fn ok(code: impl Into<String>, descendants: Vec<DescendantEntry>) -> Self {
        Self {
            code: code.into(),
            descendants,
            success: true,
            error: None,
            completed_at_millis: now_millis(),
        }
    }

    pub fn failed(code: impl Into<String>, error: ClassifiedError) -> Self {
        Self {
            code: code.into(),
            descendants: Vec::new(),
            success: false,
            error: Some(error),
            completed_at_millis: now_millis(),
        }
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
