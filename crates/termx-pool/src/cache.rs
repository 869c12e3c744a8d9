//! Multi-tier result cache
//!
//! An ordered set of lookup tiers probed from cheapest to most expensive:
//! the first hit short-circuits lower tiers and is promoted (written back)
//! into every faster tier. Expired entries are treated as misses and
//! removed on access — no background sweep. Tiers are best-effort: an I/O
//! fault in a tier degrades to a miss, never a batch failure.
//!
//! Uses `Pin<Box<dyn Future>>` trait methods for dyn-compatibility
//! (`Box<dyn CacheTier>` in the hierarchy's ordered tier list).

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use termx_client::ExpansionResult;
use tracing::{debug, warn};

/// A cached result with its validity window.
///
/// Valid iff `now − inserted_at < ttl`; anything else is treated as absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub result: ExpansionResult,
    /// Insertion time, unix milliseconds
    pub inserted_at_millis: u64,
    pub ttl_millis: u64,
}

impl CacheEntry {
    pub fn new(result: ExpansionResult, ttl: Duration) -> Self {
        Self {
            result,
            inserted_at_millis: now_millis(),
            ttl_millis: ttl.as_millis() as u64,
        }
    }

    pub fn is_expired(&self, now_millis: u64) -> bool {
        now_millis.saturating_sub(self.inserted_at_millis) >= self.ttl_millis
    }
}

/// One level in the cache hierarchy.
///
/// Implementations own their TTL and their lazy-eviction behavior; the
/// hierarchy only needs lookup/store/invalidate and the tier ordering.
pub trait CacheTier: Send + Sync {
    /// Tier label for logging (e.g. "memory", "file")
    fn name(&self) -> &'static str;

    fn lookup<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<ExpansionResult>> + Send + 'a>>;

    fn store<'a>(
        &'a self,
        key: &'a str,
        result: ExpansionResult,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

    fn invalidate<'a>(&'a self, key: &'a str) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

/// Fast in-process tier: a locked map with lazy eviction.
pub struct MemoryTier {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryTier {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lookup_sync(&self, key: &str) -> Option<ExpansionResult> {
        let mut entries = self.entries.lock().expect("memory tier lock poisoned");
        match entries.get(key) {
            Some(entry) if entry.is_expired(now_millis()) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.result.clone()),
            None => None,
        }
    }
}

impl CacheTier for MemoryTier {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn lookup<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<ExpansionResult>> + Send + 'a>> {
        Box::pin(async move { self.lookup_sync(key) })
    }

    fn store<'a>(
        &'a self,
        key: &'a str,
        result: ExpansionResult,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let entry = CacheEntry::new(result, self.ttl);
            self.entries
                .lock()
                .expect("memory tier lock poisoned")
                .insert(key.to_owned(), entry);
        })
    }

    fn invalidate<'a>(&'a self, key: &'a str) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            self.entries
                .lock()
                .expect("memory tier lock poisoned")
                .remove(key);
        })
    }
}

/// Persistent local tier: one JSON file per key.
///
/// Writes go through a temp file + rename so a crash mid-write never leaves
/// a corrupt entry. Unreadable or expired files are removed on access.
pub struct FileTier {
    dir: PathBuf,
    ttl: Duration,
}

impl FileTier {
    pub fn new(dir: PathBuf, ttl: Duration) -> Self {
        Self { dir, ttl }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        // Cache keys are base64url, hence filename-safe
        self.dir.join(format!("{key}.json"))
    }
}

impl CacheTier for FileTier {
    fn name(&self) -> &'static str {
        "file"
    }

    fn lookup<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<ExpansionResult>> + Send + 'a>> {
        Box::pin(async move {
            let path = self.entry_path(key);
            let contents = match tokio::fs::read_to_string(&path).await {
                Ok(c) => c,
                Err(_) => return None,
            };
            match serde_json::from_str::<CacheEntry>(&contents) {
                Ok(entry) if !entry.is_expired(now_millis()) => Some(entry.result),
                Ok(_) => {
                    debug!(key, "file tier entry expired, removing");
                    let _ = tokio::fs::remove_file(&path).await;
                    None
                }
                Err(e) => {
                    warn!(key, error = %e, "unreadable file tier entry, removing");
                    let _ = tokio::fs::remove_file(&path).await;
                    None
                }
            }
        })
    }

    fn store<'a>(
        &'a self,
        key: &'a str,
        result: ExpansionResult,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let entry = CacheEntry::new(result, self.ttl);
            let json = match serde_json::to_string(&entry) {
                Ok(j) => j,
                Err(e) => {
                    warn!(key, error = %e, "failed to serialize cache entry");
                    return;
                }
            };
            if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
                warn!(dir = %self.dir.display(), error = %e, "failed to create cache dir");
                return;
            }
            let tmp_path = self
                .dir
                .join(format!(".{key}.tmp.{}", std::process::id()));
            if let Err(e) = tokio::fs::write(&tmp_path, json.as_bytes()).await {
                warn!(key, error = %e, "failed to write cache entry");
                return;
            }
            if let Err(e) = tokio::fs::rename(&tmp_path, self.entry_path(key)).await {
                warn!(key, error = %e, "failed to persist cache entry");
            }
        })
    }

    fn invalidate<'a>(&'a self, key: &'a str) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let _ = tokio::fs::remove_file(self.entry_path(key)).await;
        })
    }
}

/// Ordered tiers, fastest first.
pub struct CacheHierarchy {
    tiers: Vec<Box<dyn CacheTier>>,
}

impl CacheHierarchy {
    pub fn new(tiers: Vec<Box<dyn CacheTier>>) -> Self {
        Self { tiers }
    }

    /// Probe tiers in order; the first hit short-circuits the rest and is
    /// written back into every faster tier.
    pub async fn lookup(&self, key: &str) -> Option<ExpansionResult> {
        for (position, tier) in self.tiers.iter().enumerate() {
            if let Some(result) = tier.lookup(key).await {
                debug!(key, tier = tier.name(), "cache hit");
                for faster in &self.tiers[..position] {
                    faster.store(key, result.clone()).await;
                }
                return Some(result);
            }
        }
        None
    }

    /// Write a result into every tier, each stamping its own TTL.
    pub async fn store(&self, key: &str, result: &ExpansionResult) {
        for tier in &self.tiers {
            tier.store(key, result.clone()).await;
        }
    }

    /// Remove a key from every tier.
    pub async fn invalidate(&self, key: &str) {
        for tier in &self.tiers {
            tier.invalidate(key).await;
        }
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
