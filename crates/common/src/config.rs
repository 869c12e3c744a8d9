//! Configuration types and loading
//!
//! The core never reads environment variables or files on its own — the
//! embedding layer builds a `CoreConfig` (directly or via `CoreConfig::load`)
//! and passes the relevant sections into each component at construction.
//! The client secret is resolved from the `TERMX_CLIENT_SECRET` env var or
//! a `client_secret_file` path, never stored in the TOML directly.

use crate::secret::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration for the expansion core.
#[derive(Debug, Deserialize)]
pub struct CoreConfig {
    pub endpoints: EndpointConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
}

/// Remote terminology server endpoints.
#[derive(Debug, Deserialize)]
pub struct EndpointConfig {
    /// FHIR base URL, e.g. `https://tx.example.org/fhir`
    pub base_url: String,
    /// OAuth2 token endpoint URL
    pub token_url: String,
}

/// OAuth2 client-credentials settings.
#[derive(Debug, Deserialize)]
pub struct AuthConfig {
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Option<SecretString>,
    /// Path to a file containing the secret (alternative to TERMX_CLIENT_SECRET env var)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    /// Refresh a token when it expires within this many seconds
    #[serde(default = "default_refresh_buffer")]
    pub refresh_buffer_secs: u64,
}

/// Per-request HTTP settings.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Result-page size sent as the `count` query parameter
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Upper bound on follow-up pagination requests per expansion
    #[serde(default = "default_max_page_count")]
    pub max_page_count: u32,
}

/// Adaptive rate limiting and retry settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Steady-state requests per second per worker (each worker paces
    /// itself at `1 / base_rate_per_sec` between dispatches)
    #[serde(default = "default_base_rate")]
    pub base_rate_per_sec: f64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: f64,
    /// Multiplicative jitter range applied to backoff delays
    #[serde(default = "default_jitter_min")]
    pub jitter_min: f64,
    #[serde(default = "default_jitter_max")]
    pub jitter_max: f64,
    /// Total attempts per item (initial try + retries) for transient errors
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

/// Cache tier TTLs and the file tier location.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_memory_ttl")]
    pub memory_ttl_secs: u64,
    #[serde(default = "default_file_ttl")]
    pub file_ttl_secs: u64,
    /// Directory for the persistent file tier; no file tier when absent
    #[serde(default)]
    pub file_dir: Option<PathBuf>,
}

/// Progress tracking and time estimation settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressConfig {
    /// Bounded sliding window of per-item durations
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// How many of the most recent samples feed the estimate
    #[serde(default = "default_recent_samples")]
    pub recent_samples: usize,
    /// Below this sample count the baseline estimate is used
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    #[serde(default = "default_baseline_secs")]
    pub baseline_secs: f64,
    /// Cap on the per-item estimate, suppressing transient stall distortion
    #[serde(default = "default_ceiling_secs")]
    pub ceiling_secs: f64,
}

fn default_refresh_buffer() -> u64 {
    300
}

fn default_timeout() -> u64 {
    30
}

fn default_page_size() -> u32 {
    1000
}

fn default_max_page_count() -> u32 {
    50
}

fn default_base_rate() -> f64 {
    10.0
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_max_backoff() -> f64 {
    30.0
}

fn default_jitter_min() -> f64 {
    0.8
}

fn default_jitter_max() -> f64 {
    1.2
}

fn default_max_attempts() -> u32 {
    3
}

fn default_memory_ttl() -> u64 {
    3600
}

fn default_file_ttl() -> u64 {
    86400
}

fn default_window_size() -> usize {
    50
}

fn default_recent_samples() -> usize {
    10
}

fn default_min_samples() -> usize {
    3
}

fn default_baseline_secs() -> f64 {
    0.1
}

fn default_ceiling_secs() -> f64 {
    5.0
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            page_size: default_page_size(),
            max_page_count: default_max_page_count(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            base_rate_per_sec: default_base_rate(),
            backoff_factor: default_backoff_factor(),
            max_backoff_secs: default_max_backoff(),
            jitter_min: default_jitter_min(),
            jitter_max: default_jitter_max(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_ttl_secs: default_memory_ttl(),
            file_ttl_secs: default_file_ttl(),
            file_dir: None,
        }
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            recent_samples: default_recent_samples(),
            min_samples: default_min_samples(),
            baseline_secs: default_baseline_secs(),
            ceiling_secs: default_ceiling_secs(),
        }
    }
}

impl CoreConfig {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Client secret resolution order:
    /// 1. TERMX_CLIENT_SECRET env var
    /// 2. client_secret_file path from config
    pub fn load(path: &Path) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: CoreConfig = toml::from_str(&contents)?;
        config.validate()?;

        // Resolve client secret: env var takes precedence over file
        if let Ok(secret) = std::env::var("TERMX_CLIENT_SECRET") {
            config.auth.client_secret = Some(SecretString::new(secret));
        } else if let Some(ref secret_file) = config.auth.client_secret_file {
            let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                crate::Error::Config(format!(
                    "failed to read client_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            let secret = secret.trim().to_owned();
            if !secret.is_empty() {
                config.auth.client_secret = Some(SecretString::new(secret));
            }
        }

        Ok(config)
    }

    /// Validate field constraints that serde cannot express.
    pub fn validate(&self) -> crate::Result<()> {
        for (name, url) in [
            ("base_url", &self.endpoints.base_url),
            ("token_url", &self.endpoints.token_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(crate::Error::Config(format!(
                    "{name} must start with http:// or https://, got: {url}"
                )));
            }
        }

        if self.http.timeout_secs == 0 {
            return Err(crate::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.http.page_size == 0 {
            return Err(crate::Error::Config(
                "page_size must be greater than 0".into(),
            ));
        }

        if self.rate_limit.base_rate_per_sec <= 0.0 {
            return Err(crate::Error::Config(
                "base_rate_per_sec must be greater than 0".into(),
            ));
        }

        if self.rate_limit.backoff_factor < 1.0 {
            return Err(crate::Error::Config(
                "backoff_factor must be at least 1.0".into(),
            ));
        }

        if self.rate_limit.jitter_min > self.rate_limit.jitter_max
            || self.rate_limit.jitter_min <= 0.0
        {
            return Err(crate::Error::Config(format!(
                "jitter range must satisfy 0 < jitter_min <= jitter_max, got {}..{}",
                self.rate_limit.jitter_min, self.rate_limit.jitter_max
            )));
        }

        if self.rate_limit.max_attempts == 0 {
            return Err(crate::Error::Config(
                "max_attempts must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize tests that mutate environment variables, preventing
    /// data races when tests run in parallel.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn valid_toml() -> &'static str {
        r#"
[endpoints]
base_url = "https://tx.example.org/fhir"
token_url = "https://auth.example.org/oauth/token"

[auth]
client_id = "expansion-core"
"#
    }

    #[test]
    fn load_valid_config_applies_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, valid_toml()).unwrap();

        unsafe { remove_env("TERMX_CLIENT_SECRET") };

        let config = CoreConfig::load(&path).unwrap();
        assert_eq!(config.endpoints.base_url, "https://tx.example.org/fhir");
        assert_eq!(config.auth.client_id, "expansion-core");
        assert_eq!(config.auth.refresh_buffer_secs, 300);
        assert_eq!(config.http.timeout_secs, 30);
        assert_eq!(config.http.page_size, 1000);
        assert_eq!(config.rate_limit.max_attempts, 3);
        assert_eq!(config.cache.memory_ttl_secs, 3600);
        assert_eq!(config.progress.window_size, 50);
        assert!(config.auth.client_secret.is_none());
    }

    #[test]
    fn load_missing_file_errors() {
        let result = CoreConfig::load(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn load_invalid_toml_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "not valid {{{{ toml").unwrap();

        let result = CoreConfig::load(&path);
        assert!(result.is_err());
    }

    #[test]
    fn secret_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, valid_toml()).unwrap();

        unsafe { set_env("TERMX_CLIENT_SECRET", "s3cr3t-env") };
        let config = CoreConfig::load(&path).unwrap();
        assert_eq!(
            config.auth.client_secret.as_ref().unwrap().expose(),
            "s3cr3t-env"
        );
        unsafe { remove_env("TERMX_CLIENT_SECRET") };
    }

    #[test]
    fn secret_from_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let secret_path = dir.path().join("client_secret");
        std::fs::write(&secret_path, "s3cr3t-file\n").unwrap();

        let toml_content = format!(
            r#"
[endpoints]
base_url = "https://tx.example.org/fhir"
token_url = "https://auth.example.org/oauth/token"

[auth]
client_id = "expansion-core"
client_secret_file = "{}"
"#,
            secret_path.display()
        );
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, &toml_content).unwrap();

        unsafe { remove_env("TERMX_CLIENT_SECRET") };
        let config = CoreConfig::load(&config_path).unwrap();
        assert_eq!(
            config.auth.client_secret.as_ref().unwrap().expose(),
            "s3cr3t-file"
        );
    }

    #[test]
    fn secret_env_overrides_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let secret_path = dir.path().join("client_secret");
        std::fs::write(&secret_path, "file-value").unwrap();

        let toml_content = format!(
            r#"
[endpoints]
base_url = "https://tx.example.org/fhir"
token_url = "https://auth.example.org/oauth/token"

[auth]
client_id = "expansion-core"
client_secret_file = "{}"
"#,
            secret_path.display()
        );
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, &toml_content).unwrap();

        unsafe { set_env("TERMX_CLIENT_SECRET", "env-wins") };
        let config = CoreConfig::load(&config_path).unwrap();
        assert_eq!(
            config.auth.client_secret.as_ref().unwrap().expose(),
            "env-wins"
        );
        unsafe { remove_env("TERMX_CLIENT_SECRET") };
    }

    #[test]
    fn empty_secret_file_yields_none() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let secret_path = dir.path().join("client_secret");
        std::fs::write(&secret_path, "  \n  ").unwrap(); // whitespace only

        let toml_content = format!(
            r#"
[endpoints]
base_url = "https://tx.example.org/fhir"
token_url = "https://auth.example.org/oauth/token"

[auth]
client_id = "expansion-core"
client_secret_file = "{}"
"#,
            secret_path.display()
        );
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, &toml_content).unwrap();

        unsafe { remove_env("TERMX_CLIENT_SECRET") };
        let config = CoreConfig::load(&config_path).unwrap();
        assert!(
            config.auth.client_secret.is_none(),
            "whitespace-only secret file should result in no secret"
        );
    }

    #[test]
    fn base_url_without_scheme_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let toml_content = r#"
[endpoints]
base_url = "tx.example.org/fhir"
token_url = "https://auth.example.org/oauth/token"

[auth]
client_id = "expansion-core"
"#;
        let path = dir.path().join("config.toml");
        std::fs::write(&path, toml_content).unwrap();
        unsafe { remove_env("TERMX_CLIENT_SECRET") };

        let result = CoreConfig::load(&path);
        assert!(result.is_err(), "base_url without scheme must be rejected");
        let err = format!("{}", result.unwrap_err());
        assert!(
            err.contains("base_url must start with http"),
            "error message should explain the issue, got: {err}"
        );
    }

    #[test]
    fn zero_timeout_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let toml_content = r#"
[endpoints]
base_url = "https://tx.example.org/fhir"
token_url = "https://auth.example.org/oauth/token"

[auth]
client_id = "expansion-core"

[http]
timeout_secs = 0
"#;
        let path = dir.path().join("config.toml");
        std::fs::write(&path, toml_content).unwrap();
        unsafe { remove_env("TERMX_CLIENT_SECRET") };

        let result = CoreConfig::load(&path);
        assert!(result.is_err(), "timeout_secs = 0 must be rejected");
    }

    #[test]
    fn inverted_jitter_range_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let toml_content = r#"
[endpoints]
base_url = "https://tx.example.org/fhir"
token_url = "https://auth.example.org/oauth/token"

[auth]
client_id = "expansion-core"

[rate_limit]
jitter_min = 1.5
jitter_max = 0.5
"#;
        let path = dir.path().join("config.toml");
        std::fs::write(&path, toml_content).unwrap();
        unsafe { remove_env("TERMX_CLIENT_SECRET") };

        let result = CoreConfig::load(&path);
        assert!(result.is_err(), "jitter_min > jitter_max must be rejected");
    }

    #[test]
    fn zero_base_rate_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let toml_content = r#"
[endpoints]
base_url = "https://tx.example.org/fhir"
token_url = "https://auth.example.org/oauth/token"

[auth]
client_id = "expansion-core"

[rate_limit]
base_rate_per_sec = 0.0
"#;
        let path = dir.path().join("config.toml");
        std::fs::write(&path, toml_content).unwrap();
        unsafe { remove_env("TERMX_CLIENT_SECRET") };

        let result = CoreConfig::load(&path);
        assert!(result.is_err(), "base_rate_per_sec = 0 must be rejected");
    }

    #[test]
    fn zero_max_attempts_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let toml_content = r#"
[endpoints]
base_url = "https://tx.example.org/fhir"
token_url = "https://auth.example.org/oauth/token"

[auth]
client_id = "expansion-core"

[rate_limit]
max_attempts = 0
"#;
        let path = dir.path().join("config.toml");
        std::fs::write(&path, toml_content).unwrap();
        unsafe { remove_env("TERMX_CLIENT_SECRET") };

        let result = CoreConfig::load(&path);
        assert!(result.is_err(), "max_attempts = 0 must be rejected");
    }

    #[test]
    fn cache_section_overrides() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let toml_content = r#"
[endpoints]
base_url = "https://tx.example.org/fhir"
token_url = "https://auth.example.org/oauth/token"

[auth]
client_id = "expansion-core"

[cache]
memory_ttl_secs = 60
file_ttl_secs = 120
file_dir = "/var/cache/termx"
"#;
        let path = dir.path().join("config.toml");
        std::fs::write(&path, toml_content).unwrap();
        unsafe { remove_env("TERMX_CLIENT_SECRET") };

        let config = CoreConfig::load(&path).unwrap();
        assert_eq!(config.cache.memory_ttl_secs, 60);
        assert_eq!(config.cache.file_ttl_secs, 120);
        assert_eq!(
            config.cache.file_dir,
            Some(PathBuf::from("/var/cache/termx"))
        );
    }
}
