//! Adaptive request pacing
//!
//! One `RateLimiter` instance is shared by every worker in the pool. The
//! steady-state delay is `1 / base_rate`; consecutive errors grow it
//! exponentially (capped at `max_backoff_secs`), and a multiplicative
//! jitter factor desynchronizes retries across workers. State mutation
//! happens under a single lock; the sleep itself happens outside it.

use std::time::Duration;

use common::RateLimitConfig;
use rand::Rng;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
struct LimiterState {
    consecutive_errors: u32,
    last_success_millis: Option<u64>,
}

/// Paces outbound requests, adapting to recent error history.
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Mutex::new(LimiterState::default()),
        }
    }

    /// Suspend the calling worker for the adaptively computed delay.
    ///
    /// The lock is held only to read the error counter; the sleep runs
    /// after it is released.
    pub async fn acquire_slot(&self) {
        let delay = {
            let state = self.state.lock().await;
            self.jittered_delay(state.consecutive_errors)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// Reset the consecutive-error counter and stamp the last success.
    pub async fn record_success(&self) {
        let mut state = self.state.lock().await;
        state.consecutive_errors = 0;
        state.last_success_millis = Some(now_millis());
    }

    /// Count one more consecutive error.
    pub async fn record_failure(&self) {
        let mut state = self.state.lock().await;
        state.consecutive_errors += 1;
        debug!(
            consecutive_errors = state.consecutive_errors,
            "rate limiter recorded failure"
        );
    }

    /// Current consecutive-error count.
    pub async fn consecutive_errors(&self) -> u32 {
        self.state.lock().await.consecutive_errors
    }

    /// Pre-jitter delay for a given consecutive-error count.
    ///
    /// Monotone non-decreasing in `n` and capped at `max_backoff_secs`.
    pub fn backoff_delay(&self, consecutive_errors: u32) -> Duration {
        let base = 1.0 / self.config.base_rate_per_sec;
        if consecutive_errors == 0 {
            return Duration::from_secs_f64(base);
        }
        let backoff = base * self.config.backoff_factor.powi(consecutive_errors as i32);
        Duration::from_secs_f64(backoff.min(self.config.max_backoff_secs))
    }

    /// Backoff delay with one multiplicative jitter factor applied.
    ///
    /// Jitter applies only when errors have occurred: the no-error base
    /// delay stays deterministic so steady-state pacing is stable.
    fn jittered_delay(&self, consecutive_errors: u32) -> Duration {
        let delay = self.backoff_delay(consecutive_errors);
        if consecutive_errors == 0 {
            return delay;
        }
        let (lo, hi) = (self.config.jitter_min, self.config.jitter_max);
        let factor = if hi > lo {
            rand::rng().random_range(lo..hi)
        } else {
            lo
        };
        Duration::from_secs_f64(delay.as_secs_f64() * factor)
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
