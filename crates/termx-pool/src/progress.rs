//! Per-item progress and adaptive remaining-time estimation
//!
//! One tracker per batch. Every finished task — cache hit, success, or
//! classified failure — calls `record_completion` from whichever worker
//! finished it. The estimate adapts to a bounded window of recent per-item
//! durations, with a baseline before enough samples exist and a ceiling
//! that suppresses distortion from transient network stalls.

use std::collections::VecDeque;
use std::sync::Mutex;

use common::ProgressConfig;
use serde::Serialize;

/// Read-only snapshot of batch progress.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressMetrics {
    pub total: usize,
    pub completed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Adaptive per-item duration estimate, seconds
    pub per_item_estimate_secs: f64,
    pub items_per_sec: f64,
    pub est_remaining_secs: f64,
}

#[derive(Debug)]
struct TrackerState {
    completed: usize,
    succeeded: usize,
    failed: usize,
    window: VecDeque<f64>,
}

/// Records per-item completion and timing for one batch.
pub struct ProgressTracker {
    total: usize,
    config: ProgressConfig,
    state: Mutex<TrackerState>,
}

impl ProgressTracker {
    pub fn new(total: usize, config: ProgressConfig) -> Self {
        let window = VecDeque::with_capacity(config.window_size);
        Self {
            total,
            config,
            state: Mutex::new(TrackerState {
                completed: 0,
                succeeded: 0,
                failed: 0,
                window,
            }),
        }
    }

    /// Record one finished task. `completed == succeeded + failed` holds
    /// after every call.
    pub fn record_completion(&self, duration_secs: f64, succeeded: bool) {
        let mut state = self.state.lock().expect("progress lock poisoned");
        state.completed += 1;
        if succeeded {
            state.succeeded += 1;
        } else {
            state.failed += 1;
        }
        if state.window.len() == self.config.window_size {
            state.window.pop_front();
        }
        state.window.push_back(duration_secs.max(0.0));
    }

    /// Current metrics, including the adaptive remaining-time estimate.
    pub fn snapshot(&self) -> ProgressMetrics {
        let state = self.state.lock().expect("progress lock poisoned");
        let per_item = self.per_item_estimate(&state.window);
        let remaining = self.total.saturating_sub(state.completed);
        ProgressMetrics {
            total: self.total,
            completed: state.completed,
            succeeded: state.succeeded,
            failed: state.failed,
            per_item_estimate_secs: per_item,
            items_per_sec: if per_item > 0.0 { 1.0 / per_item } else { 0.0 },
            est_remaining_secs: per_item * remaining as f64,
        }
    }

    /// Baseline until `min_samples` exist, then the mean of the most
    /// recent samples, capped at the ceiling.
    fn per_item_estimate(&self, window: &VecDeque<f64>) -> f64 {
        if window.len() < self.config.min_samples {
            return self.config.baseline_secs;
        }
        let take = self.config.recent_samples.min(window.len());
        let recent = window.iter().rev().take(take);
        let mean = recent.sum::<f64>() / take as f64;
        mean.min(self.config.ceiling_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(total: usize) -> ProgressTracker {
        ProgressTracker::new(total, ProgressConfig::default())
    }

    #[test]
    fn baseline_estimate_before_enough_samples() {
        let tracker = tracker(10);
        tracker.record_completion(2.0, true);
        tracker.record_completion(2.0, true);

        let metrics = tracker.snapshot();
        assert_eq!(metrics.per_item_estimate_secs, 0.1, "baseline with < 3 samples");
        assert_eq!(metrics.est_remaining_secs, 0.1 * 8.0);
    }

    #[test]
    fn estimate_averages_recent_samples() {
        let tracker = tracker(10);
        for _ in 0..3 {
            tracker.record_completion(0.5, true);
        }
        let metrics = tracker.snapshot();
        assert!(
            (metrics.per_item_estimate_secs - 0.5).abs() < 1e-9,
            "got {}",
            metrics.per_item_estimate_secs
        );
        assert!((metrics.items_per_sec - 2.0).abs() < 1e-9);
    }

    #[test]
    fn estimate_uses_only_most_recent_ten() {
        let tracker = tracker(40);
        // Ten slow samples drowned out by ten fast ones
        for _ in 0..10 {
            tracker.record_completion(4.0, true);
        }
        for _ in 0..10 {
            tracker.record_completion(0.2, true);
        }
        let metrics = tracker.snapshot();
        assert!(
            (metrics.per_item_estimate_secs - 0.2).abs() < 1e-9,
            "only the 10 most recent samples should count, got {}",
            metrics.per_item_estimate_secs
        );
    }

    #[test]
    fn estimate_capped_at_ceiling() {
        let tracker = tracker(10);
        for _ in 0..5 {
            tracker.record_completion(60.0, true);
        }
        let metrics = tracker.snapshot();
        assert_eq!(
            metrics.per_item_estimate_secs, 5.0,
            "transient stalls must not blow up the estimate"
        );
    }

    #[test]
    fn completed_always_equals_succeeded_plus_failed() {
        let tracker = tracker(6);
        tracker.record_completion(0.1, true);
        tracker.record_completion(0.1, false);
        tracker.record_completion(0.1, true);

        let metrics = tracker.snapshot();
        assert_eq!(metrics.completed, 3);
        assert_eq!(metrics.succeeded, 2);
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.completed, metrics.succeeded + metrics.failed);
    }

    #[test]
    fn window_is_bounded() {
        let config = ProgressConfig {
            window_size: 5,
            ..ProgressConfig::default()
        };
        let tracker = ProgressTracker::new(100, config);
        for _ in 0..50 {
            tracker.record_completion(0.1, true);
        }
        let state = tracker.state.lock().unwrap();
        assert_eq!(state.window.len(), 5);
    }

    #[test]
    fn remaining_time_scales_with_outstanding_items() {
        let tracker = tracker(100);
        for _ in 0..10 {
            tracker.record_completion(1.0, true);
        }
        let metrics = tracker.snapshot();
        assert!((metrics.est_remaining_secs - 90.0).abs() < 1e-9);
    }

    #[test]
    fn negative_durations_are_clamped() {
        let tracker = tracker(5);
        for _ in 0..3 {
            tracker.record_completion(-1.0, true);
        }
        let metrics = tracker.snapshot();
        assert_eq!(metrics.per_item_estimate_secs, 0.0);
        assert_eq!(metrics.est_remaining_secs, 0.0);
    }
}
