//! Batch scheduling for concept expansion
//!
//! The worker pool that turns a batch of codes into a `BatchSummary`:
//! adaptive rate limiting with backoff, the multi-tier cache hierarchy,
//! per-item progress tracking with remaining-time estimation, and the
//! scheduler that wires them together with partial-failure aggregation.
//!
//! Batch flow:
//! 1. `Scheduler::expand_batch()` probes the cache for every code — hits
//!    bypass the network entirely
//! 2. Misses go to a bounded pool of workers sized from the batch and the
//!    cache-hit ratio
//! 3. Each worker paces itself through `RateLimiter::acquire_slot()`,
//!    retries transient failures, and stores successes back into the cache
//! 4. Results land in input order; a minority of failures never aborts the
//!    rest of the batch

pub mod cache;
pub mod progress;
pub mod rate_limit;
pub mod scheduler;

pub use cache::{CacheEntry, CacheHierarchy, CacheTier, FileTier, MemoryTier};
pub use progress::{ProgressMetrics, ProgressTracker};
pub use rate_limit::RateLimiter;
pub use scheduler::{
    BatchHandle, BatchSummary, Scheduler, adjusted_worker_count, worker_count_for,
};
