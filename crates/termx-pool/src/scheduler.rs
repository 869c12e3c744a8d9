//! Batch scheduling with a bounded worker pool
//!
//! `expand_batch()` turns a list of codes into a `BatchSummary` in three
//! phases: a cache-probe pass that satisfies hits without touching the
//! network, a worker pool sized from the batch and the hit ratio that
//! drains the miss queue, and an aggregation step that reassembles results
//! in input order. Individual failures are classified and kept in place —
//! only an authentication failure aborts the remainder of the batch.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use common::ProgressConfig;
use metrics::{counter, histogram};
use serde::Serialize;
use termx_client::{
    ClassifiedError, ErrorKind, ExpansionClient, ExpansionOptions, ExpansionResult, cache_key,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cache::CacheHierarchy;
use crate::progress::ProgressTracker;
use crate::rate_limit::RateLimiter;

/// Worker-pool size for a batch of `total` items.
///
/// Steps up with batch size so small batches stay light and large ones
/// saturate the rate budget: 8 up to 100 items, 12 up to 300, 16 up to
/// 500, 20 beyond.
pub fn worker_count_for(total: usize) -> usize {
    match total {
        0..=100 => 8,
        101..=300 => 12,
        301..=500 => 16,
        _ => 20,
    }
}

/// Scale the base worker count down by the fraction of items the cache
/// already satisfied. Never drops below one worker.
pub fn adjusted_worker_count(base: usize, total: usize, cache_hits: usize) -> usize {
    if total == 0 {
        return 1;
    }
    let misses = total.saturating_sub(cache_hits);
    ((base * misses).div_ceil(total)).max(1)
}

/// Cooperative cancellation token for one batch.
///
/// Cancelling never interrupts an in-flight request; workers check the
/// flag before dispatching each remaining item.
#[derive(Debug, Default)]
pub struct BatchHandle {
    cancelled: AtomicBool,
}

impl BatchHandle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Aggregated outcome of one batch, results in input order.
#[derive(Debug, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Some items succeeded and some failed
    pub partial_success: bool,
    pub results: Vec<ExpansionResult>,
}

struct ExpansionTask {
    index: usize,
    code: String,
    key: String,
}

struct WorkerContext {
    client: Arc<ExpansionClient>,
    cache: Arc<CacheHierarchy>,
    limiter: Arc<RateLimiter>,
    handle: Arc<BatchHandle>,
    progress: Arc<ProgressTracker>,
    queue: Mutex<VecDeque<ExpansionTask>>,
    auth_failed: AtomicBool,
    options: ExpansionOptions,
    max_attempts: u32,
}

/// Drives batches of expansions through the cache, rate limiter, and
/// worker pool.
pub struct Scheduler {
    client: Arc<ExpansionClient>,
    cache: Arc<CacheHierarchy>,
    limiter: Arc<RateLimiter>,
    max_attempts: u32,
    progress_config: ProgressConfig,
}

impl Scheduler {
    pub fn new(
        client: Arc<ExpansionClient>,
        cache: Arc<CacheHierarchy>,
        limiter: Arc<RateLimiter>,
        max_attempts: u32,
        progress_config: ProgressConfig,
    ) -> Self {
        Self {
            client,
            cache,
            limiter,
            max_attempts,
            progress_config,
        }
    }

    /// Expand a batch with a fresh cancellation handle and tracker.
    pub async fn expand_batch(
        &self,
        codes: &[String],
        options: ExpansionOptions,
    ) -> BatchSummary {
        let handle = BatchHandle::new();
        let progress = Arc::new(ProgressTracker::new(codes.len(), self.progress_config.clone()));
        self.expand_batch_with(codes, options, handle, progress).await
    }

    /// Expand a batch under an external cancellation handle and progress
    /// tracker (for callers that surface live progress or cancel buttons).
    pub async fn expand_batch_with(
        &self,
        codes: &[String],
        options: ExpansionOptions,
        handle: Arc<BatchHandle>,
        progress: Arc<ProgressTracker>,
    ) -> BatchSummary {
        let total = codes.len();
        if total == 0 {
            return BatchSummary {
                total: 0,
                succeeded: 0,
                failed: 0,
                partial_success: false,
                results: Vec::new(),
            };
        }

        // Cache-probe pass: hits complete immediately, misses queue up
        let mut slots: Vec<Option<ExpansionResult>> = vec![None; total];
        let mut queue = VecDeque::new();
        for (index, code) in codes.iter().enumerate() {
            let key = cache_key(code, &options);
            if let Some(result) = self.cache.lookup(&key).await {
                counter!("termx_cache_hits_total").increment(1);
                progress.record_completion(0.0, result.success);
                slots[index] = Some(result);
            } else {
                counter!("termx_cache_misses_total").increment(1);
                queue.push_back(ExpansionTask {
                    index,
                    code: code.clone(),
                    key,
                });
            }
        }

        let misses = queue.len();
        let cache_hits = total - misses;
        if misses > 0 {
            let workers = adjusted_worker_count(worker_count_for(total), total, cache_hits)
                .min(misses);
            info!(total, cache_hits, misses, workers, "dispatching expansion batch");

            let ctx = Arc::new(WorkerContext {
                client: Arc::clone(&self.client),
                cache: Arc::clone(&self.cache),
                limiter: Arc::clone(&self.limiter),
                handle,
                progress,
                queue: Mutex::new(queue),
                auth_failed: AtomicBool::new(false),
                options,
                max_attempts: self.max_attempts,
            });

            let (tx, mut rx) = mpsc::unbounded_channel();
            for _ in 0..workers {
                let ctx = Arc::clone(&ctx);
                let tx = tx.clone();
                tokio::spawn(run_worker(ctx, tx));
            }
            drop(tx);

            while let Some((index, result)) = rx.recv().await {
                slots[index] = Some(result);
            }
        }

        let results: Vec<ExpansionResult> = codes
            .iter()
            .zip(slots)
            .map(|(code, slot)| {
                slot.unwrap_or_else(|| {
                    ExpansionResult::failed(
                        code,
                        ClassifiedError::new(
                            ErrorKind::NetworkError,
                            "worker terminated before completion",
                        ),
                    )
                })
            })
            .collect();

        let succeeded = results.iter().filter(|r| r.success).count();
        let failed = total - succeeded;
        if failed > 0 {
            warn!(total, succeeded, failed, "batch completed with failures");
        } else {
            info!(total, succeeded, "batch completed");
        }
        BatchSummary {
            total,
            succeeded,
            failed,
            partial_success: failed > 0 && succeeded > 0,
            results,
        }
    }
}

async fn run_worker(
    ctx: Arc<WorkerContext>,
    tx: mpsc::UnboundedSender<(usize, ExpansionResult)>,
) {
    loop {
        let task = {
            let mut queue = ctx.queue.lock().expect("task queue lock poisoned");
            queue.pop_front()
        };
        let Some(task) = task else { break };

        let started = Instant::now();
        let result = process_task(&ctx, &task).await;
        let elapsed = started.elapsed().as_secs_f64();
        ctx.progress.record_completion(elapsed, result.success);
        histogram!("termx_expansion_duration_seconds").record(elapsed);
        let outcome = result
            .error
            .as_ref()
            .map(|e| e.kind.label())
            .unwrap_or("success");
        counter!("termx_expansions_total", "outcome" => outcome).increment(1);

        if tx.send((task.index, result)).is_err() {
            break;
        }
    }
}

/// Run one task to a terminal result, retrying transient failures under
/// the rate limiter's backoff.
async fn process_task(ctx: &WorkerContext, task: &ExpansionTask) -> ExpansionResult {
    if ctx.handle.is_cancelled() {
        return ExpansionResult::failed(
            &task.code,
            ClassifiedError::new(ErrorKind::NetworkError, "batch cancelled before dispatch"),
        );
    }
    if ctx.auth_failed.load(Ordering::SeqCst) {
        return ExpansionResult::failed(
            &task.code,
            ClassifiedError::new(
                ErrorKind::AuthenticationFailed,
                "batch aborted after authentication failure",
            ),
        );
    }

    let mut attempt = 1u32;
    loop {
        ctx.limiter.acquire_slot().await;
        let result = ctx.client.expand(&task.code, &ctx.options).await;

        if result.success {
            ctx.limiter.record_success().await;
            ctx.cache.store(&task.key, &result).await;
            return result;
        }

        ctx.limiter.record_failure().await;
        let kind = result.error.as_ref().map(|e| e.kind);

        // Credential-level failures poison every remaining task
        if kind == Some(ErrorKind::AuthenticationFailed) {
            warn!(code = %task.code, "authentication failure, aborting remaining tasks");
            ctx.auth_failed.store(true, Ordering::SeqCst);
            return result;
        }

        let retryable = kind.is_some_and(|k| k.is_retryable());
        if retryable && attempt < ctx.max_attempts && !ctx.handle.is_cancelled() {
            debug!(
                code = %task.code,
                attempt,
                max_attempts = ctx.max_attempts,
                kind = kind.map(|k| k.label()).unwrap_or("unknown"),
                "retrying transient failure"
            );
            attempt += 1;
            continue;
        }
        return result;
    }
}
