use std::future::Future;
use std::time::{Duration, Instant};

use tokio::task::JoinError;
use tracing::{error, warn};

use trustguard_core::{CancellationToken, VerifyError, VerifyResult};

/// Fraction of a budget after which a completed unit of work is logged as slow.
const SLOW_FRACTION: f64 = 0.8;

// ---------------------------------------------------------------------------
// Deadline: total request budget
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    total: Duration,
}

impl Deadline {
    pub fn new(total: Duration) -> Self {
        Self {
            start: Instant::now(),
            total,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.total.saturating_sub(self.start.elapsed())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Budget for a stage: its own limit, capped by what is left overall.
    pub fn stage_budget(&self, stage_limit: Duration) -> Duration {
        stage_limit.min(self.remaining())
    }
}

pub(crate) fn join_failure(stage: &str, err: JoinError) -> VerifyError {
    let message = if err.is_panic() {
        "panicked".to_string()
    } else {
        "task cancelled".to_string()
    };
    VerifyError::StageFailure {
        stage: stage.to_string(),
        message,
    }
}

fn warn_if_slow(what: &str, elapsed: Duration, budget: Duration) {
    if elapsed.as_secs_f64() > budget.as_secs_f64() * SLOW_FRACTION {
        warn!(
            what,
            elapsed_ms = elapsed.as_millis() as u64,
            budget_ms = budget.as_millis() as u64,
            "close to time budget"
        );
    }
}

// ---------------------------------------------------------------------------
// Stage-level enforcement
// ---------------------------------------------------------------------------

/// Runs `work` as its own task with a hard wall-clock budget.
///
/// On expiry the task is aborted and `cancel` is signalled so any blocking
/// work it started can stop at its next checkpoint; the call returns
/// `StageTimeout` immediately without waiting for that to happen. A panic
/// inside the task comes back as `StageFailure`.
pub async fn run_with_budget<T, F>(
    stage: &str,
    budget: Duration,
    cancel: CancellationToken,
    work: F,
) -> VerifyResult<T>
where
    T: Send + 'static,
    F: Future<Output = VerifyResult<T>> + Send + 'static,
{
    let started = Instant::now();
    let mut handle = tokio::spawn(work);
    match tokio::time::timeout(budget, &mut handle).await {
        Ok(Ok(result)) => {
            warn_if_slow(stage, started.elapsed(), budget);
            result
        }
        Ok(Err(join_err)) => {
            error!(stage, panic = join_err.is_panic(), "stage task failed");
            Err(join_failure(stage, join_err))
        }
        Err(_) => {
            cancel.cancel();
            handle.abort();
            let budget_ms = budget.as_millis() as u64;
            error!(stage, budget_ms, "stage timed out");
            Err(VerifyError::StageTimeout {
                stage: stage.to_string(),
                budget_ms,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Provider-level enforcement
// ---------------------------------------------------------------------------

/// Runs blocking provider code on the blocking pool with a sub-budget.
///
/// Every failure mode (error, panic, timeout) is reported as
/// `VerifyError::Provider` so the caller can record an unavailable reading.
/// A timed-out closure keeps its thread until it next checks `cancel`.
pub async fn run_provider_with_budget<T, F>(
    provider: &str,
    budget: Duration,
    cancel: CancellationToken,
    work: F,
) -> VerifyResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> VerifyResult<T> + Send + 'static,
{
    let started = Instant::now();
    let mut handle = tokio::task::spawn_blocking(work);
    match tokio::time::timeout(budget, &mut handle).await {
        Ok(Ok(Ok(value))) => {
            warn_if_slow(provider, started.elapsed(), budget);
            Ok(value)
        }
        Ok(Ok(Err(e))) => Err(match e {
            VerifyError::Provider { .. } => e,
            other => VerifyError::provider(provider, other.to_string()),
        }),
        Ok(Err(join_err)) => {
            let message = if join_err.is_panic() {
                "panicked"
            } else {
                "task cancelled"
            };
            Err(VerifyError::provider(provider, message))
        }
        Err(_) => {
            cancel.cancel();
            Err(VerifyError::provider(
                provider,
                format!("timed out after {}ms", budget.as_millis()),
            ))
        }
    }
}
