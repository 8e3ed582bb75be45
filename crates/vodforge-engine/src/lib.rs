//! In-process workflow engine.
//!
//! The coordinator never runs work inline; it hands units of work to a
//! dispatcher and suspends until a result arrives. [`LocalEngine`] is the
//! in-process implementation of that substrate: semaphore-bounded
//! concurrency, a per-task-type timeout, bounded exponential backoff, and
//! cooperative cancellation.
//!
//! Delivery is at-least-once by design. A task that times out may still have
//! completed its side effects, and a retry re-executes them; every operation
//! dispatched through the engine must therefore be idempotent. The pipeline
//! guarantees this by deriving storage keys purely from task identity.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use vodforge_common::Error as TaskError;

/// Result type alias for dispatch outcomes.
pub type DispatchResult<T> = std::result::Result<T, EngineError>;

/// Bounded exponential backoff between retry attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Multiplier applied per subsequent retry.
    pub backoff_coefficient: f64,
    /// Cap on the delay between retries.
    pub maximum_interval: Duration,
    /// Total attempts, including the first.
    pub maximum_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(2),
            backoff_coefficient: 2.0,
            maximum_interval: Duration::from_secs(30),
            maximum_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            maximum_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to sleep after a failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_coefficient.powi(attempt.saturating_sub(1) as i32);
        let delay = self.initial_interval.mul_f64(factor);
        delay.min(self.maximum_interval)
    }
}

/// Static description of one task type: its name, deadline, and retries.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub task_type: &'static str,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl TaskSpec {
    pub fn new(task_type: &'static str, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            task_type,
            timeout,
            retry,
        }
    }
}

/// Errors surfaced by the dispatcher itself.
///
/// `Exhausted` wraps the task's final error so callers can recover the
/// originating stage payload (e.g. which chunk/resolution failed).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The job was cancelled before the task completed.
    #[error("{task_type} cancelled")]
    Cancelled { task_type: &'static str },

    /// Every allowed attempt timed out.
    #[error("{task_type} timed out after {timeout_secs}s ({attempts} attempt(s))")]
    TimedOut {
        task_type: &'static str,
        timeout_secs: u64,
        attempts: u32,
    },

    /// The task failed on its final attempt, or failed fatally.
    #[error("{task_type} failed after {attempts} attempt(s): {source}")]
    Exhausted {
        task_type: &'static str,
        attempts: u32,
        #[source]
        source: TaskError,
    },
}

impl EngineError {
    /// Recover the underlying task error, if there is one.
    pub fn into_task_error(self) -> Option<TaskError> {
        match self {
            Self::Exhausted { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Whether this outcome was caused by cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// In-process task dispatcher.
///
/// Cloning is cheap; clones share the same concurrency limit and
/// cancellation token.
#[derive(Debug, Clone)]
pub struct LocalEngine {
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl LocalEngine {
    /// Create an engine running at most `concurrency` tasks at once.
    pub fn new(concurrency: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            cancel: CancellationToken::new(),
        }
    }

    /// Token observed by all dispatched tasks.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop dispatching new work. In-flight attempts are interrupted at the
    /// next await point; their partial side effects are safe because tasks
    /// are idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the engine has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run `op` under the task spec's timeout and retry policy.
    ///
    /// `op` receives the 1-based attempt number. Fatal errors (per
    /// [`TaskError::is_retryable`]) short-circuit; retryable errors and
    /// timeouts are retried with backoff until attempts run out.
    pub async fn dispatch<T, F, Fut>(&self, spec: &TaskSpec, op: F) -> DispatchResult<T>
    where
        F: Fn(u32) -> Fut,
        Fut: Future<Output = Result<T, TaskError>>,
    {
        let max_attempts = spec.retry.maximum_attempts.max(1);

        for attempt in 1..=max_attempts {
            if self.cancel.is_cancelled() {
                return Err(EngineError::Cancelled {
                    task_type: spec.task_type,
                });
            }

            // Permit is held only while the attempt runs, not across backoff.
            let permit = tokio::select! {
                permit = self.permits.acquire() => {
                    permit.expect("engine semaphore closed")
                }
                _ = self.cancel.cancelled() => {
                    return Err(EngineError::Cancelled { task_type: spec.task_type });
                }
            };

            let outcome = tokio::select! {
                outcome = tokio::time::timeout(spec.timeout, op(attempt)) => outcome,
                _ = self.cancel.cancelled() => {
                    drop(permit);
                    return Err(EngineError::Cancelled { task_type: spec.task_type });
                }
            };
            drop(permit);

            match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) if !e.is_retryable() => {
                    tracing::error!("{} failed fatally: {}", spec.task_type, e);
                    return Err(EngineError::Exhausted {
                        task_type: spec.task_type,
                        attempts: attempt,
                        source: e,
                    });
                }
                Ok(Err(e)) => {
                    if attempt == max_attempts {
                        tracing::error!(
                            "{} failed on final attempt {}: {}",
                            spec.task_type,
                            attempt,
                            e
                        );
                        return Err(EngineError::Exhausted {
                            task_type: spec.task_type,
                            attempts: attempt,
                            source: e,
                        });
                    }
                    let delay = spec.retry.delay_for(attempt);
                    tracing::warn!(
                        "{} attempt {}/{} failed: {}; retrying in {:?}",
                        spec.task_type,
                        attempt,
                        max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(_elapsed) => {
                    if attempt == max_attempts {
                        return Err(EngineError::TimedOut {
                            task_type: spec.task_type,
                            timeout_secs: spec.timeout.as_secs(),
                            attempts: attempt,
                        });
                    }
                    let delay = spec.retry.delay_for(attempt);
                    tracing::warn!(
                        "{} attempt {}/{} timed out; retrying in {:?}",
                        spec.task_type,
                        attempt,
                        max_attempts,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        unreachable!("retry loop always returns")
    }
}
