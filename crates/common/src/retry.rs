//! Bounded retry helpers for network-facing adapters.
//!
//! Every helper calls the operation at most `trials` times (a `trials` of zero
//! still runs the operation once) and returns the first success. When every
//! attempt fails, the returned [`RetryError`] carries each attempt's error in
//! call order.

use std::{fmt, future::Future, time::Duration};

use {
    rand::Rng,
    tracing::{debug, warn},
};

/// Every attempt failed.
#[derive(Debug)]
pub struct RetryError<E> {
    errors: Vec<E>,
}

impl<E> RetryError<E> {
    /// Errors returned by each attempt, oldest first.
    pub fn errors(&self) -> &[E] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<E> {
        self.errors
    }

    /// The error returned by the final attempt.
    pub fn last(&self) -> Option<&E> {
        self.errors.last()
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} attempt(s) failed", self.errors.len())?;
        for (i, e) in self.errors.iter().enumerate() {
            write!(f, "; #{}: {e}", i + 1)?;
        }
        Ok(())
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryError<E> {}

/// Exponential backoff policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
    /// Growth factor applied after each failed attempt.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after `failed` attempts have already failed (1-based).
    fn backoff(&self, failed: u32) -> Duration {
        let exp = failed.saturating_sub(1).min(i32::MAX as u32) as i32;
        let millis = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exp);
        if !millis.is_finite() || millis >= self.max_backoff.as_millis() as f64 {
            return self.max_backoff;
        }
        Duration::from_millis(millis.max(0.0) as u64)
    }
}

/// Retry without waiting between attempts.
pub async fn retry<T, E, F, Fut>(trials: u32, op: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    run(trials, op, |_| Duration::ZERO).await
}

/// Retry with a fixed pause between attempts.
pub async fn retry_with_interval<T, E, F, Fut>(
    trials: u32,
    interval: Duration,
    op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    run(trials, op, |_| interval).await
}

/// Retry with a randomized pause in `[mean * (1 - factor), mean * (1 + factor)]`.
///
/// `factor` is clamped to `0.0..=1.0`.
pub async fn retry_with_backoff<T, E, F, Fut>(
    trials: u32,
    mean: Duration,
    factor: f64,
    op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    run(trials, op, |_| randomized_interval(mean, factor)).await
}

/// Retry following an exponential [`RetryPolicy`].
pub async fn retry_with_policy<T, E, F, Fut>(
    policy: &RetryPolicy,
    op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    run(policy.max_attempts, op, |failed| policy.backoff(failed)).await
}

fn randomized_interval(mean: Duration, factor: f64) -> Duration {
    let factor = if factor.is_finite() {
        factor.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let mean_ms = mean.as_millis() as f64;
    let delta = mean_ms * factor;
    if delta <= 0.0 {
        return mean;
    }
    let ms = rand::rng().random_range((mean_ms - delta)..=(mean_ms + delta));
    Duration::from_millis(ms.max(0.0) as u64)
}

async fn run<T, E, F, Fut, D>(trials: u32, mut op: F, delay: D) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
    D: Fn(u32) -> Duration,
{
    let trials = trials.max(1);
    let mut errors = Vec::new();

    for attempt in 1..=trials {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "operation succeeded after retry");
                }
                return Ok(value);
            },
            Err(e) => {
                warn!(attempt, trials, error = %e, "attempt failed");
                errors.push(e);
                if attempt < trials {
                    let pause = delay(attempt);
                    if !pause.is_zero() {
                        tokio::time::sleep(pause).await;
                    }
                }
            },
        }
    }

    Err(RetryError { errors })
}
