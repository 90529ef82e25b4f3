//! Bounded retry with exponential backoff.
//!
//! The calling thread sleeps between attempts; concurrent operations are
//! unaffected. An upstream retry-after always overrides the computed
//! backoff, and non-retryable errors are rethrown without waiting.

use std::thread;
use std::time::{Duration, Instant};

use super::error::ApiError;

/// Retry settings applied to one logical operation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Run `op` up to `max_attempts` times.
    ///
    /// Before each retry: non-retryable errors rethrow immediately; the
    /// delay is `min(initial * factor^(failed_attempts - 1), max)` unless
    /// the error carried an upstream retry-after. If sleeping would cross
    /// `deadline`, a Timeout error is returned instead and retries stop.
    pub fn execute<T, F>(&self, deadline: Option<Instant>, mut op: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Result<T, ApiError>,
    {
        let mut last_err: Option<ApiError> = None;

        for attempt in 1..=self.max_attempts.max(1) {
            if attempt > 1 {
                let failed = attempt - 1;
                let delay = last_err
                    .as_ref()
                    .and_then(|e| e.retry_after())
                    .unwrap_or_else(|| self.backoff_delay(failed));

                if let Some(deadline) = deadline {
                    if Instant::now() + delay >= deadline {
                        return Err(ApiError::Timeout(
                            "deadline reached before next retry".into(),
                        ));
                    }
                }

                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_err.as_ref().map(|e| e.to_string()).unwrap_or_default(),
                    "retrying after transient error"
                );
                thread::sleep(delay);
            }

            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.retryable() && attempt < self.max_attempts => last_err = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| ApiError::Internal("retry budget exhausted".into())))
    }

    /// Exponential delay after `failed` attempts, capped at `max_delay`.
    fn backoff_delay(&self, failed: u32) -> Duration {
        let exponent = failed.saturating_sub(1) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }
}
