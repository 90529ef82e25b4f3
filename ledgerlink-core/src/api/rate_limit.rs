//! Per-endpoint sliding-window admission control.
//!
//! Protects contractual upstream limits before a request is ever attempted,
//! independent of the circuit breaker (which reacts to failures, not
//! volume). One window per endpoint key; entries older than the window are
//! pruned lazily on each check.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::error::ApiError;

/// Sliding-window rate limiter shared across all callers of a gateway.
#[derive(Debug)]
pub struct RateLimiter {
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            max_requests,
            window,
        }
    }

    /// Admit or reject a call for `endpoint`. Rejection is local — no
    /// network request has been attempted.
    pub fn check(&self, endpoint: &str) -> Result<(), ApiError> {
        self.check_at(endpoint, Instant::now())
    }

    fn check_at(&self, endpoint: &str, now: Instant) -> Result<(), ApiError> {
        let mut windows = self.windows.lock().unwrap();
        let window = windows.entry(endpoint.to_string()).or_default();

        while let Some(&oldest) = window.front() {
            if now.duration_since(oldest) >= self.window {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= self.max_requests {
            // The slot frees up when the oldest admitted call leaves the window.
            let retry_after = window
                .front()
                .map(|&oldest| self.window.saturating_sub(now.duration_since(oldest)));
            return Err(ApiError::RateLimit {
                endpoint: endpoint.to_string(),
                detail: format!(
                    "local limit of {} requests per {}ms reached",
                    self.max_requests,
                    self.window.as_millis()
                ),
                retry_after,
            });
        }

        window.push_back(now);
        Ok(())
    }
}
