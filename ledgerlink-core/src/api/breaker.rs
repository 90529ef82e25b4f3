//! Circuit breaker with a single half-open probe.
//!
//! Closed passes calls through and counts consecutive failures. Reaching
//! the threshold opens the breaker: calls are rejected locally until the
//! open duration elapses, after which exactly one probe is admitted in
//! half-open. The probe's outcome decides: success closes the breaker,
//! failure re-opens it and restarts the timeout.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed { failures: u32 },
    Open { tripped_at: Instant },
    HalfOpen { tripped_at: Instant },
}

/// Per-endpoint circuit breaker shared by all callers of a gateway.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    threshold: u32,
    open_duration: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, open_duration: Duration) -> Self {
        Self {
            state: Mutex::new(BreakerState::Closed { failures: 0 }),
            threshold,
            open_duration,
        }
    }

    /// Admit or reject a call.
    ///
    /// In Open past the timeout this transitions to HalfOpen and admits the
    /// single probe; a second caller arriving while the probe is in flight
    /// is rejected.
    pub fn try_acquire(&self, endpoint: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        match *state {
            BreakerState::Closed { .. } => Ok(()),
            BreakerState::Open { tripped_at } => {
                if tripped_at.elapsed() >= self.open_duration {
                    *state = BreakerState::HalfOpen { tripped_at };
                    tracing::debug!(endpoint, "circuit breaker half-open, admitting probe");
                    Ok(())
                } else {
                    let remaining = self.open_duration - tripped_at.elapsed();
                    Err(ApiError::ServiceUnavailable(format!(
                        "circuit breaker open for '{endpoint}' ({}ms until probe)",
                        remaining.as_millis()
                    )))
                }
            }
            BreakerState::HalfOpen { .. } => Err(ApiError::ServiceUnavailable(format!(
                "circuit breaker for '{endpoint}' is probing recovery"
            ))),
        }
    }

    /// Return an admitted-but-unused probe, keeping the original trip
    /// instant. Used when a later pre-flight guard rejects the call locally:
    /// a probe that never reached upstream must not restart the clock.
    pub fn abort_probe(&self) {
        let mut state = self.state.lock().unwrap();
        if let BreakerState::HalfOpen { tripped_at } = *state {
            *state = BreakerState::Open { tripped_at };
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock().unwrap();
        *state = BreakerState::Closed { failures: 0 };
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock().unwrap();
        match *state {
            BreakerState::Closed { failures } => {
                let failures = failures + 1;
                if failures >= self.threshold {
                    tracing::warn!(failures, "circuit breaker tripped");
                    *state = BreakerState::Open {
                        tripped_at: Instant::now(),
                    };
                } else {
                    *state = BreakerState::Closed { failures };
                }
            }
            BreakerState::HalfOpen { .. } => {
                tracing::warn!("circuit breaker probe failed, re-opening");
                *state = BreakerState::Open {
                    tripped_at: Instant::now(),
                };
            }
            BreakerState::Open { .. } => {}
        }
    }

    /// Whether a call would currently be admitted, without side effects.
    pub fn would_allow(&self) -> bool {
        let state = self.state.lock().unwrap();
        match *state {
            BreakerState::Closed { .. } => true,
            BreakerState::Open { tripped_at } => tripped_at.elapsed() >= self.open_duration,
            BreakerState::HalfOpen { .. } => false,
        }
    }
}

/// Process-wide registry: one breaker per endpoint key, created on first use.
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
    threshold: u32,
    open_duration: Duration,
}

impl BreakerRegistry {
    pub fn new(threshold: u32, open_duration: Duration) -> Self {
        Self {
            breakers: Mutex::new(HashMap::new()),
            threshold,
            open_duration,
        }
    }

    pub fn get(&self, endpoint: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap();
        breakers
            .entry(endpoint.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(self.threshold, self.open_duration)))
            .clone()
    }

    /// False when any endpoint's breaker would reject a call right now.
    pub fn is_available(&self) -> bool {
        let breakers = self.breakers.lock().unwrap();
        breakers.values().all(|b| b.would_allow())
    }
}
