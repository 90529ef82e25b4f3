//! Request gateway: the one safe path to the upstream API.
//!
//! Every call runs the same fixed sequence: circuit breaker acquire, local
//! rate-limit check, then the retry loop around token fetch + HTTP send +
//! classification. The breaker and limiter are cheap local guards evaluated
//! before any network traffic; the overall outcome (after retries) is
//! reported back to the breaker.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::breaker::BreakerRegistry;
use super::error::{classify_response, ApiError};
use super::rate_limit::RateLimiter;
use super::retry::RetryPolicy;
use super::token::TokenManager;
use super::transport::{HttpRequest, HttpResponse, Method, Transport};

/// Connection settings for the upstream API.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_version: String,
    pub timeout: Duration,
}

/// One logical API request, addressed by path relative to the base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    /// Overall deadline for the call including retries; `None` means the
    /// per-request timeout is the only bound.
    pub deadline: Option<Instant>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
            deadline: None,
        }
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
            deadline: None,
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            path: path.into(),
            body: None,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Composes breaker, limiter, retry, and token handling around the
/// transport. Constructed once and shared; all state is process-wide per
/// endpoint key.
pub struct RequestGateway {
    transport: Arc<dyn Transport>,
    tokens: Arc<TokenManager>,
    limiter: RateLimiter,
    breakers: BreakerRegistry,
    retry: RetryPolicy,
    config: GatewayConfig,
}

impl RequestGateway {
    pub fn new(
        transport: Arc<dyn Transport>,
        tokens: Arc<TokenManager>,
        limiter: RateLimiter,
        breakers: BreakerRegistry,
        retry: RetryPolicy,
        config: GatewayConfig,
    ) -> Self {
        Self {
            transport,
            tokens,
            limiter,
            breakers,
            retry,
            config,
        }
    }

    /// Call the upstream API safely.
    ///
    /// Order matters: (a) breaker, (b) rate limiter, (c) retry loop with
    /// token + send + classify, (d) outcome reported to the breaker. A
    /// rate-limit rejection right after the breaker handed out its
    /// half-open probe returns the probe unused.
    pub fn call(&self, endpoint: &str, request: &ApiRequest) -> Result<HttpResponse, ApiError> {
        let breaker = self.breakers.get(endpoint);
        breaker.try_acquire(endpoint)?;

        if let Err(e) = self.limiter.check(endpoint) {
            breaker.abort_probe();
            return Err(e);
        }

        let result = self
            .retry
            .execute(request.deadline, || self.send_authed(endpoint, request));

        match &result {
            Ok(_) => breaker.record_success(),
            Err(e) => {
                tracing::warn!(endpoint, error = %e, "gateway call failed");
                breaker.record_failure();
            }
        }
        result
    }

    /// Whether any endpoint's breaker is currently shedding load.
    pub fn is_available(&self) -> bool {
        self.breakers.is_available()
    }

    /// One attempt: fetch a token, send, classify. A 401 invalidates the
    /// cached credential and re-sends once with a fresh token before the
    /// Auth error becomes terminal.
    fn send_authed(&self, endpoint: &str, request: &ApiRequest) -> Result<HttpResponse, ApiError> {
        let mut refreshed = false;
        loop {
            let credential = self.tokens.get_token()?;
            let http = self.build_request(request, &credential.token)?;
            let resp = self.transport.send(&http)?;

            if resp.is_success() {
                return Ok(resp);
            }
            if resp.status == 401 {
                self.tokens.invalidate();
                if !refreshed {
                    refreshed = true;
                    tracing::debug!(endpoint, "401 from upstream, retrying with a fresh token");
                    continue;
                }
            }
            return Err(classify_response(
                endpoint,
                resp.status,
                resp.header("retry-after"),
                &resp.body,
            ));
        }
    }

    fn build_request(&self, request: &ApiRequest, token: &str) -> Result<HttpRequest, ApiError> {
        let url = if request.path.starts_with("http://") || request.path.starts_with("https://") {
            request.path.clone()
        } else {
            format!(
                "{}/{}",
                self.config.base_url.trim_end_matches('/'),
                request.path.trim_start_matches('/')
            )
        };

        let timeout = match request.deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(ApiError::Timeout("call deadline expired".into()));
                }
                self.config.timeout.min(remaining)
            }
            None => self.config.timeout,
        };

        Ok(HttpRequest {
            method: request.method,
            url,
            headers: vec![
                ("authorization".into(), format!("Bearer {token}")),
                ("api-version".into(), self.config.api_version.clone()),
                ("accept".into(), "application/json".into()),
            ],
            body: request.body.clone(),
            timeout,
        })
    }
}
