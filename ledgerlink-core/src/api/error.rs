//! Error taxonomy and upstream response classification.
//!
//! Every failure in the API stack maps to one of eight classes with a fixed
//! retryable flag. Classification happens in exactly one place
//! (`classify_response`) so retry behavior never depends on scattered status
//! checks.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Typed errors for all aggregator API operations.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("rate limited on '{endpoint}': {detail}")]
    RateLimit {
        endpoint: String,
        detail: String,
        retry_after: Option<Duration>,
    },

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate resource: {0}")]
    DuplicateResource(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Whether the retry executor may re-attempt after this error.
    ///
    /// Fixed by class: rate limits, upstream outages, and timeouts are
    /// transient; everything else is terminal. Auth gets its one forced
    /// token refresh inside the gateway before reaching the retry loop.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            ApiError::RateLimit { .. } | ApiError::ServiceUnavailable(_) | ApiError::Timeout(_)
        )
    }

    /// Upstream-specified wait that overrides computed backoff.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ApiError::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Aggregator error body: `{type, title, detail, correlationId}`.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub title: Option<String>,
    pub detail: Option<String>,
    #[serde(rename = "correlationId")]
    pub correlation_id: Option<String>,
}

impl ErrorBody {
    /// Human-readable message assembled from whichever fields are present.
    fn message(&self, status: u16) -> String {
        let text = match (&self.title, &self.detail) {
            (Some(t), Some(d)) => format!("{t}: {d}"),
            (Some(t), None) => t.clone(),
            (None, Some(d)) => d.clone(),
            (None, None) => format!("HTTP {status}"),
        };
        match &self.correlation_id {
            Some(id) => format!("{text} (correlation {id})"),
            None => text,
        }
    }
}

/// Map an upstream error response to the taxonomy.
///
/// The body's `type` code is authoritative when recognized; otherwise the
/// status code decides: 401 auth, 403 permission, 404 not-found, 409
/// duplicate, 429 rate-limit (honoring retry-after), 5xx unavailable.
/// Unrecognized combinations become `Internal` so unknown failure modes are
/// never masked by blind retries.
pub fn classify_response(
    endpoint: &str,
    status: u16,
    retry_after_header: Option<&str>,
    body: &str,
) -> ApiError {
    let parsed: Option<ErrorBody> = serde_json::from_str(body).ok();
    let message = parsed
        .as_ref()
        .map(|b| b.message(status))
        .unwrap_or_else(|| format!("HTTP {status}"));

    if let Some(kind) = parsed.as_ref().and_then(|b| b.kind.as_deref()) {
        match kind {
            "unauthorized" | "invalid-credentials" | "invalid-authorization-token"
            | "token-expired" => return ApiError::Auth(message),
            "forbidden-access" | "access-denied" => return ApiError::Permission(message),
            "resource-not-found" => return ApiError::NotFound(message),
            "duplicate-resource" => return ApiError::DuplicateResource(message),
            "rate-limit-exceeded" => {
                return ApiError::RateLimit {
                    endpoint: endpoint.to_string(),
                    detail: message,
                    retry_after: parse_retry_after(retry_after_header),
                }
            }
            "service-unavailable" | "maintenance" => {
                return ApiError::ServiceUnavailable(message)
            }
            _ => {}
        }
    }

    match status {
        401 => ApiError::Auth(message),
        403 => ApiError::Permission(message),
        404 => ApiError::NotFound(message),
        409 => ApiError::DuplicateResource(message),
        429 => ApiError::RateLimit {
            endpoint: endpoint.to_string(),
            detail: message,
            retry_after: parse_retry_after(retry_after_header),
        },
        500..=599 => ApiError::ServiceUnavailable(message),
        _ => ApiError::Internal(format!("unexpected response from '{endpoint}': {message}")),
    }
}

/// Parse a `retry-after` header value given in whole seconds.
fn parse_retry_after(header: Option<&str>) -> Option<Duration> {
    header
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
