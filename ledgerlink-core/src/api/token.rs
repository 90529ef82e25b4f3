//! Bearer credential lifecycle.
//!
//! One credential is cached per manager and refreshed before expiry (60s
//! safety buffer). The cache mutex is held across the exchange call, so
//! concurrent callers observing a stale credential single-flight one
//! refresh. The exchange goes through its own retry policy, not the
//! gateway, to keep token traffic out of the endpoint rate windows.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::error::{classify_response, ApiError};
use super::models::TokenResponse;
use super::retry::RetryPolicy;
use super::transport::{HttpRequest, Method, Transport};

/// Safety margin subtracted from the reported expiry.
const EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// A bearer token and its expiry instant.
#[derive(Clone)]
pub struct Credential {
    pub token: String,
    pub expires_at: Instant,
}

impl Credential {
    pub fn is_fresh(&self, buffer: Duration) -> bool {
        Instant::now() + buffer < self.expires_at
    }
}

// The token itself never appears in logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Acquires, caches, and invalidates the aggregator bearer credential.
pub struct TokenManager {
    transport: Arc<dyn Transport>,
    auth_url: String,
    api_key: String,
    api_version: String,
    timeout: Duration,
    retry: RetryPolicy,
    cached: Mutex<Option<Credential>>,
}

impl TokenManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        auth_url: impl Into<String>,
        api_key: impl Into<String>,
        api_version: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            auth_url: auth_url.into(),
            api_key: api_key.into(),
            api_version: api_version.into(),
            timeout,
            retry,
            cached: Mutex::new(None),
        }
    }

    /// Return the cached credential, refreshing it first if it expires
    /// within the safety buffer. No network call happens while the cache
    /// is fresh.
    pub fn get_token(&self) -> Result<Credential, ApiError> {
        let mut cached = self.cached.lock().unwrap();
        if let Some(credential) = cached.as_ref() {
            if credential.is_fresh(EXPIRY_BUFFER) {
                return Ok(credential.clone());
            }
        }

        tracing::debug!("exchanging API key for a fresh bearer credential");
        let credential = self.exchange()?;
        *cached = Some(credential.clone());
        Ok(credential)
    }

    /// Drop the cached credential so the next `get_token` forces a refresh.
    /// Called by the gateway when the upstream rejects a token with 401.
    pub fn invalidate(&self) {
        let mut cached = self.cached.lock().unwrap();
        if cached.take().is_some() {
            tracing::debug!("cached credential invalidated after upstream rejection");
        }
    }

    fn exchange(&self) -> Result<Credential, ApiError> {
        self.retry.execute(None, || {
            let request = HttpRequest {
                method: Method::Post,
                url: self.auth_url.clone(),
                headers: vec![
                    ("authorization".into(), format!("Basic {}", self.api_key)),
                    ("api-version".into(), self.api_version.clone()),
                ],
                body: Some(serde_json::json!({ "scope": "SERVER_ACCESS" })),
                timeout: self.timeout,
            };

            let resp = self.transport.send(&request)?;
            if !resp.is_success() {
                return Err(classify_response(
                    "token",
                    resp.status,
                    resp.header("retry-after"),
                    &resp.body,
                ));
            }

            let body: TokenResponse = resp.json()?;
            Ok(Credential {
                token: body.access_token,
                expires_at: Instant::now() + Duration::from_secs(body.expires_in),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::api::transport::HttpResponse;

    struct FakeTransport {
        calls: AtomicUsize,
        status: u16,
        expires_in: u64,
        delay: Duration,
    }

    impl FakeTransport {
        fn new(expires_in: u64) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                status: 200,
                expires_in,
                delay: Duration::ZERO,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Transport for FakeTransport {
        fn send(&self, _req: &HttpRequest) -> Result<HttpResponse, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            let body = if self.status == 200 {
                format!(
                    r#"{{"access_token":"tok-{}","expires_in":{},"token_type":"Bearer"}}"#,
                    self.calls(),
                    self.expires_in
                )
            } else {
                r#"{"type":"invalid-credentials","title":"bad key"}"#.into()
            };
            Ok(HttpResponse {
                status: self.status,
                headers: HashMap::new(),
                body,
            })
        }
    }

    fn manager(transport: Arc<FakeTransport>) -> TokenManager {
        TokenManager::new(
            transport,
            "https://api.example.com/token",
            "key",
            "3.0",
            Duration::from_secs(5),
            RetryPolicy {
                max_attempts: 2,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                backoff_factor: 2.0,
            },
        )
    }

    #[test]
    fn second_call_within_buffer_makes_no_network_request() {
        let transport = Arc::new(FakeTransport::new(3600));
        let tokens = manager(transport.clone());

        let first = tokens.get_token().unwrap();
        let second = tokens.get_token().unwrap();

        assert_eq!(first.token, second.token);
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn credential_inside_the_buffer_is_refreshed() {
        // expires_in below the 60s buffer: stale on arrival.
        let transport = Arc::new(FakeTransport::new(30));
        let tokens = manager(transport.clone());

        tokens.get_token().unwrap();
        tokens.get_token().unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[test]
    fn invalidate_forces_the_next_call_to_refresh() {
        let transport = Arc::new(FakeTransport::new(3600));
        let tokens = manager(transport.clone());

        let first = tokens.get_token().unwrap();
        tokens.invalidate();
        let second = tokens.get_token().unwrap();

        assert_ne!(first.token, second.token);
        assert_eq!(transport.calls(), 2);
    }

    #[test]
    fn exchange_failure_classifies_as_auth() {
        let mut fake = FakeTransport::new(3600);
        fake.status = 401;
        let tokens = manager(Arc::new(fake));
        assert!(matches!(tokens.get_token().unwrap_err(), ApiError::Auth(_)));
    }

    #[test]
    fn concurrent_callers_single_flight_one_exchange() {
        let mut fake = FakeTransport::new(3600);
        fake.delay = Duration::from_millis(30);
        let transport = Arc::new(fake);
        let tokens = Arc::new(manager(transport.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tokens = tokens.clone();
                std::thread::spawn(move || tokens.get_token().unwrap().token)
            })
            .collect();
        let mut seen: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        seen.dedup();

        assert_eq!(transport.calls(), 1);
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn debug_output_redacts_the_token() {
        let credential = Credential {
            token: "super-secret".into(),
            expires_at: Instant::now(),
        };
        let text = format!("{credential:?}");
        assert!(!text.contains("super-secret"));
        assert!(text.contains("<redacted>"));
    }
}
