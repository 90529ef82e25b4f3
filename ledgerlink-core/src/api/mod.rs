//! Resilient access to the upstream aggregator API.
//!
//! Layered bottom-up:
//! - `transport` — the HTTP seam (real reqwest client or scripted doubles)
//! - `error` — the fixed error taxonomy and response classifier
//! - `token` — bearer credential cache with single-flight refresh
//! - `rate_limit` — per-endpoint sliding-window admission control
//! - `breaker` — circuit breaker with a single half-open probe
//! - `retry` — bounded retry with exponential backoff
//! - `gateway` — the one composition of all of the above
//! - `client` — typed endpoint wrappers (`BankingProvider` implementation)
//! - `jobs` — polling for long-running aggregator jobs

pub mod breaker;
pub mod client;
pub mod error;
pub mod gateway;
pub mod jobs;
pub mod models;
pub mod rate_limit;
pub mod retry;
pub mod token;
pub mod transport;

pub use breaker::{BreakerRegistry, CircuitBreaker};
pub use client::{AggregatorClient, BankingProvider};
pub use error::{classify_response, ApiError};
pub use gateway::{ApiRequest, GatewayConfig, RequestGateway};
pub use jobs::JobPoller;
pub use models::{
    LoginCredentials, RemoteAccount, RemoteConnection, RemoteInstitution, RemoteJob,
    RemoteTransaction,
};
pub use rate_limit::RateLimiter;
pub use retry::RetryPolicy;
pub use token::{Credential, TokenManager};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Method, Transport};
