//! Aggregator API client and the provider seam.
//!
//! `BankingProvider` abstracts the upstream so orchestration code can swap
//! implementations and tests can script fixtures. `AggregatorClient` is the
//! real implementation: typed endpoint wrappers over the request gateway.

use crate::domain::DateRange;

use super::error::ApiError;
use super::gateway::{ApiRequest, RequestGateway};
use super::models::{
    LoginCredentials, Paginated, RemoteAccount, RemoteConnection, RemoteInstitution, RemoteJob,
    RemoteTransaction,
};

/// Upper bound on pages followed per listing; anything beyond is logged
/// and truncated rather than looping forever on a bad `next` link.
const MAX_PAGES: usize = 50;

/// The upstream banking-data aggregator, as seen by the sync engine.
pub trait BankingProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Link a user to an institution. Returns the job tracking retrieval.
    fn create_connection(
        &self,
        user_id: &str,
        institution_id: &str,
        credentials: &LoginCredentials,
    ) -> Result<RemoteJob, ApiError>;

    /// Trigger a refresh of an existing connection. Returns the job.
    fn refresh_connection(&self, connection_id: &str) -> Result<RemoteJob, ApiError>;

    /// Remove a connection at the aggregator.
    fn delete_connection(&self, connection_id: &str) -> Result<(), ApiError>;

    fn list_connections(&self, user_id: &str) -> Result<Vec<RemoteConnection>, ApiError>;

    fn list_accounts(&self, user_id: &str) -> Result<Vec<RemoteAccount>, ApiError>;

    fn list_transactions(
        &self,
        account_id: &str,
        range: Option<&DateRange>,
    ) -> Result<Vec<RemoteTransaction>, ApiError>;

    fn list_institutions(&self) -> Result<Vec<RemoteInstitution>, ApiError>;

    fn get_job(&self, job_id: &str) -> Result<RemoteJob, ApiError>;

    /// Check if the provider is currently usable (no breaker shedding load).
    fn is_available(&self) -> bool;
}

/// Production provider backed by the request gateway.
pub struct AggregatorClient {
    gateway: RequestGateway,
}

impl AggregatorClient {
    pub fn new(gateway: RequestGateway) -> Self {
        Self { gateway }
    }

    /// Follow `links.next` until the listing is exhausted (or MAX_PAGES).
    fn list_paginated<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        first_path: String,
    ) -> Result<Vec<T>, ApiError> {
        let mut items = Vec::new();
        let mut next = Some(first_path);
        let mut pages = 0;

        while let Some(path) = next {
            if pages >= MAX_PAGES {
                tracing::warn!(
                    endpoint,
                    pages,
                    "listing truncated at page limit; remaining pages skipped"
                );
                break;
            }
            let resp = self.gateway.call(endpoint, &ApiRequest::get(path))?;
            let page: Paginated<T> = resp.json()?;
            items.extend(page.data);
            next = page.links.next;
            pages += 1;
        }

        Ok(items)
    }
}

impl BankingProvider for AggregatorClient {
    fn name(&self) -> &str {
        "aggregator"
    }

    fn create_connection(
        &self,
        user_id: &str,
        institution_id: &str,
        credentials: &LoginCredentials,
    ) -> Result<RemoteJob, ApiError> {
        let body = serde_json::json!({
            "loginId": credentials.login_id,
            "password": credentials.password,
            "institution": { "id": institution_id },
        });
        let resp = self.gateway.call(
            "connections",
            &ApiRequest::post(format!("/users/{user_id}/connections"), body),
        )?;
        resp.json()
    }

    fn refresh_connection(&self, connection_id: &str) -> Result<RemoteJob, ApiError> {
        let resp = self.gateway.call(
            "connections",
            &ApiRequest::post(
                format!("/connections/{connection_id}/refresh"),
                serde_json::json!({}),
            ),
        )?;
        resp.json()
    }

    fn delete_connection(&self, connection_id: &str) -> Result<(), ApiError> {
        self.gateway.call(
            "connections",
            &ApiRequest::delete(format!("/connections/{connection_id}")),
        )?;
        Ok(())
    }

    fn list_connections(&self, user_id: &str) -> Result<Vec<RemoteConnection>, ApiError> {
        self.list_paginated("connections", format!("/users/{user_id}/connections"))
    }

    fn list_accounts(&self, user_id: &str) -> Result<Vec<RemoteAccount>, ApiError> {
        self.list_paginated("accounts", format!("/users/{user_id}/accounts"))
    }

    fn list_transactions(
        &self,
        account_id: &str,
        range: Option<&DateRange>,
    ) -> Result<Vec<RemoteTransaction>, ApiError> {
        let path = match range {
            Some(range) => format!(
                "/accounts/{account_id}/transactions?from={}&to={}&limit=500",
                range.from.format("%Y-%m-%d"),
                range.to.format("%Y-%m-%d")
            ),
            None => format!("/accounts/{account_id}/transactions?limit=500"),
        };
        self.list_paginated("transactions", path)
    }

    fn list_institutions(&self) -> Result<Vec<RemoteInstitution>, ApiError> {
        self.list_paginated("institutions", "/institutions".to_string())
    }

    fn get_job(&self, job_id: &str) -> Result<RemoteJob, ApiError> {
        let resp = self
            .gateway
            .call("jobs", &ApiRequest::get(format!("/jobs/{job_id}")))?;
        resp.json()
    }

    fn is_available(&self) -> bool {
        self.gateway.is_available()
    }
}
