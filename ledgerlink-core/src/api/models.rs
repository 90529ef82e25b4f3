//! Wire DTOs for the aggregator API.
//!
//! These mirror the upstream JSON exactly; conversion into domain records
//! (with validation and derived tax fields) happens in the reconciler.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{Job, JobStatus};

/// Response from the credential-exchange endpoint.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: u64,
    pub token_type: Option<String>,
}

/// Generic paginated listing: a page of records plus navigation links.
#[derive(Debug, Deserialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub links: Links,
}

#[derive(Debug, Default, Deserialize)]
pub struct Links {
    #[serde(rename = "self")]
    pub this: Option<String>,
    pub next: Option<String>,
}

/// Institution login credentials supplied when creating a connection.
#[derive(Clone, Serialize)]
pub struct LoginCredentials {
    #[serde(rename = "loginId")]
    pub login_id: String,
    pub password: String,
}

// Passwords never appear in logs.
impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("login_id", &self.login_id)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstitutionRef {
    pub id: String,
}

/// A connection as returned by the aggregator.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConnection {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    pub institution: InstitutionRef,
    #[serde(rename = "lastUsed")]
    pub last_used: Option<String>,
}

/// An account as returned by the aggregator.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteAccount {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub balance: Option<f64>,
    #[serde(rename = "availableFunds")]
    pub available_funds: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
    /// Remote id of the owning connection.
    #[serde(default)]
    pub connection: Option<String>,
}

/// A transaction as returned by the aggregator.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteTransaction {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    pub amount: f64,
    /// "credit" or "debit"; absent on some institutions.
    #[serde(default)]
    pub direction: Option<String>,
    /// Raw aggregator category, e.g. "bank-fees".
    #[serde(rename = "class")]
    pub raw_category: Option<String>,
    #[serde(default)]
    pub merchant: Option<String>,
    #[serde(rename = "postDate")]
    pub post_date: Option<String>,
    #[serde(rename = "transactionDate")]
    pub transaction_date: Option<String>,
    /// Remote id of the owning account.
    #[serde(default)]
    pub account: Option<String>,
}

/// An institution listing entry.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteInstitution {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobStep {
    #[serde(default)]
    pub title: Option<String>,
    pub status: String,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
}

/// An asynchronous job resource.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteJob {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub steps: Vec<JobStep>,
}

impl RemoteJob {
    /// Overall status: the explicit field when present, otherwise derived
    /// from the steps (any failure fails the job; all successes complete it).
    pub fn overall_status(&self) -> JobStatus {
        if let Some(status) = &self.status {
            return parse_job_status(status);
        }
        if self.steps.is_empty() {
            return JobStatus::Pending;
        }
        if self.steps.iter().any(|s| parse_job_status(&s.status) == JobStatus::Failed) {
            JobStatus::Failed
        } else if self
            .steps
            .iter()
            .all(|s| parse_job_status(&s.status) == JobStatus::Completed)
        {
            JobStatus::Completed
        } else if self
            .steps
            .iter()
            .any(|s| parse_job_status(&s.status) == JobStatus::InProgress)
        {
            JobStatus::InProgress
        } else {
            JobStatus::Pending
        }
    }

    pub fn to_job(&self) -> Job {
        let error_detail = self
            .steps
            .iter()
            .find(|s| parse_job_status(&s.status) == JobStatus::Failed)
            .map(|s| {
                let title = s.title.as_deref().unwrap_or("step");
                match &s.result {
                    Some(result) => format!("{title}: {result}"),
                    None => title.to_string(),
                }
            });
        Job {
            remote_id: self.id.clone(),
            status: self.overall_status(),
            error_detail,
        }
    }
}

fn parse_job_status(s: &str) -> JobStatus {
    match s.to_ascii_lowercase().as_str() {
        "in-progress" | "in_progress" | "running" => JobStatus::InProgress,
        "completed" | "success" => JobStatus::Completed,
        "failed" | "failure" | "error" => JobStatus::Failed,
        // Unknown statuses keep the job non-terminal; the poller's own
        // timeout bounds how long that can last.
        _ => JobStatus::Pending,
    }
}

/// Parse an aggregator date that may be `YYYY-MM-DD` or a full timestamp.
pub fn parse_wire_date(raw: &str) -> Option<NaiveDate> {
    let date_part = raw.get(..10)?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}
