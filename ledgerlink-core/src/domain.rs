//! Domain types mirrored from the aggregator: connections, accounts,
//! transactions, jobs, and sync summaries.
//!
//! Local identity for every mirrored record is the aggregator-assigned
//! remote id. Upserting the same remote id twice converges to one record.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Lifecycle of a bank connection as reported by the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Pending,
    Fetching,
    Success,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Pending => "pending",
            ConnectionStatus::Fetching => "fetching",
            ConnectionStatus::Success => "success",
            ConnectionStatus::Error => "error",
        }
    }

    /// Parse an aggregator status string; unknown values map to `Error`.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "pending" => ConnectionStatus::Pending,
            "fetching" => ConnectionStatus::Fetching,
            "success" | "active" => ConnectionStatus::Success,
            _ => ConnectionStatus::Error,
        }
    }
}

/// A link between a user and an institution at the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub remote_id: String,
    pub user_id: String,
    pub institution_id: String,
    pub status: ConnectionStatus,
    pub last_used: Option<NaiveDateTime>,
}

/// A bank account mirrored from the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub remote_id: String,
    pub connection_id: String,
    pub user_id: String,
    pub name: String,
    pub currency: String,
    pub balance: f64,
    pub available_balance: Option<f64>,
    pub status: String,
}

/// Flow direction of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Credit => "credit",
            Direction::Debit => "debit",
        }
    }
}

/// Tax-relevant category assigned during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaxCategory {
    Income,
    Software,
    OfficeSupplies,
    Advertising,
    Professional,
    BankFees,
    Travel,
    Meals,
    Utilities,
    Personal,
    Uncategorized,
}

impl TaxCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaxCategory::Income => "income",
            TaxCategory::Software => "software",
            TaxCategory::OfficeSupplies => "office-supplies",
            TaxCategory::Advertising => "advertising",
            TaxCategory::Professional => "professional",
            TaxCategory::BankFees => "bank-fees",
            TaxCategory::Travel => "travel",
            TaxCategory::Meals => "meals",
            TaxCategory::Utilities => "utilities",
            TaxCategory::Personal => "personal",
            TaxCategory::Uncategorized => "uncategorized",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "income" => TaxCategory::Income,
            "software" => TaxCategory::Software,
            "office-supplies" => TaxCategory::OfficeSupplies,
            "advertising" => TaxCategory::Advertising,
            "professional" => TaxCategory::Professional,
            "bank-fees" => TaxCategory::BankFees,
            "travel" => TaxCategory::Travel,
            "meals" => TaxCategory::Meals,
            "utilities" => TaxCategory::Utilities,
            "personal" => TaxCategory::Personal,
            _ => TaxCategory::Uncategorized,
        }
    }
}

/// A transaction mirrored from the aggregator, including derived tax fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub remote_id: String,
    pub account_id: String,
    pub amount: f64,
    pub direction: Direction,
    pub description: String,
    pub merchant: Option<String>,
    pub raw_category: Option<String>,
    pub post_date: Option<NaiveDate>,
    pub transaction_date: NaiveDate,
    pub tax_category: TaxCategory,
    pub is_business: bool,
    pub gst_amount: Option<f64>,
}

/// Terminal and in-flight states of an aggregator job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in-progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

/// An asynchronous aggregator job. Transient: polled, never persisted.
#[derive(Debug, Clone)]
pub struct Job {
    pub remote_id: String,
    pub status: JobStatus,
    pub error_detail: Option<String>,
}

/// Inclusive date range filter for transaction listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// Summary of one sync run: counts plus an ordered per-item error list.
///
/// A failed item never aborts the batch; its error is recorded here and the
/// run continues.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncResult {
    pub accounts_synced: usize,
    pub transactions_synced: usize,
    pub errors: Vec<String>,
}

impl SyncResult {
    /// Fold another run's outcome into this one, preserving error order.
    pub fn merge(&mut self, other: SyncResult) {
        self.accounts_synced += other.accounts_synced;
        self.transactions_synced += other.transactions_synced;
        self.errors.extend(other.errors);
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_status_parse_is_lenient() {
        assert_eq!(ConnectionStatus::parse("success"), ConnectionStatus::Success);
        assert_eq!(ConnectionStatus::parse("FETCHING"), ConnectionStatus::Fetching);
        assert_eq!(ConnectionStatus::parse("garbage"), ConnectionStatus::Error);
    }

    #[test]
    fn tax_category_roundtrips_through_strings() {
        for cat in [
            TaxCategory::Income,
            TaxCategory::Software,
            TaxCategory::OfficeSupplies,
            TaxCategory::BankFees,
            TaxCategory::Personal,
            TaxCategory::Uncategorized,
        ] {
            assert_eq!(TaxCategory::parse(cat.as_str()), cat);
        }
    }

    #[test]
    fn sync_result_merge_preserves_error_order() {
        let mut a = SyncResult {
            accounts_synced: 1,
            transactions_synced: 2,
            errors: vec!["first".into()],
        };
        a.merge(SyncResult {
            accounts_synced: 0,
            transactions_synced: 3,
            errors: vec!["second".into()],
        });
        assert_eq!(a.accounts_synced, 1);
        assert_eq!(a.transactions_synced, 5);
        assert_eq!(a.errors, vec!["first".to_string(), "second".to_string()]);
        assert!(!a.is_clean());
    }
}
