//! Reconciliation of remote records into the local store.
//!
//! Sync is best-effort: every item in a batch is attempted independently,
//! failures are recorded as ordered error strings in the SyncResult, and
//! the run keeps moving. A sync call only errors outright when the fetch
//! itself fails — before any items were attempted.

use ledgerlink_core::api::models::{parse_wire_date, RemoteAccount, RemoteConnection, RemoteTransaction};
use ledgerlink_core::api::{ApiError, BankingProvider};
use ledgerlink_core::domain::{
    Account, Connection, ConnectionStatus, DateRange, Direction, SyncResult, Transaction,
};
use ledgerlink_core::store::Store;
use ledgerlink_core::tax;

/// Progress callbacks for multi-connection sync runs.
pub trait SyncProgress: Send + Sync {
    /// Called when a connection's sync begins.
    fn on_connection_start(&self, connection_id: &str, index: usize, total: usize);

    /// Called when a connection's sync finishes (cleanly or with item errors).
    fn on_connection_complete(
        &self,
        connection_id: &str,
        index: usize,
        total: usize,
        result: &SyncResult,
    );

    /// Called once the whole run is done.
    fn on_run_complete(&self, result: &SyncResult);
}

/// Progress reporter that prints to stdout.
pub struct StdoutProgress;

impl SyncProgress for StdoutProgress {
    fn on_connection_start(&self, connection_id: &str, index: usize, total: usize) {
        println!("[{}/{}] Syncing connection {connection_id}...", index + 1, total);
    }

    fn on_connection_complete(
        &self,
        connection_id: &str,
        _index: usize,
        _total: usize,
        result: &SyncResult,
    ) {
        if result.is_clean() {
            println!(
                "  OK: {connection_id} ({} accounts, {} transactions)",
                result.accounts_synced, result.transactions_synced
            );
        } else {
            println!(
                "  PARTIAL: {connection_id} ({} accounts, {} transactions, {} errors)",
                result.accounts_synced,
                result.transactions_synced,
                result.errors.len()
            );
        }
    }

    fn on_run_complete(&self, result: &SyncResult) {
        println!(
            "\nSync complete: {} accounts, {} transactions, {} errors",
            result.accounts_synced,
            result.transactions_synced,
            result.errors.len()
        );
    }
}

/// No-op progress reporter for library callers and tests.
pub struct SilentProgress;

impl SyncProgress for SilentProgress {
    fn on_connection_start(&self, _: &str, _: usize, _: usize) {}
    fn on_connection_complete(&self, _: &str, _: usize, _: usize, _: &SyncResult) {}
    fn on_run_complete(&self, _: &SyncResult) {}
}

/// Fetches remote records through a provider and upserts them idempotently.
pub struct SyncReconciler<'a> {
    provider: &'a dyn BankingProvider,
    store: &'a Store,
    batch_size: usize,
}

impl<'a> SyncReconciler<'a> {
    pub fn new(provider: &'a dyn BankingProvider, store: &'a Store, batch_size: usize) -> Self {
        Self {
            provider,
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Mirror the user's connections. Returns the mirrored list plus a
    /// result carrying any per-connection errors.
    pub fn sync_connections(
        &self,
        user_id: &str,
    ) -> Result<(Vec<Connection>, SyncResult), ApiError> {
        let remote = self.provider.list_connections(user_id)?;
        let mut result = SyncResult::default();
        let mut connections = Vec::with_capacity(remote.len());

        for (index, conn) in remote.iter().enumerate() {
            match self.upsert_connection(user_id, conn) {
                Ok(connection) => connections.push(connection),
                Err(message) => result.errors.push(format!(
                    "connection {}: {message}",
                    item_label(&conn.id, index)
                )),
            }
        }

        Ok((connections, result))
    }

    /// Mirror the user's accounts: update balance/status on re-sight,
    /// insert on first sight.
    pub fn sync_accounts(&self, user_id: &str) -> Result<SyncResult, ApiError> {
        let remote = self.provider.list_accounts(user_id)?;
        tracing::debug!(user_id, count = remote.len(), "fetched remote accounts");

        let mut result = SyncResult::default();
        for (index, account) in remote.iter().enumerate() {
            match self.upsert_account(user_id, account) {
                Ok(()) => result.accounts_synced += 1,
                Err(message) => result
                    .errors
                    .push(format!("account {}: {message}", item_label(&account.id, index))),
            }
        }
        Ok(result)
    }

    /// Mirror one account's transactions, categorizing each for tax and
    /// computing GST where it applies. Items are processed in batches;
    /// one bad item never blocks the rest.
    pub fn sync_transactions(
        &self,
        account_id: &str,
        range: Option<&DateRange>,
    ) -> Result<SyncResult, ApiError> {
        let remote = self.provider.list_transactions(account_id, range)?;
        tracing::debug!(account_id, count = remote.len(), "fetched remote transactions");

        let mut result = SyncResult::default();
        let mut index = 0;
        for batch in remote.chunks(self.batch_size) {
            for txn in batch {
                match self.upsert_transaction(account_id, txn) {
                    Ok(()) => result.transactions_synced += 1,
                    Err(message) => result
                        .errors
                        .push(format!("transaction {}: {message}", item_label(&txn.id, index))),
                }
                index += 1;
            }
        }
        Ok(result)
    }

    fn upsert_connection(
        &self,
        user_id: &str,
        remote: &RemoteConnection,
    ) -> Result<Connection, String> {
        if remote.id.trim().is_empty() {
            return Err("missing remote id".into());
        }
        let connection = Connection {
            remote_id: remote.id.clone(),
            user_id: user_id.to_string(),
            institution_id: remote.institution.id.clone(),
            status: remote
                .status
                .as_deref()
                .map(ConnectionStatus::parse)
                .unwrap_or(ConnectionStatus::Pending),
            last_used: remote.last_used.as_deref().and_then(parse_wire_datetime),
        };
        self.store
            .upsert_connection(&connection)
            .map_err(|e| e.to_string())?;
        Ok(connection)
    }

    fn upsert_account(&self, user_id: &str, remote: &RemoteAccount) -> Result<(), String> {
        if remote.id.trim().is_empty() {
            return Err("missing remote id".into());
        }
        let account = Account {
            remote_id: remote.id.clone(),
            connection_id: remote.connection.clone().unwrap_or_default(),
            user_id: user_id.to_string(),
            name: remote.name.clone().unwrap_or_else(|| "Unnamed account".into()),
            currency: remote.currency.clone().unwrap_or_else(|| "AUD".into()),
            balance: remote.balance.unwrap_or(0.0),
            available_balance: remote.available_funds,
            status: remote.status.clone().unwrap_or_else(|| "available".into()),
        };
        self.store.upsert_account(&account).map_err(|e| e.to_string())
    }

    fn upsert_transaction(&self, account_id: &str, remote: &RemoteTransaction) -> Result<(), String> {
        if remote.id.trim().is_empty() {
            return Err("missing remote id".into());
        }
        let transaction_date = remote
            .transaction_date
            .as_deref()
            .or(remote.post_date.as_deref())
            .and_then(parse_wire_date)
            .ok_or_else(|| "missing or unparseable transaction date".to_string())?;

        let description = remote.description.clone().unwrap_or_default();
        let classification = tax::classify(
            &description,
            remote.merchant.as_deref(),
            remote.raw_category.as_deref(),
        );
        let gst_amount = if tax::gst_applies(&classification) {
            Some(tax::gst_component(remote.amount))
        } else {
            None
        };

        let direction = match remote.direction.as_deref() {
            Some("credit") => Direction::Credit,
            Some("debit") => Direction::Debit,
            // Some institutions omit direction; the amount sign decides.
            _ if remote.amount >= 0.0 => Direction::Credit,
            _ => Direction::Debit,
        };

        let transaction = Transaction {
            remote_id: remote.id.clone(),
            account_id: remote
                .account
                .clone()
                .unwrap_or_else(|| account_id.to_string()),
            amount: remote.amount,
            direction,
            description,
            merchant: remote.merchant.clone(),
            raw_category: remote.raw_category.clone(),
            post_date: remote.post_date.as_deref().and_then(parse_wire_date),
            transaction_date,
            tax_category: classification.category,
            is_business: classification.is_business,
            gst_amount,
        };
        self.store
            .upsert_transaction(&transaction)
            .map_err(|e| e.to_string())
    }
}

/// Label for an item error: the remote id when present, else its position.
fn item_label(id: &str, index: usize) -> String {
    if id.trim().is_empty() {
        format!("#{}", index + 1)
    } else {
        id.to_string()
    }
}

fn parse_wire_datetime(raw: &str) -> Option<chrono::NaiveDateTime> {
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%SZ")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .or_else(|| parse_wire_date(raw).and_then(|d| d.and_hms_opt(0, 0, 0)))
}
