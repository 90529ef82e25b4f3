//! Caller-facing banking service.
//!
//! Wires the provider, job poller, and reconciler into the operations the
//! application layer calls: link a connection, refresh it, read accounts
//! and transactions, and bulk-sync everything a user has.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;

use ledgerlink_core::api::models::LoginCredentials;
use ledgerlink_core::api::{ApiError, BankingProvider, JobPoller};
use ledgerlink_core::domain::{
    Account, Connection, DateRange, JobStatus, SyncResult, Transaction,
};
use ledgerlink_core::store::{Store, StoreError};

use crate::config::SyncConfig;
use crate::reconciler::{SyncProgress, SyncReconciler};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("api error: {0}")]
    Api(#[from] ApiError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("job '{job_id}' failed: {detail}")]
    JobFailed { job_id: String, detail: String },
}

/// The sync engine's front door. One instance per configured aggregator;
/// safe to share across threads.
pub struct BankService {
    provider: Arc<dyn BankingProvider>,
    poller: JobPoller,
    db_path: PathBuf,
    batch_size: usize,
    job_max_wait: Duration,
}

impl BankService {
    pub fn new(provider: Arc<dyn BankingProvider>, config: &SyncConfig) -> Self {
        let poller = JobPoller::new(
            provider.clone(),
            Duration::from_secs(config.jobs.poll_interval_secs),
        );
        Self {
            provider,
            poller,
            db_path: config.database.path.clone(),
            batch_size: config.sync.batch_size,
            job_max_wait: Duration::from_secs(config.jobs.max_wait_secs),
        }
    }

    fn open_store(&self) -> Result<Store, SyncError> {
        Ok(Store::open(&self.db_path)?)
    }

    /// Link a user to an institution: create the connection, wait for the
    /// retrieval job, then mirror connections and accounts.
    pub fn create_connection(
        &self,
        user_id: &str,
        institution_id: &str,
        credentials: &LoginCredentials,
    ) -> Result<SyncResult, SyncError> {
        let job = self
            .provider
            .create_connection(user_id, institution_id, credentials)?;
        tracing::info!(user_id, institution_id, job_id = %job.id, "connection job started");
        self.await_job(&job.id)?;

        let store = self.open_store()?;
        let reconciler = SyncReconciler::new(self.provider.as_ref(), &store, self.batch_size);
        let (_, mut result) = reconciler.sync_connections(user_id)?;
        result.merge(reconciler.sync_accounts(user_id)?);
        Ok(result)
    }

    /// Refresh an existing connection and mirror its accounts and their
    /// transactions.
    pub fn refresh_connection(
        &self,
        user_id: &str,
        connection_id: &str,
    ) -> Result<SyncResult, SyncError> {
        let job = self.provider.refresh_connection(connection_id)?;
        tracing::info!(connection_id, job_id = %job.id, "refresh job started");
        self.await_job(&job.id)?;

        let store = self.open_store()?;
        let reconciler = SyncReconciler::new(self.provider.as_ref(), &store, self.batch_size);
        let (_, mut result) = reconciler.sync_connections(user_id)?;
        result.merge(reconciler.sync_accounts(user_id)?);

        for account in store.list_accounts_for_connection(connection_id)? {
            result.merge(reconciler.sync_transactions(&account.remote_id, None)?);
        }
        Ok(result)
    }

    /// Disconnect: remove the connection upstream, then locally. Mirrored
    /// accounts and transactions are kept for history.
    pub fn disconnect_connection(&self, connection_id: &str) -> Result<(), SyncError> {
        self.provider.delete_connection(connection_id)?;
        let store = self.open_store()?;
        store.delete_connection(connection_id)?;
        tracing::info!(connection_id, "connection disconnected");
        Ok(())
    }

    /// Fetch and mirror the user's accounts, returning the local records.
    pub fn get_accounts(&self, user_id: &str) -> Result<Vec<Account>, SyncError> {
        let store = self.open_store()?;
        let reconciler = SyncReconciler::new(self.provider.as_ref(), &store, self.batch_size);
        reconciler.sync_accounts(user_id)?;
        Ok(store.list_accounts(user_id)?)
    }

    /// Fetch and mirror one account's transactions, returning the local
    /// records (categorized, with GST where applicable).
    pub fn get_transactions(
        &self,
        account_id: &str,
        range: Option<&DateRange>,
    ) -> Result<Vec<Transaction>, SyncError> {
        let store = self.open_store()?;
        let reconciler = SyncReconciler::new(self.provider.as_ref(), &store, self.batch_size);
        reconciler.sync_transactions(account_id, range)?;
        Ok(store.list_transactions(account_id)?)
    }

    /// Bulk sync: connections → accounts → transactions for everything the
    /// user has linked, aggregating one SyncResult.
    ///
    /// Connections are processed in parallel, each worker with its own
    /// store handle. When the provider is shedding load (breaker open), the
    /// remaining connections are recorded as errors without upstream
    /// contact.
    pub fn sync_user_bank_data(
        &self,
        user_id: &str,
        progress: &dyn SyncProgress,
    ) -> Result<SyncResult, SyncError> {
        let store = self.open_store()?;
        let reconciler = SyncReconciler::new(self.provider.as_ref(), &store, self.batch_size);
        let (connections, mut result) = reconciler.sync_connections(user_id)?;
        result.merge(reconciler.sync_accounts(user_id)?);
        drop(store);

        let total = connections.len();
        let per_connection: Vec<SyncResult> = connections
            .par_iter()
            .enumerate()
            .map(|(index, connection)| {
                progress.on_connection_start(&connection.remote_id, index, total);
                let outcome = self.sync_one_connection(user_id, connection);
                progress.on_connection_complete(&connection.remote_id, index, total, &outcome);
                outcome
            })
            .collect();

        for outcome in per_connection {
            result.merge(outcome);
        }
        progress.on_run_complete(&result);
        tracing::info!(
            user_id,
            accounts = result.accounts_synced,
            transactions = result.transactions_synced,
            errors = result.errors.len(),
            "user bank data sync finished"
        );
        Ok(result)
    }

    fn sync_one_connection(&self, _user_id: &str, connection: &Connection) -> SyncResult {
        let mut outcome = SyncResult::default();

        if !self.provider.is_available() {
            outcome.errors.push(format!(
                "connection {}: skipped, provider unavailable",
                connection.remote_id
            ));
            return outcome;
        }

        let store = match Store::open(&self.db_path) {
            Ok(store) => store,
            Err(e) => {
                outcome
                    .errors
                    .push(format!("connection {}: {e}", connection.remote_id));
                return outcome;
            }
        };
        let reconciler = SyncReconciler::new(self.provider.as_ref(), &store, self.batch_size);

        let accounts = match store.list_accounts_for_connection(&connection.remote_id) {
            Ok(accounts) => accounts,
            Err(e) => {
                outcome
                    .errors
                    .push(format!("connection {}: {e}", connection.remote_id));
                return outcome;
            }
        };

        for account in accounts {
            match reconciler.sync_transactions(&account.remote_id, None) {
                Ok(r) => outcome.merge(r),
                Err(e) => outcome
                    .errors
                    .push(format!("account {}: {e}", account.remote_id)),
            }
        }
        outcome
    }

    fn await_job(&self, job_id: &str) -> Result<(), SyncError> {
        let job = self.poller.wait_for_job(job_id, self.job_max_wait, None)?;
        if job.status == JobStatus::Failed {
            return Err(SyncError::JobFailed {
                job_id: job.remote_id,
                detail: job
                    .error_detail
                    .unwrap_or_else(|| "no detail reported".into()),
            });
        }
        Ok(())
    }
}
