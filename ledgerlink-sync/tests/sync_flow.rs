//! Integration tests for the reconciler and service: scripted provider,
//! real SQLite store, end-to-end sync flows including partial failures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ledgerlink_core::api::models::{
    InstitutionRef, LoginCredentials, RemoteAccount, RemoteConnection, RemoteInstitution,
    RemoteJob, RemoteTransaction,
};
use ledgerlink_core::api::{ApiError, BankingProvider};
use ledgerlink_core::domain::{DateRange, TaxCategory};
use ledgerlink_core::store::Store;
use ledgerlink_sync::config::SyncConfig;
use ledgerlink_sync::{BankService, SilentProgress, SyncError, SyncReconciler};

// ── Fixtures ────────────────────────────────────────────────────────

fn connection(id: &str) -> RemoteConnection {
    RemoteConnection {
        id: id.into(),
        status: Some("success".into()),
        institution: InstitutionRef { id: "inst-au".into() },
        last_used: Some("2026-03-01T10:00:00Z".into()),
    }
}

fn account(id: &str, connection_id: &str, balance: f64) -> RemoteAccount {
    RemoteAccount {
        id: id.into(),
        name: Some("Everyday".into()),
        currency: Some("AUD".into()),
        balance: Some(balance),
        available_funds: Some(balance),
        status: Some("available".into()),
        connection: Some(connection_id.into()),
    }
}

fn transaction(id: &str, account_id: &str, amount: f64, description: &str) -> RemoteTransaction {
    RemoteTransaction {
        id: id.into(),
        description: Some(description.into()),
        amount,
        direction: Some(if amount >= 0.0 { "credit" } else { "debit" }.into()),
        raw_category: None,
        merchant: None,
        post_date: Some("2026-03-05".into()),
        transaction_date: Some("2026-03-05".into()),
        account: Some(account_id.into()),
    }
}

/// Scripted provider: fixed fixtures, a job status sequence, and call
/// counters for asserting what was (not) contacted.
struct FakeProvider {
    connections: Vec<RemoteConnection>,
    accounts: Vec<RemoteAccount>,
    transactions: HashMap<String, Vec<RemoteTransaction>>,
    job_statuses: Mutex<Vec<&'static str>>,
    available: AtomicBool,
    transaction_calls: AtomicUsize,
}

impl FakeProvider {
    fn new() -> Self {
        Self {
            connections: Vec::new(),
            accounts: Vec::new(),
            transactions: HashMap::new(),
            job_statuses: Mutex::new(vec!["completed"]),
            available: AtomicBool::new(true),
            transaction_calls: AtomicUsize::new(0),
        }
    }
}

impl BankingProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    fn create_connection(
        &self,
        _user_id: &str,
        _institution_id: &str,
        _credentials: &LoginCredentials,
    ) -> Result<RemoteJob, ApiError> {
        Ok(RemoteJob {
            id: "job-create".into(),
            status: None,
            steps: Vec::new(),
        })
    }

    fn refresh_connection(&self, _connection_id: &str) -> Result<RemoteJob, ApiError> {
        Ok(RemoteJob {
            id: "job-refresh".into(),
            status: None,
            steps: Vec::new(),
        })
    }

    fn delete_connection(&self, _connection_id: &str) -> Result<(), ApiError> {
        Ok(())
    }

    fn list_connections(&self, _user_id: &str) -> Result<Vec<RemoteConnection>, ApiError> {
        Ok(self.connections.clone())
    }

    fn list_accounts(&self, _user_id: &str) -> Result<Vec<RemoteAccount>, ApiError> {
        Ok(self.accounts.clone())
    }

    fn list_transactions(
        &self,
        account_id: &str,
        _range: Option<&DateRange>,
    ) -> Result<Vec<RemoteTransaction>, ApiError> {
        self.transaction_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .transactions
            .get(account_id)
            .cloned()
            .unwrap_or_default())
    }

    fn list_institutions(&self) -> Result<Vec<RemoteInstitution>, ApiError> {
        Ok(vec![RemoteInstitution {
            id: "inst-au".into(),
            name: "Example Bank".into(),
            country: Some("Australia".into()),
        }])
    }

    fn get_job(&self, job_id: &str) -> Result<RemoteJob, ApiError> {
        let mut statuses = self.job_statuses.lock().unwrap();
        let status = if statuses.len() > 1 {
            statuses.remove(0)
        } else {
            statuses[0]
        };
        Ok(RemoteJob {
            id: job_id.into(),
            status: Some(status.into()),
            steps: Vec::new(),
        })
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

fn service_with(provider: Arc<FakeProvider>) -> (BankService, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = SyncConfig::default();
    config.database.path = dir.path().join("ledger.db");
    config.jobs.poll_interval_secs = 1;
    (BankService::new(provider, &config), dir)
}

// ── Reconciler ──────────────────────────────────────────────────────

#[test]
fn partial_batch_failure_syncs_the_rest_and_records_one_error() {
    let mut provider = FakeProvider::new();
    provider.transactions.insert(
        "acc-1".into(),
        vec![
            transaction("txn-1", "acc-1", -50.0, "Officeworks stationery"),
            transaction("", "acc-1", -10.0, "corrupt item"),
            transaction("txn-3", "acc-1", -30.0, "Coles groceries"),
        ],
    );

    let store = Store::open_in_memory().unwrap();
    let reconciler = SyncReconciler::new(&provider, &store, 50);
    let result = reconciler.sync_transactions("acc-1", None).unwrap();

    assert_eq!(result.transactions_synced, 2);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("#2"), "error was: {}", result.errors[0]);

    assert!(store.get_transaction("txn-1").unwrap().is_some());
    assert!(store.get_transaction("txn-3").unwrap().is_some());
}

#[test]
fn overlapping_sync_runs_converge_to_the_latest_payload() {
    let mut provider = FakeProvider::new();
    provider.transactions.insert(
        "acc-1".into(),
        vec![transaction("txn-1", "acc-1", -100.0, "GitHub subscription")],
    );

    let store = Store::open_in_memory().unwrap();
    {
        let reconciler = SyncReconciler::new(&provider, &store, 50);
        reconciler.sync_transactions("acc-1", None).unwrap();
    }

    provider.transactions.get_mut("acc-1").unwrap()[0].amount = -110.0;
    let reconciler = SyncReconciler::new(&provider, &store, 50);
    reconciler.sync_transactions("acc-1", None).unwrap();

    let rows = store.list_transactions("acc-1").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].amount, -110.0);
}

#[test]
fn business_transactions_get_category_and_gst() {
    let mut provider = FakeProvider::new();
    let mut txn = transaction("txn-1", "acc-1", -110.0, "Adobe subscription");
    txn.merchant = Some("Adobe".into());
    provider.transactions.insert("acc-1".into(), vec![txn]);

    let store = Store::open_in_memory().unwrap();
    let reconciler = SyncReconciler::new(&provider, &store, 50);
    reconciler.sync_transactions("acc-1", None).unwrap();

    let stored = store.get_transaction("txn-1").unwrap().unwrap();
    assert_eq!(stored.tax_category, TaxCategory::Software);
    assert!(stored.is_business);
    assert_eq!(stored.gst_amount, Some(10.0));
}

#[test]
fn personal_spend_is_categorized_without_gst() {
    let mut provider = FakeProvider::new();
    let mut txn = transaction("txn-1", "acc-1", -45.0, "WOOLWORTHS 123 SYDNEY");
    txn.merchant = Some("Woolworths".into());
    provider.transactions.insert("acc-1".into(), vec![txn]);

    let store = Store::open_in_memory().unwrap();
    let reconciler = SyncReconciler::new(&provider, &store, 50);
    reconciler.sync_transactions("acc-1", None).unwrap();

    let stored = store.get_transaction("txn-1").unwrap().unwrap();
    assert_eq!(stored.tax_category, TaxCategory::Personal);
    assert_eq!(stored.gst_amount, None);
}

#[test]
fn account_resync_refreshes_balances() {
    let mut provider = FakeProvider::new();
    provider.accounts = vec![account("acc-1", "conn-1", 100.0)];

    let store = Store::open_in_memory().unwrap();
    {
        let reconciler = SyncReconciler::new(&provider, &store, 50);
        assert_eq!(reconciler.sync_accounts("user-1").unwrap().accounts_synced, 1);
    }

    provider.accounts[0].balance = Some(175.5);
    let reconciler = SyncReconciler::new(&provider, &store, 50);
    reconciler.sync_accounts("user-1").unwrap();

    let accounts = store.list_accounts("user-1").unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].balance, 175.5);
}

// ── Service ─────────────────────────────────────────────────────────

#[test]
fn create_connection_waits_for_the_job_then_mirrors_accounts() {
    let mut provider = FakeProvider::new();
    provider.connections = vec![connection("conn-1")];
    provider.accounts = vec![account("acc-1", "conn-1", 42.0)];
    let provider = Arc::new(provider);
    let (service, _dir) = service_with(provider.clone());

    let credentials = LoginCredentials {
        login_id: "user".into(),
        password: "pass".into(),
    };
    let result = service
        .create_connection("user-1", "inst-au", &credentials)
        .unwrap();

    assert_eq!(result.accounts_synced, 1);
    assert!(result.is_clean());
}

#[test]
fn failed_job_surfaces_as_job_failed() {
    let provider = FakeProvider::new();
    *provider.job_statuses.lock().unwrap() = vec!["failed"];
    let (service, _dir) = service_with(Arc::new(provider));

    let credentials = LoginCredentials {
        login_id: "user".into(),
        password: "bad".into(),
    };
    let err = service
        .create_connection("user-1", "inst-au", &credentials)
        .unwrap_err();
    assert!(matches!(err, SyncError::JobFailed { .. }));
}

#[test]
fn refresh_connection_syncs_accounts_and_their_transactions() {
    let mut provider = FakeProvider::new();
    provider.connections = vec![connection("conn-1")];
    provider.accounts = vec![account("acc-1", "conn-1", 10.0)];
    provider.transactions.insert(
        "acc-1".into(),
        vec![
            transaction("txn-1", "acc-1", -20.0, "Telstra internet"),
            transaction("txn-2", "acc-1", 500.0, "Client payment invoice 7"),
        ],
    );
    let (service, _dir) = service_with(Arc::new(provider));

    let result = service.refresh_connection("user-1", "conn-1").unwrap();
    assert_eq!(result.accounts_synced, 1);
    assert_eq!(result.transactions_synced, 2);
    assert!(result.is_clean());
}

#[test]
fn bulk_sync_aggregates_across_connections() {
    let mut provider = FakeProvider::new();
    provider.connections = vec![connection("conn-1"), connection("conn-2")];
    provider.accounts = vec![
        account("acc-1", "conn-1", 10.0),
        account("acc-2", "conn-2", 20.0),
    ];
    provider.transactions.insert(
        "acc-1".into(),
        vec![transaction("txn-1", "acc-1", -5.0, "Cafe lunch")],
    );
    provider.transactions.insert(
        "acc-2".into(),
        vec![
            transaction("txn-2", "acc-2", -15.0, "Qantas flight"),
            transaction("txn-3", "acc-2", -2.5, "bank fee"),
        ],
    );
    let (service, _dir) = service_with(Arc::new(provider));

    let result = service.sync_user_bank_data("user-1", &SilentProgress).unwrap();
    assert_eq!(result.accounts_synced, 2);
    assert_eq!(result.transactions_synced, 3);
    assert!(result.is_clean());
}

#[test]
fn unavailable_provider_skips_connections_without_upstream_contact() {
    let mut provider = FakeProvider::new();
    provider.connections = vec![connection("conn-1"), connection("conn-2")];
    provider.accounts = vec![
        account("acc-1", "conn-1", 10.0),
        account("acc-2", "conn-2", 20.0),
    ];
    provider
        .transactions
        .insert("acc-1".into(), vec![transaction("txn-1", "acc-1", -5.0, "x")]);
    provider.available.store(false, Ordering::SeqCst);
    let provider = Arc::new(provider);
    let (service, _dir) = service_with(provider.clone());

    let result = service.sync_user_bank_data("user-1", &SilentProgress).unwrap();

    assert_eq!(result.transactions_synced, 0);
    assert_eq!(result.errors.len(), 2);
    assert!(result.errors.iter().all(|e| e.contains("provider unavailable")));
    assert_eq!(provider.transaction_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn disconnect_removes_the_local_connection() {
    let mut provider = FakeProvider::new();
    provider.connections = vec![connection("conn-1")];
    let provider = Arc::new(provider);
    let (service, _dir) = service_with(provider.clone());

    // Mirror first so there is something to remove.
    service.sync_user_bank_data("user-1", &SilentProgress).unwrap();

    let db_path = _dir.path().join("ledger.db");
    let store = Store::open(&db_path).unwrap();
    assert!(store.get_connection("conn-1").unwrap().is_some());
    drop(store);

    service.disconnect_connection("conn-1").unwrap();

    let store = Store::open(&db_path).unwrap();
    assert!(store.get_connection("conn-1").unwrap().is_none());
}
