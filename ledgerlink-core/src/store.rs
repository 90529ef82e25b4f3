//! SQLite store for mirrored aggregator records.
//!
//! Every record is keyed by its aggregator-assigned remote id (UNIQUE), so
//! upserts are idempotent: re-syncing overlapping data converges to one row
//! per remote id with the latest field values. Each upsert is one atomic
//! statement, which is what lets a batch continue past a failed item.

use std::path::Path;

use rusqlite::{params, Connection as DbConnection, OptionalExtension};
use thiserror::Error;

use crate::domain::{
    Account, Connection, ConnectionStatus, Direction, TaxCategory, Transaction,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS connections (
    id INTEGER PRIMARY KEY,
    remote_id TEXT NOT NULL UNIQUE,
    user_id TEXT NOT NULL,
    institution_id TEXT NOT NULL,
    status TEXT NOT NULL,
    last_used TEXT,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY,
    remote_id TEXT NOT NULL UNIQUE,
    connection_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    currency TEXT NOT NULL,
    balance REAL NOT NULL,
    available_balance REAL,
    status TEXT NOT NULL,
    last_synced_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY,
    remote_id TEXT NOT NULL UNIQUE,
    account_id TEXT NOT NULL,
    amount REAL NOT NULL,
    direction TEXT NOT NULL,
    description TEXT NOT NULL,
    merchant TEXT,
    raw_category TEXT,
    post_date TEXT,
    transaction_date TEXT NOT NULL,
    tax_category TEXT NOT NULL,
    is_business INTEGER NOT NULL DEFAULT 0,
    gst_amount REAL,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_accounts_connection ON accounts(connection_id);
CREATE INDEX IF NOT EXISTS idx_transactions_account ON transactions(account_id);
CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(transaction_date);
";

/// Handle on the local database. Open one per thread of work; SQLite's own
/// locking (plus a busy timeout) coordinates concurrent writers.
pub struct Store {
    conn: DbConnection,
}

impl Store {
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        let conn = DbConnection::open(db_path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = DbConnection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    // ── Connections ─────────────────────────────────────────────────

    pub fn upsert_connection(&self, connection: &Connection) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO connections (remote_id, user_id, institution_id, status, last_used)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(remote_id) DO UPDATE SET
                 status = excluded.status,
                 last_used = excluded.last_used",
            params![
                connection.remote_id,
                connection.user_id,
                connection.institution_id,
                connection.status.as_str(),
                connection.last_used.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
            ],
        )?;
        Ok(())
    }

    pub fn get_connection(&self, remote_id: &str) -> Result<Option<Connection>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT remote_id, user_id, institution_id, status, last_used
                 FROM connections WHERE remote_id = ?1",
                [remote_id],
                |row| {
                    Ok(Connection {
                        remote_id: row.get(0)?,
                        user_id: row.get(1)?,
                        institution_id: row.get(2)?,
                        status: ConnectionStatus::parse(&row.get::<_, String>(3)?),
                        last_used: row
                            .get::<_, Option<String>>(4)?
                            .and_then(|s| {
                                chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S").ok()
                            }),
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Remove a connection on explicit disconnect. Mirrored accounts and
    /// transactions are kept for history.
    pub fn delete_connection(&self, remote_id: &str) -> Result<bool, StoreError> {
        let n = self
            .conn
            .execute("DELETE FROM connections WHERE remote_id = ?1", [remote_id])?;
        Ok(n > 0)
    }

    // ── Accounts ────────────────────────────────────────────────────

    pub fn upsert_account(&self, account: &Account) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO accounts
                 (remote_id, connection_id, user_id, name, currency, balance,
                  available_balance, status, last_synced_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, datetime('now'))
             ON CONFLICT(remote_id) DO UPDATE SET
                 balance = excluded.balance,
                 available_balance = excluded.available_balance,
                 status = excluded.status,
                 name = excluded.name,
                 last_synced_at = datetime('now')",
            params![
                account.remote_id,
                account.connection_id,
                account.user_id,
                account.name,
                account.currency,
                account.balance,
                account.available_balance,
                account.status,
            ],
        )?;
        Ok(())
    }

    pub fn list_accounts(&self, user_id: &str) -> Result<Vec<Account>, StoreError> {
        self.query_accounts(
            "SELECT remote_id, connection_id, user_id, name, currency, balance,
                    available_balance, status
             FROM accounts WHERE user_id = ?1 ORDER BY remote_id",
            user_id,
        )
    }

    pub fn list_accounts_for_connection(
        &self,
        connection_id: &str,
    ) -> Result<Vec<Account>, StoreError> {
        self.query_accounts(
            "SELECT remote_id, connection_id, user_id, name, currency, balance,
                    available_balance, status
             FROM accounts WHERE connection_id = ?1 ORDER BY remote_id",
            connection_id,
        )
    }

    fn query_accounts(&self, sql: &str, key: &str) -> Result<Vec<Account>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map([key], |row| {
                Ok(Account {
                    remote_id: row.get(0)?,
                    connection_id: row.get(1)?,
                    user_id: row.get(2)?,
                    name: row.get(3)?,
                    currency: row.get(4)?,
                    balance: row.get(5)?,
                    available_balance: row.get(6)?,
                    status: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Transactions ────────────────────────────────────────────────

    pub fn upsert_transaction(&self, txn: &Transaction) -> Result<(), StoreError> {
        if txn.remote_id.trim().is_empty() {
            return Err(StoreError::InvalidRecord(
                "transaction remote id is empty".into(),
            ));
        }
        self.conn.execute(
            "INSERT INTO transactions
                 (remote_id, account_id, amount, direction, description, merchant,
                  raw_category, post_date, transaction_date, tax_category,
                  is_business, gst_amount)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(remote_id) DO UPDATE SET
                 amount = excluded.amount,
                 direction = excluded.direction,
                 description = excluded.description,
                 merchant = excluded.merchant,
                 raw_category = excluded.raw_category,
                 post_date = excluded.post_date,
                 transaction_date = excluded.transaction_date,
                 tax_category = excluded.tax_category,
                 is_business = excluded.is_business,
                 gst_amount = excluded.gst_amount,
                 updated_at = datetime('now')",
            params![
                txn.remote_id,
                txn.account_id,
                txn.amount,
                txn.direction.as_str(),
                txn.description,
                txn.merchant,
                txn.raw_category,
                txn.post_date.map(|d| d.format("%Y-%m-%d").to_string()),
                txn.transaction_date.format("%Y-%m-%d").to_string(),
                txn.tax_category.as_str(),
                txn.is_business,
                txn.gst_amount,
            ],
        )?;
        Ok(())
    }

    pub fn get_transaction(&self, remote_id: &str) -> Result<Option<Transaction>, StoreError> {
        let row = self
            .conn
            .query_row(
                &format!("{TXN_SELECT} WHERE remote_id = ?1"),
                [remote_id],
                map_transaction_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn list_transactions(&self, account_id: &str) -> Result<Vec<Transaction>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "{TXN_SELECT} WHERE account_id = ?1 ORDER BY transaction_date, remote_id"
            ))?;
        let rows = stmt
            .query_map([account_id], map_transaction_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Row counts for the status report: (connections, accounts, transactions).
    pub fn counts(&self) -> Result<(usize, usize, usize), StoreError> {
        let count = |table: &str| -> Result<usize, rusqlite::Error> {
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
        };
        Ok((
            count("connections")?,
            count("accounts")?,
            count("transactions")?,
        ))
    }
}

const TXN_SELECT: &str = "SELECT remote_id, account_id, amount, direction, description, merchant,
        raw_category, post_date, transaction_date, tax_category, is_business, gst_amount
 FROM transactions";

fn map_transaction_row(row: &rusqlite::Row<'_>) -> Result<Transaction, rusqlite::Error> {
    let direction: String = row.get(3)?;
    let post_date: Option<String> = row.get(7)?;
    let transaction_date: String = row.get(8)?;
    let tax_category: String = row.get(9)?;
    Ok(Transaction {
        remote_id: row.get(0)?,
        account_id: row.get(1)?,
        amount: row.get(2)?,
        direction: if direction == "credit" {
            Direction::Credit
        } else {
            Direction::Debit
        },
        description: row.get(4)?,
        merchant: row.get(5)?,
        raw_category: row.get(6)?,
        post_date: post_date.and_then(|s| chrono::NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
        transaction_date: chrono::NaiveDate::parse_from_str(&transaction_date, "%Y-%m-%d")
            .unwrap_or_default(),
        tax_category: TaxCategory::parse(&tax_category),
        is_business: row.get(10)?,
        gst_amount: row.get(11)?,
    })
}
