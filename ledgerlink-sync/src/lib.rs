//! LedgerLink Sync — reconciliation orchestration over `ledgerlink-core`.
//!
//! This crate builds on the core client stack to provide:
//! - `SyncReconciler`: idempotent mirroring of connections, accounts, and
//!   transactions with per-item error capture
//! - `BankService`: the caller-facing operations (link, refresh, read,
//!   bulk sync, disconnect)
//! - TOML configuration with defaults and environment overrides

pub mod config;
pub mod reconciler;
pub mod service;

pub use config::{ConfigError, SyncConfig};
pub use reconciler::{SilentProgress, StdoutProgress, SyncProgress, SyncReconciler};
pub use service::{BankService, SyncError};
