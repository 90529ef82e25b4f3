//! LedgerLink Core — resilient aggregator client, tax rules, local store.
//!
//! This crate contains everything below the sync orchestration layer:
//! - Domain types (connections, accounts, transactions, jobs, sync results)
//! - The resilient API client stack (token manager, rate limiter, circuit
//!   breaker, retry executor, request gateway, job poller)
//! - Tax categorization and GST computation
//! - The SQLite store with idempotent upserts keyed by remote id

pub mod api;
pub mod domain;
pub mod store;
pub mod tax;
