//! LedgerLink CLI — link, refresh, sync, and inspection commands.
//!
//! Commands:
//! - `institutions` — list institutions available at the aggregator
//! - `link` — connect a user to an institution and mirror their accounts
//! - `refresh` — refresh a connection and re-sync its data
//! - `sync` — bulk sync everything a user has linked
//! - `accounts` / `transactions` — fetch, mirror, and print records
//! - `disconnect` — remove a connection upstream and locally
//! - `status` — report local store row counts

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use ledgerlink_core::api::models::LoginCredentials;
use ledgerlink_core::api::{
    AggregatorClient, BankingProvider, BreakerRegistry, GatewayConfig, HttpTransport, RateLimiter,
    RequestGateway, TokenManager,
};
use ledgerlink_core::domain::{DateRange, SyncResult};
use ledgerlink_core::store::Store;
use ledgerlink_sync::{BankService, StdoutProgress, SyncConfig};

#[derive(Parser)]
#[command(
    name = "ledgerlink",
    about = "LedgerLink CLI — bank data sync with tax categorization"
)]
struct Cli {
    /// Path to a TOML config file. Defaults and environment variables are
    /// used when absent.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List institutions available at the aggregator.
    Institutions,
    /// Link a user to an institution and mirror their accounts.
    Link {
        /// Aggregator user id.
        #[arg(long)]
        user: String,

        /// Institution id (see `institutions`).
        #[arg(long)]
        institution: String,

        /// Institution login id.
        #[arg(long)]
        login_id: String,

        /// Institution password.
        #[arg(long)]
        password: String,
    },
    /// Refresh a connection and re-sync its accounts and transactions.
    Refresh {
        /// Aggregator user id.
        #[arg(long)]
        user: String,

        /// Connection id to refresh.
        #[arg(long)]
        connection: String,
    },
    /// Bulk sync all connections, accounts, and transactions for a user.
    Sync {
        /// Aggregator user id.
        #[arg(long)]
        user: String,
    },
    /// Fetch and print a user's accounts.
    Accounts {
        /// Aggregator user id.
        #[arg(long)]
        user: String,
    },
    /// Fetch and print an account's transactions.
    Transactions {
        /// Account id.
        #[arg(long)]
        account: String,

        /// Start date (YYYY-MM-DD).
        #[arg(long)]
        from: Option<String>,

        /// End date (YYYY-MM-DD).
        #[arg(long)]
        to: Option<String>,
    },
    /// Remove a connection upstream and locally.
    Disconnect {
        /// Connection id to remove.
        #[arg(long)]
        connection: String,
    },
    /// Report local store row counts.
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Institutions => {
            let (client, _) = build_stack(&config)?;
            for inst in client.list_institutions()? {
                let country = inst.country.as_deref().unwrap_or("-");
                println!("{:<24} {:<32} {country}", inst.id, inst.name);
            }
        }
        Commands::Link {
            user,
            institution,
            login_id,
            password,
        } => {
            let (_, service) = build_stack(&config)?;
            let credentials = LoginCredentials { login_id, password };
            let result = service.create_connection(&user, &institution, &credentials)?;
            print_result("Link", &result);
        }
        Commands::Refresh { user, connection } => {
            let (_, service) = build_stack(&config)?;
            let result = service.refresh_connection(&user, &connection)?;
            print_result("Refresh", &result);
        }
        Commands::Sync { user } => {
            let (_, service) = build_stack(&config)?;
            let result = service.sync_user_bank_data(&user, &StdoutProgress)?;
            if !result.is_clean() {
                for error in &result.errors {
                    eprintln!("  error: {error}");
                }
            }
        }
        Commands::Accounts { user } => {
            let (_, service) = build_stack(&config)?;
            for account in service.get_accounts(&user)? {
                println!(
                    "{:<20} {:<24} {:>12.2} {} [{}]",
                    account.remote_id, account.name, account.balance, account.currency,
                    account.status
                );
            }
        }
        Commands::Transactions { account, from, to } => {
            let range = parse_range(from.as_deref(), to.as_deref())?;
            let (_, service) = build_stack(&config)?;
            for txn in service.get_transactions(&account, range.as_ref())? {
                let gst = txn
                    .gst_amount
                    .map(|g| format!("{g:.2}"))
                    .unwrap_or_else(|| "-".into());
                println!(
                    "{} {:>10.2} {:<10} {:<16} gst={gst} {}",
                    txn.transaction_date,
                    txn.amount,
                    txn.direction.as_str(),
                    txn.tax_category.as_str(),
                    txn.description
                );
            }
        }
        Commands::Disconnect { connection } => {
            let (_, service) = build_stack(&config)?;
            service.disconnect_connection(&connection)?;
            println!("Disconnected {connection}");
        }
        Commands::Status => {
            let store = Store::open(&config.database.path)
                .with_context(|| format!("opening {}", config.database.path.display()))?;
            let (connections, accounts, transactions) = store.counts()?;
            println!("Store: {}", config.database.path.display());
            println!("  connections:  {connections}");
            println!("  accounts:     {accounts}");
            println!("  transactions: {transactions}");
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<SyncConfig> {
    match path {
        Some(path) => {
            SyncConfig::load(path).with_context(|| format!("loading {}", path.display()))
        }
        None => Ok(SyncConfig::from_env()?),
    }
}

/// Build the full client stack from config: transport → tokens → gateway →
/// client → service.
fn build_stack(config: &SyncConfig) -> Result<(Arc<AggregatorClient>, BankService)> {
    if config.api.api_key.is_empty() {
        bail!("no API key configured; set LEDGERLINK_API_KEY or api.api_key in the config file");
    }

    let transport = Arc::new(HttpTransport::new());
    let retry = config.retry.to_policy();
    let tokens = Arc::new(TokenManager::new(
        transport.clone(),
        format!("{}/token", config.api.base_url.trim_end_matches('/')),
        config.api.api_key.clone(),
        config.api.version.clone(),
        Duration::from_secs(config.api.timeout_secs),
        retry.clone(),
    ));
    let gateway = RequestGateway::new(
        transport,
        tokens,
        RateLimiter::new(
            config.rate_limit.max_requests,
            Duration::from_millis(config.rate_limit.window_ms),
        ),
        BreakerRegistry::new(
            config.breaker.failure_threshold,
            Duration::from_secs(config.breaker.open_duration_secs),
        ),
        retry,
        GatewayConfig {
            base_url: config.api.base_url.clone(),
            api_version: config.api.version.clone(),
            timeout: Duration::from_secs(config.api.timeout_secs),
        },
    );
    let client = Arc::new(AggregatorClient::new(gateway));
    let service = BankService::new(client.clone(), config);
    Ok((client, service))
}

fn print_result(label: &str, result: &SyncResult) {
    println!(
        "{label} complete: {} accounts, {} transactions synced",
        result.accounts_synced, result.transactions_synced
    );
    for error in &result.errors {
        eprintln!("  error: {error}");
    }
}

fn parse_range(from: Option<&str>, to: Option<&str>) -> Result<Option<DateRange>> {
    match (from, to) {
        (None, None) => Ok(None),
        (Some(from), Some(to)) => Ok(Some(DateRange {
            from: parse_date(from)?,
            to: parse_date(to)?,
        })),
        _ => bail!("--from and --to must be given together"),
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date '{s}'"))
}
