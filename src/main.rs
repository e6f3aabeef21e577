use chrono::Utc;
use clap::Parser;
use miette::{IntoDiagnostic, Result, miette};
use panel_orders::application::expiry::{CloseOrderHandler, ExpiryWorker};
use panel_orders::application::workflow::OrderWorkflow;
use panel_orders::config::OrderConfig;
use panel_orders::domain::ports::Repositories;
use panel_orders::infrastructure::in_memory::{InMemoryStore, InMemoryTaskQueue};
#[cfg(feature = "storage-rocksdb")]
use panel_orders::infrastructure::rocksdb::RocksDBStore;
use panel_orders::interfaces::catalog::Catalog;
use panel_orders::interfaces::csv::order_writer::OrderWriter;
use panel_orders::interfaces::csv::request_reader::RequestReader;
use panel_orders::telemetry::{LogFormat, init_tracing};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Catalog JSON with plans, coupons, payment methods, users and subscriptions
    catalog: PathBuf,

    /// Order requests CSV file
    requests: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Refuse purchases from users already holding a subscription
    #[arg(long, env = "SUBSCRIBE_SINGLE_MODEL")]
    single_model: bool,

    /// Minutes an unpaid order stays open
    #[arg(long, env = "ORDER_CLOSE_MINUTES", default_value_t = 15)]
    close_minutes: u64,

    /// Run the expiry worker as if the close window had elapsed
    #[arg(long)]
    close_unpaid: bool,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let repos = open_repositories(cli.db_path.as_ref())?;
    let queue = Arc::new(InMemoryTaskQueue::new());
    let window = close_window(cli.close_minutes)?;
    let config = OrderConfig::default()
        .with_single_subscription_mode(cli.single_model)
        .with_close_order_after(window.to_std().into_diagnostic()?);

    let catalog = Catalog::from_reader(File::open(&cli.catalog).into_diagnostic()?)?;
    catalog.seed(&repos).await?;

    let workflow = OrderWorkflow::new(repos.clone(), queue.clone(), config);

    let file = File::open(&cli.requests).into_diagnostic()?;
    let reader = RequestReader::new(file);
    for (line, record) in reader.requests().enumerate() {
        let (user_id, request) = match record.and_then(|r| r.into_request()) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(line = line + 1, error = %e, "skipping malformed request");
                continue;
            }
        };
        let user = repos.users.find(user_id).await.into_diagnostic()?;
        if let Err(e) = workflow.submit(user.as_ref(), request).await {
            warn!(line = line + 1, user_id, kind = ?e.kind(), error = %e, "request rejected");
        }
    }

    if cli.close_unpaid {
        let handler = CloseOrderHandler::new(
            repos.orders.clone(),
            repos.users.clone(),
            repos.transactions.clone(),
        );
        let worker = ExpiryWorker::new(queue, handler);
        let deadline = Utc::now()
            .checked_add_signed(window)
            .ok_or_else(|| miette!("close window of {window} is out of range"))?;
        let report = worker.run_due(deadline).await?;
        info!(processed = report.processed, failed = report.failed, "expiry worker done");
    }

    let mut orders = repos.orders.all_orders().await.into_diagnostic()?;
    orders.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.order_no.cmp(&b.order_no))
    });

    let stdout = io::stdout();
    let mut writer = OrderWriter::new(stdout.lock());
    writer.write_orders(&orders)?;

    Ok(())
}

/// Converts `--close-minutes` into a window that still yields a valid deadline.
fn close_window(minutes: u64) -> Result<chrono::Duration> {
    let window = minutes
        .checked_mul(60)
        .and_then(|secs| chrono::Duration::from_std(Duration::from_secs(secs)).ok())
        .filter(|window| Utc::now().checked_add_signed(*window).is_some())
        .ok_or_else(|| miette!("--close-minutes {minutes} is out of range"))?;
    Ok(window)
}

#[cfg(feature = "storage-rocksdb")]
fn open_repositories(db_path: Option<&PathBuf>) -> Result<Repositories> {
    match db_path {
        Some(path) => {
            let store = RocksDBStore::open(path).into_diagnostic()?;
            Ok(Repositories::from_store(store))
        }
        None => Ok(Repositories::from_store(InMemoryStore::new())),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_repositories(db_path: Option<&PathBuf>) -> Result<Repositories> {
    if db_path.is_some() {
        warn!(
            "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(Repositories::from_store(InMemoryStore::new()))
}
