use clap::{Parser, ValueEnum};
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use webhook_reconciler::application::reconciler::Reconciler;
use webhook_reconciler::config::{LockConfig, ReconcilerConfig};
use webhook_reconciler::domain::ports::{
    SharedCollectionStore, SharedEventStore, SharedLockProvider,
};
use webhook_reconciler::infrastructure::in_memory::{InMemoryCollectionStore, InMemoryEventStore};
use webhook_reconciler::infrastructure::lock::DegradedLockProvider;
use webhook_reconciler::interfaces::csv::collection_reader::CollectionReader;
use webhook_reconciler::interfaces::csv::report_writer::ReportWriter;
use webhook_reconciler::interfaces::jsonl::payload_reader::PayloadReader;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Report {
    /// One row per delivery, in input order
    Outcomes,
    /// Final state of every collection
    Collections,
    /// Stored webhook events
    Events,
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Webhook payloads, one JSON object per line
    input: PathBuf,

    /// Collections CSV to seed before processing
    #[arg(long, env = "RECONCILER_COLLECTIONS")]
    collections: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "RECONCILER_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Redis URL for the distributed collection lock.
    #[arg(long, env = "RECONCILER_REDIS_URL")]
    redis_url: Option<String>,

    /// Deliveries processed concurrently
    #[arg(long, env = "RECONCILER_WORKERS", default_value_t = 4)]
    workers: usize,

    #[arg(long, env = "RECONCILER_LOCK_HOLD_MS", default_value_t = 30_000)]
    lock_hold_ms: u64,

    #[arg(long, env = "RECONCILER_LOCK_WAIT_MS", default_value_t = 10_000)]
    lock_wait_ms: u64,

    #[arg(long, env = "RECONCILER_REPORT", value_enum, default_value_t = Report::Outcomes)]
    report: Report,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ReconcilerConfig::default().with_lock_timeouts(
        Duration::from_millis(cli.lock_hold_ms),
        Duration::from_millis(cli.lock_wait_ms),
    );

    let (events, collections) = open_stores(cli.db_path.as_deref())?;
    let locks = select_locks(cli.redis_url.as_deref(), &config.lock).await;

    if let Some(path) = &cli.collections {
        seed_collections(path, &collections).await?;
    }

    let reconciler = Arc::new(Reconciler::new(events, collections, locks, config));

    let file = File::open(&cli.input).into_diagnostic()?;
    let workers = Arc::new(Semaphore::new(cli.workers.max(1)));
    let mut tasks = JoinSet::new();
    for (index, payload) in PayloadReader::new(BufReader::new(file)).payloads().enumerate() {
        let payload = match payload {
            Ok(payload) => payload,
            Err(e) => {
                error!(line = index + 1, error = %e, "skipping unreadable webhook payload");
                continue;
            }
        };
        let permit = Arc::clone(&workers).acquire_owned().await.into_diagnostic()?;
        let reconciler = Arc::clone(&reconciler);
        tasks.spawn(async move {
            let result = reconciler.process(payload).await;
            drop(permit);
            (index, result)
        });
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined.into_diagnostic()? {
            (index, Ok(outcome)) => outcomes.push((index, outcome)),
            (index, Err(e)) => {
                error!(
                    line = index + 1,
                    error = %e,
                    retryable = e.is_retryable(),
                    "webhook not processed"
                );
            }
        }
    }
    outcomes.sort_by_key(|(index, _)| *index);

    let stats = reconciler.journal().stats().await.into_diagnostic()?;
    info!(
        total = stats.total,
        processed = stats.processed,
        failed = stats.failed,
        applied = stats.applied,
        duplicate_deliveries = stats.duplicate_deliveries,
        "webhook processing finished"
    );

    let stdout = io::stdout();
    let mut writer = ReportWriter::new(stdout.lock());
    match cli.report {
        Report::Outcomes => {
            let outcomes: Vec<_> = outcomes.into_iter().map(|(_, outcome)| outcome).collect();
            writer.write_outcomes(&outcomes).into_diagnostic()?;
        }
        Report::Collections => {
            let all = reconciler.collections().all().await.into_diagnostic()?;
            writer.write_collections(&all).into_diagnostic()?;
        }
        Report::Events => {
            let all = reconciler.journal().list().await.into_diagnostic()?;
            writer.write_events(&all).into_diagnostic()?;
        }
    }

    Ok(())
}

fn in_memory_stores() -> (SharedEventStore, SharedCollectionStore) {
    (
        Arc::new(InMemoryEventStore::new()),
        Arc::new(InMemoryCollectionStore::new()),
    )
}

#[cfg(feature = "storage-rocksdb")]
fn open_stores(db_path: Option<&Path>) -> Result<(SharedEventStore, SharedCollectionStore)> {
    use webhook_reconciler::infrastructure::rocksdb::RocksDBStore;

    match db_path {
        Some(path) => {
            let store = Arc::new(RocksDBStore::open(path).into_diagnostic()?);
            info!(path = %path.display(), "using RocksDB storage");
            let events: SharedEventStore = store.clone();
            let collections: SharedCollectionStore = store;
            Ok((events, collections))
        }
        None => Ok(in_memory_stores()),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_stores(db_path: Option<&Path>) -> Result<(SharedEventStore, SharedCollectionStore)> {
    if let Some(path) = db_path {
        warn!(
            path = %path.display(),
            "RocksDB support not compiled in (feature storage-rocksdb); using in-memory storage"
        );
    }
    Ok(in_memory_stores())
}

fn degraded(reason: &str) -> SharedLockProvider {
    warn!("{}; processing without distributed locks", reason);
    Arc::new(DegradedLockProvider)
}

#[cfg(feature = "lock-redis")]
async fn select_locks(redis_url: Option<&str>, config: &LockConfig) -> SharedLockProvider {
    use webhook_reconciler::infrastructure::lock::CoordinatedLockProvider;
    use webhook_reconciler::infrastructure::redis::RedisCoordinator;

    let Some(url) = redis_url else {
        return degraded("no Redis URL configured");
    };
    let connect = RedisCoordinator::connect(url);
    match tokio::time::timeout(config.backend_timeout, connect).await {
        Ok(Ok(coordinator)) => {
            info!(url, "using Redis collection locks");
            Arc::new(CoordinatedLockProvider::new(Arc::new(coordinator), config))
        }
        Ok(Err(e)) => degraded(&format!("Redis unreachable ({})", e)),
        Err(_) => degraded("Redis did not answer the connection attempt"),
    }
}

#[cfg(not(feature = "lock-redis"))]
async fn select_locks(redis_url: Option<&str>, _config: &LockConfig) -> SharedLockProvider {
    match redis_url {
        Some(_) => degraded("Redis support not compiled in (feature lock-redis)"),
        None => degraded("no Redis URL configured"),
    }
}

/// Seeds collections; rows that fail to parse or already exist are logged and skipped.
async fn seed_collections(path: &Path, store: &SharedCollectionStore) -> Result<()> {
    let file = File::open(path).into_diagnostic()?;
    let mut seeded = 0usize;
    for record in CollectionReader::new(file).records() {
        let created = match record.and_then(|record| record.into_collection()) {
            Ok((collection, ledger)) => store.create(collection, ledger).await,
            Err(e) => Err(e),
        };
        match created {
            Ok(()) => seeded += 1,
            Err(e) => warn!(error = %e, "skipping collection row"),
        }
    }
    info!(seeded, "collections seeded");
    Ok(())
}
