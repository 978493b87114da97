//! Logsync - log export sync service

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use logsync_common::logging::{init_logging, LogConfig, LogLevel};
use logsync_ingest::{
    config::{
        DEFAULT_CYCLE_INTERVAL_SECS, DEFAULT_LIST_BACKOFF_INITIAL_SECS,
        DEFAULT_LIST_BACKOFF_MAX_SECS, DEFAULT_MAX_QUEUED_TASKS, DEFAULT_STREAM_PREFIX,
        DEFAULT_TIMESTAMP_FIELD, DEFAULT_WORKER_POOL_SIZE,
    },
    sink::http::DEFAULT_INGEST_URL,
    HttpIngestClient, HttpIngestConfig, S3Storage, S3StorageConfig, Scheduler, StreamCursor,
    StreamDirectory, SyncConfig, TracingReporter,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "logsync")]
#[command(author, version, about = "Sync log export files into an ingestion service")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the sync service until interrupted
    Export(ExportArgs),

    /// List export streams, their destinations and whether they hold files
    Streams(NamingArgs),
}

#[derive(Args, Debug)]
struct NamingArgs {
    /// Prefix of export container names
    #[arg(long, env = "STREAM_PREFIX", default_value = DEFAULT_STREAM_PREFIX)]
    stream_prefix: String,

    /// Prefix added to destination names
    #[arg(long, env = "DESTINATION_PREFIX", default_value = "")]
    destination_prefix: String,
}

#[derive(Args, Debug)]
struct ExportArgs {
    #[command(flatten)]
    naming: NamingArgs,

    /// Base URL of the ingestion service
    #[arg(long, env = "INGEST_URL", default_value = DEFAULT_INGEST_URL)]
    ingest_url: String,

    /// API token of the ingestion service
    #[arg(long, env = "INGEST_TOKEN", hide_env_values = true)]
    ingest_token: String,

    /// Organization id, needed with personal tokens
    #[arg(long, env = "INGEST_ORG_ID")]
    org_id: Option<String>,

    /// Record field carrying the event time
    #[arg(long, env = "TIMESTAMP_FIELD", default_value = DEFAULT_TIMESTAMP_FIELD)]
    timestamp_field: String,

    /// Streams drained concurrently
    #[arg(long, env = "WORKER_POOL_SIZE", default_value_t = DEFAULT_WORKER_POOL_SIZE)]
    workers: usize,

    /// Drain tasks waiting for a worker before submission blocks
    #[arg(long, env = "MAX_QUEUED_TASKS", default_value_t = DEFAULT_MAX_QUEUED_TASKS)]
    max_queued: usize,

    /// Seconds between cycles
    #[arg(long, env = "CYCLE_INTERVAL_SECS", default_value_t = DEFAULT_CYCLE_INTERVAL_SECS)]
    interval_secs: u64,

    /// First delay after a failed stream listing, 0 retries immediately
    #[arg(long, env = "LIST_BACKOFF_INITIAL_SECS", default_value_t = DEFAULT_LIST_BACKOFF_INITIAL_SECS)]
    backoff_initial_secs: u64,

    /// Upper bound of the listing backoff
    #[arg(long, env = "LIST_BACKOFF_MAX_SECS", default_value_t = DEFAULT_LIST_BACKOFF_MAX_SECS)]
    backoff_max_secs: u64,
}

impl ExportArgs {
    fn sync_config(&self) -> SyncConfig {
        SyncConfig::default()
            .with_workers(self.workers, self.max_queued)
            .with_cycle_interval(Duration::from_secs(self.interval_secs))
            .with_list_backoff(
                Duration::from_secs(self.backoff_initial_secs),
                Duration::from_secs(self.backoff_max_secs),
            )
            .with_timestamp_field(&self.timestamp_field)
            .with_prefixes(&self.naming.stream_prefix, &self.naming.destination_prefix)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before clap reads its env fallbacks
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("logsync")
        .build();

    // Environment variables take precedence
    let log_config = LogConfig::from_env_or(log_config)?;
    let _guard = init_logging(&log_config)?;

    match cli.command {
        Command::Export(args) => export(args).await,
        Command::Streams(args) => streams(args).await,
    }
}

async fn export(args: ExportArgs) -> Result<()> {
    let config = args.sync_config();
    config.validate()?;

    let storage = S3Storage::new(S3StorageConfig::from_env()?)
        .await
        .context("Failed to initialize export storage")?;
    let sink = HttpIngestClient::new(
        HttpIngestConfig::new(&args.ingest_url, &args.ingest_token).with_org_id(args.org_id.clone()),
    )
    .context("Failed to initialize ingest client")?;

    info!(
        workers = config.worker_pool_size,
        queued = config.max_queued_tasks,
        interval_secs = config.cycle_interval.as_secs(),
        stream_prefix = %config.stream_prefix,
        "Starting sync"
    );

    let scheduler = Scheduler::new(config.clone(), Arc::new(TracingReporter));
    scheduler.start(
        StreamDirectory::new(config.naming()),
        Arc::new(storage),
        Arc::new(sink),
    )?;

    shutdown_signal().await;

    let summary = scheduler.stop().await?;
    info!("Sync stopped: {summary}");
    Ok(())
}

async fn streams(args: NamingArgs) -> Result<()> {
    let config = SyncConfig::default().with_prefixes(&args.stream_prefix, &args.destination_prefix);
    config.validate()?;

    let storage = Arc::new(S3Storage::new(S3StorageConfig::from_env()?).await?);
    let cursor = StreamCursor::new(storage.clone());

    for stream in StreamDirectory::new(config.naming())
        .list_streams(storage.as_ref())
        .await?
    {
        let pending = if cursor.has_any(stream.name()).await? {
            "pending"
        } else {
            "empty"
        };
        println!("{}\t{}\t{}", stream.name(), stream.destination(), pending);
    }

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, finishing in-flight files");
        },
        _ = terminate => {
            info!("Received terminate signal, finishing in-flight files");
        },
    }
}
