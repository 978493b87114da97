//! Logsync Ingest Library
//!
//! Drains time-partitioned log export files from object storage into an
//! ingestion service. Each export container is a stream; its files are
//! ingested strictly oldest first, one at a time, and deleted after the
//! service acknowledged them. Streams are drained in parallel by a bounded
//! worker pool.
//!
//! # Example
//!
//! ```no_run
//! use logsync_ingest::{
//!     HttpIngestClient, HttpIngestConfig, S3Storage, S3StorageConfig, Scheduler,
//!     StreamDirectory, SyncConfig, TracingReporter,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SyncConfig::default();
//!     let storage = Arc::new(S3Storage::new(S3StorageConfig::from_env()?).await?);
//!     let sink = Arc::new(HttpIngestClient::new(HttpIngestConfig::new(
//!         "https://api.axiom.co",
//!         "xaat-token",
//!     ))?);
//!
//!     let scheduler = Scheduler::new(config.clone(), Arc::new(TracingReporter));
//!     scheduler.start(StreamDirectory::new(config.naming()), storage, sink)?;
//!     tokio::signal::ctrl_c().await?;
//!     let summary = scheduler.stop().await?;
//!     println!("{summary}");
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod backoff;
pub mod compression;
pub mod config;
pub mod cursor;
pub mod directory;
pub mod naming;
pub mod pipeline;
pub mod pool;
pub mod report;
pub mod scheduler;
pub mod sink;
pub mod storage;
pub mod timestamp;

pub use config::SyncConfig;
pub use cursor::{ExportFile, NextFile, StreamCursor};
pub use directory::{Stream, StreamDirectory};
pub use naming::DestinationNaming;
pub use report::{Reporter, SyncSummary, TracingReporter};
pub use scheduler::Scheduler;
pub use sink::{HttpIngestClient, HttpIngestConfig, IngestError, IngestSink, IngestStatus};
pub use storage::{BlobStorage, ByteStream, ListPage, S3Storage, S3StorageConfig, StorageError};
pub use timestamp::{resolve, ChronoKey, ParseError};
