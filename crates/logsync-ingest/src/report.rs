//! Progress reporting
//!
//! The scheduler and every drain task talk to an injected [`Reporter`]
//! instead of a global logger. [`TracingReporter`] turns the events into
//! `tracing` records; tests plug in their own.

use chrono::Utc;
use logsync_common::SyncError;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::cursor::ExportFile;
use crate::directory::Stream;
use crate::sink::IngestStatus;

/// Receiver of engine events. Called concurrently from all workers.
pub trait Reporter: Send + Sync {
    fn cycle_started(&self, cycle: u64, streams: usize);

    fn stream_started(&self, stream: &Stream);

    fn file_ingested(&self, stream: &Stream, file: &ExportFile, status: &IngestStatus);

    /// A drain task ended on `error`; other streams are unaffected.
    fn task_failed(&self, stream: &Stream, error: &SyncError);

    /// A drain task died without reporting, e.g. it panicked.
    fn worker_lost(&self, error: &SyncError);

    /// The cycle was abandoned; the next one starts after `retry_in`.
    fn cycle_failed(&self, cycle: u64, error: &SyncError, retry_in: Duration);

    fn cycle_finished(&self, cycle: u64, elapsed: Duration);

    fn stopped(&self, summary: &SyncSummary);
}

/// Reporter backed by `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn cycle_started(&self, cycle: u64, streams: usize) {
        info!(cycle, streams, "Cycle started");
    }

    fn stream_started(&self, stream: &Stream) {
        debug!(stream = stream.name(), destination = stream.destination(), "Draining stream");
    }

    fn file_ingested(&self, stream: &Stream, file: &ExportFile, status: &IngestStatus) {
        let lag_secs = file
            .key()
            .lag_at(Utc::now().naive_utc())
            .map(|lag| lag.num_seconds());
        info!(
            stream = stream.name(),
            destination = stream.destination(),
            path = file.path(),
            lag_secs,
            processed_bytes = status.processed_bytes,
            ingested = status.ingested,
            failed = status.failed,
            "Ingested {}",
            file.key()
        );
        if status.failed > 0 {
            warn!(
                stream = stream.name(),
                path = file.path(),
                failed = status.failed,
                "Destination rejected records"
            );
        }
    }

    fn task_failed(&self, stream: &Stream, error: &SyncError) {
        error!(stream = stream.name(), kind = error.kind(), error = %error, "Stream drain stopped");
    }

    fn worker_lost(&self, error: &SyncError) {
        error!(kind = error.kind(), error = %error, "Drain task lost");
    }

    fn cycle_failed(&self, cycle: u64, error: &SyncError, retry_in: Duration) {
        error!(
            cycle,
            kind = error.kind(),
            error = %error,
            retry_in_ms = retry_in.as_millis() as u64,
            "Cycle abandoned"
        );
    }

    fn cycle_finished(&self, cycle: u64, elapsed: Duration) {
        info!(cycle, elapsed_ms = elapsed.as_millis() as u64, "Cycle finished");
    }

    fn stopped(&self, summary: &SyncSummary) {
        info!(
            cycles = summary.cycles,
            files = summary.files_ingested,
            records = summary.records_ingested,
            rejected = summary.records_failed,
            bytes = summary.bytes_processed,
            errors = summary.errors,
            "Sync stopped"
        );
    }
}

/// Run-wide counters shared by all workers.
#[derive(Debug, Default)]
pub struct SyncStats {
    cycles: AtomicU64,
    files_ingested: AtomicU64,
    records_ingested: AtomicU64,
    records_failed: AtomicU64,
    bytes_processed: AtomicU64,
    errors: AtomicU64,
}

impl SyncStats {
    pub fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_file(&self, status: &IngestStatus) {
        self.files_ingested.fetch_add(1, Ordering::Relaxed);
        self.records_ingested.fetch_add(status.ingested, Ordering::Relaxed);
        self.records_failed.fetch_add(status.failed, Ordering::Relaxed);
        self.bytes_processed.fetch_add(status.processed_bytes, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SyncSummary {
        SyncSummary {
            cycles: self.cycles.load(Ordering::Relaxed),
            files_ingested: self.files_ingested.load(Ordering::Relaxed),
            records_ingested: self.records_ingested.load(Ordering::Relaxed),
            records_failed: self.records_failed.load(Ordering::Relaxed),
            bytes_processed: self.bytes_processed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Totals of one Running period, returned by `Scheduler::stop`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub cycles: u64,
    pub files_ingested: u64,
    pub records_ingested: u64,
    pub records_failed: u64,
    pub bytes_processed: u64,
    pub errors: u64,
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} cycles, {} files, {} records ingested ({} rejected), {} bytes, {} errors",
            self.cycles,
            self.files_ingested,
            self.records_ingested,
            self.records_failed,
            self.bytes_processed,
            self.errors
        )
    }
}
