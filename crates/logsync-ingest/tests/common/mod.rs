//! Common test utilities for logsync integration tests
//!
//! In-process stand-ins for the two collaborators plus a reporter that keeps
//! every event:
//!
//! - [`MemoryStorage`]: containers of files with paginated listings and
//!   injectable failures
//! - [`RecordingSink`]: decompresses and records every ingest, tracks
//!   concurrency and can hold ingests behind a gate
//! - [`RecordingReporter`]: event log with a polling helper
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{export_path, MemoryStorage};
//!
//! let storage = MemoryStorage::new();
//! storage.put("am-syslog", &export_path(2024, 1, 15, 10, 0, None), "{}\n");
//! ```

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use bytes::Bytes;
use flate2::read::GzDecoder;
use futures::{stream, StreamExt, TryStreamExt};
use logsync_common::SyncError;
use logsync_ingest::{
    BlobStorage, ByteStream, ExportFile, IngestError, IngestSink, IngestStatus, ListPage,
    Reporter, Stream, StorageError, SyncSummary,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

pub const WORKSPACE: &str =
    "WorkspaceResourceId=/subscriptions/0000/resourcegroups/rg/providers/microsoft.operationalinsights/workspaces/ws";

/// Path of an export file for the given bucket and optional split sequence.
pub fn export_path(year: u32, month: u32, day: u32, hour: u32, minute: u32, seq: Option<u32>) -> String {
    let name = match seq {
        Some(n) => format!("PT05M_{n}.json"),
        None => "PT05M.json".to_string(),
    };
    format!("{WORKSPACE}/y={year:04}/m={month:02}/d={day:02}/h={hour:02}/m={minute:02}/{name}")
}

/// One NDJSON record per line, tagged with the file it came from.
pub fn ndjson(tag: &str, records: usize) -> String {
    (0..records)
        .map(|i| format!("{{\"TimeGenerated\":\"2024-01-15T10:00:00Z\",\"file\":\"{tag}\",\"n\":{i}}}\n"))
        .collect()
}

// ============================================================================
// Storage
// ============================================================================

#[derive(Default)]
struct Failures {
    listings: usize,
    reads: HashSet<(String, String)>,
    deletes: HashSet<(String, String)>,
    /// Containers whose deletes report success but keep the file
    lost_deletes: HashSet<String>,
}

/// Export account held in memory.
pub struct MemoryStorage {
    containers: Mutex<BTreeMap<String, BTreeMap<String, Bytes>>>,
    failures: Mutex<Failures>,
    page_size: usize,
    container_listings: AtomicUsize,
    deletes: Mutex<Vec<(String, String)>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::with_page_size(2)
    }

    /// Listings return at most `page_size` names per page.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            containers: Mutex::new(BTreeMap::new()),
            failures: Mutex::new(Failures::default()),
            page_size: page_size.max(1),
            container_listings: AtomicUsize::new(0),
            deletes: Mutex::new(Vec::new()),
        }
    }

    pub fn create_container(&self, container: &str) {
        self.containers
            .lock()
            .unwrap()
            .entry(container.to_string())
            .or_default();
    }

    pub fn put(&self, container: &str, path: &str, body: impl Into<String>) {
        self.containers
            .lock()
            .unwrap()
            .entry(container.to_string())
            .or_default()
            .insert(path.to_string(), Bytes::from(body.into()));
    }

    pub fn remove(&self, container: &str, path: &str) {
        if let Some(files) = self.containers.lock().unwrap().get_mut(container) {
            files.remove(path);
        }
    }

    /// Paths currently in `container`, in path order.
    pub fn files(&self, container: &str) -> Vec<String> {
        self.containers
            .lock()
            .unwrap()
            .get(container)
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Successful deletes in the order they happened.
    pub fn deletes(&self) -> Vec<(String, String)> {
        self.deletes.lock().unwrap().clone()
    }

    pub fn container_listings(&self) -> usize {
        self.container_listings.load(Ordering::SeqCst)
    }

    /// The next `count` container listings fail.
    pub fn fail_next_listings(&self, count: usize) {
        self.failures.lock().unwrap().listings = count;
    }

    pub fn fail_read(&self, container: &str, path: &str) {
        self.failures
            .lock()
            .unwrap()
            .reads
            .insert((container.to_string(), path.to_string()));
    }

    pub fn heal_read(&self, container: &str, path: &str) {
        self.failures
            .lock()
            .unwrap()
            .reads
            .remove(&(container.to_string(), path.to_string()));
    }

    pub fn fail_delete(&self, container: &str, path: &str) {
        self.failures
            .lock()
            .unwrap()
            .deletes
            .insert((container.to_string(), path.to_string()));
    }

    /// Deletes in `container` succeed without removing anything.
    pub fn lose_deletes(&self, container: &str) {
        self.failures
            .lock()
            .unwrap()
            .lost_deletes
            .insert(container.to_string());
    }

    fn page(&self, names: Vec<String>, marker: Option<String>) -> ListPage {
        let start: usize = marker.map(|m| m.parse().unwrap()).unwrap_or(0);
        let end = (start + self.page_size).min(names.len());
        ListPage {
            names: names[start.min(end)..end].to_vec(),
            next_marker: (end < names.len()).then(|| end.to_string()),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStorage for MemoryStorage {
    async fn list_containers(
        &self,
        prefix: &str,
        marker: Option<String>,
    ) -> Result<ListPage, StorageError> {
        self.container_listings.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = self.failures.lock().unwrap();
            if failures.listings > 0 {
                failures.listings -= 1;
                return Err(StorageError::List {
                    target: "containers".to_string(),
                    message: "service unavailable".to_string(),
                });
            }
        }

        let names = self
            .containers
            .lock()
            .unwrap()
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect();
        Ok(self.page(names, marker))
    }

    async fn list_files(
        &self,
        container: &str,
        marker: Option<String>,
    ) -> Result<ListPage, StorageError> {
        let names = self
            .containers
            .lock()
            .unwrap()
            .get(container)
            .ok_or_else(|| StorageError::List {
                target: container.to_string(),
                message: "no such container".to_string(),
            })?
            .keys()
            .cloned()
            .collect();
        Ok(self.page(names, marker))
    }

    async fn open_read(&self, container: &str, path: &str) -> Result<ByteStream, StorageError> {
        let read_error = |message: &str| StorageError::Read {
            container: container.to_string(),
            path: path.to_string(),
            message: message.to_string(),
        };

        if self
            .failures
            .lock()
            .unwrap()
            .reads
            .contains(&(container.to_string(), path.to_string()))
        {
            return Err(read_error("connection reset"));
        }

        let body = self
            .containers
            .lock()
            .unwrap()
            .get(container)
            .and_then(|files| files.get(path).cloned())
            .ok_or_else(|| read_error("not found"))?;

        // Hand out small chunks so the compressor sees a real stream.
        let chunks: Vec<std::io::Result<Bytes>> = body
            .chunks(16)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        Ok(stream::iter(chunks).boxed())
    }

    async fn delete(&self, container: &str, path: &str) -> Result<(), StorageError> {
        if self
            .failures
            .lock()
            .unwrap()
            .deletes
            .contains(&(container.to_string(), path.to_string()))
        {
            return Err(StorageError::Delete {
                container: container.to_string(),
                path: path.to_string(),
                message: "access denied".to_string(),
            });
        }

        if self.failures.lock().unwrap().lost_deletes.contains(container) {
            return Ok(());
        }

        self.remove(container, path);
        self.deletes
            .lock()
            .unwrap()
            .push((container.to_string(), path.to_string()));
        Ok(())
    }
}

// ============================================================================
// Sink
// ============================================================================

/// One acknowledged ingest.
#[derive(Debug, Clone)]
pub struct Ingested {
    pub destination: String,
    pub body: String,
    pub timestamp_field: String,
}

#[derive(Default)]
struct SinkFaults {
    ingest: HashSet<String>,
    ensure: HashSet<String>,
    panic: HashSet<String>,
}

/// Ingestion service held in memory.
pub struct RecordingSink {
    destinations: Mutex<HashSet<String>>,
    ingested: Mutex<Vec<Ingested>>,
    faults: Mutex<SinkFaults>,
    ensure_calls: AtomicUsize,
    /// Create calls on an existing destination answer `AlreadyExists`
    strict_create: bool,
    delay: Duration,
    gate: Option<Arc<Semaphore>>,
    running: AtomicUsize,
    peak: AtomicUsize,
    running_per_destination: Mutex<HashMap<String, usize>>,
    destination_overlaps: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            destinations: Mutex::new(HashSet::new()),
            ingested: Mutex::new(Vec::new()),
            faults: Mutex::new(SinkFaults::default()),
            ensure_calls: AtomicUsize::new(0),
            strict_create: false,
            delay: Duration::ZERO,
            gate: None,
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            running_per_destination: Mutex::new(HashMap::new()),
            destination_overlaps: AtomicUsize::new(0),
        }
    }

    /// Report `AlreadyExists` when asked to ensure a known destination.
    pub fn strict(mut self) -> Self {
        self.strict_create = true;
        self
    }

    /// Every ingest takes at least `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every ingest waits for one permit of the returned gate.
    pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn add_destination(&self, name: &str) {
        self.destinations.lock().unwrap().insert(name.to_string());
    }

    pub fn has_destination(&self, name: &str) -> bool {
        self.destinations.lock().unwrap().contains(name)
    }

    pub fn fail_ingest(&self, destination: &str) {
        self.faults.lock().unwrap().ingest.insert(destination.to_string());
    }

    pub fn heal_ingest(&self, destination: &str) {
        self.faults.lock().unwrap().ingest.remove(destination);
    }

    pub fn fail_ensure(&self, destination: &str) {
        self.faults.lock().unwrap().ensure.insert(destination.to_string());
    }

    pub fn panic_on(&self, destination: &str) {
        self.faults.lock().unwrap().panic.insert(destination.to_string());
    }

    pub fn ingested(&self) -> Vec<Ingested> {
        self.ingested.lock().unwrap().clone()
    }

    /// Bodies ingested into `destination`, in order.
    pub fn bodies(&self, destination: &str) -> Vec<String> {
        self.ingested()
            .into_iter()
            .filter(|i| i.destination == destination)
            .map(|i| i.body)
            .collect()
    }

    pub fn ensure_calls(&self) -> usize {
        self.ensure_calls.load(Ordering::SeqCst)
    }

    /// Ingests in progress right now.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Most ingests ever in progress at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Times an ingest started while another one for the same destination
    /// was still running.
    pub fn destination_overlaps(&self) -> usize {
        self.destination_overlaps.load(Ordering::SeqCst)
    }

    fn enter(&self, destination: &str) {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let mut per_destination = self.running_per_destination.lock().unwrap();
        let count = per_destination.entry(destination.to_string()).or_default();
        if *count > 0 {
            self.destination_overlaps.fetch_add(1, Ordering::SeqCst);
        }
        *count += 1;
    }

    fn leave(&self, destination: &str) {
        self.running.fetch_sub(1, Ordering::SeqCst);
        if let Some(count) = self.running_per_destination.lock().unwrap().get_mut(destination) {
            *count -= 1;
        }
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

async fn gunzip(body: ByteStream) -> std::io::Result<String> {
    let compressed: Vec<Bytes> = body.try_collect().await?;
    let mut out = String::new();
    GzDecoder::new(compressed.concat().as_slice()).read_to_string(&mut out)?;
    Ok(out)
}

#[async_trait]
impl IngestSink for RecordingSink {
    async fn ensure_destination(&self, name: &str) -> Result<(), IngestError> {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        if self.faults.lock().unwrap().ensure.contains(name) {
            return Err(IngestError::Status {
                endpoint: "/v1/datasets".to_string(),
                status: 403,
                body: "forbidden".to_string(),
            });
        }

        let created = self.destinations.lock().unwrap().insert(name.to_string());
        if !created && self.strict_create {
            return Err(IngestError::AlreadyExists(name.to_string()));
        }
        Ok(())
    }

    async fn ingest(
        &self,
        name: &str,
        body: ByteStream,
        timestamp_field: &str,
    ) -> Result<IngestStatus, IngestError> {
        if self.faults.lock().unwrap().panic.contains(name) {
            panic!("sink exploded on {name}");
        }

        self.enter(name);
        let outcome = self.ingest_inner(name, body, timestamp_field).await;
        self.leave(name);
        outcome
    }
}

impl RecordingSink {
    async fn ingest_inner(
        &self,
        name: &str,
        body: ByteStream,
        timestamp_field: &str,
    ) -> Result<IngestStatus, IngestError> {
        let endpoint = format!("/v1/datasets/{name}/ingest");
        let body = gunzip(body).await.map_err(|e| IngestError::Request {
            endpoint: endpoint.clone(),
            message: e.to_string(),
        })?;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        if self.faults.lock().unwrap().ingest.contains(name) {
            return Err(IngestError::Status {
                endpoint,
                status: 500,
                body: "ingest failed".to_string(),
            });
        }

        let records = body.lines().filter(|l| !l.is_empty()).count() as u64;
        let status = IngestStatus {
            processed_bytes: body.len() as u64,
            ingested: records,
            failed: 0,
        };
        self.ingested.lock().unwrap().push(Ingested {
            destination: name.to_string(),
            body,
            timestamp_field: timestamp_field.to_string(),
        });
        Ok(status)
    }
}

// ============================================================================
// Reporter
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    CycleStarted { cycle: u64, streams: usize },
    StreamStarted(String),
    FileIngested { stream: String, path: String },
    TaskFailed { stream: String, kind: &'static str },
    WorkerLost(&'static str),
    CycleFailed { cycle: u64, kind: &'static str },
    CycleFinished(u64),
    Stopped(SyncSummary),
}

#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<Event>>,
}

impl RecordingReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| matches(e)).count()
    }

    /// Poll until `done` holds for the event log, panicking after `timeout`.
    pub async fn wait_for(&self, timeout: Duration, done: impl Fn(&[Event]) -> bool) {
        let wait = async {
            loop {
                if done(&self.events()) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        if tokio::time::timeout(timeout, wait).await.is_err() {
            panic!("condition not reached, events: {:#?}", self.events());
        }
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl Reporter for RecordingReporter {
    fn cycle_started(&self, cycle: u64, streams: usize) {
        self.push(Event::CycleStarted { cycle, streams });
    }

    fn stream_started(&self, stream: &Stream) {
        self.push(Event::StreamStarted(stream.name().to_string()));
    }

    fn file_ingested(&self, stream: &Stream, file: &ExportFile, _status: &IngestStatus) {
        self.push(Event::FileIngested {
            stream: stream.name().to_string(),
            path: file.path().to_string(),
        });
    }

    fn task_failed(&self, stream: &Stream, error: &SyncError) {
        self.push(Event::TaskFailed {
            stream: stream.name().to_string(),
            kind: error.kind(),
        });
    }

    fn worker_lost(&self, error: &SyncError) {
        self.push(Event::WorkerLost(error.kind()));
    }

    fn cycle_failed(&self, cycle: u64, error: &SyncError, _retry_in: Duration) {
        self.push(Event::CycleFailed {
            cycle,
            kind: error.kind(),
        });
    }

    fn cycle_finished(&self, cycle: u64, _elapsed: Duration) {
        self.push(Event::CycleFinished(cycle));
    }

    fn stopped(&self, summary: &SyncSummary) {
        self.push(Event::Stopped(*summary));
    }
}
