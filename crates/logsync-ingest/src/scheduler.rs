//! Scheduler
//!
//! Owns the Idle → Running → Stopping → Idle lifecycle. While Running, one
//! supervising task repeats the cycle:
//!
//! 1. enumerate streams (abandon the cycle and back off on failure)
//! 2. shuffle them
//! 3. submit one drain task per stream to a fresh bounded pool
//! 4. join every task
//! 5. wait for the cycle interval or cancellation
//!
//! A drain task handles one stream strictly in order: the next file is looked
//! up only after the previous one was ingested and deleted. Cancellation is
//! checked between files, never in the middle of one.

use logsync_common::SyncError;
use rand::seq::SliceRandom;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backoff::Backoff;
use crate::config::SyncConfig;
use crate::cursor::StreamCursor;
use crate::directory::{Stream, StreamDirectory};
use crate::pipeline::FilePipeline;
use crate::pool::WorkerPool;
use crate::report::{Reporter, SyncStats, SyncSummary};
use crate::sink::IngestSink;
use crate::storage::BlobStorage;

enum RunState {
    Idle,
    Running(Running),
    /// Cancelled; the supervisor may still be finishing in-flight files
    Stopping(Running),
}

struct Running {
    token: CancellationToken,
    /// Cancelled by the supervising task when it exits, panics included
    exited: CancellationToken,
    supervisor: JoinHandle<()>,
    stats: Arc<SyncStats>,
}

pub struct Scheduler {
    config: SyncConfig,
    reporter: Arc<dyn Reporter>,
    state: Mutex<RunState>,
}

impl Scheduler {
    pub fn new(config: SyncConfig, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            config,
            reporter,
            state: Mutex::new(RunState::Idle),
        }
    }

    fn state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.state(), RunState::Running(_))
    }

    /// Spawn the supervising task on the current Tokio runtime.
    ///
    /// Fails with [`SyncError::AlreadyStarted`] unless Idle. A scheduler left
    /// Stopping by an abandoned [`stop`](Self::stop) counts as Idle once its
    /// supervisor has exited.
    pub fn start(
        &self,
        directory: StreamDirectory,
        storage: Arc<dyn BlobStorage>,
        sink: Arc<dyn IngestSink>,
    ) -> Result<(), SyncError> {
        let mut state = self.state();
        match &*state {
            RunState::Idle => {},
            RunState::Stopping(run) if run.exited.is_cancelled() => {
                debug!("Previous supervisor exited without a completed stop");
            },
            _ => return Err(SyncError::AlreadyStarted),
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SyncError::Config(format!("no Tokio runtime to run on: {e}")))?;

        let token = CancellationToken::new();
        let exited = CancellationToken::new();
        let stats = Arc::new(SyncStats::default());
        let supervisor = Supervisor {
            pipeline: Arc::new(FilePipeline::new(
                Arc::clone(&storage),
                sink,
                &self.config.timestamp_field,
            )),
            cursor: StreamCursor::new(Arc::clone(&storage)),
            config: self.config.clone(),
            reporter: Arc::clone(&self.reporter),
            directory,
            storage,
            token: token.clone(),
            stats: Arc::clone(&stats),
        };

        let exit_guard = exited.clone().drop_guard();
        let supervisor = runtime.spawn(async move {
            let _exit_guard = exit_guard;
            supervisor.run().await;
        });

        *state = RunState::Running(Running {
            token,
            exited,
            supervisor,
            stats,
        });
        Ok(())
    }

    /// Cancel and wait until the supervisor and every drain task it started
    /// have exited.
    ///
    /// Fails with [`SyncError::NotStarted`] when Idle. Files already in their
    /// pipeline are finished first. Dropping the returned future leaves the
    /// scheduler Stopping; calling `stop` again resumes the wait.
    pub async fn stop(&self) -> Result<SyncSummary, SyncError> {
        let exited = {
            let mut state = self.state();
            match std::mem::replace(&mut *state, RunState::Idle) {
                RunState::Idle => return Err(SyncError::NotStarted),
                RunState::Running(run) | RunState::Stopping(run) => {
                    run.token.cancel();
                    let exited = run.exited.clone();
                    *state = RunState::Stopping(run);
                    exited
                },
            }
        };

        exited.cancelled().await;

        // A concurrent stop may have finished the transition already.
        let run = {
            let mut state = self.state();
            match std::mem::replace(&mut *state, RunState::Idle) {
                RunState::Stopping(run) => run,
                other => {
                    *state = other;
                    return Err(SyncError::NotStarted);
                },
            }
        };

        let summary = run.stats.snapshot();
        self.reporter.stopped(&summary);

        run.supervisor
            .await
            .map_err(|e| SyncError::Invariant(format!("supervisor ended abnormally: {e}")))?;
        Ok(summary)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let RunState::Running(run) | RunState::Stopping(run) = state {
            run.token.cancel();
        }
    }
}

struct Supervisor {
    config: SyncConfig,
    reporter: Arc<dyn Reporter>,
    directory: StreamDirectory,
    storage: Arc<dyn BlobStorage>,
    cursor: StreamCursor,
    pipeline: Arc<FilePipeline>,
    token: CancellationToken,
    stats: Arc<SyncStats>,
}

impl Supervisor {
    async fn run(self) {
        let mut backoff = Backoff::new(self.config.list_backoff_initial, self.config.list_backoff_max);
        let mut cycle = 0u64;

        loop {
            if self.token.is_cancelled() {
                break;
            }
            cycle += 1;

            let delay = match self.run_cycle(cycle).await {
                Ok(()) => {
                    backoff.reset();
                    self.config.cycle_interval
                },
                Err(e) if e.is_cancelled() => break,
                Err(e) => {
                    let retry_in = backoff.next_delay();
                    self.stats.record_error();
                    self.reporter.cycle_failed(cycle, &e, retry_in);
                    retry_in
                },
            };

            tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {},
            }
        }

        debug!(cycles = cycle, "Supervisor exited");
    }

    async fn run_cycle(&self, cycle: u64) -> Result<(), SyncError> {
        let started = Instant::now();

        let mut streams = tokio::select! {
            biased;
            _ = self.token.cancelled() => return Err(SyncError::Cancelled),
            listed = self.directory.list_streams(self.storage.as_ref()) => listed?,
        };
        streams.shuffle(&mut rand::rng());
        self.reporter.cycle_started(cycle, streams.len());

        let mut pool = WorkerPool::new(self.config.worker_pool_size, self.config.max_queued_tasks);
        for stream in streams {
            let task = DrainTask {
                stream,
                cursor: self.cursor.clone(),
                pipeline: Arc::clone(&self.pipeline),
                reporter: Arc::clone(&self.reporter),
                stats: Arc::clone(&self.stats),
                token: self.token.clone(),
            };

            tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                submitted = pool.submit(task.run()) => {
                    if let Err(e) = submitted {
                        self.stats.record_error();
                        self.reporter.worker_lost(&e);
                        break;
                    }
                },
            }
        }

        for outcome in pool.join().await {
            if let Err(e) = outcome {
                let error = SyncError::Invariant(format!("drain task ended abnormally: {e}"));
                self.stats.record_error();
                self.reporter.worker_lost(&error);
            }
        }

        self.stats.record_cycle();
        self.reporter.cycle_finished(cycle, started.elapsed());
        Ok(())
    }
}

struct DrainTask {
    stream: Stream,
    cursor: StreamCursor,
    pipeline: Arc<FilePipeline>,
    reporter: Arc<dyn Reporter>,
    stats: Arc<SyncStats>,
    token: CancellationToken,
}

impl DrainTask {
    async fn run(self) {
        self.reporter.stream_started(&self.stream);

        match self.drain().await {
            Ok(files) => debug!(stream = self.stream.name(), files, "Stream drained"),
            Err(e) if e.is_cancelled() => debug!(stream = self.stream.name(), "Drain cancelled"),
            Err(e) => {
                self.stats.record_error();
                self.reporter.task_failed(&self.stream, &e);
            },
        }
    }

    /// Process files oldest first until the stream is empty, an error occurs
    /// or cancellation is observed. Returns the number of files ingested.
    async fn drain(&self) -> Result<u64, SyncError> {
        let mut files = 0;
        let mut last_deleted: Option<String> = None;

        loop {
            if self.token.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let Some(next) = self.cursor.next_oldest(self.stream.name()).await? else {
                return Ok(files);
            };

            if last_deleted.as_deref() == Some(next.file.path()) {
                return Err(SyncError::Invariant(format!(
                    "{:?} in stream {:?} listed again after it was deleted",
                    next.file.path(),
                    self.stream.name()
                )));
            }

            let status = self.pipeline.process(&self.stream, &next.file).await?;
            files += 1;
            self.stats.record_file(&status);
            self.reporter.file_ingested(&self.stream, &next.file, &status);

            if !next.more_remain {
                return Ok(files);
            }
            last_deleted = Some(next.file.path().to_string());
        }
    }
}
