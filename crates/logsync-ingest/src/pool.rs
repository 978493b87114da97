//! Bounded worker pool
//!
//! At most `max_workers` tasks run at once and at most `max_queued` more wait
//! for a worker. Once both are taken, [`WorkerPool::submit`] suspends until a
//! task finishes; that backpressure is the engine's only throttle against the
//! storage and ingestion backends.

use logsync_common::SyncError;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

pub struct WorkerPool<T> {
    /// Permits to run
    workers: Arc<Semaphore>,
    /// Permits to exist, running or queued
    slots: Arc<Semaphore>,
    tasks: JoinSet<T>,
}

impl<T: Send + 'static> WorkerPool<T> {
    pub fn new(max_workers: usize, max_queued: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            workers: Arc::new(Semaphore::new(max_workers)),
            slots: Arc::new(Semaphore::new(max_workers.saturating_add(max_queued))),
            tasks: JoinSet::new(),
        }
    }

    /// Queue `task`, waiting for a free slot when the pool is full.
    pub async fn submit<F>(&mut self, task: F) -> Result<(), SyncError>
    where
        F: Future<Output = T> + Send + 'static,
    {
        let slot = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| SyncError::Invariant("worker pool closed while submitting".to_string()))?;
        let workers = Arc::clone(&self.workers);

        self.tasks.spawn(async move {
            let _slot = slot;
            let _worker = workers.acquire_owned().await.ok();
            task.await
        });
        Ok(())
    }

    /// Wait for every submitted task. Panicked tasks come back as
    /// `Err(JoinError)`; completion order, not submission order.
    pub async fn join(mut self) -> Vec<Result<T, JoinError>> {
        let mut outcomes = Vec::with_capacity(self.tasks.len());
        while let Some(outcome) = self.tasks.join_next().await {
            outcomes.push(outcome);
        }
        outcomes
    }
}
