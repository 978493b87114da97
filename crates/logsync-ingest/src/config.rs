//! Engine configuration

use logsync_common::SyncError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::naming::DestinationNaming;

// ============================================================================
// Engine Configuration Constants
// ============================================================================

/// Default number of streams drained concurrently.
pub const DEFAULT_WORKER_POOL_SIZE: usize = 8;

/// Default number of drain tasks waiting for a worker before submission blocks.
pub const DEFAULT_MAX_QUEUED_TASKS: usize = 16;

/// Default pause between two cycles in seconds.
pub const DEFAULT_CYCLE_INTERVAL_SECS: u64 = 30;

/// Default first delay after a failed stream enumeration in seconds.
pub const DEFAULT_LIST_BACKOFF_INITIAL_SECS: u64 = 1;

/// Default cap on the enumeration backoff in seconds.
pub const DEFAULT_LIST_BACKOFF_MAX_SECS: u64 = 60;

/// Default record field carrying the event time.
pub const DEFAULT_TIMESTAMP_FIELD: &str = "TimeGenerated";

/// Default prefix of export container names.
pub const DEFAULT_STREAM_PREFIX: &str = "am-";

/// Sync engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub worker_pool_size: usize,
    pub max_queued_tasks: usize,
    pub cycle_interval: Duration,
    pub list_backoff_initial: Duration,
    pub list_backoff_max: Duration,
    pub timestamp_field: String,
    pub stream_prefix: String,
    pub destination_prefix: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
            max_queued_tasks: DEFAULT_MAX_QUEUED_TASKS,
            cycle_interval: Duration::from_secs(DEFAULT_CYCLE_INTERVAL_SECS),
            list_backoff_initial: Duration::from_secs(DEFAULT_LIST_BACKOFF_INITIAL_SECS),
            list_backoff_max: Duration::from_secs(DEFAULT_LIST_BACKOFF_MAX_SECS),
            timestamp_field: DEFAULT_TIMESTAMP_FIELD.to_string(),
            stream_prefix: DEFAULT_STREAM_PREFIX.to_string(),
            destination_prefix: String::new(),
        }
    }
}

impl SyncConfig {
    pub fn with_workers(mut self, worker_pool_size: usize, max_queued_tasks: usize) -> Self {
        self.worker_pool_size = worker_pool_size;
        self.max_queued_tasks = max_queued_tasks;
        self
    }

    pub fn with_cycle_interval(mut self, interval: Duration) -> Self {
        self.cycle_interval = interval;
        self
    }

    /// Set the backoff after failed stream enumeration. An `initial` of zero
    /// retries immediately.
    pub fn with_list_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.list_backoff_initial = initial;
        self.list_backoff_max = max;
        self
    }

    pub fn with_timestamp_field(mut self, field: impl Into<String>) -> Self {
        self.timestamp_field = field.into();
        self
    }

    pub fn with_prefixes(
        mut self,
        stream_prefix: impl Into<String>,
        destination_prefix: impl Into<String>,
    ) -> Self {
        self.stream_prefix = stream_prefix.into();
        self.destination_prefix = destination_prefix.into();
        self
    }

    pub fn naming(&self) -> DestinationNaming {
        DestinationNaming::new(&self.stream_prefix, &self.destination_prefix)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.worker_pool_size == 0 {
            return Err(SyncError::Config(
                "worker_pool_size must be greater than 0".to_string(),
            ));
        }

        if self.list_backoff_initial > self.list_backoff_max {
            return Err(SyncError::Config(format!(
                "list backoff initial ({:?}) exceeds its maximum ({:?})",
                self.list_backoff_initial, self.list_backoff_max
            )));
        }

        if self.timestamp_field.trim().is_empty() {
            return Err(SyncError::Config("timestamp_field cannot be empty".to_string()));
        }

        // An empty stream prefix would treat every bucket as an export stream.
        if self.stream_prefix.is_empty() {
            return Err(SyncError::Config("stream_prefix cannot be empty".to_string()));
        }

        Ok(())
    }
}
