//! Stream directory
//!
//! Enumerates the export streams (containers) of the storage account. The
//! result is a frozen snapshot: streams created or removed while a cycle runs
//! are seen by the next cycle.

use logsync_common::SyncError;
use tracing::debug;

use crate::naming::DestinationNaming;
use crate::storage::{collect_pages, BlobStorage};

/// One export stream and the destination it drains into.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Stream {
    name: String,
    destination: String,
}

impl Stream {
    pub fn new(name: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            destination: destination.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }
}

#[derive(Debug, Clone)]
pub struct StreamDirectory {
    naming: DestinationNaming,
}

impl StreamDirectory {
    /// Streams are the containers whose name starts with the naming's
    /// stream prefix.
    pub fn new(naming: DestinationNaming) -> Self {
        Self { naming }
    }

    pub fn prefix(&self) -> &str {
        self.naming.stream_prefix()
    }

    pub async fn list_streams(&self, storage: &dyn BlobStorage) -> Result<Vec<Stream>, SyncError> {
        let prefix = self.prefix();
        let names = collect_pages(|marker| storage.list_containers(prefix, marker))
            .await
            .map_err(SyncError::list)?;

        debug!(prefix, count = names.len(), "Listed streams");

        Ok(names
            .into_iter()
            .filter(|name| name.starts_with(prefix))
            .map(|name| {
                let destination = self.naming.destination_for(&name);
                Stream::new(name, destination)
            })
            .collect())
    }
}
