//! Per-file pipeline
//!
//! open → ensure destination → compressed ingest → delete. The source file is
//! deleted only after the sink acknowledged the ingest, and the call returns
//! only once the delete resolved, so the cursor never sees a half-processed
//! stream.

use logsync_common::{BoxError, SyncError};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::compression::gzip;
use crate::cursor::ExportFile;
use crate::directory::Stream;
use crate::sink::{IngestError, IngestSink, IngestStatus};
use crate::storage::BlobStorage;

pub struct FilePipeline {
    storage: Arc<dyn BlobStorage>,
    sink: Arc<dyn IngestSink>,
    timestamp_field: String,
}

impl FilePipeline {
    pub fn new(
        storage: Arc<dyn BlobStorage>,
        sink: Arc<dyn IngestSink>,
        timestamp_field: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            sink,
            timestamp_field: timestamp_field.into(),
        }
    }

    #[instrument(skip_all, fields(stream = stream.name(), path = file.path()))]
    pub async fn process(&self, stream: &Stream, file: &ExportFile) -> Result<IngestStatus, SyncError> {
        let transfer = |source: BoxError| SyncError::Transfer {
            stream: stream.name().to_string(),
            path: file.path().to_string(),
            source,
        };

        let body = self
            .storage
            .open_read(stream.name(), file.path())
            .await
            .map_err(|e| transfer(Box::new(e)))?;

        match self.sink.ensure_destination(stream.destination()).await {
            Ok(()) | Err(IngestError::AlreadyExists(_)) => {},
            Err(e) => {
                return Err(SyncError::Destination {
                    name: stream.destination().to_string(),
                    source: Box::new(e),
                })
            },
        }

        let status = self
            .sink
            .ingest(stream.destination(), gzip(body), &self.timestamp_field)
            .await
            .map_err(|e| transfer(Box::new(e)))?;

        debug!(ingested = status.ingested, "Ingest acknowledged, deleting source");

        self.storage
            .delete(stream.name(), file.path())
            .await
            .map_err(|e| SyncError::Delete {
                stream: stream.name().to_string(),
                path: file.path().to_string(),
                source: Box::new(e),
            })?;

        Ok(status)
    }
}
