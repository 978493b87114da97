//! Ingestion boundary
//!
//! The engine hands each file to an [`IngestSink`]: make sure the destination
//! exists, then stream the gzip-compressed NDJSON body into it. The sink
//! reports how many bytes it read and how many records it accepted.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::ByteStream;

pub mod http;

pub use http::{HttpIngestClient, HttpIngestConfig};

/// Acknowledgement of one ingest call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestStatus {
    #[serde(default)]
    pub processed_bytes: u64,
    #[serde(default)]
    pub ingested: u64,
    #[serde(default)]
    pub failed: u64,
}

#[derive(Debug, Error)]
pub enum IngestError {
    /// Returned by sinks whose create call is not idempotent; callers treat
    /// it as success.
    #[error("Destination {0:?} already exists")]
    AlreadyExists(String),

    #[error("Request to {endpoint} failed: {message}")]
    Request { endpoint: String, message: String },

    #[error("{endpoint} answered {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Unexpected response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
}

/// Destination-side operations of the ingestion service.
///
/// Shared by every drain task without locking.
#[async_trait]
pub trait IngestSink: Send + Sync {
    /// Create `name` unless it exists. Calling it for an existing destination
    /// must not fail, though [`IngestError::AlreadyExists`] is tolerated.
    async fn ensure_destination(&self, name: &str) -> Result<(), IngestError>;

    /// Stream a gzip-compressed NDJSON body into `name`. `timestamp_field`
    /// names the record field that carries the event time.
    async fn ingest(
        &self,
        name: &str,
        body: ByteStream,
        timestamp_field: &str,
    ) -> Result<IngestStatus, IngestError>;
}
