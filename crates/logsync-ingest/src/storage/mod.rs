//! Object storage boundary
//!
//! The engine reads export files through [`BlobStorage`] and never talks to a
//! concrete backend. Listings are paginated with an opaque continuation
//! marker; callers that need a snapshot use [`collect_pages`].

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::future::Future;
use thiserror::Error;

pub mod config;
pub mod s3;

pub use config::S3StorageConfig;
pub use s3::S3Storage;

/// Chunked file contents as read from storage.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// One page of a container or file listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub names: Vec<String>,
    /// Marker for the following page, `None` on the last page
    pub next_marker: Option<String>,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to list {target}: {message}")]
    List { target: String, message: String },

    #[error("Failed to open {container}/{path}: {message}")]
    Read {
        container: String,
        path: String,
        message: String,
    },

    #[error("Failed to delete {container}/{path}: {message}")]
    Delete {
        container: String,
        path: String,
        message: String,
    },
}

/// Storage operations the engine needs from the export account.
///
/// Implementations must be safe to share between all drain tasks; the engine
/// does no locking around them.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// One page of container names starting with `prefix`.
    async fn list_containers(
        &self,
        prefix: &str,
        marker: Option<String>,
    ) -> Result<ListPage, StorageError>;

    /// One page of a flat listing of every file path in `container`.
    async fn list_files(
        &self,
        container: &str,
        marker: Option<String>,
    ) -> Result<ListPage, StorageError>;

    async fn open_read(&self, container: &str, path: &str) -> Result<ByteStream, StorageError>;

    /// Permanently remove a file.
    async fn delete(&self, container: &str, path: &str) -> Result<(), StorageError>;
}

/// Follow continuation markers until the listing is exhausted.
pub async fn collect_pages<F, Fut>(mut fetch: F) -> Result<Vec<String>, StorageError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<ListPage, StorageError>>,
{
    let mut names = Vec::new();
    let mut marker = None;

    loop {
        let page = fetch(marker.take()).await?;
        names.extend(page.names);
        match page.next_marker {
            Some(next) if !next.is_empty() => marker = Some(next),
            _ => return Ok(names),
        }
    }
}
