//! Stream cursor
//!
//! Finds the oldest file left in a stream. There is no stored position:
//! every call lists the stream afresh, and deleting a processed file is what
//! moves the cursor forward.

use logsync_common::SyncError;
use std::sync::Arc;

use crate::storage::{collect_pages, BlobStorage};
use crate::timestamp::{resolve, ChronoKey, ParseError};

/// A file of a stream together with its position in the stream's timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    stream: String,
    path: String,
    key: ChronoKey,
}

impl ExportFile {
    pub fn parse(stream: impl Into<String>, path: impl Into<String>) -> Result<Self, ParseError> {
        let path = path.into();
        Ok(Self {
            key: resolve(&path)?,
            stream: stream.into(),
            path,
        })
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn key(&self) -> ChronoKey {
        self.key
    }
}

/// Result of [`StreamCursor::next_oldest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextFile {
    pub file: ExportFile,
    /// More than one file was present in the listing snapshot
    pub more_remain: bool,
}

#[derive(Clone)]
pub struct StreamCursor {
    storage: Arc<dyn BlobStorage>,
}

impl StreamCursor {
    pub fn new(storage: Arc<dyn BlobStorage>) -> Self {
        Self { storage }
    }

    /// The chronologically first file of `stream`, or `None` if it is empty.
    ///
    /// The whole listing is read before choosing. A single unparseable path
    /// fails the call: without its key the stream cannot be ordered.
    pub async fn next_oldest(&self, stream: &str) -> Result<Option<NextFile>, SyncError> {
        let paths = collect_pages(|marker| self.storage.list_files(stream, marker))
            .await
            .map_err(SyncError::list)?;
        let present = paths.len();

        let mut oldest: Option<(ChronoKey, String)> = None;
        for path in paths {
            let key = resolve(&path).map_err(|e| SyncError::Parse {
                stream: stream.to_string(),
                path: path.clone(),
                source: Box::new(e),
            })?;
            // Equal keys only happen across workspace folders; the path keeps
            // the choice deterministic.
            let older = match &oldest {
                None => true,
                Some((best_key, best_path)) => (key, &path) < (*best_key, best_path),
            };
            if older {
                oldest = Some((key, path));
            }
        }

        Ok(oldest.map(|(key, path)| NextFile {
            file: ExportFile {
                stream: stream.to_string(),
                path,
                key,
            },
            more_remain: present > 1,
        }))
    }

    /// Whether `stream` holds any file at all.
    ///
    /// Only for deciding whether to schedule work; a drain loop learns the
    /// same from [`next_oldest`](Self::next_oldest).
    pub async fn has_any(&self, stream: &str) -> Result<bool, SyncError> {
        let mut marker = None;
        loop {
            let page = self
                .storage
                .list_files(stream, marker.take())
                .await
                .map_err(SyncError::list)?;
            if !page.names.is_empty() {
                return Ok(true);
            }
            match page.next_marker {
                Some(next) if !next.is_empty() => marker = Some(next),
                _ => return Ok(false),
            }
        }
    }
}
