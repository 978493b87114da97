//! Error types for logsync

use thiserror::Error;

/// Boxed source error carried by the collaborator-facing variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Failure classes of a sync run.
///
/// Every variant except [`SyncError::List`] is scoped to a single stream: the
/// drain task reporting it ends, other streams keep going. `List` abandons the
/// whole cycle. `Cancelled` marks a shutdown and is never reported as a failure.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A file path does not follow the export layout; the stream cannot be
    /// ordered until the file is removed or renamed.
    #[error("Unparseable file {path:?} in stream {stream:?}: {source}")]
    Parse {
        stream: String,
        path: String,
        #[source]
        source: BoxError,
    },

    #[error("Listing failed: {0}")]
    List(#[source] BoxError),

    /// Download or upload failed; the file stays in place for the next cycle.
    #[error("Transfer of {path:?} from stream {stream:?} failed: {source}")]
    Transfer {
        stream: String,
        path: String,
        #[source]
        source: BoxError,
    },

    /// Ingest was acknowledged but the source file survived; it will be
    /// ingested again on a later cycle.
    #[error("Delete of {path:?} from stream {stream:?} failed after ingest: {source}")]
    Delete {
        stream: String,
        path: String,
        #[source]
        source: BoxError,
    },

    #[error("Destination {name:?} could not be ensured: {source}")]
    Destination {
        name: String,
        #[source]
        source: BoxError,
    },

    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("already started")]
    AlreadyStarted,

    #[error("not started")]
    NotStarted,

    #[error("Cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Short label used in reports and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Parse { .. } => "parse",
            SyncError::List(_) => "list",
            SyncError::Transfer { .. } => "transfer",
            SyncError::Delete { .. } => "delete",
            SyncError::Destination { .. } => "destination",
            SyncError::Invariant(_) => "invariant",
            SyncError::AlreadyStarted | SyncError::NotStarted => "lifecycle",
            SyncError::Cancelled => "cancelled",
            SyncError::Config(_) => "config",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }

    pub fn list(source: impl Into<BoxError>) -> Self {
        SyncError::List(source.into())
    }
}
