//! Logsync Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error taxonomy and logging setup for the logsync workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`SyncError`], the failure classes a sync run can
//!   report (parse, listing, transfer, delete, destination, invariant)
//! - **Logging**: `tracing` subscriber configuration driven by `LOG_*`
//!   environment variables
//!
//! # Example
//!
//! ```no_run
//! use logsync_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     tracing::info!("logging ready");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{BoxError, Result, SyncError};
