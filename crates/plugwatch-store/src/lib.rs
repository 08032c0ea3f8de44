//! Persistence layer for plugwatch
//!
//! Provides:
//! - The telemetry store interface (device/group snapshots, field writes)
//! - The activity logger interface for manual actions
//! - A SQLite implementation, an in-memory implementation with fault
//!   injection, and a wrapper that bounds every call with a timeout
//! - JSON snapshot import/export

mod memory;
mod snapshot;
mod sqlite;
mod timeout;
mod traits;

pub use memory::*;
pub use snapshot::*;
pub use sqlite::*;
pub use timeout::*;
pub use traits::*;

use std::time::Duration;
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
