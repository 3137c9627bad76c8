//! Error types for the sync layer.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
///
/// None of these is fatal to the host: a failed sync leaves local state as
/// it was and the next poll tick or change event tries again.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network error (request never produced a response).
    #[error("network error: {0}")]
    Network(String),

    /// The backend answered with a non-success status.
    #[error("backend returned {status}: {body}")]
    Backend { status: u16, body: String },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A row could not be mapped onto a record.
    #[error("invalid row in {table}: {reason}")]
    InvalidRow { table: String, reason: String },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Invalid identifier or table name.
    #[error(transparent)]
    Types(#[from] tillsync_types::Error),

    /// Timeout.
    #[error("operation timed out")]
    Timeout,
}

impl SyncError {
    /// Returns true for failures worth retrying on the next tick.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Network(_) | SyncError::Timeout => true,
            SyncError::Backend { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SyncError::Timeout
        } else {
            SyncError::Network(e.to_string())
        }
    }
}
