//! Error kinds for the library
//!
//! `UpstreamError` and `StoreError` come from the two collaborators of the
//! syncer; `SyncError` is what the sync operations return and decides which
//! failures end a day early.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request to {endpoint} failed: {message}")]
    Transport { endpoint: String, message: String },

    #[error("{endpoint} returned status {status}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("failed to decode {endpoint} response: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid upstream configuration: {0}")]
    Config(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode column: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store connection lock poisoned")]
    Poisoned,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Persistence(#[from] StoreError),

    #[error("invalid input: {0}")]
    Validation(String),
}

impl SyncError {
    /// Upstream failures in the duration and heartbeat steps only cost that
    /// step; everything else ends the day.
    pub fn is_upstream(&self) -> bool {
        matches!(self, SyncError::Upstream(_))
    }
}
