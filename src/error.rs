use thiserror::Error;

use crate::models::task::DownloadStatus;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("download already in progress for song {song_id}")]
    AlreadyInProgress { song_id: u64 },

    #[error("a batch download is already active")]
    BatchInProgress,

    #[error("no entry for song {song_id}")]
    NotFound { song_id: u64 },

    #[error("operation not valid for song {song_id} in state {status:?}")]
    InvalidState {
        song_id: u64,
        status: DownloadStatus,
    },

    #[error("transfer failed: {0}")]
    TransferFailed(String),

    #[error("corrupt transfer: expected {expected} bytes, received {actual}")]
    CorruptTransfer { expected: u64, actual: u64 },

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("index error: {0}")]
    Index(#[from] serde_json::Error),

    /// Cooperative cancellation observed mid-transfer. Mapped to the
    /// `Cancelled` task status, never surfaced to callers as a failure.
    #[error("download cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, DownloadError>;
