//! Error types for the persistence layer

use thiserror::Error;

/// Errors that can occur while reading or writing persisted state
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to acquire file lock on {path}")]
    LockFailed { path: String },

    #[error("no checkpoint found for run_id={run_id}")]
    NoCheckpoint { run_id: String },

    #[error("no checkpoint found for run_id={run_id} at cycle={cycle} inference_count={inference_count}")]
    CheckpointNotAt {
        run_id: String,
        cycle: i64,
        inference_count: i64,
    },

    #[error("record not found: collection={collection} id={id}")]
    NotFound { collection: String, id: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;
