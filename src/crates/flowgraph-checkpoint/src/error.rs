//! Error types for checkpoint operations

use thiserror::Error;

/// Result type for checkpoint operations
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors that can occur during checkpoint operations
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// No checkpoint exists with the given id
    #[error("Checkpoint not found: {0}")]
    NotFound(String),

    /// Another writer already holds this `(thread_id, version)` slot
    #[error("Version conflict on thread '{thread_id}': version {version} already exists")]
    VersionConflict { thread_id: String, version: u64 },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Checkpoint is malformed (empty thread id, zero version, ...)
    #[error("Invalid checkpoint: {0}")]
    Invalid(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CheckpointError {
    /// Whether the error is a lost race for a version slot
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, CheckpointError::VersionConflict { .. })
    }
}
