//! Error types for Mnemon

use thiserror::Error;

/// Result type alias for Mnemon operations
pub type Result<T> = std::result::Result<T, MnemonError>;

/// Main error type for Mnemon
#[derive(Error, Debug)]
pub enum MnemonError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    #[error("Invalid category: {0}")]
    InvalidCategory(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Memory not found: {0}")]
    NotFound(String),

    #[error("Capability error: {0}")]
    Capability(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl MnemonError {
    /// Whether this error came from an external capability (embedding or
    /// completion backend) rather than local validation or storage
    pub fn is_capability_failure(&self) -> bool {
        matches!(self, MnemonError::Capability(_))
    }
}
