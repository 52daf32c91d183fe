//! Error types for swarmr
//!
//! Centralized error handling using thiserror. Only the startup class of
//! failures ever aborts a sprint; everything task-level is converted to an
//! outcome before it can reach these types.

use thiserror::Error;

/// All error types that can occur in swarmr
#[derive(Debug, Error)]
pub enum SwarmError {
    /// Category catalog is malformed (empty, duplicate keys, bad weights)
    #[error("Invalid catalog: {0}")]
    Catalog(String),

    /// Completion provider could not be constructed at startup
    #[error("Provider error: {0}")]
    Provider(String),

    /// Artifact sink error
    #[error("Sink error: {0}")]
    Sink(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for swarmr operations
pub type Result<T> = std::result::Result<T, SwarmError>;
