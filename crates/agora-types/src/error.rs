//! Error types for agora.

use thiserror::Error;

/// Shared error type for configuration and record encoding.
#[derive(Error, Debug)]
pub enum AgoraError {
    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Record could not be serialized or deserialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
