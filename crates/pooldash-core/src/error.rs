//! Error types for pooldash

use thiserror::Error;

/// Main error type for pooldash
#[derive(Error, Debug)]
pub enum PoolError {
    /// Network failure or non-success HTTP status
    #[error("Transport error: {0}")]
    Transport(String),

    /// Structured `error` field reported by the backend
    #[error("Backend error: {0}")]
    Backend(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// User input rejected before reaching the backend
    #[error("Invalid input: {0}")]
    Validation(String),

    /// A submission is already in flight
    #[error("Operation already in progress: {0}")]
    Busy(String),

    /// The component is not ready to issue this call yet
    #[error("Not ready: {0}")]
    NotReady(String),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for pooldash operations
pub type PoolResult<T> = Result<T, PoolError>;

impl PoolError {
    /// Message shown to the operator.
    ///
    /// Backend-authored messages are passed through verbatim; everything else
    /// uses the prefixed display form.
    pub fn user_message(&self) -> String {
        match self {
            PoolError::Backend(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for PoolError {
    fn from(err: serde_json::Error) -> Self {
        PoolError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for PoolError {
    fn from(err: toml::de::Error) -> Self {
        PoolError::Config(err.to_string())
    }
}
