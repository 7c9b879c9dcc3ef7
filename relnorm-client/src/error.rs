//! Error types for solver communication and job driving

use thiserror::Error;

/// Errors from solver calls and computation passes
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or HTTP error communicating with the solver
    #[error("Solver communication error: {0}")]
    Remote(String),

    /// Progress stream failed before delivering a result
    #[error("Progress stream error: {0}")]
    Stream(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error from the decomposition model
    #[error("Decomposition error: {0}")]
    Core(#[from] relnorm_core::CoreError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation requires a different driver phase
    #[error("Invalid driver state: {0}")]
    State(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Remote(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
