//! Error types for cluster module

use thiserror::Error;

/// Cluster error types
#[derive(Debug, Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Notification channel disconnected: {0}")]
    Disconnected(String),
}

/// Result type for cluster operations
pub type Result<T> = std::result::Result<T, Error>;
