//! # Database Errors

use thiserror::Error;

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;

/// Database errors
#[derive(Debug, Error)]
pub enum DbError {
    /// Connection URL could not be parsed
    #[error("failed to parse db config: {0}")]
    InvalidUrl(String),

    /// Pool could not be created
    #[error("failed to connect: {0}")]
    Connect(String),

    /// Connectivity check failed
    #[error("ping failed: {0}")]
    Ping(String),

    /// Query failed or timed out
    #[error("query failed: {0}")]
    Query(String),
}
