//! Session error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session configuration: {0}")]
    Config(String),

    #[error("session storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode or decode session data: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("invalid cookie header value: {0}")]
    Header(#[from] axum::http::header::InvalidHeaderValue),

    #[error("session id hashing failed: {0}")]
    Crypto(String),

    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[cfg(feature = "mysql")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
