//! Error types for Parley

use thiserror::Error;

/// Result type alias for Parley operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Parley
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Backend rejected the request (non-2xx with a server message)
    #[error("{0}")]
    Backend(String),

    /// Audio processing error
    #[error("audio error: {0}")]
    Audio(String),

    /// Voice capture error
    #[error("voice error: {0}")]
    Voice(String),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
