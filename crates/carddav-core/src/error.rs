//! Error types for carddav-core

use thiserror::Error;

/// Main error type for carddav-core
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for carddav-core
pub type Result<T> = std::result::Result<T, Error>;
