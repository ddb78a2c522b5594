//! Error types for carddav-contacts

use thiserror::Error;

/// carddav-contacts error type
#[derive(Error, Debug)]
pub enum ContactsError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("vCard parse error: {0}")]
    Parse(String),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Download error: {0}")]
    Download(String),

    #[error("Image processing error: {0}")]
    Image(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] carddav_core::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ContactsError>;
