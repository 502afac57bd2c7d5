//! Custom error types for permadex

use thiserror::Error;

/// Main error type for permadex operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Content type '{0}' is not indexable")]
    NotIndexable(String),

    #[error("Content not found: {0}")]
    ContentNotFound(i64),

    #[error("Malformed content identifier: {0}")]
    MalformedIdentifier(String),

    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    #[error("Index swap failed: {0}")]
    SwapFailure(String),

    #[error("Rebuild job state is unreadable: {0}")]
    JobState(String),

    #[error("Rebuild job changed concurrently: {0}")]
    JobConflict(String),

    #[error("Not initialized: run 'permadex init' first")]
    NotInitialized,

    #[error("Already initialized at {0}")]
    AlreadyInitialized(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for permadex
pub type Result<T> = std::result::Result<T, Error>;
