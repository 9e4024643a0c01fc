//! Common error types for the on-air services

use thiserror::Error;

/// Common result type for on-air operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the on-air crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed cue point metadata
    #[error("Invalid cue points: {0}")]
    InvalidCuePoints(String),

    /// Invalid track metadata
    #[error("Invalid track: {0}")]
    InvalidTrack(String),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
