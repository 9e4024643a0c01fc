//! Error types for onair-playout
//!
//! Every failure is scoped to one channel; none of these is fatal to the
//! engine as a whole.

use crate::device::DeviceError;
use thiserror::Error;

/// Main error type for the playout engine
#[derive(Error, Debug)]
pub enum Error {
    /// Missing, zero-length or otherwise invalid track (no device interaction)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Decode or fetch failure while warming or binding a resource
    #[error("Resource load error: {0}")]
    ResourceLoad(String),

    /// Output sink switch failed (playback continues on the default sink)
    #[error("Device bind error: {0}")]
    DeviceBind(String),

    /// Resource not ready within the grace window (load continues)
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Host refused to start playback without a user gesture
    #[error("Permission error: {0}")]
    Permission(String),

    /// Channel name not in the registry
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    /// Operation not valid in the channel's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Superseded by a newer load or an unload on the same channel
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metadata API errors
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the shared crate
    #[error(transparent)]
    Common(#[from] onair_common::Error),
}

impl Error {
    /// Map a device failure that happened while loading or playing
    pub fn from_device(err: DeviceError) -> Self {
        match err {
            DeviceError::AutoplayBlocked => {
                Error::Permission("host blocked automatic playback".to_string())
            }
            DeviceError::SinkUnavailable(msg) => Error::DeviceBind(msg),
            DeviceError::Resource(msg) => Error::ResourceLoad(msg),
            DeviceError::Disconnected(msg) => Error::ResourceLoad(format!("device disconnected: {}", msg)),
        }
    }

    /// Short machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::ResourceLoad(_) => "resource_load",
            Error::DeviceBind(_) => "device_bind",
            Error::Timeout(_) => "timeout",
            Error::Permission(_) => "permission",
            Error::UnknownChannel(_) => "unknown_channel",
            Error::InvalidState(_) => "invalid_state",
            Error::Cancelled(_) => "cancelled",
            Error::Config(_) => "config",
            Error::Metadata(_) => "metadata",
            Error::Http(_) => "http",
            Error::Io(_) => "io",
            Error::Common(_) => "common",
        }
    }
}

/// Convenience Result type using the playout Error
pub type Result<T> = std::result::Result<T, Error>;
