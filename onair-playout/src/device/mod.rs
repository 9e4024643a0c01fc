//! Device binding abstractions
//!
//! The engine never talks to an audio backend directly. Each channel owns one
//! [`DeviceBinding`] (output sink + decode unit) created by a
//! [`DeviceFactory`]; resources are warmed by a [`ResourceLoader`]; autoplay
//! policy is a [`HostCapabilities`] concern.
//!
//! Shipped implementations:
//! - [`ProbeLoader`]: probes media files with symphonia
//! - [`ClockDevice`]: playhead driven by a tokio interval, emits ticks
//! - [`GestureRelay`]: host capability fed by explicit gesture signals

pub mod clock;
pub mod host;
pub mod probe;

pub use clock::{ClockDevice, ClockDeviceFactory};
pub use host::GestureRelay;
pub use probe::ProbeLoader;

use async_trait::async_trait;
use onair_common::{ChannelId, Track};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Failures reported by device and loader implementations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// Host denied automatic playback (needs a user gesture)
    #[error("automatic playback blocked by host")]
    AutoplayBlocked,

    /// Requested output sink could not be selected
    #[error("output sink unavailable: {0}")]
    SinkUnavailable(String),

    /// Resource could not be fetched or decoded
    #[error("resource error: {0}")]
    Resource(String),

    /// The device went away
    #[error("device disconnected: {0}")]
    Disconnected(String),
}

/// A media resource warmed ahead of playback
#[derive(Debug, Clone, PartialEq)]
pub struct WarmResource {
    /// Track the resource was warmed for
    pub track_id: String,
    /// Resolved locator
    pub locator: PathBuf,
    /// Probed duration in seconds (None when the container doesn't say)
    pub duration: Option<f64>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    /// Size of the underlying file in bytes
    pub byte_len: u64,
}

/// Warms track resources (fetch, open, probe)
#[async_trait]
pub trait ResourceLoader: Send + Sync {
    async fn warm(&self, track: &Track) -> Result<WarmResource, DeviceError>;
}

/// One channel's output sink and decode unit
///
/// Position ticks are delivered through the receiver returned by
/// [`DeviceBinding::subscribe_ticks`]; each call replaces the previous
/// subscription.
#[async_trait]
pub trait DeviceBinding: Send + Sync {
    /// Attach a warmed resource (replaces any previous one)
    async fn bind_resource(&self, resource: Arc<WarmResource>) -> Result<(), DeviceError>;

    /// Route output to the given sink
    async fn bind_sink(&self, sink_id: &str) -> Result<(), DeviceError>;

    /// Start or resume playback
    async fn start(&self) -> Result<(), DeviceError>;

    fn pause(&self);

    fn seek(&self, position: f64);

    fn set_gain(&self, gain: f64);

    /// Subscribe to playhead position ticks (seconds)
    fn subscribe_ticks(&self) -> mpsc::UnboundedReceiver<f64>;

    /// Stop playback, drop the resource and end the tick subscription
    fn teardown(&self);
}

/// Creates the Device Binding owned by each channel
pub trait DeviceFactory: Send + Sync {
    fn create(&self, channel: &ChannelId) -> Arc<dyn DeviceBinding>;
}

/// Capabilities the host environment provides to the engine
pub trait HostCapabilities: Send + Sync {
    /// Fire once on the next user gesture
    ///
    /// The receiver errors if the host drops the listener without a gesture.
    fn register_one_shot_gesture_listener(&self, channel: &ChannelId) -> oneshot::Receiver<()>;
}
