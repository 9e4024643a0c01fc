//! # On-Air Playout Engine
//!
//! Multi-channel playout for a studio player bank: each channel loads a
//! track, optionally prebuffers the next one, applies cue-point fades and
//! publishes end-of-track timing events for an external Auto DJ.
//!
//! - [`playback::PlayoutEngine`]: lifecycle controller over all channels
//! - [`state`]: replace-on-write channel records
//! - [`playback::prebuffer`]: warm-up cache keyed by channel and purpose
//! - [`playback::thresholds`]: one-shot "approaching end" scheduling
//! - [`device`]: device, loader and host capability seams
//! - [`api`]: HTTP/SSE control surface

pub mod api;
pub mod config;
pub mod device;
pub mod error;
pub mod metadata;
pub mod notify;
pub mod playback;
pub mod state;

pub use config::{EngineSettings, TomlConfig};
pub use error::{Error, Result};
pub use notify::{Notification, NotificationSink};
pub use playback::{PlayOutcome, PlayoutEngine};
pub use state::{ChannelRecord, ChannelView};
