//! # On-Air Common Library
//!
//! Shared code for the on-air playout services:
//! - Track model and cue points (fade/gain calculations)
//! - Published event types and the EventBus
//! - Configuration file location and root folder resolution
//! - Timestamp helpers

pub mod config;
pub mod cue_points;
pub mod error;
pub mod events;
pub mod time;
pub mod track;

pub use cue_points::{CuePoints, FadePhase};
pub use error::{Error, Result};
pub use track::{ChannelId, Track};
