//! Playback-related type definitions
//!
//! Supporting types for channel lifecycle state and end-of-track signalling.

use serde::{Deserialize, Serialize};

/// Per-channel lifecycle state
///
/// `Idle → Loading → Ready → Playing ⇄ Paused → Ended → Idle`, with `Error`
/// reachable from `Loading` and `Playing`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    /// No track loaded
    Idle,
    /// Resource being warmed and bound
    Loading,
    /// Track bound, playhead at cue start, not playing
    Ready,
    /// Actively playing
    Playing,
    /// Paused mid-track
    Paused,
    /// Reached the end of the track
    Ended,
    /// Load or playback failed; a new load is required
    Error,
}

impl ChannelState {
    /// True when a track is bound to the channel's device
    pub fn has_track(&self) -> bool {
        matches!(
            self,
            ChannelState::Ready | ChannelState::Playing | ChannelState::Paused | ChannelState::Ended
        )
    }
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelState::Idle => write!(f, "idle"),
            ChannelState::Loading => write!(f, "loading"),
            ChannelState::Ready => write!(f, "ready"),
            ChannelState::Playing => write!(f, "playing"),
            ChannelState::Paused => write!(f, "paused"),
            ChannelState::Ended => write!(f, "ended"),
            ChannelState::Error => write!(f, "error"),
        }
    }
}

/// Remaining-time thresholds that fire "approaching end" events
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdLevel {
    /// Default 3.0s remaining
    Early,
    /// Default 1.5s remaining
    Medium,
    /// Default 0.5s remaining
    Critical,
}

impl ThresholdLevel {
    /// All levels in firing order
    pub const ALL: [ThresholdLevel; 3] = [
        ThresholdLevel::Early,
        ThresholdLevel::Medium,
        ThresholdLevel::Critical,
    ];

    /// Delivery priority attached to the published event
    pub fn priority(&self) -> EventPriority {
        match self {
            ThresholdLevel::Early => EventPriority::Normal,
            ThresholdLevel::Medium => EventPriority::High,
            ThresholdLevel::Critical => EventPriority::Critical,
        }
    }
}

impl std::fmt::Display for ThresholdLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThresholdLevel::Early => write!(f, "early"),
            ThresholdLevel::Medium => write!(f, "medium"),
            ThresholdLevel::Critical => write!(f, "critical"),
        }
    }
}

/// Priority hint for event consumers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum EventPriority {
    Normal,
    High,
    Critical,
}
