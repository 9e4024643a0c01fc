//! Channel state store
//!
//! Keyed store of per-channel records with replace-on-write semantics.
//! Readers get an `Arc<ChannelRecord>` snapshot that never changes under
//! them; writers build a new record from the old one and swap it in while
//! holding the write lock, so a position tick and a user command racing on
//! the same channel never produce a torn record.
//!
//! No validation lives here. The lifecycle controller is the only writer.

use onair_common::events::ChannelState;
use onair_common::{ChannelId, Track};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Immutable snapshot of one channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelRecord {
    pub channel: ChannelId,
    pub state: ChannelState,
    /// Track bound to the channel (kept while `Error` for diagnostics)
    pub current_track: Option<Track>,
    /// Track queued by `prebuffer_next`
    pub next_track: Option<Track>,
    /// Playhead in seconds
    pub position: f64,
    /// Duration of the current track in seconds
    pub duration: f64,
    /// Operator volume 0.0-1.0
    pub volume: f64,
    /// Last gain applied to the device (volume × fade ramp)
    pub gain: f64,
    /// Waiting for a user gesture before retrying playback
    pub awaiting_gesture: bool,
    /// Message of the last failure, cleared by the next successful load
    pub last_error: Option<String>,
}

/// Read-only view handed to callers
pub type ChannelView = Arc<ChannelRecord>;

impl ChannelRecord {
    /// Fresh idle record
    pub fn idle(channel: ChannelId, volume: f64) -> Self {
        Self {
            channel,
            state: ChannelState::Idle,
            current_track: None,
            next_track: None,
            position: 0.0,
            duration: 0.0,
            volume,
            gain: 0.0,
            awaiting_gesture: false,
            last_error: None,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state == ChannelState::Playing
    }

    /// Where the current track stops (cue end aware); None while unknown
    pub fn end(&self) -> Option<f64> {
        let end = self
            .current_track
            .as_ref()
            .and_then(|t| t.cue_points)
            .map(|c| c.effective_end(self.duration))
            .unwrap_or(self.duration);
        (end > 0.0).then_some(end)
    }

    /// Time left until [`end`](Self::end); None while the end is unknown
    pub fn remaining(&self) -> Option<f64> {
        self.end().map(|end| (end - self.position).max(0.0))
    }
}

/// Replace-on-write keyed store of channel records
pub struct ChannelStateStore {
    records: RwLock<HashMap<ChannelId, ChannelView>>,
    order: Vec<ChannelId>,
}

impl ChannelStateStore {
    /// Create idle records for the fixed channel registry
    pub fn new(channels: &[ChannelId], volume: f64) -> Self {
        let records = channels
            .iter()
            .map(|c| (c.clone(), Arc::new(ChannelRecord::idle(c.clone(), volume))))
            .collect();
        Self {
            records: RwLock::new(records),
            order: channels.to_vec(),
        }
    }

    /// Current snapshot of a channel
    pub fn get(&self, channel: &ChannelId) -> Option<ChannelView> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
            .cloned()
    }

    /// Snapshots of every channel in registry order
    pub fn snapshot(&self) -> Vec<ChannelView> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        self.order
            .iter()
            .filter_map(|c| records.get(c).cloned())
            .collect()
    }

    /// Channel registry
    pub fn channels(&self) -> &[ChannelId] {
        &self.order
    }

    /// Build a new record from the current one and swap it in atomically
    ///
    /// Returns `(old, new)`, or None for an unknown channel.
    pub fn update<F>(&self, channel: &ChannelId, f: F) -> Option<(ChannelView, ChannelView)>
    where
        F: FnOnce(&ChannelRecord) -> ChannelRecord,
    {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let old = records.get(channel)?.clone();
        let new = Arc::new(f(&old));
        records.insert(channel.clone(), Arc::clone(&new));
        Some((old, new))
    }
}
