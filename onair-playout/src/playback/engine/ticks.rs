//! Position ticks for PlayoutEngine
//!
//! **Responsibilities:**
//! - Pump device ticks into the engine (one task per playing channel)
//! - Cue-aware gain on every tick
//! - Threshold crossings → `track-end-approaching` (published twice)
//! - End of track → `track-ended` once, then `play-next` (published twice)
//!
//! Ticks are synchronous; they never take the command lock. A tick tagged
//! with a superseded generation is ignored, and so is any delayed repeat
//! of an event whose channel was re-loaded or unloaded in the meantime.

use super::core::ChannelSlot;
use super::PlayoutEngine;
use crate::error::Result;
use crate::state::ChannelRecord;
use onair_common::events::{ChannelState, PlayoutEvent};
use onair_common::{ChannelId, Track};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

impl PlayoutEngine {
    /// Feed a position (seconds) for the channel's current track
    ///
    /// For hosts that push positions instead of exposing a tick
    /// subscription. Must be called from within a tokio runtime.
    pub fn tick(&self, channel: &ChannelId, position: f64) -> Result<()> {
        let slot = self.slot(channel)?;
        self.handle_tick(channel, slot.generation(), position);
        Ok(())
    }

    /// (Re)start forwarding the device's ticks for `generation`
    pub(super) fn start_tick_pump(&self, channel: &ChannelId, slot: &ChannelSlot, generation: u64) {
        let mut pump = slot.pump();
        if let Some(previous) = pump.take() {
            previous.abort();
        }

        let mut ticks = slot.device.subscribe_ticks();
        let engine = self.clone();
        let channel = channel.clone();
        *pump = Some(tokio::spawn(async move {
            while let Some(position) = ticks.recv().await {
                if !engine.handle_tick(&channel, generation, position) {
                    break;
                }
            }
            trace!(channel = %channel, "Tick pump finished");
        }));
    }

    /// Apply one tick; false once the pump should stop
    pub(super) fn handle_tick(&self, channel: &ChannelId, generation: u64, position: f64) -> bool {
        let Some(slot) = self.shared.slots.get(channel) else {
            return false;
        };
        if !slot.is_current(generation) {
            trace!(channel = %channel, "Dropped tick from superseded track");
            return false;
        }
        if !position.is_finite() {
            return true;
        }
        let position = position.max(0.0);

        let mut applied = None;
        let updated = self.shared.store.update(channel, |r| {
            if r.state != ChannelState::Playing {
                return r.clone();
            }
            let gain = r
                .current_track
                .as_ref()
                .map(|t| t.cues_or_default().gain(position, r.volume))
                .unwrap_or(r.volume);
            applied = Some(gain);
            ChannelRecord {
                position,
                gain,
                ..r.clone()
            }
        });
        let (Some((old, record)), Some(gain)) = (updated, applied) else {
            return true;
        };
        if gain != old.gain {
            slot.device.set_gain(gain);
        }
        let Some(track) = record.current_track.clone() else {
            return true;
        };

        // No known end yet: gain only, never thresholds or end of track
        let Some(end) = record.end() else {
            return true;
        };
        let remaining = (end - position).max(0.0);
        for level in self.shared.thresholds.observe(channel, remaining) {
            debug!(channel = %channel, threshold = %level, remaining, "Track end approaching");
            let event =
                PlayoutEvent::track_end_approaching(channel.clone(), track.clone(), remaining, level);
            self.publish_redundant(slot, generation, event, self.shared.settings.approaching_repost);
        }

        if position >= end && self.shared.thresholds.mark_ended(channel) {
            self.finish_track(channel, slot, generation, track);
            return false;
        }
        true
    }

    fn finish_track(&self, channel: &ChannelId, slot: &ChannelSlot, generation: u64, track: Track) {
        slot.device.pause();
        slot.device.set_gain(0.0);

        let next_track = self
            .transition(channel, |r| ChannelRecord {
                state: ChannelState::Ended,
                gain: 0.0,
                ..r.clone()
            })
            .ok()
            .and_then(|view| view.next_track.clone());

        info!(
            channel = %channel,
            track_id = %track.id,
            next = next_track.as_ref().map(|t| t.id.as_str()).unwrap_or("-"),
            "Track ended"
        );
        self.shared.bus.emit_lossy(PlayoutEvent::track_ended(
            channel.clone(),
            track.clone(),
            next_track,
        ));
        self.publish_redundant(
            slot,
            generation,
            PlayoutEvent::play_next(channel.clone(), track),
            self.shared.settings.play_next_repost,
        );
    }

    /// Publish now and once more after `delay`, reusing the event id
    ///
    /// The repeat is dropped if the channel's generation moved on.
    fn publish_redundant(
        &self,
        slot: &ChannelSlot,
        generation: u64,
        event: PlayoutEvent,
        delay: Duration,
    ) {
        self.shared.bus.emit_lossy(event.clone());

        let bus = self.shared.bus.clone();
        let current = Arc::clone(&slot.generation);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if current.load(Ordering::SeqCst) == generation {
                bus.emit_lossy(event);
            } else {
                trace!(
                    event_type = event.event_type(),
                    "Dropped repeat for superseded track"
                );
            }
        });
    }
}
