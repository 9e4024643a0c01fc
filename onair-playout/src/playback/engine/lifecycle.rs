//! Lifecycle commands for PlayoutEngine
//!
//! **Responsibilities:**
//! - Load, play, pause, stop, seek, unload and update per channel
//! - Resource acquisition through the prebuffer cache
//! - Grace-window timeout warnings while a resource warms up
//! - Autoplay rejection: one-shot gesture listener and a single retry
//!
//! Every command takes the channel's command lock, so two commands on the
//! same channel never interleave. Loads and unloads first cancel whatever
//! is in flight on the channel.

use super::core::ChannelSlot;
use super::PlayoutEngine;
use crate::device::{DeviceError, WarmResource};
use crate::error::{Error, Result};
use crate::notify::Notification;
use crate::playback::prebuffer::{CacheLookup, PrebufferPurpose, WarmState};
use crate::state::{ChannelRecord, ChannelView};
use onair_common::events::{ChannelState, PlayoutEvent};
use onair_common::time::{clamp_position, format_position};
use onair_common::{ChannelId, Track};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What `play` did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayOutcome {
    /// Started from `Ready` (or rewound from `Ended`)
    Started,
    /// Resumed from `Paused`
    Resumed,
    AlreadyPlaying,
    /// Host blocked playback; it will be retried once after a user gesture
    AwaitingGesture,
}

fn validate(track: &Track) -> Result<()> {
    track.validate().map_err(|e| match e {
        onair_common::Error::InvalidTrack(msg) | onair_common::Error::InvalidCuePoints(msg) => {
            Error::Validation(msg)
        }
        other => Error::Validation(other.to_string()),
    })
}

/// Seconds the bound resource can actually play; 0 while unknown
///
/// Metadata durations are trusted only up to the probed length, since the
/// device stops at the end of the decoded file.
fn playable_duration(track: &Track, resource: &WarmResource) -> f64 {
    let probed = resource.duration.filter(|d| d.is_finite() && *d > 0.0);
    match probed {
        Some(probed) if track.duration > 0.0 => track.duration.min(probed),
        Some(probed) => probed,
        None => track.duration,
    }
}

fn cancelled(channel: &ChannelId, track: &Track) -> Error {
    Error::Cancelled(format!(
        "load of track {} on channel {} was superseded",
        track.id, channel
    ))
}

impl PlayoutEngine {
    /// Load `track` onto `channel` and leave it `Ready` at the cue start
    ///
    /// Supersedes any load in flight on the channel (that one returns
    /// [`Error::Cancelled`]). Validation failures put the channel into
    /// `Error` without touching the device binding.
    pub async fn load_track(&self, channel: &ChannelId, track: Track) -> Result<ChannelView> {
        let slot = self.slot(channel)?;
        let (token, generation) = slot.supersede();
        let _guard = slot.command_lock.lock().await;
        if token.is_cancelled() {
            return Err(cancelled(channel, &track));
        }

        slot.stop_tick_pump();
        self.shared.thresholds.clear(channel);

        if let Err(err) = validate(&track) {
            if self.get(channel)?.is_playing() {
                slot.device.pause();
            }
            let message = err.to_string();
            self.transition(channel, |r| ChannelRecord {
                state: ChannelState::Error,
                current_track: Some(track.clone()),
                position: 0.0,
                duration: 0.0,
                gain: 0.0,
                awaiting_gesture: false,
                last_error: Some(message),
                ..r.clone()
            })?;
            error!(channel = %channel, track_id = %track.id, "Rejected track: {}", err);
            self.shared
                .notifier
                .notify(Notification::error(channel, &err));
            return Err(err);
        }

        let start = track.start_position();
        self.transition(channel, |r| ChannelRecord {
            state: ChannelState::Loading,
            next_track: r.next_track.clone().filter(|n| !n.same_resource(&track)),
            current_track: Some(track.clone()),
            position: start,
            duration: track.duration,
            gain: 0.0,
            awaiting_gesture: false,
            last_error: None,
            ..r.clone()
        })?;
        info!(channel = %channel, track_id = %track.id, "Loading track");

        let work = async {
            let (resource, from_cache) = self.acquire_resource(channel, &track).await?;
            slot.device
                .bind_resource(Arc::clone(&resource))
                .await
                .map_err(Error::from_device)?;
            Ok::<_, Error>((resource, from_cache))
        };

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Err(cancelled(channel, &track)),
            result = self.within_grace(channel, &track.id, work) => result,
        };

        let (resource, from_cache) = match outcome {
            Ok(loaded) => loaded,
            Err(err @ Error::Cancelled(_)) => {
                debug!(channel = %channel, track_id = %track.id, "Load cancelled");
                return Err(err);
            }
            Err(err) => return Err(self.fail_channel(channel, generation, err)),
        };
        if !slot.is_current(generation) {
            return Err(cancelled(channel, &track));
        }

        if !from_cache {
            self.shared
                .prebuffer
                .store_active(channel, &track, Arc::clone(&resource));
        }

        let duration = playable_duration(&track, &resource);
        slot.device.seek(start);
        slot.device.set_gain(0.0);

        let view = self.transition(channel, |r| ChannelRecord {
            state: ChannelState::Ready,
            position: start,
            duration,
            gain: 0.0,
            ..r.clone()
        })?;

        info!(
            channel = %channel,
            track_id = %track.id,
            from_cache,
            duration,
            "Track ready"
        );
        self.shared
            .notifier
            .notify(Notification::info(channel, format!("Loaded {}", track.label())));
        self.shared
            .bus
            .emit_lossy(PlayoutEvent::track_loaded(channel.clone(), track, from_cache));
        Ok(view)
    }

    /// Load `track` without playing; no-op when it is already loaded
    pub async fn set_track_without_playing(
        &self,
        channel: &ChannelId,
        track: Track,
    ) -> Result<ChannelView> {
        let record = self.get(channel)?;
        let loaded = record.state.has_track()
            && record
                .current_track
                .as_ref()
                .map(|t| t.same_resource(&track))
                .unwrap_or(false);
        if loaded {
            debug!(channel = %channel, track_id = %track.id, "Track already loaded");
            return Ok(record);
        }
        self.load_track(channel, track).await
    }

    /// Start or resume playback
    pub async fn play(&self, channel: &ChannelId) -> Result<PlayOutcome> {
        let slot = self.slot(channel)?;
        let _guard = slot.command_lock.lock().await;
        let record = self.get(channel)?;

        let resuming = match record.state {
            ChannelState::Playing => return Ok(PlayOutcome::AlreadyPlaying),
            ChannelState::Paused => true,
            ChannelState::Ready | ChannelState::Ended => false,
            state => {
                return Err(Error::InvalidState(format!(
                    "channel {} cannot play while {}",
                    channel, state
                )))
            }
        };
        if record.awaiting_gesture {
            return Ok(PlayOutcome::AwaitingGesture);
        }
        let Some(track) = record.current_track.clone() else {
            return Err(Error::InvalidState(format!("channel {} has no track", channel)));
        };
        let cues = track.cues_or_default();

        let mut position = record.position;
        if record.state == ChannelState::Ended {
            position = track.start_position();
            slot.device.seek(position);
            self.shared.thresholds.clear(channel);
            self.transition(channel, |r| ChannelRecord {
                state: ChannelState::Ready,
                position,
                ..r.clone()
            })?;
            debug!(channel = %channel, position, "Rewound ended track");
        }

        if let Some(sink) = self.shared.settings.output_sinks.get(channel) {
            if let Err(e) = slot.device.bind_sink(sink).await {
                let err = Error::DeviceBind(format!("sink '{}': {}", sink, e));
                warn!(channel = %channel, "{}; playing on the default output", err);
                self.shared
                    .notifier
                    .notify(Notification::warning(channel, &err));
            }
        }

        let gain = if position <= cues.start {
            cues.initial_gain(record.volume)
        } else {
            cues.gain(position, record.volume)
        };
        slot.device.set_gain(gain);

        let generation = slot.generation();
        match slot.device.start().await {
            Ok(()) => {
                self.start_tick_pump(channel, slot, generation);
                self.transition(channel, |r| ChannelRecord {
                    state: ChannelState::Playing,
                    position,
                    gain,
                    awaiting_gesture: false,
                    ..r.clone()
                })?;
                if resuming {
                    info!(
                        channel = %channel,
                        track_id = %track.id,
                        position = %format_position(position),
                        "Playback resumed"
                    );
                    Ok(PlayOutcome::Resumed)
                } else {
                    info!(
                        channel = %channel,
                        track_id = %track.id,
                        position = %format_position(position),
                        "Playback started"
                    );
                    Ok(PlayOutcome::Started)
                }
            }
            Err(DeviceError::AutoplayBlocked) => {
                self.await_gesture(channel, slot, generation)?;
                Ok(PlayOutcome::AwaitingGesture)
            }
            Err(e) => Err(self.fail_channel(channel, generation, Error::from_device(e))),
        }
    }

    /// Load `track` then start it
    pub async fn play_track(&self, channel: &ChannelId, track: Track) -> Result<PlayOutcome> {
        self.load_track(channel, track).await?;
        self.play(channel).await
    }

    pub async fn pause(&self, channel: &ChannelId) -> Result<ChannelView> {
        let slot = self.slot(channel)?;
        let _guard = slot.command_lock.lock().await;
        let record = self.get(channel)?;
        if !record.state.has_track() {
            return Err(Error::InvalidState(format!(
                "channel {} has nothing to pause ({})",
                channel, record.state
            )));
        }

        if record.is_playing() {
            slot.device.pause();
            slot.stop_tick_pump();
        }
        self.transition(channel, |r| ChannelRecord {
            state: if r.is_playing() {
                ChannelState::Paused
            } else {
                r.state
            },
            awaiting_gesture: false,
            ..r.clone()
        })
    }

    /// Stop and rewind to the cue start; the channel stays loaded (`Ready`)
    pub async fn stop(&self, channel: &ChannelId) -> Result<ChannelView> {
        let slot = self.slot(channel)?;
        let _guard = slot.command_lock.lock().await;
        let record = self.get(channel)?;
        if !record.state.has_track() {
            return Err(Error::InvalidState(format!(
                "channel {} has nothing to stop ({})",
                channel, record.state
            )));
        }

        let start = record
            .current_track
            .as_ref()
            .map(Track::start_position)
            .unwrap_or(0.0);
        slot.device.pause();
        slot.stop_tick_pump();
        slot.device.seek(start);
        slot.device.set_gain(0.0);
        self.shared.thresholds.clear(channel);

        self.transition(channel, |r| ChannelRecord {
            state: ChannelState::Ready,
            position: start,
            gain: 0.0,
            awaiting_gesture: false,
            ..r.clone()
        })
    }

    /// Move the playhead; clamped to `[0, duration]`
    ///
    /// Keeps the playing/paused state. Seeking an ended track back inside
    /// its playable range leaves it `Paused` there.
    pub async fn seek(&self, channel: &ChannelId, position: f64) -> Result<ChannelView> {
        if !position.is_finite() {
            return Err(Error::Validation(format!("invalid seek position {}", position)));
        }
        let slot = self.slot(channel)?;
        let _guard = slot.command_lock.lock().await;
        let record = self.get(channel)?;
        if !record.state.has_track() {
            return Err(Error::InvalidState(format!(
                "channel {} cannot seek while {}",
                channel, record.state
            )));
        }

        let target = clamp_position(position, record.duration);
        let cues = record
            .current_track
            .as_ref()
            .map(Track::cues_or_default)
            .unwrap_or_default();
        let end = cues.effective_end(record.duration);

        slot.device.seek(target);
        if target < record.position {
            self.shared.thresholds.clear(channel);
        }

        let gain = if record.is_playing() {
            let gain = cues.gain(target, record.volume);
            slot.device.set_gain(gain);
            gain
        } else {
            record.gain
        };

        debug!(
            channel = %channel,
            from = %format_position(record.position),
            to = %format_position(target),
            "Seek"
        );
        self.transition(channel, |r| ChannelRecord {
            state: if r.state == ChannelState::Ended && target < end {
                ChannelState::Paused
            } else {
                r.state
            },
            position: target,
            gain,
            ..r.clone()
        })
    }

    /// Tear the channel down to `Idle`
    ///
    /// Cancels any in-flight load, stops ticks and drops the channel's
    /// prebuffer entries and threshold flags.
    pub async fn unload_track(&self, channel: &ChannelId) -> Result<ChannelView> {
        let slot = self.slot(channel)?;
        slot.supersede();
        let _guard = slot.command_lock.lock().await;

        slot.stop_tick_pump();
        slot.device.teardown();
        self.shared.thresholds.clear(channel);
        self.shared.prebuffer.discard_channel(channel);

        let view = self.transition(channel, |r| ChannelRecord::idle(channel.clone(), r.volume))?;
        info!(channel = %channel, "Channel unloaded");
        Ok(view)
    }

    /// Refresh the metadata of the loaded track
    ///
    /// While playing or paused only the metadata is replaced. Otherwise a
    /// different track is loaded, a new locator for the same track is
    /// re-bound at the current playhead, and anything else is a metadata
    /// refresh.
    pub async fn update_track(&self, channel: &ChannelId, track: Track) -> Result<ChannelView> {
        validate(&track)?;
        let slot = self.slot(channel)?;
        let guard = slot.command_lock.lock().await;
        let record = self.get(channel)?;

        if matches!(record.state, ChannelState::Playing | ChannelState::Paused) {
            return self.refresh_metadata(channel, track);
        }

        let current = match &record.current_track {
            Some(current) if record.state.has_track() => current.clone(),
            _ => {
                drop(guard);
                return self.load_track(channel, track).await;
            }
        };

        if current.id != track.id {
            drop(guard);
            return self.load_track(channel, track).await;
        }
        if current.path != track.path {
            return self.rebind(channel, slot, &record, track).await;
        }
        self.refresh_metadata(channel, track)
    }

    /// Replace the track metadata; fills in a duration that is still unknown
    fn refresh_metadata(&self, channel: &ChannelId, track: Track) -> Result<ChannelView> {
        debug!(channel = %channel, track_id = %track.id, "Track metadata refreshed");
        self.transition(channel, |r| ChannelRecord {
            duration: if r.duration > 0.0 {
                r.duration
            } else {
                track.duration
            },
            current_track: Some(track),
            ..r.clone()
        })
    }

    /// Bind a new resource for the same track, keeping the playhead
    async fn rebind(
        &self,
        channel: &ChannelId,
        slot: &ChannelSlot,
        record: &ChannelRecord,
        track: Track,
    ) -> Result<ChannelView> {
        let generation = slot.generation();
        let token = slot.current_token();
        let position = record.position;

        let work = async {
            let (resource, _) = self.acquire_resource(channel, &track).await?;
            slot.device
                .bind_resource(Arc::clone(&resource))
                .await
                .map_err(Error::from_device)?;
            Ok::<_, Error>(resource)
        };
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Err(cancelled(channel, &track)),
            result = self.within_grace(channel, &track.id, work) => result,
        };

        let resource = match outcome {
            Ok(resource) => resource,
            Err(err @ Error::Cancelled(_)) => return Err(err),
            Err(err) => return Err(self.fail_channel(channel, generation, err)),
        };

        self.shared
            .prebuffer
            .store_active(channel, &track, Arc::clone(&resource));
        let duration = playable_duration(&track, &resource);
        let position = clamp_position(position, duration);
        slot.device.seek(position);
        info!(channel = %channel, track_id = %track.id, position, "Track re-bound to new locator");
        self.transition(channel, |r| ChannelRecord {
            current_track: Some(track),
            position,
            duration,
            ..r.clone()
        })
    }

    /// Set the operator volume (clamped to 0.0-1.0)
    ///
    /// A playing channel gets the cue-aware gain re-applied immediately.
    pub fn set_volume(&self, channel: &ChannelId, volume: f64) -> Result<ChannelView> {
        if !volume.is_finite() {
            return Err(Error::Validation(format!("invalid volume {}", volume)));
        }
        let slot = self.slot(channel)?;
        let volume = volume.clamp(0.0, 1.0);

        let mut applied = None;
        let view = self.transition(channel, |r| {
            let gain = if r.is_playing() {
                let gain = r
                    .current_track
                    .as_ref()
                    .map(|t| t.cues_or_default().gain(r.position, volume))
                    .unwrap_or(volume);
                applied = Some(gain);
                gain
            } else {
                r.gain
            };
            ChannelRecord {
                volume,
                gain,
                ..r.clone()
            }
        })?;

        if let Some(gain) = applied {
            slot.device.set_gain(gain);
        }
        Ok(view)
    }

    /// Warm `track` for `channel` ahead of use
    pub fn prebuffer(
        &self,
        channel: &ChannelId,
        track: &Track,
        purpose: PrebufferPurpose,
    ) -> Result<()> {
        self.slot(channel)?;
        validate(track)?;
        self.shared.prebuffer.prebuffer(channel, track, purpose);
        Ok(())
    }

    /// Queue `next` in the channel's next slot and warm it
    pub fn prebuffer_next(&self, channel: &ChannelId, next: Track) -> Result<ChannelView> {
        self.slot(channel)?;
        validate(&next)?;
        self.shared
            .prebuffer
            .prebuffer(channel, &next, PrebufferPurpose::Next);
        info!(channel = %channel, track_id = %next.id, "Next track queued");
        self.transition(channel, |r| ChannelRecord {
            next_track: Some(next),
            ..r.clone()
        })
    }

    /// Warm resource for `track`: cache hit, in-flight warm-up, or a fresh fetch
    async fn acquire_resource(
        &self,
        channel: &ChannelId,
        track: &Track,
    ) -> Result<(Arc<WarmResource>, bool)> {
        match self.shared.prebuffer.lookup(channel, track) {
            CacheLookup::Hit(resource) => {
                debug!(channel = %channel, track_id = %track.id, "Prebuffer hit");
                Ok((resource, true))
            }
            CacheLookup::Pending(mut rx) => {
                debug!(channel = %channel, track_id = %track.id, "Awaiting in-flight prebuffer");
                let settled = rx
                    .wait_for(|s| !matches!(s, WarmState::Warming))
                    .await
                    .map(|s| s.clone());
                match settled {
                    Ok(WarmState::Ready(resource)) => Ok((resource, true)),
                    Ok(WarmState::Failed(msg)) => Err(Error::ResourceLoad(msg)),
                    // Entry was discarded mid-flight; fetch directly
                    Ok(WarmState::Warming) | Err(_) => self.warm_now(track).await.map(|r| (r, false)),
                }
            }
            CacheLookup::Miss => self.warm_now(track).await.map(|r| (r, false)),
        }
    }

    async fn warm_now(&self, track: &Track) -> Result<Arc<WarmResource>> {
        self.shared
            .prebuffer
            .loader()
            .warm(track)
            .await
            .map(Arc::new)
            .map_err(Error::from_device)
    }

    /// Await `work`, warning once if it outlives the load grace window
    ///
    /// The work is never aborted by the grace window.
    async fn within_grace<F, T>(&self, channel: &ChannelId, track_id: &str, work: F) -> T
    where
        F: Future<Output = T>,
    {
        let grace = self.shared.settings.load_grace;
        tokio::pin!(work);
        match tokio::time::timeout(grace, &mut work).await {
            Ok(value) => value,
            Err(_) => {
                let err = Error::Timeout(format!(
                    "track {} not ready after {}ms, still waiting",
                    track_id,
                    grace.as_millis()
                ));
                warn!(channel = %channel, "{}", err);
                self.shared
                    .notifier
                    .notify(Notification::warning(channel, &err));
                work.await
            }
        }
    }

    /// Register for the next user gesture and retry `start` once when it comes
    fn await_gesture(&self, channel: &ChannelId, slot: &ChannelSlot, generation: u64) -> Result<()> {
        let err = Error::Permission("playback needs a user gesture, will retry once".to_string());
        warn!(channel = %channel, "{}", err);
        self.shared
            .notifier
            .notify(Notification::warning(channel, &err));

        self.transition(channel, |r| ChannelRecord {
            awaiting_gesture: true,
            ..r.clone()
        })?;

        let gesture = self.shared.host.register_one_shot_gesture_listener(channel);
        let token = slot.current_token();
        let engine = self.clone();
        let channel = channel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(channel = %channel, "Gesture wait cancelled");
                }
                result = gesture => match result {
                    Ok(()) => engine.retry_after_gesture(&channel, generation).await,
                    Err(_) => debug!(channel = %channel, "Gesture listener dropped"),
                },
            }
        });
        Ok(())
    }

    async fn retry_after_gesture(&self, channel: &ChannelId, generation: u64) {
        let Ok(slot) = self.slot(channel) else {
            return;
        };
        let _guard = slot.command_lock.lock().await;
        let Ok(record) = self.get(channel) else {
            return;
        };
        if !slot.is_current(generation) || !record.awaiting_gesture {
            debug!(channel = %channel, "Gesture arrived for a stale play request");
            return;
        }

        info!(channel = %channel, "User gesture received, retrying playback");
        match slot.device.start().await {
            Ok(()) => {
                self.start_tick_pump(channel, slot, generation);
                let _ = self.transition(channel, |r| ChannelRecord {
                    state: ChannelState::Playing,
                    awaiting_gesture: false,
                    ..r.clone()
                });
            }
            Err(DeviceError::AutoplayBlocked) => {
                let err = Error::Permission("playback still blocked after user gesture".to_string());
                self.fail_channel(channel, generation, err);
            }
            Err(e) => {
                self.fail_channel(channel, generation, Error::from_device(e));
            }
        }
    }
}
