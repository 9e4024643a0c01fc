//! Event types for the on-air event system
//!
//! Provides the published event definitions and the EventBus that carries
//! them to subscribers (the Auto DJ scheduler, the SSE stream).
//!
//! Delivery is at-least-once: some events are deliberately published twice.
//! Both copies carry the same `event_id`, so subscribers can de-duplicate.

mod playback_types;

pub use playback_types::{ChannelState, EventPriority, ThresholdLevel};

use crate::time;
use crate::track::{ChannelId, Track};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events published by the playout engine
///
/// Serialized with a kebab-case `type` tag (`"track-ended"`, ...) and
/// camelCase fields, the shape the Auto DJ consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PlayoutEvent {
    /// Remaining time crossed one of the end thresholds
    ///
    /// Published twice (immediately and after a short delay).
    #[serde(rename_all = "camelCase")]
    TrackEndApproaching {
        event_id: Uuid,
        channel: ChannelId,
        track: Track,
        /// Seconds left until the effective end
        remaining: f64,
        threshold: ThresholdLevel,
        priority: EventPriority,
        timestamp: DateTime<Utc>,
    },

    /// Track reached its end (published exactly once per track instance)
    #[serde(rename_all = "camelCase")]
    TrackEnded {
        event_id: Uuid,
        channel: ChannelId,
        track: Track,
        /// Contents of the channel's next-track slot, if any
        next_track: Option<Track>,
        timestamp: DateTime<Utc>,
    },

    /// Ask the Auto DJ to start the next item
    ///
    /// Published twice after `TrackEnded` as a guard against a missed dispatch.
    #[serde(rename_all = "camelCase")]
    PlayNext {
        event_id: Uuid,
        channel: ChannelId,
        previous_track: Track,
        priority: EventPriority,
        timestamp: DateTime<Utc>,
    },

    /// Channel lifecycle state changed
    #[serde(rename_all = "camelCase")]
    ChannelStateChanged {
        event_id: Uuid,
        channel: ChannelId,
        old_state: ChannelState,
        new_state: ChannelState,
        timestamp: DateTime<Utc>,
    },

    /// A track was bound to a channel and is ready to play
    #[serde(rename_all = "camelCase")]
    TrackLoaded {
        event_id: Uuid,
        channel: ChannelId,
        track: Track,
        /// True when the prebuffered resource was reused
        from_cache: bool,
        timestamp: DateTime<Utc>,
    },
}

impl PlayoutEvent {
    pub fn track_end_approaching(
        channel: ChannelId,
        track: Track,
        remaining: f64,
        threshold: ThresholdLevel,
    ) -> Self {
        PlayoutEvent::TrackEndApproaching {
            event_id: Uuid::new_v4(),
            channel,
            track,
            remaining,
            threshold,
            priority: threshold.priority(),
            timestamp: time::now(),
        }
    }

    pub fn track_ended(channel: ChannelId, track: Track, next_track: Option<Track>) -> Self {
        PlayoutEvent::TrackEnded {
            event_id: Uuid::new_v4(),
            channel,
            track,
            next_track,
            timestamp: time::now(),
        }
    }

    pub fn play_next(channel: ChannelId, previous_track: Track) -> Self {
        PlayoutEvent::PlayNext {
            event_id: Uuid::new_v4(),
            channel,
            previous_track,
            priority: EventPriority::High,
            timestamp: time::now(),
        }
    }

    pub fn channel_state_changed(
        channel: ChannelId,
        old_state: ChannelState,
        new_state: ChannelState,
    ) -> Self {
        PlayoutEvent::ChannelStateChanged {
            event_id: Uuid::new_v4(),
            channel,
            old_state,
            new_state,
            timestamp: time::now(),
        }
    }

    pub fn track_loaded(channel: ChannelId, track: Track, from_cache: bool) -> Self {
        PlayoutEvent::TrackLoaded {
            event_id: Uuid::new_v4(),
            channel,
            track,
            from_cache,
            timestamp: time::now(),
        }
    }

    /// Identity shared by redundant copies of the same event
    pub fn event_id(&self) -> Uuid {
        match self {
            PlayoutEvent::TrackEndApproaching { event_id, .. }
            | PlayoutEvent::TrackEnded { event_id, .. }
            | PlayoutEvent::PlayNext { event_id, .. }
            | PlayoutEvent::ChannelStateChanged { event_id, .. }
            | PlayoutEvent::TrackLoaded { event_id, .. } => *event_id,
        }
    }

    /// Channel the event concerns
    pub fn channel(&self) -> &ChannelId {
        match self {
            PlayoutEvent::TrackEndApproaching { channel, .. }
            | PlayoutEvent::TrackEnded { channel, .. }
            | PlayoutEvent::PlayNext { channel, .. }
            | PlayoutEvent::ChannelStateChanged { channel, .. }
            | PlayoutEvent::TrackLoaded { channel, .. } => channel,
        }
    }

    /// Wire name of the event (matches the serialized `type` tag)
    pub fn event_type(&self) -> &'static str {
        match self {
            PlayoutEvent::TrackEndApproaching { .. } => "track-end-approaching",
            PlayoutEvent::TrackEnded { .. } => "track-ended",
            PlayoutEvent::PlayNext { .. } => "play-next",
            PlayoutEvent::ChannelStateChanged { .. } => "channel-state-changed",
            PlayoutEvent::TrackLoaded { .. } => "track-loaded",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block the engine)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use onair_common::events::{EventBus, PlayoutEvent};
/// use onair_common::{ChannelId, Track};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(PlayoutEvent::play_next(
///     ChannelId::from("A"),
///     Track::new("t1", "a.mp3", 180.0),
/// ));
///
/// assert_eq!(rx.try_recv().unwrap().event_type(), "play-next");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlayoutEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered per subscriber before the
    /// oldest are dropped (the subscriber then observes `Lagged`).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<PlayoutEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PlayoutEvent,
    ) -> Result<usize, broadcast::error::SendError<PlayoutEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PlayoutEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track() -> Track {
        Track::new("t1", "music/t1.mp3", 180.0).with_title("Opener")
    }

    #[test]
    fn test_track_ended_wire_format() {
        let event = PlayoutEvent::track_ended(
            ChannelId::from("A"),
            track(),
            Some(Track::new("t2", "music/t2.mp3", 200.0)),
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "track-ended");
        assert_eq!(json["channel"], "A");
        assert_eq!(json["track"]["id"], "t1");
        assert_eq!(json["nextTrack"]["id"], "t2");
        assert!(json["eventId"].is_string());
    }

    #[test]
    fn test_approaching_carries_priority() {
        let event = PlayoutEvent::track_end_approaching(
            ChannelId::from("B"),
            track(),
            1.4,
            ThresholdLevel::Medium,
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "track-end-approaching");
        assert_eq!(json["threshold"], "medium");
        assert_eq!(json["priority"], "high");
        assert_eq!(event.event_type(), "track-end-approaching");
    }

    #[test]
    fn test_play_next_round_trip_keeps_event_id() {
        let event = PlayoutEvent::play_next(ChannelId::from("A"), track());
        let json = serde_json::to_string(&event).unwrap();
        let parsed: PlayoutEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.event_id(), event.event_id());
        assert_eq!(parsed.channel().as_str(), "A");
        assert!(json.contains("\"previousTrack\""));
    }

    #[test]
    fn test_event_bus_emit_without_subscribers() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        assert!(bus
            .emit(PlayoutEvent::play_next(ChannelId::from("A"), track()))
            .is_err());
    }

    #[tokio::test]
    async fn test_event_bus_fan_out() {
        let bus = EventBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        let sent = bus
            .emit(PlayoutEvent::channel_state_changed(
                ChannelId::from("C"),
                ChannelState::Ready,
                ChannelState::Playing,
            ))
            .unwrap();
        assert_eq!(sent, 2);

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1.event_id(), e2.event_id());
        assert_eq!(bus.capacity(), 10);
    }
}
