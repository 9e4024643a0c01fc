//! Core playout engine - construction, channel slots, accessors
//!
//! **Responsibilities:**
//! - PlayoutEngine struct definition and initialization
//! - Per-channel slot (device, command lock, generation, cancellation)
//! - Read access to channel state and prebuffer status
//! - State transitions that publish `channel-state-changed`

use crate::config::EngineSettings;
use crate::device::{DeviceBinding, DeviceFactory, HostCapabilities, ResourceLoader};
use crate::error::{Error, Result};
use crate::notify::{Notification, NotificationSink};
use crate::playback::prebuffer::{PrebufferCache, PrebufferPurpose, PrebufferStatus};
use crate::playback::thresholds::ThresholdScheduler;
use crate::state::{ChannelRecord, ChannelStateStore, ChannelView};
use onair_common::events::{ChannelState, EventBus, PlayoutEvent};
use onair_common::ChannelId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Everything the engine owns for one channel besides its record
pub(super) struct ChannelSlot {
    pub(super) device: Arc<dyn DeviceBinding>,

    /// Serializes lifecycle commands on this channel
    pub(super) command_lock: tokio::sync::Mutex<()>,

    /// Track-instance counter; bumped by every load and unload
    ///
    /// Ticks and delayed event copies carry the generation they were
    /// produced under and are dropped once it moves on.
    pub(super) generation: Arc<AtomicU64>,

    /// Cancels the in-flight load (and any pending gesture retry)
    cancel: Mutex<CancellationToken>,

    /// Task forwarding device ticks into the engine
    pub(super) tick_pump: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelSlot {
    fn new(device: Arc<dyn DeviceBinding>) -> Self {
        Self {
            device,
            command_lock: tokio::sync::Mutex::new(()),
            generation: Arc::new(AtomicU64::new(0)),
            cancel: Mutex::new(CancellationToken::new()),
            tick_pump: Mutex::new(None),
        }
    }

    /// Cancel whatever is in flight and start a new track instance
    pub(super) fn supersede(&self) -> (CancellationToken, u64) {
        let mut cancel = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        cancel.cancel();
        *cancel = CancellationToken::new();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        (cancel.clone(), generation)
    }

    pub(super) fn current_token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(super) fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub(super) fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }

    pub(super) fn pump(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.tick_pump.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn stop_tick_pump(&self) {
        if let Some(handle) = self.pump().take() {
            handle.abort();
        }
    }
}

pub(super) struct EngineShared {
    pub(super) settings: EngineSettings,
    pub(super) store: ChannelStateStore,
    pub(super) slots: HashMap<ChannelId, ChannelSlot>,
    pub(super) prebuffer: PrebufferCache,
    pub(super) thresholds: ThresholdScheduler,
    pub(super) bus: EventBus,
    pub(super) host: Arc<dyn HostCapabilities>,
    pub(super) notifier: Arc<dyn NotificationSink>,
}

/// Multi-channel playout engine
///
/// Cheap to clone; clones share the same channels. Commands on one channel
/// are serialized, channels run independently.
#[derive(Clone)]
pub struct PlayoutEngine {
    pub(super) shared: Arc<EngineShared>,
}

impl PlayoutEngine {
    /// Create the engine with one device per configured channel
    pub fn new(
        settings: EngineSettings,
        devices: &dyn DeviceFactory,
        loader: Arc<dyn ResourceLoader>,
        host: Arc<dyn HostCapabilities>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let slots = settings
            .channels
            .iter()
            .map(|c| (c.clone(), ChannelSlot::new(devices.create(c))))
            .collect();
        let store = ChannelStateStore::new(&settings.channels, settings.default_volume);
        let thresholds = ThresholdScheduler::new(settings.thresholds);
        let bus = EventBus::new(settings.event_bus_capacity);

        info!(
            channels = settings.channels.len(),
            "Playout engine initialized: {}",
            settings
                .channels
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Self {
            shared: Arc::new(EngineShared {
                settings,
                store,
                slots,
                prebuffer: PrebufferCache::new(loader),
                thresholds,
                bus,
                host,
                notifier,
            }),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.shared.settings
    }

    /// Subscribe to published playout events
    pub fn subscribe(&self) -> broadcast::Receiver<PlayoutEvent> {
        self.shared.bus.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.shared.bus
    }

    /// Channel registry in display order
    pub fn channels(&self) -> &[ChannelId] {
        self.shared.store.channels()
    }

    /// Current view of one channel
    pub fn get(&self, channel: &ChannelId) -> Result<ChannelView> {
        self.shared
            .store
            .get(channel)
            .ok_or_else(|| Error::UnknownChannel(channel.to_string()))
    }

    /// Views of every channel in registry order
    pub fn snapshot(&self) -> Vec<ChannelView> {
        self.shared.store.snapshot()
    }

    pub fn prebuffer_status(
        &self,
        channel: &ChannelId,
        purpose: PrebufferPurpose,
    ) -> Result<Option<PrebufferStatus>> {
        self.slot(channel)?;
        Ok(self.shared.prebuffer.status(channel, purpose))
    }

    pub(super) fn slot(&self, channel: &ChannelId) -> Result<&ChannelSlot> {
        self.shared
            .slots
            .get(channel)
            .ok_or_else(|| Error::UnknownChannel(channel.to_string()))
    }

    /// Replace a record and publish the state change, if any
    pub(super) fn transition<F>(&self, channel: &ChannelId, f: F) -> Result<ChannelView>
    where
        F: FnOnce(&ChannelRecord) -> ChannelRecord,
    {
        let (old, new) = self
            .shared
            .store
            .update(channel, f)
            .ok_or_else(|| Error::UnknownChannel(channel.to_string()))?;

        if old.state != new.state {
            info!(channel = %channel, "Channel state: {} -> {}", old.state, new.state);
            self.shared.bus.emit_lossy(PlayoutEvent::channel_state_changed(
                channel.clone(),
                old.state,
                new.state,
            ));
        }
        Ok(new)
    }

    /// Put the channel into `Error` and report `err` to the notification sink
    ///
    /// Skipped when `generation` is stale (a newer load or an unload owns the
    /// channel now). Returns `err` for propagation.
    pub(super) fn fail_channel(&self, channel: &ChannelId, generation: u64, err: Error) -> Error {
        let current = self
            .shared
            .slots
            .get(channel)
            .map(|s| s.is_current(generation))
            .unwrap_or(false);
        if !current {
            return err;
        }

        if let Some(slot) = self.shared.slots.get(channel) {
            slot.stop_tick_pump();
        }
        let message = err.to_string();
        let _ = self.transition(channel, |r| ChannelRecord {
            state: ChannelState::Error,
            gain: 0.0,
            awaiting_gesture: false,
            last_error: Some(message),
            ..r.clone()
        });

        error!(channel = %channel, kind = err.kind(), "Channel failed: {}", err);
        self.shared
            .notifier
            .notify(Notification::error(channel, &err));
        err
    }
}
