//! Test helpers for onair-playout integration tests
//!
//! - `MockDevice` / `MockFactory`: scriptable device bindings (autoplay
//!   rejections, sink and bind failures) that record every call
//! - `TestLoader`: counts fetches; paths containing `slow` are delayed,
//!   paths containing `corrupt` fail, `short` files probe at 60% of the
//!   metadata duration and `unprobed` files report no duration
//! - `Harness`: engine wired to the mocks, a `GestureRelay` host and a
//!   channel-backed notification sink

#![allow(dead_code)]

use async_trait::async_trait;
use onair_common::events::PlayoutEvent;
use onair_common::{ChannelId, Track};
use onair_playout::device::{
    DeviceBinding, DeviceError, DeviceFactory, GestureRelay, ResourceLoader, WarmResource,
};
use onair_playout::notify::{ChannelNotifier, Notification};
use onair_playout::{EngineSettings, PlayoutEngine};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

// ============================================================================
// Mock device
// ============================================================================

#[derive(Default)]
pub struct MockState {
    pub binds: usize,
    pub bound: Option<Arc<WarmResource>>,
    pub starts: usize,
    pub playing: bool,
    pub position: f64,
    pub gain: f64,
    pub sink: Option<String>,
    pub teardowns: usize,
    ticks: Option<mpsc::UnboundedSender<f64>>,

    /// Number of upcoming `start` calls to reject with AutoplayBlocked
    pub autoplay_blocks: usize,
    pub fail_sink: bool,
    pub fail_bind: Option<DeviceError>,
}

#[derive(Default)]
pub struct MockDevice {
    state: Mutex<MockState>,
}

impl MockDevice {
    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Push a position through the device's tick subscription
    pub fn send_tick(&self, position: f64) -> bool {
        match &self.state().ticks {
            Some(tx) => tx.send(position).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl DeviceBinding for MockDevice {
    async fn bind_resource(&self, resource: Arc<WarmResource>) -> Result<(), DeviceError> {
        let mut s = self.state();
        s.binds += 1;
        if let Some(err) = s.fail_bind.clone() {
            return Err(err);
        }
        s.bound = Some(resource);
        s.playing = false;
        s.position = 0.0;
        Ok(())
    }

    async fn bind_sink(&self, sink_id: &str) -> Result<(), DeviceError> {
        let mut s = self.state();
        if s.fail_sink {
            return Err(DeviceError::SinkUnavailable(sink_id.to_string()));
        }
        s.sink = Some(sink_id.to_string());
        Ok(())
    }

    async fn start(&self) -> Result<(), DeviceError> {
        let mut s = self.state();
        if s.autoplay_blocks > 0 {
            s.autoplay_blocks -= 1;
            return Err(DeviceError::AutoplayBlocked);
        }
        s.starts += 1;
        s.playing = true;
        Ok(())
    }

    fn pause(&self) {
        self.state().playing = false;
    }

    fn seek(&self, position: f64) {
        self.state().position = position;
    }

    fn set_gain(&self, gain: f64) {
        self.state().gain = gain;
    }

    fn subscribe_ticks(&self) -> mpsc::UnboundedReceiver<f64> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state().ticks = Some(tx);
        rx
    }

    fn teardown(&self) {
        let mut s = self.state();
        s.teardowns += 1;
        s.playing = false;
        s.position = 0.0;
        s.bound = None;
        s.ticks = None;
    }
}

/// Hands out one `MockDevice` per channel and keeps them for inspection
#[derive(Default)]
pub struct MockFactory {
    devices: Mutex<HashMap<ChannelId, Arc<MockDevice>>>,
}

impl MockFactory {
    pub fn device(&self, channel: &str) -> Arc<MockDevice> {
        let mut devices = self.devices.lock().unwrap();
        devices
            .entry(ChannelId::from(channel))
            .or_default()
            .clone()
    }
}

impl DeviceFactory for MockFactory {
    fn create(&self, channel: &ChannelId) -> Arc<dyn DeviceBinding> {
        self.device(channel.as_str())
    }
}

// ============================================================================
// Loader
// ============================================================================

pub struct TestLoader {
    fetches: AtomicUsize,
    slow_delay: Duration,
}

impl TestLoader {
    pub fn new(slow_delay: Duration) -> Self {
        Self {
            fetches: AtomicUsize::new(0),
            slow_delay,
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceLoader for TestLoader {
    async fn warm(&self, track: &Track) -> Result<WarmResource, DeviceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if track.path.contains("slow") {
            tokio::time::sleep(self.slow_delay).await;
        } else {
            tokio::task::yield_now().await;
        }
        if track.path.contains("corrupt") {
            return Err(DeviceError::Resource(format!("cannot decode {}", track.path)));
        }
        let duration = if track.path.contains("unprobed") {
            None
        } else if track.path.contains("short") {
            Some(track.duration * 0.6)
        } else {
            Some(track.duration)
        };
        Ok(WarmResource {
            track_id: track.id.clone(),
            locator: PathBuf::from(&track.path),
            duration,
            sample_rate: Some(44100),
            channels: Some(2),
            byte_len: track.file_size.unwrap_or(1) as u64,
        })
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub engine: PlayoutEngine,
    pub devices: Arc<MockFactory>,
    pub loader: Arc<TestLoader>,
    pub gestures: Arc<GestureRelay>,
    pub notifications: mpsc::UnboundedReceiver<Notification>,
    pub events: broadcast::Receiver<PlayoutEvent>,
}

impl Harness {
    /// Channels "A" and "B" with default settings
    pub fn new() -> Self {
        Self::with_settings(EngineSettings::with_channels(["A", "B"]))
    }

    pub fn with_settings(settings: EngineSettings) -> Self {
        let devices = Arc::new(MockFactory::default());
        let loader = Arc::new(TestLoader::new(Duration::from_millis(200)));
        let gestures = Arc::new(GestureRelay::new());
        let (notifier, notifications) = ChannelNotifier::new();

        let engine = PlayoutEngine::new(
            settings,
            devices.as_ref(),
            loader.clone(),
            gestures.clone(),
            Arc::new(notifier),
        );
        let events = engine.subscribe();

        Self {
            engine,
            devices,
            loader,
            gestures,
            notifications,
            events,
        }
    }

    pub fn device(&self, channel: &str) -> Arc<MockDevice> {
        self.devices.device(channel)
    }

    /// Events published since the last call
    pub fn drain_events(&mut self) -> Vec<PlayoutEvent> {
        drain(&mut self.events)
    }

    /// Notifications reported since the last call
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = self.notifications.try_recv() {
            out.push(n);
        }
        out
    }

    /// Load and start `track`, panicking on failure
    pub async fn start(&self, channel: &ChannelId, track: Track) {
        self.engine.load_track(channel, track).await.unwrap();
        self.engine.play(channel).await.unwrap();
    }

    /// Feed positions from `from` to `to` (inclusive) in `step` increments
    pub fn sweep(&self, channel: &ChannelId, from: f64, to: f64, step: f64) {
        let steps = ((to - from) / step).round() as usize;
        for i in 0..=steps {
            let position = (from + i as f64 * step).min(to);
            self.engine.tick(channel, position).unwrap();
        }
    }
}

pub fn ch(name: &str) -> ChannelId {
    ChannelId::from(name)
}

/// Valid track with a known file size
pub fn track(id: &str, duration: f64) -> Track {
    Track::new(id, format!("{}.mp3", id), duration)
        .with_title(format!("Track {}", id))
        .with_file_size(4096)
}

pub fn drain(rx: &mut broadcast::Receiver<PlayoutEvent>) -> Vec<PlayoutEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

/// Only events of the given wire type
pub fn of_type<'a>(events: &'a [PlayoutEvent], event_type: &str) -> Vec<&'a PlayoutEvent> {
    events
        .iter()
        .filter(|e| e.event_type() == event_type)
        .collect()
}

/// Wait long enough for delayed repeats and spawned tasks to run
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
