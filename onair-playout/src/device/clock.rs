//! Clock-driven device binding
//!
//! `ClockDevice` keeps a playhead that advances in real time while playing
//! and publishes it as position ticks every `tick_interval`. It does not
//! render audio; it stands in for the host's media element wherever the
//! engine runs without one (the service binary, integration tests) and
//! enforces the host autoplay policy through a shared [`GestureRelay`].

use super::{DeviceBinding, DeviceError, DeviceFactory, GestureRelay, WarmResource};
use async_trait::async_trait;
use onair_common::ChannelId;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace};

#[derive(Default)]
struct ClockState {
    resource: Option<Arc<WarmResource>>,
    position: f64,
    playing: bool,
    gain: f64,
    sink: Option<String>,
    ticks: Option<mpsc::UnboundedSender<f64>>,
    ticker: Option<JoinHandle<()>>,
}

/// Playhead clock for one channel
pub struct ClockDevice {
    channel: ChannelId,
    tick_interval: Duration,
    autoplay_allowed: bool,
    relay: Arc<GestureRelay>,
    state: Arc<Mutex<ClockState>>,
}

impl ClockDevice {
    pub fn new(
        channel: ChannelId,
        tick_interval: Duration,
        autoplay_allowed: bool,
        relay: Arc<GestureRelay>,
    ) -> Self {
        Self {
            channel,
            tick_interval,
            autoplay_allowed,
            relay,
            state: Arc::new(Mutex::new(ClockState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ClockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current playhead (seconds)
    pub fn position(&self) -> f64 {
        self.lock().position
    }

    /// Last gain applied by the engine
    pub fn gain(&self) -> f64 {
        self.lock().gain
    }

    /// Sink output is routed to (None = default output)
    pub fn sink(&self) -> Option<String> {
        self.lock().sink.clone()
    }

    fn stop_ticker(state: &mut ClockState) {
        if let Some(handle) = state.ticker.take() {
            handle.abort();
        }
    }

    fn spawn_ticker(&self) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let period = self.tick_interval;
        let channel = self.channel.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last = Instant::now();

            loop {
                interval.tick().await;
                let now = Instant::now();
                let elapsed = now.duration_since(last).as_secs_f64();
                last = now;

                let mut s = state.lock().unwrap_or_else(PoisonError::into_inner);
                if !s.playing {
                    break;
                }

                s.position += elapsed;
                let end = s.resource.as_ref().and_then(|r| r.duration);
                let finished = matches!(end, Some(end) if s.position >= end);
                if let Some(end) = end {
                    s.position = s.position.min(end);
                }

                if let Some(tx) = &s.ticks {
                    let _ = tx.send(s.position);
                }
                trace!(channel = %channel, position = s.position, "Clock tick");

                if finished {
                    debug!(channel = %channel, "Clock reached end of resource");
                    s.playing = false;
                    s.ticker = None;
                    break;
                }
            }
        })
    }
}

#[async_trait]
impl DeviceBinding for ClockDevice {
    async fn bind_resource(&self, resource: Arc<WarmResource>) -> Result<(), DeviceError> {
        let mut s = self.lock();
        Self::stop_ticker(&mut s);
        s.playing = false;
        s.position = 0.0;
        s.resource = Some(resource);
        Ok(())
    }

    async fn bind_sink(&self, sink_id: &str) -> Result<(), DeviceError> {
        if sink_id.trim().is_empty() {
            return Err(DeviceError::SinkUnavailable("empty sink id".to_string()));
        }
        self.lock().sink = Some(sink_id.to_string());
        Ok(())
    }

    async fn start(&self) -> Result<(), DeviceError> {
        if !self.autoplay_allowed && !self.relay.has_user_activation() {
            return Err(DeviceError::AutoplayBlocked);
        }

        let needs_ticker = {
            let mut s = self.lock();
            if s.resource.is_none() {
                return Err(DeviceError::Resource("no resource bound".to_string()));
            }
            if s.playing {
                false
            } else {
                s.playing = true;
                true
            }
        };

        if needs_ticker {
            let handle = self.spawn_ticker();
            let mut s = self.lock();
            Self::stop_ticker(&mut s);
            s.ticker = Some(handle);
        }
        Ok(())
    }

    fn pause(&self) {
        let mut s = self.lock();
        s.playing = false;
        Self::stop_ticker(&mut s);
    }

    fn seek(&self, position: f64) {
        let mut s = self.lock();
        let end = s.resource.as_ref().and_then(|r| r.duration);
        s.position = match end {
            Some(end) => position.clamp(0.0, end),
            None => position.max(0.0),
        };
    }

    fn set_gain(&self, gain: f64) {
        self.lock().gain = gain;
    }

    fn subscribe_ticks(&self) -> mpsc::UnboundedReceiver<f64> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().ticks = Some(tx);
        rx
    }

    fn teardown(&self) {
        let mut s = self.lock();
        Self::stop_ticker(&mut s);
        s.playing = false;
        s.position = 0.0;
        s.resource = None;
        s.ticks = None;
    }
}

/// Creates one [`ClockDevice`] per channel
pub struct ClockDeviceFactory {
    tick_interval: Duration,
    autoplay_allowed: bool,
    relay: Arc<GestureRelay>,
}

impl ClockDeviceFactory {
    pub fn new(tick_interval: Duration, autoplay_allowed: bool, relay: Arc<GestureRelay>) -> Self {
        Self {
            tick_interval,
            autoplay_allowed,
            relay,
        }
    }
}

impl DeviceFactory for ClockDeviceFactory {
    fn create(&self, channel: &ChannelId) -> Arc<dyn DeviceBinding> {
        Arc::new(ClockDevice::new(
            channel.clone(),
            self.tick_interval,
            self.autoplay_allowed,
            Arc::clone(&self.relay),
        ))
    }
}
