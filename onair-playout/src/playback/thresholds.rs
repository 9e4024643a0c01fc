//! End-of-track threshold scheduler
//!
//! Tracks one-shot flags per channel so each "approaching end" level and the
//! "ended" signal fire once per track instance. Flags re-arm when the
//! remaining time climbs back above `early + rearm_margin` (new track, or the
//! playhead moved back).

use crate::config::ThresholdSettings;
use onair_common::events::ThresholdLevel;
use onair_common::ChannelId;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// One-shot flags for a channel
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdFlags {
    pub early: bool,
    pub medium: bool,
    pub critical: bool,
    pub ended: bool,
}

impl ThresholdFlags {
    fn level_mut(&mut self, level: ThresholdLevel) -> &mut bool {
        match level {
            ThresholdLevel::Early => &mut self.early,
            ThresholdLevel::Medium => &mut self.medium,
            ThresholdLevel::Critical => &mut self.critical,
        }
    }
}

pub struct ThresholdScheduler {
    settings: ThresholdSettings,
    flags: Mutex<HashMap<ChannelId, ThresholdFlags>>,
}

impl ThresholdScheduler {
    pub fn new(settings: ThresholdSettings) -> Self {
        Self {
            settings,
            flags: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ChannelId, ThresholdFlags>> {
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remaining seconds at which `level` fires
    pub fn level_seconds(&self, level: ThresholdLevel) -> f64 {
        match level {
            ThresholdLevel::Early => self.settings.early,
            ThresholdLevel::Medium => self.settings.medium,
            ThresholdLevel::Critical => self.settings.critical,
        }
    }

    /// Record a tick and return the levels newly crossed, in firing order
    pub fn observe(&self, channel: &ChannelId, remaining: f64) -> Vec<ThresholdLevel> {
        let mut all = self.lock();
        let flags = all.entry(channel.clone()).or_default();

        if remaining > self.settings.rearm_above() {
            if *flags != ThresholdFlags::default() {
                trace!(channel = %channel, remaining, "Threshold flags re-armed");
                *flags = ThresholdFlags::default();
            }
            return Vec::new();
        }

        let mut crossed = Vec::new();
        for level in ThresholdLevel::ALL {
            let limit = self.level_seconds(level);
            let fired = flags.level_mut(level);
            if remaining <= limit && !*fired {
                *fired = true;
                crossed.push(level);
            }
        }
        crossed
    }

    /// Set the `ended` flag; true only for the first call per track instance
    pub fn mark_ended(&self, channel: &ChannelId) -> bool {
        let mut all = self.lock();
        let flags = all.entry(channel.clone()).or_default();
        !std::mem::replace(&mut flags.ended, true)
    }

    /// Re-arm every flag for `channel`
    pub fn clear(&self, channel: &ChannelId) {
        self.lock().remove(channel);
    }

    pub fn flags(&self, channel: &ChannelId) -> ThresholdFlags {
        self.lock().get(channel).copied().unwrap_or_default()
    }
}
