//! Prebuffer cache
//!
//! Warms media resources ahead of use so a later load is a cache hit.
//!
//! **Responsibilities:**
//! - One entry per `(channel, purpose)`, purpose ∈ {Active, Next}
//! - Same track at the same key: idempotent (the running or finished warm-up is reused)
//! - Different track at the same key: the old entry is discarded and its warm-up aborted
//! - Failed warm-ups are logged and left not-ready; nothing retries them
//!
//! Size is bounded by `channels × 2`, so there is no eviction policy.

use crate::device::{ResourceLoader, WarmResource};
use onair_common::{ChannelId, Track};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Why a resource is being warmed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrebufferPurpose {
    /// The track about to be (or currently) loaded
    Active,
    /// The track queued after the current one
    Next,
}

/// Progress of one warm-up
#[derive(Debug, Clone)]
pub enum WarmState {
    Warming,
    Ready(Arc<WarmResource>),
    Failed(String),
}

impl WarmState {
    pub fn is_ready(&self) -> bool {
        matches!(self, WarmState::Ready(_))
    }
}

/// Externally visible state of an entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrebufferStatus {
    pub track_id: String,
    pub ready: bool,
    pub failed: bool,
}

/// Result of looking a track up for a load
pub enum CacheLookup {
    /// Warm resource available now
    Hit(Arc<WarmResource>),
    /// Warm-up for this track is in flight
    Pending(watch::Receiver<WarmState>),
    Miss,
}

type EntryKey = (ChannelId, PrebufferPurpose);

struct PrebufferEntry {
    seq: u64,
    track: Track,
    state: watch::Sender<WarmState>,
    task: Option<JoinHandle<()>>,
}

impl PrebufferEntry {
    fn discard(self) {
        if let Some(task) = self.task {
            task.abort();
        }
    }
}

/// Channel-scoped cache of warmed resources
pub struct PrebufferCache {
    loader: Arc<dyn ResourceLoader>,
    entries: Arc<Mutex<HashMap<EntryKey, PrebufferEntry>>>,
    next_seq: AtomicU64,
}

impl PrebufferCache {
    pub fn new(loader: Arc<dyn ResourceLoader>) -> Self {
        Self {
            loader,
            entries: Arc::new(Mutex::new(HashMap::new())),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Loader used for warm-ups (also used directly on a cache miss)
    pub fn loader(&self) -> &Arc<dyn ResourceLoader> {
        &self.loader
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<EntryKey, PrebufferEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Begin warming `track` for `(channel, purpose)`
    ///
    /// Returns a receiver that observes the warm-up's progress.
    pub fn prebuffer(
        &self,
        channel: &ChannelId,
        track: &Track,
        purpose: PrebufferPurpose,
    ) -> watch::Receiver<WarmState> {
        let key = (channel.clone(), purpose);
        let mut entries = self.lock();

        if let Some(existing) = entries.get(&key) {
            let failed = matches!(*existing.state.borrow(), WarmState::Failed(_));
            if existing.track.same_resource(track) && !failed {
                debug!(channel = %channel, track_id = %track.id, ?purpose, "Prebuffer already requested");
                return existing.state.subscribe();
            }
        }

        if let Some(old) = entries.remove(&key) {
            debug!(
                channel = %channel,
                old_track = %old.track.id,
                new_track = %track.id,
                ?purpose,
                "Superseding prebuffer entry"
            );
            old.discard();
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(WarmState::Warming);

        let loader = Arc::clone(&self.loader);
        let shared = Arc::clone(&self.entries);
        let task_track = track.clone();
        let task_channel = channel.clone();
        let task = tokio::spawn(async move {
            let result = loader.warm(&task_track).await;

            let mut entries = shared.lock().unwrap_or_else(PoisonError::into_inner);
            // The entry may have been promoted to another key, so match by seq
            let Some(entry) = entries.values_mut().find(|e| e.seq == seq) else {
                return;
            };
            entry.task = None;
            match result {
                Ok(resource) => {
                    info!(channel = %task_channel, track_id = %task_track.id, "Prebuffer ready");
                    entry.state.send_replace(WarmState::Ready(Arc::new(resource)));
                }
                Err(e) => {
                    warn!(channel = %task_channel, track_id = %task_track.id, "Prebuffer failed: {}", e);
                    entry.state.send_replace(WarmState::Failed(e.to_string()));
                }
            }
        });

        entries.insert(
            key,
            PrebufferEntry {
                seq,
                track: track.clone(),
                state: tx,
                task: Some(task),
            },
        );
        rx
    }

    /// Find a usable entry for loading `track` on `channel`
    ///
    /// A `Next` hit is promoted to the `Active` key. Failed entries for the
    /// track are dropped and reported as a miss so an explicit load fetches
    /// afresh.
    pub fn lookup(&self, channel: &ChannelId, track: &Track) -> CacheLookup {
        let mut entries = self.lock();

        for purpose in [PrebufferPurpose::Active, PrebufferPurpose::Next] {
            let key = (channel.clone(), purpose);
            let Some(entry) = entries.get(&key) else {
                continue;
            };
            if !entry.track.same_resource(track) {
                continue;
            }

            let state = entry.state.borrow().clone();
            if let WarmState::Failed(_) = state {
                if let Some(entry) = entries.remove(&key) {
                    entry.discard();
                }
                return CacheLookup::Miss;
            }

            let rx = entry.state.subscribe();
            if purpose == PrebufferPurpose::Next {
                if let Some(entry) = entries.remove(&key) {
                    let active_key = (channel.clone(), PrebufferPurpose::Active);
                    if let Some(old) = entries.insert(active_key, entry) {
                        old.discard();
                    }
                }
            }

            return match state {
                WarmState::Ready(resource) => CacheLookup::Hit(resource),
                _ => CacheLookup::Pending(rx),
            };
        }

        CacheLookup::Miss
    }

    /// Record a resource warmed outside the cache as the channel's active entry
    pub fn store_active(&self, channel: &ChannelId, track: &Track, resource: Arc<WarmResource>) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let (tx, _rx) = watch::channel(WarmState::Ready(resource));
        let entry = PrebufferEntry {
            seq,
            track: track.clone(),
            state: tx,
            task: None,
        };
        if let Some(old) = self
            .lock()
            .insert((channel.clone(), PrebufferPurpose::Active), entry)
        {
            old.discard();
        }
    }

    pub fn status(&self, channel: &ChannelId, purpose: PrebufferPurpose) -> Option<PrebufferStatus> {
        self.lock().get(&(channel.clone(), purpose)).map(|e| {
            let state = e.state.borrow();
            PrebufferStatus {
                track_id: e.track.id.clone(),
                ready: state.is_ready(),
                failed: matches!(*state, WarmState::Failed(_)),
            }
        })
    }

    /// Drop every entry belonging to `channel`
    pub fn discard_channel(&self, channel: &ChannelId) {
        let mut entries = self.lock();
        for purpose in [PrebufferPurpose::Active, PrebufferPurpose::Next] {
            if let Some(entry) = entries.remove(&(channel.clone(), purpose)) {
                entry.discard();
            }
        }
    }
}

#[cfg(test)]
impl PrebufferCache {
    fn is_ready(&self, channel: &ChannelId, purpose: PrebufferPurpose) -> bool {
        self.status(channel, purpose).map(|s| s.ready).unwrap_or(false)
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
