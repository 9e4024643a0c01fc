//! Host capability backed by an explicit gesture signal
//!
//! Browsers and similar hosts refuse to start audio until the user has
//! interacted with the page. `GestureRelay` models that: listeners register
//! for the next gesture, `signal_gesture` fires them all once and marks the
//! host as activated.

use super::HostCapabilities;
use onair_common::ChannelId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, info};

/// One-shot gesture listener registry
#[derive(Default)]
pub struct GestureRelay {
    listeners: Mutex<Vec<(ChannelId, oneshot::Sender<()>)>>,
    activated: AtomicBool,
}

impl GestureRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once any user gesture has been observed
    pub fn has_user_activation(&self) -> bool {
        self.activated.load(Ordering::Acquire)
    }

    /// Number of listeners waiting for a gesture
    pub fn pending_listeners(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Record a user gesture and wake every registered listener
    ///
    /// Returns the number of listeners fired.
    pub fn signal_gesture(&self) -> usize {
        self.activated.store(true, Ordering::Release);

        let listeners: Vec<_> = std::mem::take(
            &mut *self.listeners.lock().unwrap_or_else(PoisonError::into_inner),
        );

        let mut fired = 0;
        for (channel, tx) in listeners {
            if tx.send(()).is_ok() {
                debug!(channel = %channel, "Gesture delivered");
                fired += 1;
            }
        }
        info!(fired, "User gesture relayed");
        fired
    }
}

impl HostCapabilities for GestureRelay {
    fn register_one_shot_gesture_listener(&self, channel: &ChannelId) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        // Drop listeners whose receiver is gone
        listeners.retain(|(_, tx)| !tx.is_closed());
        listeners.push((channel.clone(), tx));
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_gesture_fires_each_listener_once() {
        let relay = GestureRelay::new();
        let rx_a = relay.register_one_shot_gesture_listener(&ChannelId::from("A"));
        let rx_b = relay.register_one_shot_gesture_listener(&ChannelId::from("B"));
        assert_eq!(relay.pending_listeners(), 2);
        assert!(!relay.has_user_activation());

        assert_eq!(relay.signal_gesture(), 2);
        rx_a.await.unwrap();
        rx_b.await.unwrap();

        assert!(relay.has_user_activation());
        assert_eq!(relay.pending_listeners(), 0);
        assert_eq!(relay.signal_gesture(), 0);
    }

    #[test]
    fn test_dropped_receivers_are_pruned() {
        let relay = GestureRelay::new();
        drop(relay.register_one_shot_gesture_listener(&ChannelId::from("A")));
        let _rx = relay.register_one_shot_gesture_listener(&ChannelId::from("B"));
        assert_eq!(relay.pending_listeners(), 1);
    }
}
