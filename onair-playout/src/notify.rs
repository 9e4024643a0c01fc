//! User-facing notifications
//!
//! The engine reports human-readable error/success messages to an external
//! presentation layer through a [`NotificationSink`]. `notify` must never
//! block the engine.

use onair_common::ChannelId;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// One message for the operator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub channel: Option<ChannelId>,
    /// Error kind (`validation`, `timeout`, ...) when the message reports a failure
    pub kind: Option<String>,
    pub message: String,
}

impl Notification {
    pub fn info(channel: &ChannelId, message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            channel: Some(channel.clone()),
            kind: None,
            message: message.into(),
        }
    }

    pub fn warning(channel: &ChannelId, err: &crate::Error) -> Self {
        Self::from_error(NotificationLevel::Warning, channel, err)
    }

    pub fn error(channel: &ChannelId, err: &crate::Error) -> Self {
        Self::from_error(NotificationLevel::Error, channel, err)
    }

    fn from_error(level: NotificationLevel, channel: &ChannelId, err: &crate::Error) -> Self {
        Self {
            level,
            channel: Some(channel.clone()),
            kind: Some(err.kind().to_string()),
            message: format!("Channel {}: {}", channel, err),
        }
    }
}

/// Destination for notifications
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Sink that writes notifications to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&self, n: Notification) {
        let channel = n.channel.as_ref().map(|c| c.as_str()).unwrap_or("-");
        match n.level {
            NotificationLevel::Info => info!(channel, "{}", n.message),
            NotificationLevel::Warning => warn!(channel, kind = ?n.kind, "{}", n.message),
            NotificationLevel::Error => error!(channel, kind = ?n.kind, "{}", n.message),
        }
    }
}

/// Sink that forwards notifications over an unbounded channel
///
/// Sending never blocks; notifications are dropped once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        let _ = self.tx.send(notification);
    }
}
