//! Timestamp and playhead helpers

use chrono::{DateTime, Utc};

/// Current UTC timestamp for published events
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Clamp a playhead to `[0, duration]`
///
/// A non-positive duration means "not known yet" and only bounds below.
pub fn clamp_position(position: f64, duration: f64) -> f64 {
    if duration > 0.0 {
        position.clamp(0.0, duration)
    } else {
        position.max(0.0)
    }
}

/// Playhead as `m:ss.t` for log lines
pub fn format_position(seconds: f64) -> String {
    let tenths = if seconds.is_finite() && seconds > 0.0 {
        (seconds * 10.0).round() as u64
    } else {
        0
    };
    let minutes = tenths / 600;
    let rest = tenths % 600;
    format!("{}:{:02}.{}", minutes, rest / 10, rest % 10)
}
