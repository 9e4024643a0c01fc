//! Cue points and the fade/gain model
//!
//! A track's cue points mark where playback starts, where it ends, and how
//! long the linear fade-in and fade-out ramps last:
//!
//! ```text
//!   gain
//!    1 |        ______________________
//!      |       /                      \
//!    0 |______/                        \______
//!      +------+---+------------------+---+----> position
//!           start  start+fadeIn  end-fadeOut  end
//! ```
//!
//! Cue points arrive from the metadata API as a JSON-encoded string. They are
//! parsed and validated once when a track is loaded; the gain calculation on
//! every position tick works on the typed struct.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-track cue point metadata (seconds)
///
/// Invariants (enforced by [`CuePoints::new`]):
/// - `start >= 0`
/// - `start <= end` when `end` is present
/// - `fade_in >= 0` and `fade_out >= 0` (negative input is clamped)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CuePoints {
    /// Playback start position
    pub start: f64,
    /// Playback end position (None = play to the end of the file)
    #[serde(default)]
    pub end: Option<f64>,
    /// Fade-in ramp length starting at `start`
    #[serde(default)]
    pub fade_in: f64,
    /// Fade-out ramp length ending at `end`
    #[serde(default)]
    pub fade_out: f64,
}

/// Where a position falls relative to the cue points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FadePhase {
    /// Before the cue start (not played)
    PreStart,
    /// Inside the fade-in ramp
    FadeIn,
    /// Full volume
    Body,
    /// Inside the fade-out ramp
    FadeOut,
    /// At or past the cue end
    PostEnd,
}

impl std::fmt::Display for FadePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FadePhase::PreStart => write!(f, "PreStart"),
            FadePhase::FadeIn => write!(f, "FadeIn"),
            FadePhase::Body => write!(f, "Body"),
            FadePhase::FadeOut => write!(f, "FadeOut"),
            FadePhase::PostEnd => write!(f, "PostEnd"),
        }
    }
}

impl Default for CuePoints {
    fn default() -> Self {
        Self {
            start: 0.0,
            end: None,
            fade_in: 0.0,
            fade_out: 0.0,
        }
    }
}

impl CuePoints {
    /// Build validated cue points
    ///
    /// Negative fades clamp to zero and a negative start clamps to zero.
    /// Non-finite values and `end < start` are rejected.
    pub fn new(start: f64, end: Option<f64>, fade_in: f64, fade_out: f64) -> Result<Self> {
        for (name, value) in [("start", start), ("fadeIn", fade_in), ("fadeOut", fade_out)] {
            if !value.is_finite() {
                return Err(Error::InvalidCuePoints(format!("{} is not a finite number", name)));
            }
        }
        let start = start.max(0.0);

        if let Some(end) = end {
            if !end.is_finite() {
                return Err(Error::InvalidCuePoints("end is not a finite number".to_string()));
            }
            if end < start {
                return Err(Error::InvalidCuePoints(format!(
                    "end ({}) is before start ({})",
                    end, start
                )));
            }
        }

        Ok(Self {
            start,
            end,
            fade_in: fade_in.max(0.0),
            fade_out: fade_out.max(0.0),
        })
    }

    /// Parse the JSON-encoded form served by the metadata API
    ///
    /// Accepts camelCase or snake_case keys and numbers or numeric strings.
    /// An empty string or JSON `null` means the track has no cue points.
    pub fn from_json(raw: &str) -> Result<Option<Self>> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        let value: Value = serde_json::from_str(trimmed)
            .map_err(|e| Error::InvalidCuePoints(format!("not valid JSON: {}", e)))?;
        Self::from_value(&value)
    }

    /// Parse cue points from an already-decoded JSON value
    ///
    /// Strings are treated as a second level of JSON encoding.
    pub fn from_value(value: &Value) -> Result<Option<Self>> {
        match value {
            Value::Null => Ok(None),
            Value::String(inner) => Self::from_json(inner),
            Value::Object(map) => {
                let field = |keys: &[&str]| -> Result<Option<f64>> {
                    for key in keys {
                        if let Some(v) = map.get(*key) {
                            return lenient_number(v)
                                .map_err(|msg| Error::InvalidCuePoints(format!("{}: {}", key, msg)));
                        }
                    }
                    Ok(None)
                };

                let start = field(&["start"])?.unwrap_or(0.0);
                let end = field(&["end"])?;
                let fade_in = field(&["fadeIn", "fade_in"])?.unwrap_or(0.0);
                let fade_out = field(&["fadeOut", "fade_out"])?.unwrap_or(0.0);

                Self::new(start, end, fade_in, fade_out).map(Some)
            }
            other => Err(Error::InvalidCuePoints(format!(
                "expected an object, got {}",
                other
            ))),
        }
    }

    /// Initial playhead for a track: the cue start, or 0 without cue points
    pub fn initial_position(cues: Option<&CuePoints>) -> f64 {
        cues.map(|c| c.start).unwrap_or(0.0)
    }

    /// Position at which the track is considered finished
    ///
    /// The cue end when set, never past the nominal duration when one is known.
    pub fn effective_end(&self, duration: f64) -> f64 {
        match self.end {
            Some(end) if duration > 0.0 => end.min(duration),
            Some(end) => end,
            None => duration,
        }
    }

    /// Start of the fade-out ramp (None without an end cue)
    pub fn fade_out_start(&self) -> Option<f64> {
        self.end.map(|end| (end - self.fade_out).max(self.start))
    }

    /// Classify a position
    ///
    /// When the ramps overlap, FadeOut wins over FadeIn.
    pub fn phase(&self, position: f64) -> FadePhase {
        if position < self.start {
            return FadePhase::PreStart;
        }
        if let Some(end) = self.end {
            if position >= end {
                return FadePhase::PostEnd;
            }
            if self.fade_out > 0.0 && position > end - self.fade_out {
                return FadePhase::FadeOut;
            }
        }
        if self.fade_in > 0.0 && position < self.start + self.fade_in {
            return FadePhase::FadeIn;
        }
        FadePhase::Body
    }

    /// Gain multiplier for `position` at the given base volume
    ///
    /// - before `start`: 0.0 (the controller never plays from there)
    /// - at or past `end`: 0.0
    /// - fade-in window: linear 0 → base
    /// - fade-out window: linear base → 0
    ///
    /// Overlapping windows apply the lower of the two ramps, so a fade-out
    /// near the end of a short track is never overridden by its fade-in.
    pub fn gain(&self, position: f64, base_volume: f64) -> f64 {
        let base = base_volume.clamp(0.0, 1.0);

        if position < self.start {
            return 0.0;
        }
        if let Some(end) = self.end {
            if position >= end {
                return 0.0;
            }
        }

        let mut gain = base;

        if self.fade_in > 0.0 && position < self.start + self.fade_in {
            gain = base * (position - self.start) / self.fade_in;
        }

        if let Some(end) = self.end {
            if self.fade_out > 0.0 && position > end - self.fade_out {
                let fade_out_gain = base * (end - position) / self.fade_out;
                gain = gain.min(fade_out_gain);
            }
        }

        gain.clamp(0.0, base)
    }

    /// Gain to apply before the first tick arrives
    ///
    /// Zero when a fade-in is defined, else the base volume.
    pub fn initial_gain(&self, base_volume: f64) -> f64 {
        if self.fade_in > 0.0 {
            0.0
        } else {
            base_volume.clamp(0.0, 1.0)
        }
    }
}

fn lenient_number(value: &Value) -> std::result::Result<Option<f64>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| "number out of range".to_string()),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| format!("'{}' is not a number", s)),
        other => Err(format!("expected a number, got {}", other)),
    }
}
