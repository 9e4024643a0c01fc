//! Track and channel identity types
//!
//! `Track` mirrors the record served by the external metadata API:
//! `{id, title, path, duration, cuePoints, fileSize, ...}`. Unknown fields are
//! ignored. `cuePoints` may be an object, a JSON-encoded string, or absent.

use crate::cue_points::CuePoints;
use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Name of one playback channel ("A", "B", "cartwall", ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for ChannelId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// A playable track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Stable track identity
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,

    /// Display title
    #[serde(default)]
    pub title: String,

    /// Resource locator (absolute path, or relative to the root folder)
    #[serde(default)]
    pub path: String,

    /// Nominal duration in seconds (0 = unknown until probed)
    #[serde(default)]
    pub duration: f64,

    /// Optional cue points
    #[serde(
        default,
        alias = "cue_points",
        deserialize_with = "cue_points_lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub cue_points: Option<CuePoints>,

    /// File size in bytes, when the metadata API knows it
    #[serde(default, alias = "file_size", skip_serializing_if = "Option::is_none")]
    pub file_size: Option<i64>,
}

impl Track {
    /// Create a track without cue points or file size
    pub fn new(id: impl Into<String>, path: impl Into<String>, duration: f64) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            path: path.into(),
            duration,
            cue_points: None,
            file_size: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_cue_points(mut self, cue_points: CuePoints) -> Self {
        self.cue_points = Some(cue_points);
        self
    }

    pub fn with_file_size(mut self, file_size: i64) -> Self {
        self.file_size = Some(file_size);
        self
    }

    /// Check the track is loadable
    ///
    /// Rejects an empty id or path, a known file size of zero or less, a
    /// negative or non-finite duration, and cue points outside the duration.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidTrack("track id is empty".to_string()));
        }
        if self.path.trim().is_empty() {
            return Err(Error::InvalidTrack(format!("track {} has no path", self.id)));
        }
        if let Some(size) = self.file_size {
            if size <= 0 {
                return Err(Error::InvalidTrack(format!(
                    "track {} has file size {} (empty or corrupt file)",
                    self.id, size
                )));
            }
        }
        if !self.duration.is_finite() || self.duration < 0.0 {
            return Err(Error::InvalidTrack(format!(
                "track {} has invalid duration {}",
                self.id, self.duration
            )));
        }
        if let Some(cues) = &self.cue_points {
            if self.duration > 0.0 && cues.start > self.duration {
                return Err(Error::InvalidTrack(format!(
                    "track {} cue start {} is past its duration {}",
                    self.id, cues.start, self.duration
                )));
            }
        }
        Ok(())
    }

    /// Title for messages, falling back to the id
    pub fn label(&self) -> &str {
        if self.title.trim().is_empty() {
            &self.id
        } else {
            &self.title
        }
    }

    /// Position playback starts from
    pub fn start_position(&self) -> f64 {
        CuePoints::initial_position(self.cue_points.as_ref())
    }

    /// Cue points, or the neutral defaults (start 0, no end, no fades)
    pub fn cues_or_default(&self) -> CuePoints {
        self.cue_points.unwrap_or_default()
    }

    /// True when `other` refers to the same resource (identity and locator)
    pub fn same_resource(&self, other: &Track) -> bool {
        self.id == other.id && self.path == other.path
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

fn cue_points_lenient<'de, D>(deserializer: D) -> std::result::Result<Option<CuePoints>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    CuePoints::from_value(&value).map_err(serde::de::Error::custom)
}
