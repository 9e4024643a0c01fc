//! Configuration management for onair-playout
//!
//! Bootstrap configuration comes from a TOML file (located via
//! `onair_common::config::locate_config_file`) and is converted into
//! [`EngineSettings`], the only configuration the engine itself sees.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (--port, --root-folder, --config)
//! 2. Environment variables (ONAIR_PLAYOUT_PORT, ONAIR_ROOT_FOLDER, ONAIR_CONFIG)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants below)
//!
//! ```toml
//! port = 5750
//! root_folder = "/srv/media"
//!
//! [logging]
//! level = "info"
//!
//! [playout]
//! channels = ["A", "B", "C", "cartwall"]
//! default_volume = 1.0
//! load_grace_ms = 5000
//!
//! [playout.thresholds]
//! early = 3.0
//! medium = 1.5
//! critical = 0.5
//!
//! [outputs]
//! A = "studio-main"
//! cartwall = "studio-fx"
//!
//! [host]
//! autoplay_allowed = true
//!
//! [metadata]
//! base_url = "http://localhost:5760/api"
//! ```

use crate::error::{Error, Result};
use onair_common::ChannelId;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Default HTTP port for the playout service
pub const DEFAULT_PORT: u16 = 5750;

/// Channel registry used when the config names none
pub const DEFAULT_CHANNELS: [&str; 4] = ["A", "B", "C", "cartwall"];

/// How long a load waits for its resource before warning
pub const DEFAULT_LOAD_GRACE_MS: u64 = 5000;

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Root folder for relative track paths (optional)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub playout: PlayoutConfig,

    /// Output sink id per channel name
    #[serde(default)]
    pub outputs: HashMap<String, String>,

    #[serde(default)]
    pub host: HostConfig,

    /// External metadata API (optional; loads by track id need it)
    #[serde(default)]
    pub metadata: Option<MetadataConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Engine behaviour
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlayoutConfig {
    pub channels: Vec<String>,
    pub default_volume: f64,
    pub load_grace_ms: u64,
    pub tick_interval_ms: u64,
    pub event_bus_capacity: usize,
    pub thresholds: ThresholdSettings,
    pub redundancy: RedundancyConfig,
}

/// Remaining-time thresholds (seconds)
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ThresholdSettings {
    pub early: f64,
    pub medium: f64,
    pub critical: f64,
    /// Flags re-arm once remaining time exceeds `early + rearm_margin`
    pub rearm_margin: f64,
}

/// Delays for the redundant second publish of selected events
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedundancyConfig {
    pub approaching_repost_ms: u64,
    pub play_next_repost_ms: u64,
}

/// Host environment behaviour
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// False to require a user gesture before the first playback start
    pub autoplay_allowed: bool,
}

/// External metadata API
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataConfig {
    pub base_url: String,
    #[serde(default = "default_metadata_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metadata_timeout_ms() -> u64 {
    3000
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for PlayoutConfig {
    fn default() -> Self {
        Self {
            channels: DEFAULT_CHANNELS.iter().map(|c| c.to_string()).collect(),
            default_volume: 1.0,
            load_grace_ms: DEFAULT_LOAD_GRACE_MS,
            tick_interval_ms: 100,
            event_bus_capacity: 256,
            thresholds: ThresholdSettings::default(),
            redundancy: RedundancyConfig::default(),
        }
    }
}

impl Default for ThresholdSettings {
    fn default() -> Self {
        Self {
            early: 3.0,
            medium: 1.5,
            critical: 0.5,
            rearm_margin: 1.0,
        }
    }
}

impl ThresholdSettings {
    /// Remaining time above which flags re-arm
    pub fn rearm_above(&self) -> f64 {
        self.early + self.rearm_margin
    }
}

impl Default for RedundancyConfig {
    fn default() -> Self {
        Self {
            approaching_repost_ms: 50,
            play_next_repost_ms: 10,
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            autoplay_allowed: true,
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            root_folder: None,
            logging: LoggingConfig::default(),
            playout: PlayoutConfig::default(),
            outputs: HashMap::new(),
            host: HostConfig::default(),
            metadata: None,
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&text)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Validate and convert into engine settings
    pub fn engine_settings(&self) -> Result<EngineSettings> {
        let playout = &self.playout;

        if playout.channels.is_empty() {
            return Err(Error::Config("at least one channel is required".to_string()));
        }
        let mut seen = HashSet::new();
        for name in &playout.channels {
            if name.trim().is_empty() {
                return Err(Error::Config("channel names must not be empty".to_string()));
            }
            if !seen.insert(name.as_str()) {
                return Err(Error::Config(format!("duplicate channel '{}'", name)));
            }
        }
        for name in self.outputs.keys() {
            if !seen.contains(name.as_str()) {
                return Err(Error::Config(format!(
                    "output configured for unknown channel '{}'",
                    name
                )));
            }
        }

        if !(0.0..=1.0).contains(&playout.default_volume) {
            return Err(Error::Config(format!(
                "default_volume must be within 0.0-1.0, got {}",
                playout.default_volume
            )));
        }

        let t = playout.thresholds;
        if !(t.early > t.medium && t.medium > t.critical && t.critical > 0.0) {
            return Err(Error::Config(format!(
                "thresholds must satisfy early > medium > critical > 0 (got {} / {} / {})",
                t.early, t.medium, t.critical
            )));
        }
        if t.rearm_margin < 0.0 {
            return Err(Error::Config("rearm_margin must not be negative".to_string()));
        }

        Ok(EngineSettings {
            channels: playout.channels.iter().map(|c| ChannelId::from(c.as_str())).collect(),
            default_volume: playout.default_volume,
            load_grace: Duration::from_millis(playout.load_grace_ms),
            thresholds: t,
            approaching_repost: Duration::from_millis(playout.redundancy.approaching_repost_ms),
            play_next_repost: Duration::from_millis(playout.redundancy.play_next_repost_ms),
            output_sinks: self
                .outputs
                .iter()
                .map(|(k, v)| (ChannelId::from(k.as_str()), v.clone()))
                .collect(),
            event_bus_capacity: playout.event_bus_capacity.max(1),
        })
    }

    /// Position tick period for clock devices
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.playout.tick_interval_ms.max(1))
    }
}

/// Settings consumed by the playout engine
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Fixed channel registry, in display order
    pub channels: Vec<ChannelId>,
    /// Volume applied to newly loaded channels
    pub default_volume: f64,
    /// Resource readiness grace window
    pub load_grace: Duration,
    pub thresholds: ThresholdSettings,
    /// Delay before the second `track-end-approaching` publish
    pub approaching_repost: Duration,
    /// Delay before the second `play-next` publish
    pub play_next_repost: Duration,
    /// Output sink per channel (absent = default output)
    pub output_sinks: HashMap<ChannelId, String>,
    pub event_bus_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        let playout = PlayoutConfig::default();
        Self {
            channels: playout.channels.iter().map(|c| ChannelId::from(c.as_str())).collect(),
            default_volume: playout.default_volume,
            load_grace: Duration::from_millis(playout.load_grace_ms),
            thresholds: playout.thresholds,
            approaching_repost: Duration::from_millis(playout.redundancy.approaching_repost_ms),
            play_next_repost: Duration::from_millis(playout.redundancy.play_next_repost_ms),
            output_sinks: HashMap::new(),
            event_bus_capacity: playout.event_bus_capacity,
        }
    }
}

impl EngineSettings {
    /// Settings with a custom channel registry
    pub fn with_channels<I, S>(channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            channels: channels.into_iter().map(|c| ChannelId::from(c.into())).collect(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = EngineSettings::default();
        assert_eq!(settings.channels.len(), 4);
        assert_eq!(settings.channels[3].as_str(), "cartwall");
        assert_eq!(settings.load_grace, Duration::from_secs(5));
        assert_eq!(settings.thresholds.early, 3.0);
        assert_eq!(settings.thresholds.rearm_above(), 4.0);
        assert_eq!(settings.approaching_repost, Duration::from_millis(50));
        assert_eq!(settings.play_next_repost, Duration::from_millis(10));
    }

    #[test]
    fn test_parse_full_config() {
        let config = TomlConfig::from_toml_str(
            r#"
            port = 6000
            root_folder = "/srv/media"

            [logging]
            level = "debug"

            [playout]
            channels = ["A", "B"]
            default_volume = 0.8
            load_grace_ms = 2000

            [playout.thresholds]
            early = 5.0

            [outputs]
            A = "studio-main"

            [host]
            autoplay_allowed = false

            [metadata]
            base_url = "http://meta.local/api"
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 6000);
        assert_eq!(config.logging.level, "debug");
        assert!(!config.host.autoplay_allowed);
        assert_eq!(config.metadata.as_ref().unwrap().timeout_ms, 3000);

        let settings = config.engine_settings().unwrap();
        assert_eq!(settings.channels, vec![ChannelId::from("A"), ChannelId::from("B")]);
        assert_eq!(settings.default_volume, 0.8);
        assert_eq!(settings.load_grace, Duration::from_secs(2));
        assert_eq!(settings.thresholds.early, 5.0);
        assert_eq!(settings.thresholds.medium, 1.5);
        assert_eq!(
            settings.output_sinks.get(&ChannelId::from("A")).map(String::as_str),
            Some("studio-main")
        );
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.host.autoplay_allowed);
        assert!(config.engine_settings().is_ok());
    }

    #[test]
    fn test_rejects_duplicate_channels() {
        let config = TomlConfig::from_toml_str("[playout]\nchannels = [\"A\", \"A\"]\n").unwrap();
        assert!(config.engine_settings().is_err());
    }

    #[test]
    fn test_rejects_output_for_unknown_channel() {
        let config = TomlConfig::from_toml_str("[outputs]\nZ = \"sink\"\n").unwrap();
        assert!(config.engine_settings().is_err());
    }

    #[test]
    fn test_rejects_unordered_thresholds() {
        let config =
            TomlConfig::from_toml_str("[playout.thresholds]\nearly = 1.0\nmedium = 2.0\n").unwrap();
        assert!(config.engine_settings().is_err());
    }

    #[test]
    fn test_rejects_volume_out_of_range() {
        let config = TomlConfig::from_toml_str("[playout]\ndefault_volume = 1.5\n").unwrap();
        assert!(config.engine_settings().is_err());
    }

    #[test]
    fn test_with_channels() {
        let settings = EngineSettings::with_channels(["X", "Y"]);
        assert_eq!(settings.channels.len(), 2);
        assert_eq!(settings.default_volume, 1.0);
    }
}
