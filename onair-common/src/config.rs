//! Configuration file location and root folder resolution
//!
//! Both follow the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file / platform config directory
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory name used under the platform config/data directories
pub const APP_DIR: &str = "onair";

/// Locate a service's TOML config file
///
/// `file_name` is e.g. `"playout.toml"`. Returns `Ok(None)` when no file was
/// requested and none exists in the platform locations; an explicitly
/// requested file that does not exist is an error.
pub fn locate_config_file(cli_arg: Option<&Path>, file_name: &str) -> Result<Option<PathBuf>> {
    if let Some(path) = cli_arg {
        if path.exists() {
            return Ok(Some(path.to_path_buf()));
        }
        return Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    for candidate in platform_config_candidates(file_name) {
        if candidate.exists() {
            debug!("Using config file {}", candidate.display());
            return Ok(Some(candidate));
        }
    }

    Ok(None)
}

/// Platform config file locations, most specific first
fn platform_config_candidates(file_name: &str) -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join(APP_DIR).join(file_name));
    }
    if cfg!(target_os = "linux") {
        candidates.push(PathBuf::from("/etc").join(APP_DIR).join(file_name));
    }

    candidates
}

/// Root folder resolution for relative track paths
///
/// `toml_value` is the `root_folder` key from an already-parsed config file.
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_value: Option<&Path>,
) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = toml_value {
        return path.to_path_buf();
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::audio_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Music")))
        .unwrap_or_else(|| PathBuf::from("./onair_media"))
}

/// Resolve a track locator against the root folder
///
/// Absolute paths are returned unchanged.
pub fn resolve_track_path(root_folder: &Path, locator: &str) -> PathBuf {
    let path = Path::new(locator);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root_folder.join(path)
    }
}
