//! Tests for config file location and root folder resolution
//!
//! Tests that manipulate ONAIR_TEST_ROOT are marked with #[serial] so they
//! run sequentially, not in parallel.

use onair_common::config::{locate_config_file, resolve_root_folder};
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};

const ENV_VAR: &str = "ONAIR_TEST_ROOT";

#[test]
#[serial]
fn test_cli_argument_wins() {
    env::set_var(ENV_VAR, "/from/env");

    let root = resolve_root_folder(
        Some(Path::new("/from/cli")),
        ENV_VAR,
        Some(Path::new("/from/toml")),
    );
    assert_eq!(root, PathBuf::from("/from/cli"));

    env::remove_var(ENV_VAR);
}

#[test]
#[serial]
fn test_env_beats_toml() {
    env::set_var(ENV_VAR, "/from/env");

    let root = resolve_root_folder(None, ENV_VAR, Some(Path::new("/from/toml")));
    assert_eq!(root, PathBuf::from("/from/env"));

    env::remove_var(ENV_VAR);
}

#[test]
#[serial]
fn test_toml_used_without_cli_or_env() {
    env::remove_var(ENV_VAR);

    let root = resolve_root_folder(None, ENV_VAR, Some(Path::new("/from/toml")));
    assert_eq!(root, PathBuf::from("/from/toml"));
}

#[test]
#[serial]
fn test_falls_back_to_platform_default() {
    env::remove_var(ENV_VAR);

    let root = resolve_root_folder(None, ENV_VAR, None);
    assert!(!root.as_os_str().is_empty());
}

#[test]
fn test_explicit_config_file_found() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("playout.toml");
    std::fs::write(&path, "port = 5750\n").unwrap();

    let located = locate_config_file(Some(&path), "playout.toml").unwrap();
    assert_eq!(located, Some(path));
}
