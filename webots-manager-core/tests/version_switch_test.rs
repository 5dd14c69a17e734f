//! Active version switching and crash recovery

#![cfg(unix)]

mod common;

use common::init_test_logging;
use std::path::PathBuf;
use tempfile::TempDir;
use webots_manager_core::store::VersionStore;
use webots_manager_core::{ManagerConfig, ManagerError, Version};

fn v(s: &str) -> Version {
    Version::parse(s).unwrap()
}

fn two_versions() -> (TempDir, ManagerConfig) {
    init_test_logging();
    let temp_dir = TempDir::new().unwrap();
    let config = ManagerConfig::with_root(temp_dir.path().join("webots_manager"));
    VersionStore::init(&config).unwrap();
    for name in ["2023a", "2023b"] {
        std::fs::create_dir(config.version_dir(&v(name))).unwrap();
    }
    (temp_dir, config)
}

#[test]
fn test_switch_replaces_in_use_link() {
    let (_temp_dir, config) = two_versions();
    let mut store = VersionStore::open(&config).unwrap();

    store.activate(&v("2023a")).unwrap();
    store.activate(&v("2023b")).unwrap();

    assert_eq!(
        std::fs::read_link(config.in_use_link()).unwrap(),
        PathBuf::from("2023b")
    );
    assert!(store.is_active(&v("2023b")));
    assert!(!store.is_active(&v("2023a")));

    // The alias keeps pointing at in_use across switches
    assert_eq!(std::fs::read_link(&config.alias).unwrap(), config.in_use_link());
}

#[test]
fn test_interrupted_switch_converges_on_retry() {
    let (_temp_dir, config) = two_versions();
    let mut store = VersionStore::open(&config).unwrap();
    store.activate(&v("2023a")).unwrap();

    // Crash after the old link was removed, before the new one was created
    std::fs::remove_file(config.in_use_link()).unwrap();

    let mut store = VersionStore::open(&config).unwrap();
    assert!(store.active().is_none());

    store.activate(&v("2023b")).unwrap();
    assert_eq!(store.active(), Some(&v("2023b")));

    let store = VersionStore::open(&config).unwrap();
    assert_eq!(store.active(), Some(&v("2023b")));
}

#[test]
fn test_use_not_installed_keeps_current() {
    let (_temp_dir, config) = two_versions();
    let mut store = VersionStore::open(&config).unwrap();
    store.activate(&v("2023a")).unwrap();

    let err = store.activate(&v("2024a")).unwrap_err();
    assert!(matches!(err, ManagerError::VersionNotInstalled(ref s) if s == "2024a"));
    assert_eq!(store.active(), Some(&v("2023a")));
    assert_eq!(
        std::fs::read_link(config.in_use_link()).unwrap(),
        PathBuf::from("2023a")
    );
}

#[test]
fn test_in_use_pointing_at_removed_version() {
    let (_temp_dir, config) = two_versions();
    let mut store = VersionStore::open(&config).unwrap();
    store.activate(&v("2023a")).unwrap();
    std::fs::remove_dir(config.version_dir(&v("2023a"))).unwrap();

    let mut store = VersionStore::open(&config).unwrap();
    assert!(store.active().is_none());
    assert!(!store.is_installed(&v("2023a")));

    store.activate(&v("2023b")).unwrap();
    assert_eq!(
        std::fs::read_link(config.in_use_link()).unwrap(),
        PathBuf::from("2023b")
    );
}

#[test]
fn test_remove_is_not_implemented() {
    let (_temp_dir, config) = two_versions();
    let mut store = VersionStore::open(&config).unwrap();
    assert!(matches!(
        store.remove(&v("2023a")),
        Err(ManagerError::NotImplemented { operation: "remove" })
    ));
    assert!(config.version_dir(&v("2023a")).is_dir());
}
