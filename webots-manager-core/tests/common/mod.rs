//! Test helpers for integration tests
//!
//! Shared across test files through the tests/common/ pattern.

#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use std::path::Path;
use std::sync::Once;
use webots_manager_core::config::CatalogConfig;
use webots_manager_core::ManagerConfig;

/// Initialize logging for tests (only once per test run)
static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_target(true)
                    .with_level(true),
            )
            .with(tracing_subscriber::filter::EnvFilter::from_default_env())
            .try_init();
    });
}

pub const ARCH: &str = "x86-64";

/// Archive filename the listing advertises for `version`
pub fn archive_name(version: &str) -> String {
    format!("webots-{version}-{ARCH}.tar.gz")
}

/// Listing page body in the vendor's index format
pub fn listing_body(versions: &[&str]) -> String {
    let mut body = String::from("<html><body><pre>\n");
    for version in versions {
        let name = archive_name(version);
        body.push_str(&format!("<a href=\"{name}\">{name}</a>  12-Oct-2023 10:00  1.2G\n"));
    }
    body.push_str("</pre></body></html>\n");
    body
}

/// Gzip'd tar with every file under `top/`
pub fn release_archive(top: &str, files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o755);
        builder
            .append_data(&mut header, format!("{top}/{path}"), *content)
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Config rooted under `dir`, listing served from `server_uri`
pub fn test_config(dir: &Path, server_uri: &str) -> ManagerConfig {
    let mut config = ManagerConfig::with_root(dir.join("webots_manager"));
    config.catalog = CatalogConfig {
        url: format!("{server_uri}/archive/"),
        package: "webots".to_string(),
        arch: ARCH.to_string(),
        suffix: ".tar.gz".to_string(),
        timeout_secs: 5,
        cache: None,
    };
    config.download_timeout_secs = 5;
    config
}

/// Names of the entries directly inside `dir`, sorted
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
