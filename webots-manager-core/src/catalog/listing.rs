//! Listing page parsing
//!
//! The listing is a plain directory index. Every line is scanned for archive
//! names of the form `<package>-<version>-<arch><suffix>`; document order is
//! preserved so the last entry is the latest release.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::CatalogConfig;
use crate::version::{Version, VERSION_CHARS};

/// A downloadable release
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub version: Version,

    /// Archive filename as it appears in the listing
    pub filename: String,

    /// Full download URL
    pub url: String,
}

/// Releases available for this OS and architecture, in document order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogListing {
    entries: Vec<CatalogEntry>,
}

impl CatalogListing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a listing from entries, dropping repeated versions
    pub fn from_entries(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        let mut listing = Self::new();
        for entry in entries {
            listing.push(entry);
        }
        listing
    }

    /// Parse a listing document.
    ///
    /// URLs are formed by appending the matched filename to `base_url`.
    pub fn parse(body: &str, base_url: &str, config: &CatalogConfig) -> Self {
        // The name must end at the suffix, so `.tar.bz2.sha256` is not a release
        let pattern = format!(
            r"({}-({})-{}{})(?:$|[^A-Za-z0-9._\-])",
            regex::escape(&config.package),
            VERSION_CHARS,
            regex::escape(&config.arch),
            regex::escape(&config.suffix),
        );
        let rx = match Regex::new(&pattern) {
            Ok(rx) => rx,
            Err(e) => {
                tracing::warn!("Cannot build listing pattern '{}': {}", pattern, e);
                return Self::new();
            }
        };

        let base = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };

        let mut listing = Self::new();
        for line in body.lines() {
            for caps in rx.captures_iter(line) {
                let filename = &caps[1];
                let version = match Version::parse(&caps[2]) {
                    Ok(v) => v,
                    Err(_) => {
                        tracing::debug!("Skipping listing entry with odd version: {}", filename);
                        continue;
                    }
                };
                listing.push(CatalogEntry {
                    version,
                    filename: filename.to_string(),
                    url: format!("{base}{filename}"),
                });
            }
        }

        tracing::debug!("Parsed {} releases from listing", listing.len());
        listing
    }

    fn push(&mut self, entry: CatalogEntry) {
        // Index pages usually mention each archive twice (href and link text)
        if self.get(&entry.version).is_none() {
            self.entries.push(entry);
        }
    }

    pub fn get(&self, version: &Version) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| &e.version == version)
    }

    pub fn url_for(&self, version: &Version) -> Option<&str> {
        self.get(version).map(|e| e.url.as_str())
    }

    pub fn contains(&self, version: &Version) -> bool {
        self.get(version).is_some()
    }

    /// The last release in document order
    pub fn latest(&self) -> Option<&CatalogEntry> {
        self.entries.last()
    }

    pub fn versions(&self) -> impl Iterator<Item = &Version> {
        self.entries.iter().map(|e| &e.version)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
