//! On-disk cache of the last successful listing fetch

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::CatalogListing;

/// Cached listing plus the validators needed to skip a re-download
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedListing {
    /// URL the listing was fetched from
    pub url: String,

    /// When the listing was fetched
    pub fetched_at: DateTime<Utc>,

    /// `Last-Modified` header of the listing document, verbatim
    #[serde(default)]
    pub last_modified: Option<String>,

    pub listing: CatalogListing,
}

impl CachedListing {
    /// Load the cache for `url`.
    ///
    /// Unreadable or mismatched caches are treated as absent; caching is
    /// best effort and never fails a fetch.
    pub fn load(path: &Path, url: &str) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Failed to read catalog cache {}: {}", path.display(), e);
                return None;
            }
        };

        let cached: CachedListing = match serde_yaml_ng::from_str(&content) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Ignoring corrupt catalog cache {}: {}", path.display(), e);
                return None;
            }
        };

        if cached.url != url {
            tracing::debug!("Catalog cache is for {}, not {}", cached.url, url);
            return None;
        }

        Some(cached)
    }

    pub fn save(&self, path: &Path) {
        if let Err(e) = self.try_save(path) {
            tracing::warn!("Failed to save catalog cache {}: {}", path.display(), e);
        } else {
            tracing::debug!("Saved catalog listing to cache: {}", path.display());
        }
    }

    fn try_save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml_ng::to_string(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Whether a document modified at `last_modified` is newer than this cache.
    ///
    /// Unknown or unparseable dates count as newer so the fresh body is used.
    pub fn is_stale_against(&self, last_modified: Option<&str>) -> bool {
        let (Some(cached), Some(remote)) = (self.last_modified.as_deref(), last_modified) else {
            return true;
        };
        match (parse_http_date(cached), parse_http_date(remote)) {
            (Some(cached), Some(remote)) => remote > cached,
            _ => cached != remote,
        }
    }
}

/// Parse an HTTP date (`Wed, 21 Oct 2015 07:28:00 GMT`)
fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}
