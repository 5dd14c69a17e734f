//! HTTP client for the release listing
//!
//! One GET per fetch. When a cache file is configured the request carries
//! `If-Modified-Since`, and an unchanged document reuses the cached listing.

use chrono::Utc;
use reqwest::header::{IF_MODIFIED_SINCE, LAST_MODIFIED};
use reqwest::StatusCode;
use std::time::Duration;

use super::{CachedListing, CatalogListing};
use crate::config::CatalogConfig;
use crate::error::{ManagerError, Result};

/// Fetches the version -> download URL mapping
pub struct CatalogClient {
    client: reqwest::Client,
    config: CatalogConfig,
}

impl CatalogClient {
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("webots-manager/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .read_timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ManagerError::CatalogUnavailable {
                url: config.url.clone(),
                reason: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Fetch the listing, reusing the cache when the document is unchanged
    pub async fn fetch(&self) -> Result<CatalogListing> {
        let cached = self
            .config
            .cache
            .as_deref()
            .and_then(|path| CachedListing::load(path, &self.config.url));
        self.fetch_with(cached).await
    }

    /// Fetch the listing, ignoring any cached copy
    pub async fn fetch_fresh(&self) -> Result<CatalogListing> {
        self.fetch_with(None).await
    }

    async fn fetch_with(&self, cached: Option<CachedListing>) -> Result<CatalogListing> {
        let url = &self.config.url;
        let unavailable = |reason: String| ManagerError::CatalogUnavailable {
            url: url.clone(),
            reason,
        };

        let mut request = self.client.get(url);
        if let Some(last_modified) = cached.as_ref().and_then(|c| c.last_modified.as_deref()) {
            request = request.header(IF_MODIFIED_SINCE, last_modified);
        }

        tracing::debug!("Fetching release listing from {}", url);
        let response = request.send().await.map_err(|e| unavailable(e.to_string()))?;

        if response.status() == StatusCode::NOT_MODIFIED {
            if let Some(cached) = cached {
                tracing::debug!("Listing not modified since {:?}", cached.last_modified);
                return Ok(cached.listing);
            }
        }

        if !response.status().is_success() {
            return Err(unavailable(format!("HTTP {}", response.status())));
        }

        let last_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if let Some(cached) = cached {
            if !cached.is_stale_against(last_modified.as_deref()) {
                tracing::debug!("Listing unchanged, using cached copy");
                return Ok(cached.listing);
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| unavailable(format!("failed to read listing: {e}")))?;

        let listing = CatalogListing::parse(&body, url, &self.config);
        tracing::info!("Found {} releases at {}", listing.len(), url);

        if let Some(path) = self.config.cache.as_deref() {
            CachedListing {
                url: url.clone(),
                fetched_at: Utc::now(),
                last_modified,
                listing: listing.clone(),
            }
            .save(path);
        }

        Ok(listing)
    }
}
