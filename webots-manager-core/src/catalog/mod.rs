//! Release catalog
//!
//! Turns the vendor's archive listing into an ordered mapping from version
//! to download URL.
//!
//! ```text
//! Listing page (one line per archive)
//!     │
//!     ├── webots-2023a-x86-64.tar.bz2
//!     └── webots-2023b-x86-64.tar.bz2  ← latest (last in document order)
//!            │
//!            ▼
//!     CatalogClient::fetch()  ──►  catalog.yaml (Last-Modified cache)
//!            │
//!            ▼
//!     CatalogListing  ──►  VersionStore::install
//! ```

mod cache;
mod client;
mod listing;

pub use cache::CachedListing;
pub use client::CatalogClient;
pub use listing::{CatalogEntry, CatalogListing};
