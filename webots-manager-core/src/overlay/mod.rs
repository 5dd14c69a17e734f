//! Template overlay
//!
//! Files that should appear inside installed versions are stored once,
//! content-addressed, and symlinked into each eligible version directory.
//!
//! ```text
//! <root>/templates/
//!   templates_db      digest -> { paths, only, except }
//!   paths_db          path -> [digest]
//!   3a7bd3e2360a...   blob
//! <root>/2023a/worlds/default.wbt -> <root>/templates/3a7bd3e2360a...
//! ```

mod hasher;
mod index;
mod reconciler;
mod store;

pub use hasher::digest;
pub use index::{TemplateEntry, PATHS_DB, TEMPLATES_DB};
pub use reconciler::{LinkReconciler, ReconcileReport};
pub use store::{normalize_target, TemplateFilters, TemplateStore};
