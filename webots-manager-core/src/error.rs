//! Error taxonomy for the version store and the template overlay engine
//!
//! Every failure path maps to one variant here. Nothing is retried internally;
//! callers decide whether to re-run an operation.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised by the core engines
#[derive(Error, Debug)]
pub enum ManagerError {
    /// The remote listing could not be fetched
    #[error("Catalog at {url} is unavailable: {reason}")]
    CatalogUnavailable { url: String, reason: String },

    /// The installation root does not exist yet
    #[error("Installation root {} does not exist.\n\nTo set it up, run:\n  webots-manager init", root.display())]
    NotInitialized { root: PathBuf },

    #[error("Version {0} is not available in the catalog")]
    VersionNotAvailable(String),

    #[error("Version {0} is already installed")]
    VersionAlreadyInstalled(String),

    #[error("Version {0} is not installed")]
    VersionNotInstalled(String),

    #[error("Failed to extract archive {}: {reason}", archive.display())]
    ArchiveExtractionFailed { archive: PathBuf, reason: String },

    /// No overlay entry matches the given content or path
    #[error("No template stored for {what}")]
    TemplateNotFound { what: String },

    /// A link the manager owns is occupied by something else
    #[error("{} points to {found}, expected {}.\n\nRemove it manually if it is safe to do so.", path.display(), expected.display())]
    ConflictingAlias {
        path: PathBuf,
        found: String,
        expected: PathBuf,
    },

    #[error("{operation} is not implemented")]
    NotImplemented { operation: &'static str },

    #[error("Permission denied on {}", path.display())]
    FilesystemPermission {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid version identifier '{0}'")]
    InvalidVersion(String),

    #[error("Invalid template path '{0}': must be relative and stay inside the version directory")]
    InvalidTemplatePath(String),

    #[error("Filesystem error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// An overlay index file could not be parsed or serialized
    #[error("Template index {} is corrupt: {reason}", path.display())]
    Index { path: PathBuf, reason: String },

    #[error("Invalid configuration {}: {reason}", path.display())]
    Config { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, ManagerError>;

impl ManagerError {
    /// Wrap an I/O error with the path it happened on.
    ///
    /// Permission problems get their own variant so callers can tell them
    /// apart from missing files or full disks.
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        if source.kind() == io::ErrorKind::PermissionDenied {
            ManagerError::FilesystemPermission { path, source }
        } else {
            ManagerError::Io { path, source }
        }
    }
}

/// Attach a path to `io::Result` values
pub(crate) trait IoResultExt<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|e| ManagerError::io(path, e))
    }
}
