//! Version store
//!
//! Owns the installation root. Nothing is persisted besides the filesystem
//! itself: the installed set is the list of version directories, and the
//! active version is wherever the `in_use` link points.
//!
//! ```text
//! <prefix>/
//!   webots -> <root>/in_use        (alias, stable across switches)
//!   webots_manager/                (root)
//!     2023a/
//!     2023b/
//!     in_use -> 2023b
//!     templates/
//! ```

mod install;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::archive::{ArchiveExtractor, TarExtractor};
use crate::config::ManagerConfig;
use crate::error::{IoResultExt, ManagerError, Result};
use crate::links::{self, Occupant};
use crate::version::Version;

/// Installed versions and the active-version link
pub struct VersionStore {
    config: ManagerConfig,
    installed: BTreeSet<Version>,
    active: Option<Version>,
    extractor: Box<dyn ArchiveExtractor + Send + Sync>,
}

impl VersionStore {
    /// Open an existing installation root and rebuild state from disk
    pub fn open(config: &ManagerConfig) -> Result<Self> {
        let mut store = Self {
            config: config.clone(),
            installed: BTreeSet::new(),
            active: None,
            extractor: Box::new(TarExtractor),
        };
        store.restore_state()?;
        Ok(store)
    }

    /// Create the installation root and the alias, then open it.
    ///
    /// Safe to run on an already initialised root.
    pub fn init(config: &ManagerConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.root).at(&config.root)?;
        let templates = config.templates_dir();
        std::fs::create_dir_all(&templates).at(&templates)?;
        tracing::info!("Initialised installation root {}", config.root.display());

        let store = Self::open(config)?;
        store.ensure_alias()?;
        Ok(store)
    }

    /// Replace the archive extractor used by `install`
    pub fn with_extractor(mut self, extractor: impl ArchiveExtractor + Send + Sync + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    /// Rescan the installation root
    pub fn restore_state(&mut self) -> Result<()> {
        let root = &self.config.root;
        if !root.is_dir() {
            return Err(ManagerError::NotInitialized { root: root.clone() });
        }

        let mut installed = BTreeSet::new();
        for entry in std::fs::read_dir(root).at(root)? {
            let entry = entry.at(root)?;
            let is_dir = entry.file_type().at(entry.path())?.is_dir();
            if !is_dir {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if let Ok(version) = Version::parse(name) {
                    installed.insert(version);
                }
            }
        }
        self.installed = installed;

        let link = self.config.in_use_link();
        self.active = match links::occupant(&link).at(&link)? {
            Occupant::Nothing => None,
            Occupant::Other => {
                return Err(ManagerError::ConflictingAlias {
                    path: link,
                    found: "a file or directory that is not a symlink".to_string(),
                    expected: root.clone(),
                })
            }
            Occupant::Link(target) => {
                let resolved = root.join(&target);
                let version = target
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| Version::parse(n).ok());
                match version {
                    Some(v)
                        if self.installed.contains(&v) && resolved == self.config.version_dir(&v) =>
                    {
                        Some(v)
                    }
                    _ => {
                        tracing::warn!(
                            "{} points to {}, which is not an installed version; treating as no active version",
                            link.display(),
                            target.display()
                        );
                        None
                    }
                }
            }
        };

        tracing::debug!(
            "Restored state: {} installed, active {:?}",
            self.installed.len(),
            self.active.as_ref().map(Version::as_str)
        );
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn installed(&self) -> &BTreeSet<Version> {
        &self.installed
    }

    pub fn is_installed(&self, version: &Version) -> bool {
        self.installed.contains(version)
    }

    pub fn active(&self) -> Option<&Version> {
        self.active.as_ref()
    }

    pub fn is_active(&self, version: &Version) -> bool {
        self.active.as_ref() == Some(version)
    }

    /// Make `version` the active one.
    ///
    /// The old link is removed before the new one is created. A crash in
    /// between leaves no active version; running `activate` again converges.
    pub fn activate(&mut self, version: &Version) -> Result<()> {
        if !self.installed.contains(version) {
            return Err(ManagerError::VersionNotInstalled(version.to_string()));
        }

        let link = self.config.in_use_link();
        match links::occupant(&link).at(&link)? {
            Occupant::Nothing => {}
            Occupant::Link(_) => std::fs::remove_file(&link).at(&link)?,
            Occupant::Other => {
                return Err(ManagerError::ConflictingAlias {
                    path: link,
                    found: "a file or directory that is not a symlink".to_string(),
                    expected: self.config.version_dir(version),
                })
            }
        }
        self.active = None;

        links::symlink_dir(Path::new(version.as_str()), &link).at(&link)?;
        self.active = Some(version.clone());
        tracing::info!("Now using version {}", version);

        self.ensure_alias()?;
        self.check_home();
        Ok(())
    }

    /// Verify the top-level alias, creating it when missing.
    ///
    /// An alias that points anywhere other than `<root>/in_use` is reported,
    /// never rewritten.
    pub fn ensure_alias(&self) -> Result<()> {
        let alias = &self.config.alias;
        let expected = self.config.in_use_link();

        match links::occupant(alias).at(alias)? {
            Occupant::Nothing => {
                if let Some(parent) = alias.parent() {
                    std::fs::create_dir_all(parent).at(parent)?;
                }
                links::symlink_dir(&expected, alias).at(alias)?;
                tracing::info!("Created alias {} -> {}", alias.display(), expected.display());
                Ok(())
            }
            Occupant::Link(target) if target == expected => Ok(()),
            Occupant::Link(target) => Err(ManagerError::ConflictingAlias {
                path: alias.clone(),
                found: target.display().to_string(),
                expected,
            }),
            Occupant::Other => Err(ManagerError::ConflictingAlias {
                path: alias.clone(),
                found: "an existing installation (not a symlink)".to_string(),
                expected,
            }),
        }
    }

    /// Whether the configured home variable points at the alias
    pub fn home_matches(&self) -> bool {
        self.config.home.as_deref() == Some(self.config.alias.as_path())
    }

    /// Warn when the home variable does not point at the alias
    pub fn check_home(&self) {
        let var = &self.config.home_var;
        let alias = self.config.alias.display();
        match &self.config.home {
            None => tracing::warn!("{var} is not set, please consider exporting {var}={alias}"),
            Some(home) if !self.home_matches() => tracing::warn!(
                "{var}={} does not point at the managed installation, please use {var}={alias}",
                home.display()
            ),
            Some(_) => {}
        }
    }

    /// Uninstalling is not supported yet
    pub fn remove(&mut self, _version: &Version) -> Result<()> {
        Err(ManagerError::NotImplemented {
            operation: "remove",
        })
    }

    fn version_dir(&self, version: &Version) -> PathBuf {
        self.config.version_dir(version)
    }
}
