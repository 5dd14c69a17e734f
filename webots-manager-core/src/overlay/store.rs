//! Content-addressed template store
//!
//! Every distinct file content is stored once under `templates/<digest>`.
//! The index records which paths each blob is overlaid at and for which
//! versions.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use super::hasher;
use super::index::{self, TemplateEntry, TemplateIndex};
use crate::config::ManagerConfig;
use crate::error::{IoResultExt, ManagerError, Result};
use crate::links::{self, Occupant};
use crate::version::Version;

/// Version filters given when a template is added
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateFilters {
    pub only: BTreeSet<Version>,
    pub except: BTreeSet<Version>,
}

impl TemplateFilters {
    pub fn only(versions: impl IntoIterator<Item = Version>) -> Self {
        Self {
            only: versions.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn except(versions: impl IntoIterator<Item = Version>) -> Self {
        Self {
            except: versions.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.only.is_empty() && self.except.is_empty()
    }
}

pub struct TemplateStore {
    root: PathBuf,
    dir: PathBuf,
    index: TemplateIndex,
}

impl TemplateStore {
    /// Open the store under the installation root, creating `templates/`
    pub fn open(config: &ManagerConfig) -> Result<Self> {
        if !config.root.is_dir() {
            return Err(ManagerError::NotInitialized {
                root: config.root.clone(),
            });
        }
        let dir = config.templates_dir();
        std::fs::create_dir_all(&dir).at(&dir)?;
        let index = TemplateIndex::load(&dir)?;
        tracing::debug!(
            "Opened template store {} ({} blobs)",
            dir.display(),
            index.templates.len()
        );
        Ok(Self {
            root: config.root.clone(),
            dir,
            index,
        })
    }

    /// Directory holding the blobs
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Installation root the target paths are relative to
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn blob_path(&self, digest: &str) -> PathBuf {
        self.dir.join(digest)
    }

    /// Store `content` and register it at `target`.
    ///
    /// Identical content is stored once; filters are merged into whatever
    /// the entry already had. Returns the content digest.
    pub fn add_file(
        &mut self,
        content: &[u8],
        target: &str,
        filters: &TemplateFilters,
    ) -> Result<String> {
        let target = normalize_target(target)?;
        let digest = hasher::digest(content);

        let blob = self.blob_path(&digest);
        if blob.exists() {
            tracing::debug!("Blob {} already stored", digest);
        } else {
            index::write_atomic(&blob, content)?;
            tracing::debug!("Stored blob {} ({} bytes)", digest, content.len());
        }

        if self.index.register(&digest, &target) {
            tracing::info!("Registered new template {} at {}", short(&digest), target);
        } else {
            tracing::info!("Added path {} to template {}", target, short(&digest));
        }
        if let Some(entry) = self.index.templates.get_mut(&digest) {
            entry.only.extend(filters.only.iter().cloned());
            entry.except.extend(filters.except.iter().cloned());
        }

        self.index.save(&self.dir)?;
        Ok(digest)
    }

    /// Read a local file and add it at `target`
    pub fn add_file_from(
        &mut self,
        source: &Path,
        target: &str,
        filters: &TemplateFilters,
    ) -> Result<String> {
        let content = std::fs::read(source).at(source)?;
        self.add_file(&content, target, filters)
    }

    /// Unregister every template at `target`.
    ///
    /// Managed links at `target` are removed from each installed version;
    /// blobs no longer referenced by any path are deleted.
    pub fn remove_file(&mut self, target: &str, installed: &BTreeSet<Version>) -> Result<()> {
        let target = normalize_target(target)?;
        if !self.index.paths.contains_key(&target) {
            return Err(ManagerError::TemplateNotFound { what: target });
        }

        for version in installed {
            let link = self.root.join(version.as_str()).join(&target);
            if self.is_managed_link(&link)? {
                std::fs::remove_file(&link).at(&link)?;
                tracing::debug!("Removed {}", link.display());
            }
        }

        let orphaned = self.index.deregister_path(&target);
        self.index.save(&self.dir)?;

        for digest in orphaned {
            let blob = self.blob_path(&digest);
            match std::fs::remove_file(&blob) {
                Ok(()) => tracing::debug!("Deleted unreferenced blob {}", digest),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(ManagerError::io(&blob, e)),
            }
        }
        tracing::info!("Removed template path {}", target);
        Ok(())
    }

    /// Whether this exact content is stored
    pub fn has(&self, content: &[u8]) -> bool {
        self.index.templates.contains_key(&hasher::digest(content))
    }

    /// Index entry for this exact content
    pub fn entry(&self, content: &[u8]) -> Result<&TemplateEntry> {
        let digest = hasher::digest(content);
        self.index
            .templates
            .get(&digest)
            .ok_or(ManagerError::TemplateNotFound { what: digest })
    }

    /// Restrict the stored content to `version` (adds to its whitelist)
    pub fn whitelist(&mut self, content: &[u8], version: &Version) -> Result<()> {
        self.update_entry(content, |entry| {
            entry.only.insert(version.clone());
        })?;
        tracing::info!("Whitelisted version {}", version);
        Ok(())
    }

    /// Exclude `version` for the stored content (adds to its blacklist)
    pub fn blacklist(&mut self, content: &[u8], version: &Version) -> Result<()> {
        self.update_entry(content, |entry| {
            entry.except.insert(version.clone());
        })?;
        tracing::info!("Blacklisted version {}", version);
        Ok(())
    }

    fn update_entry(&mut self, content: &[u8], apply: impl FnOnce(&mut TemplateEntry)) -> Result<()> {
        let digest = hasher::digest(content);
        let entry = self
            .index
            .templates
            .get_mut(&digest)
            .ok_or(ManagerError::TemplateNotFound { what: digest })?;
        apply(entry);
        self.index.save(&self.dir)
    }

    /// All entries keyed by digest
    pub fn entries(&self) -> &BTreeMap<String, TemplateEntry> {
        &self.index.templates
    }

    /// Digests registered at `target`
    pub fn digests_at(&self, target: &str) -> Option<&BTreeSet<String>> {
        let target = normalize_target(target).ok()?;
        self.index.paths.get(&target)
    }

    /// Whether `path` is a symlink into this store's blob directory
    pub fn is_managed_link(&self, path: &Path) -> Result<bool> {
        match links::occupant(path).at(path)? {
            Occupant::Link(target) => Ok(target.parent() == Some(self.dir.as_path())),
            Occupant::Nothing | Occupant::Other => Ok(false),
        }
    }
}

/// Canonical form of a target path: relative, `/`-separated, no `..`
pub fn normalize_target(target: &str) -> Result<String> {
    let invalid = || ManagerError::InvalidTemplatePath(target.to_string());

    let mut parts = Vec::new();
    for component in Path::new(target).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str().ok_or_else(invalid)?),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(invalid())
            }
        }
    }
    if parts.is_empty() {
        return Err(invalid());
    }
    Ok(parts.join("/"))
}

fn short(digest: &str) -> &str {
    digest.get(..12).unwrap_or(digest)
}
