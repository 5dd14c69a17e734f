//! Template index persistence (`templates_db` and `paths_db`)
//!
//! `templates_db` maps a content digest to its registered paths and version
//! filters; `paths_db` is the reverse map from path to digests. Both files
//! are rewritten through a temp file and a rename.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::Path;

use crate::error::{IoResultExt, ManagerError, Result};
use crate::version::Version;

pub const TEMPLATES_DB: &str = "templates_db";
pub const PATHS_DB: &str = "paths_db";

/// One stored blob and where it is overlaid
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateEntry {
    /// Target paths relative to a version directory, in registration order
    #[serde(default)]
    pub paths: Vec<String>,

    /// Whitelist; when non-empty only these versions get the overlay
    #[serde(default)]
    pub only: BTreeSet<Version>,

    /// Blacklist; these versions never get the overlay
    #[serde(default)]
    pub except: BTreeSet<Version>,
}

impl TemplateEntry {
    /// Blacklist is checked first, then a non-empty whitelist restricts further
    pub fn is_eligible(&self, version: &Version) -> bool {
        if self.except.contains(version) {
            return false;
        }
        self.only.is_empty() || self.only.contains(version)
    }
}

/// In-memory view of both index files
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateIndex {
    pub templates: BTreeMap<String, TemplateEntry>,
    pub paths: BTreeMap<String, BTreeSet<String>>,
}

impl TemplateIndex {
    /// Load both files from `dir`; missing files mean an empty index.
    ///
    /// A missing `paths_db` next to an existing `templates_db` is rebuilt
    /// from the entries.
    pub fn load(dir: &Path) -> Result<Self> {
        let templates: Option<BTreeMap<String, TemplateEntry>> =
            read_yaml(&dir.join(TEMPLATES_DB))?;
        let paths: Option<BTreeMap<String, BTreeSet<String>>> = read_yaml(&dir.join(PATHS_DB))?;

        let mut index = TemplateIndex {
            templates: templates.unwrap_or_default(),
            paths: paths.unwrap_or_default(),
        };
        if index.paths.is_empty() && !index.templates.is_empty() {
            tracing::warn!("{} is missing, rebuilding it from {}", PATHS_DB, TEMPLATES_DB);
            index.rebuild_paths();
        }
        Ok(index)
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        write_yaml(&dir.join(TEMPLATES_DB), &self.templates)?;
        write_yaml(&dir.join(PATHS_DB), &self.paths)?;
        tracing::debug!(
            "Saved template index: {} blobs, {} paths",
            self.templates.len(),
            self.paths.len()
        );
        Ok(())
    }

    fn rebuild_paths(&mut self) {
        self.paths.clear();
        for (digest, entry) in &self.templates {
            for path in &entry.paths {
                self.paths
                    .entry(path.clone())
                    .or_default()
                    .insert(digest.clone());
            }
        }
    }

    /// Register `path` on `digest`, creating the entry if needed.
    ///
    /// Returns true when the entry is new.
    pub fn register(&mut self, digest: &str, path: &str) -> bool {
        let is_new = !self.templates.contains_key(digest);
        let entry = self.templates.entry(digest.to_string()).or_default();
        if !entry.paths.iter().any(|p| p == path) {
            entry.paths.push(path.to_string());
        }
        self.paths
            .entry(path.to_string())
            .or_default()
            .insert(digest.to_string());
        is_new
    }

    /// Drop every registration at `path`.
    ///
    /// Returns the digests whose entries lost their last path and were
    /// deleted; their blobs are now unreferenced.
    pub fn deregister_path(&mut self, path: &str) -> Vec<String> {
        let mut orphaned = Vec::new();
        let Some(digests) = self.paths.remove(path) else {
            return orphaned;
        };
        for digest in digests {
            if let Some(entry) = self.templates.get_mut(&digest) {
                entry.paths.retain(|p| p != path);
                if entry.paths.is_empty() {
                    self.templates.remove(&digest);
                    orphaned.push(digest);
                }
            }
        }
        orphaned
    }
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path).at(path)?;
    if content.trim().is_empty() {
        return Ok(None);
    }
    serde_yaml_ng::from_str(&content)
        .map(Some)
        .map_err(|e| ManagerError::Index {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_yaml_ng::to_string(value).map_err(|e| ManagerError::Index {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    write_atomic(path, content.as_bytes())
}

/// Write `content` next to `path` and rename it into place
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut file = tempfile::NamedTempFile::new_in(dir).at(dir)?;
    file.write_all(content).at(file.path())?;
    file.flush().at(file.path())?;
    file.persist(path)
        .map_err(|e| ManagerError::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_eligibility_blacklist_only() {
        let entry = TemplateEntry {
            except: [v("2023b")].into_iter().collect(),
            ..Default::default()
        };
        assert!(entry.is_eligible(&v("2023a")));
        assert!(!entry.is_eligible(&v("2023b")));
        assert!(entry.is_eligible(&v("2024a")));
    }

    #[test]
    fn test_eligibility_whitelist_restricts() {
        let entry = TemplateEntry {
            only: [v("2023a")].into_iter().collect(),
            ..Default::default()
        };
        assert!(entry.is_eligible(&v("2023a")));
        assert!(!entry.is_eligible(&v("2023b")));
    }

    #[test]
    fn test_blacklist_beats_whitelist() {
        let entry = TemplateEntry {
            only: [v("2023a")].into_iter().collect(),
            except: [v("2023a")].into_iter().collect(),
            ..Default::default()
        };
        assert!(!entry.is_eligible(&v("2023a")));
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut index = TemplateIndex::default();
        assert!(index.register("abc", "worlds/default.wbt"));
        assert!(!index.register("abc", "worlds/default.wbt"));

        assert_eq!(index.templates["abc"].paths, vec!["worlds/default.wbt"]);
        assert_eq!(index.paths["worlds/default.wbt"].len(), 1);
    }

    #[test]
    fn test_deregister_reports_orphans() {
        let mut index = TemplateIndex::default();
        index.register("abc", "a.txt");
        index.register("abc", "b.txt");
        index.register("def", "a.txt");

        let orphaned = index.deregister_path("a.txt");
        assert_eq!(orphaned, vec!["def".to_string()]);
        assert_eq!(index.templates["abc"].paths, vec!["b.txt"]);
        assert!(!index.paths.contains_key("a.txt"));
        assert!(index.deregister_path("a.txt").is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let mut index = TemplateIndex::default();
        index.register("abc", "worlds/default.wbt");
        index
            .templates
            .get_mut("abc")
            .unwrap()
            .except
            .insert(v("2023b"));
        index.save(temp_dir.path()).unwrap();

        let loaded = TemplateIndex::load(temp_dir.path()).unwrap();
        assert_eq!(loaded, index);
    }

    #[test]
    fn test_load_empty_dir_and_empty_files() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(
            TemplateIndex::load(temp_dir.path()).unwrap(),
            TemplateIndex::default()
        );

        std::fs::write(temp_dir.path().join(TEMPLATES_DB), "\n").unwrap();
        assert_eq!(
            TemplateIndex::load(temp_dir.path()).unwrap(),
            TemplateIndex::default()
        );
    }

    #[test]
    fn test_missing_paths_db_is_rebuilt() {
        let temp_dir = TempDir::new().unwrap();
        let mut index = TemplateIndex::default();
        index.register("abc", "worlds/default.wbt");
        index.save(temp_dir.path()).unwrap();
        std::fs::remove_file(temp_dir.path().join(PATHS_DB)).unwrap();

        let loaded = TemplateIndex::load(temp_dir.path()).unwrap();
        assert_eq!(loaded.paths, index.paths);
    }

    #[test]
    fn test_corrupt_index_is_typed_error() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(TEMPLATES_DB), "- just\n- a list\n").unwrap();
        assert!(matches!(
            TemplateIndex::load(temp_dir.path()),
            Err(ManagerError::Index { .. })
        ));
    }
}
