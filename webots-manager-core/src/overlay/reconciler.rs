//! Link reconciliation
//!
//! Computes, for every installed version and every registered path, which
//! blob should be linked there, then makes the filesystem match. Anything at
//! a target path that is not a link into the template directory belongs to
//! the user and is never touched.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use super::store::TemplateStore;
use crate::error::{IoResultExt, Result};
use crate::links::{self, Occupant};
use crate::version::Version;

/// What one reconciliation pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub created: usize,
    pub replaced: usize,
    pub removed: usize,
    pub unchanged: usize,
    /// Targets left alone because user content sits there
    pub skipped: usize,
}

impl ReconcileReport {
    pub fn changes(&self) -> usize {
        self.created + self.replaced + self.removed
    }
}

pub struct LinkReconciler<'a> {
    store: &'a TemplateStore,
}

impl<'a> LinkReconciler<'a> {
    pub fn new(store: &'a TemplateStore) -> Self {
        Self { store }
    }

    /// Bring the links of every installed version in line with the index.
    ///
    /// Running it twice in a row changes nothing the second time.
    pub fn update_links(&self, installed: &BTreeSet<Version>) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let desired = self.desired_links(installed);

        let mut missing_versions = BTreeSet::new();
        for ((version, target), digest) in desired {
            let version_dir = self.store.root().join(version.as_str());
            if !version_dir.is_dir() {
                if missing_versions.insert(version) {
                    tracing::warn!(
                        "Version directory {} is missing, skipping its templates",
                        version_dir.display()
                    );
                }
                continue;
            }

            let link = version_dir.join(target);
            match digest {
                Some(digest) => self.place(&link, digest, &mut report)?,
                None => self.clear(&link, &mut report)?,
            }
        }

        tracing::info!(
            "Template links: {} created, {} replaced, {} removed, {} unchanged, {} skipped",
            report.created,
            report.replaced,
            report.removed,
            report.unchanged,
            report.skipped
        );
        Ok(report)
    }

    /// Desired blob per (version, path); `None` means no eligible template.
    ///
    /// Entries are visited in digest order, so when several eligible blobs
    /// share a path the result is deterministic.
    fn desired_links<'v>(
        &self,
        installed: &'v BTreeSet<Version>,
    ) -> BTreeMap<(&'v Version, &'a str), Option<&'a str>> {
        let store: &'a TemplateStore = self.store;
        let mut desired = BTreeMap::new();
        for (digest, entry) in store.entries() {
            for version in installed {
                let eligible = entry.is_eligible(version);
                for target in &entry.paths {
                    let slot = desired.entry((version, target.as_str())).or_insert(None);
                    if eligible {
                        *slot = Some(digest.as_str());
                    }
                }
            }
        }
        desired
    }

    fn place(&self, link: &Path, digest: &str, report: &mut ReconcileReport) -> Result<()> {
        let blob = self.store.blob_path(digest);
        match links::occupant(link).at(link)? {
            Occupant::Nothing => {
                if let Some(parent) = link.parent() {
                    std::fs::create_dir_all(parent).at(parent)?;
                }
                links::symlink_file(&blob, link).at(link)?;
                tracing::debug!("Linked {}", link.display());
                report.created += 1;
            }
            Occupant::Link(current) if current == blob => {
                report.unchanged += 1;
            }
            Occupant::Link(current) if self.is_blob(&current) => {
                std::fs::remove_file(link).at(link)?;
                links::symlink_file(&blob, link).at(link)?;
                tracing::debug!("Relinked {}", link.display());
                report.replaced += 1;
            }
            Occupant::Link(_) | Occupant::Other => {
                tracing::debug!("Leaving user content at {}", link.display());
                report.skipped += 1;
            }
        }
        Ok(())
    }

    fn clear(&self, link: &Path, report: &mut ReconcileReport) -> Result<()> {
        if let Occupant::Link(current) = links::occupant(link).at(link)? {
            if self.is_blob(&current) {
                std::fs::remove_file(link).at(link)?;
                tracing::debug!("Unlinked {}", link.display());
                report.removed += 1;
            }
        }
        Ok(())
    }

    fn is_blob(&self, target: &Path) -> bool {
        target.parent() == Some(self.store.dir())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::ManagerConfig;
    use crate::overlay::TemplateFilters;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn setup(versions: &[&str]) -> (TempDir, ManagerConfig, BTreeSet<Version>) {
        let temp_dir = TempDir::new().unwrap();
        let config = ManagerConfig::with_root(temp_dir.path().join("webots_manager"));
        let mut installed = BTreeSet::new();
        for name in versions {
            let version = v(name);
            std::fs::create_dir_all(config.version_dir(&version)).unwrap();
            installed.insert(version);
        }
        std::fs::create_dir_all(&config.root).unwrap();
        (temp_dir, config, installed)
    }

    #[test]
    fn test_links_created_for_every_version() {
        let (_temp_dir, config, installed) = setup(&["2023a", "2023b"]);
        let mut store = TemplateStore::open(&config).unwrap();
        store
            .add_file(b"world", "worlds/default.wbt", &TemplateFilters::default())
            .unwrap();

        let report = LinkReconciler::new(&store).update_links(&installed).unwrap();
        assert_eq!(report.created, 2);

        for version in &installed {
            let link = config.version_dir(version).join("worlds/default.wbt");
            assert!(store.is_managed_link(&link).unwrap());
            assert_eq!(std::fs::read(&link).unwrap(), b"world");
        }
    }

    #[test]
    fn test_second_run_is_noop() {
        let (_temp_dir, config, installed) = setup(&["2023a", "2023b"]);
        let mut store = TemplateStore::open(&config).unwrap();
        store.add_file(b"x", "a.txt", &TemplateFilters::default()).unwrap();

        let reconciler = LinkReconciler::new(&store);
        reconciler.update_links(&installed).unwrap();
        let second = reconciler.update_links(&installed).unwrap();
        assert_eq!(second.changes(), 0);
        assert_eq!(second.unchanged, 2);
    }

    #[test]
    fn test_blacklisted_version_loses_link() {
        let (_temp_dir, config, installed) = setup(&["2023a", "2023b"]);
        let mut store = TemplateStore::open(&config).unwrap();
        store.add_file(b"x", "a.txt", &TemplateFilters::default()).unwrap();
        LinkReconciler::new(&store).update_links(&installed).unwrap();

        store.blacklist(b"x", &v("2023b")).unwrap();
        let report = LinkReconciler::new(&store).update_links(&installed).unwrap();

        assert_eq!(report.removed, 1);
        assert!(config.version_dir(&v("2023a")).join("a.txt").exists());
        assert!(!config.version_dir(&v("2023b")).join("a.txt").exists());
    }

    #[test]
    fn test_version_specific_content_replaces_shared() {
        let (_temp_dir, config, installed) = setup(&["2023a", "2023b"]);
        let mut store = TemplateStore::open(&config).unwrap();
        store
            .add_file(b"generic", "a.txt", &TemplateFilters::except([v("2023b")]))
            .unwrap();
        store
            .add_file(b"special", "a.txt", &TemplateFilters::only([v("2023b")]))
            .unwrap();

        LinkReconciler::new(&store).update_links(&installed).unwrap();
        assert_eq!(
            std::fs::read(config.version_dir(&v("2023a")).join("a.txt")).unwrap(),
            b"generic"
        );
        assert_eq!(
            std::fs::read(config.version_dir(&v("2023b")).join("a.txt")).unwrap(),
            b"special"
        );
    }

    #[test]
    fn test_user_files_are_not_touched() {
        let (_temp_dir, config, installed) = setup(&["2023a"]);
        let mut store = TemplateStore::open(&config).unwrap();
        store.add_file(b"x", "a.txt", &TemplateFilters::default()).unwrap();
        store.add_file(b"y", "b.txt", &TemplateFilters::default()).unwrap();

        let dir = config.version_dir(&v("2023a"));
        std::fs::write(dir.join("a.txt"), "mine").unwrap();
        std::fs::write(dir.join("other"), "").unwrap();
        links::symlink_file(&dir.join("other"), &dir.join("b.txt")).unwrap();

        let report = LinkReconciler::new(&store).update_links(&installed).unwrap();
        assert_eq!(report.skipped, 2);
        assert_eq!(std::fs::read_to_string(dir.join("a.txt")).unwrap(), "mine");
        assert!(!store.is_managed_link(&dir.join("b.txt")).unwrap());
    }

    #[test]
    fn test_missing_version_dir_is_skipped() {
        let (_temp_dir, config, mut installed) = setup(&["2023a"]);
        installed.insert(v("2024a"));
        let mut store = TemplateStore::open(&config).unwrap();
        store.add_file(b"x", "a.txt", &TemplateFilters::default()).unwrap();

        let report = LinkReconciler::new(&store).update_links(&installed).unwrap();
        assert_eq!(report.created, 1);
        assert!(!config.version_dir(&v("2024a")).exists());
    }
}
