//! Manager facade
//!
//! Ties the version store and the template store together so that every
//! operation that changes what should be linked re-applies the overlays.

use std::path::Path;

use crate::catalog::{CatalogClient, CatalogListing};
use crate::config::ManagerConfig;
use crate::error::{IoResultExt, Result};
use crate::overlay::{LinkReconciler, ReconcileReport, TemplateFilters, TemplateStore};
use crate::store::VersionStore;
use crate::version::Version;

pub struct Manager {
    config: ManagerConfig,
    versions: VersionStore,
    templates: TemplateStore,
}

impl Manager {
    /// Open an initialised installation root
    pub fn open(config: ManagerConfig) -> Result<Self> {
        let versions = VersionStore::open(&config)?;
        let templates = TemplateStore::open(&config)?;
        Ok(Self {
            config,
            versions,
            templates,
        })
    }

    /// Initialise the installation root if needed, then open it
    pub fn init(config: ManagerConfig) -> Result<Self> {
        let versions = VersionStore::init(&config)?;
        let templates = TemplateStore::open(&config)?;
        Ok(Self {
            config,
            versions,
            templates,
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn versions(&self) -> &VersionStore {
        &self.versions
    }

    pub fn versions_mut(&mut self) -> &mut VersionStore {
        &mut self.versions
    }

    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    /// Client for the configured release listing
    pub fn catalog(&self) -> Result<CatalogClient> {
        CatalogClient::new(&self.config.catalog)
    }

    /// Install `version` and link templates into it
    pub async fn install(
        &mut self,
        version: &Version,
        listing: &CatalogListing,
    ) -> Result<ReconcileReport> {
        self.versions.install(version, listing).await?;
        self.apply_templates()
    }

    pub fn activate(&mut self, version: &Version) -> Result<()> {
        self.versions.activate(version)
    }

    pub fn remove(&mut self, version: &Version) -> Result<()> {
        self.versions.remove(version)
    }

    /// Store `source` at `target` and link it where eligible
    pub fn add_template(
        &mut self,
        source: &Path,
        target: &str,
        filters: &TemplateFilters,
    ) -> Result<ReconcileReport> {
        self.templates.add_file_from(source, target, filters)?;
        self.apply_templates()
    }

    pub fn remove_template(&mut self, target: &str) -> Result<()> {
        self.templates.remove_file(target, self.versions.installed())
    }

    /// Restrict the content of `source` to `version`, then relink
    pub fn whitelist(&mut self, source: &Path, version: &Version) -> Result<ReconcileReport> {
        let content = read(source)?;
        self.templates.whitelist(&content, version)?;
        self.apply_templates()
    }

    /// Exclude `version` for the content of `source`, then relink
    pub fn blacklist(&mut self, source: &Path, version: &Version) -> Result<ReconcileReport> {
        let content = read(source)?;
        self.templates.blacklist(&content, version)?;
        self.apply_templates()
    }

    /// Reconcile template links for every installed version
    pub fn apply_templates(&self) -> Result<ReconcileReport> {
        LinkReconciler::new(&self.templates).update_links(self.versions.installed())
    }
}

fn read(source: &Path) -> Result<Vec<u8>> {
    std::fs::read(source).at(source)
}
