//! Version installation
//!
//! Download to a temporary file, extract into a hidden staging directory
//! inside the root, then rename the archive's top-level directory to
//! `<root>/<version>`. The rename is the only step that makes a version
//! visible, so an interrupted install never leaves a partial version behind.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::VersionStore;
use crate::catalog::CatalogListing;
use crate::error::{IoResultExt, ManagerError, Result};
use crate::links;
use crate::version::Version;

impl VersionStore {
    /// Download and install `version` from the catalog.
    ///
    /// The first installed version becomes the active one.
    pub async fn install(&mut self, version: &Version, catalog: &CatalogListing) -> Result<()> {
        if self.installed.contains(version) {
            return Err(ManagerError::VersionAlreadyInstalled(version.to_string()));
        }
        let entry = catalog
            .get(version)
            .ok_or_else(|| ManagerError::VersionNotAvailable(version.to_string()))?;

        tracing::info!("Downloading {} from {}", version, entry.url);
        let archive = self.download(&entry.url, &entry.filename).await?;

        tracing::info!("Extracting {}", entry.filename);
        self.extract_and_relocate(archive.path(), version)?;
        archive.close().at(self.root())?;

        self.installed.insert(version.clone());
        tracing::info!("Successfully installed {}", version);

        if self.active.is_none() {
            self.activate(version)?;
        }
        Ok(())
    }

    /// Stream the archive at `url` into a temporary file inside the root
    async fn download(&self, url: &str, filename: &str) -> Result<tempfile::NamedTempFile> {
        let unavailable = |reason: String| ManagerError::CatalogUnavailable {
            url: url.to_string(),
            reason,
        };

        let timeout = Duration::from_secs(self.config.download_timeout_secs);
        let client = reqwest::Client::builder()
            .user_agent(concat!("webots-manager/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|e| unavailable(format!("failed to create HTTP client: {e}")))?;

        let mut response = client
            .get(url)
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(unavailable(format!("download failed: HTTP {}", response.status())));
        }

        let root = self.root();
        let mut file = tempfile::Builder::new()
            .prefix(".download-")
            .suffix(&suffix_of(filename))
            .tempfile_in(root)
            .at(root)?;

        let mut written: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| unavailable(format!("download interrupted: {e}")))?
        {
            file.write_all(&chunk).at(file.path())?;
            written += chunk.len() as u64;
        }
        file.flush().at(file.path())?;

        tracing::debug!("Downloaded {} bytes to {}", written, file.path().display());
        Ok(file)
    }

    /// Extract into a staging directory and move the release into place
    fn extract_and_relocate(&self, archive: &Path, version: &Version) -> Result<()> {
        let root = self.root();
        let staging = tempfile::Builder::new()
            .prefix(".extract-")
            .tempdir_in(root)
            .at(root)?;

        self.extractor.extract(archive, staging.path())?;

        let top = self.locate_release(staging.path(), archive)?;
        let dest = self.version_dir(version);
        if links::occupant(&dest).at(&dest)? != links::Occupant::Nothing {
            return Err(ManagerError::VersionAlreadyInstalled(version.to_string()));
        }

        std::fs::rename(&top, &dest).at(&dest)?;
        tracing::debug!("Moved {} to {}", top.display(), dest.display());

        staging.close().at(root)?;
        Ok(())
    }

    /// Find the release directory inside the staging area.
    ///
    /// Prefers the configured archive root; an archive with a single
    /// top-level directory of another name is accepted as well.
    fn locate_release(&self, staging: &Path, archive: &Path) -> Result<PathBuf> {
        let expected = staging.join(&self.config.archive_root);
        if expected.is_dir() {
            return Ok(expected);
        }

        let entries = std::fs::read_dir(staging)
            .at(staging)?
            .collect::<std::io::Result<Vec<_>>>()
            .at(staging)?;

        match entries.as_slice() {
            [only] if only.path().is_dir() => {
                tracing::debug!(
                    "Archive root is '{}' instead of '{}'",
                    only.file_name().to_string_lossy(),
                    self.config.archive_root
                );
                Ok(only.path())
            }
            _ => Err(ManagerError::ArchiveExtractionFailed {
                archive: archive.to_path_buf(),
                reason: format!(
                    "expected a top-level '{}' directory, found {} entries",
                    self.config.archive_root,
                    entries.len()
                ),
            }),
        }
    }
}

/// Archive suffix of a filename (`.tar.gz` for `webots-2023a-x86-64.tar.gz`)
fn suffix_of(filename: &str) -> String {
    for known in [".tar.gz", ".tar.bz2", ".tar.xz", ".tgz", ".tar"] {
        if filename.ends_with(known) {
            return known.to_string();
        }
    }
    Path::new(filename)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}
