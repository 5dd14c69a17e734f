//! Manager configuration
//!
//! Built once by the caller and handed to every component by reference.
//! Defaults depend on the host OS; a YAML file can override any field.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{ManagerError, Result};
use crate::version::Version;

/// Name of the active-version link inside the installation root
pub const IN_USE_LINK: &str = "in_use";

/// Directory holding template blobs and their index
pub const TEMPLATES_DIR: &str = "templates";

/// Environment variable the advisory home check looks at
pub const DEFAULT_HOME_VAR: &str = "WEBOTS_HOME";

/// Listing endpoint settings
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogConfig {
    /// URL of the listing page
    pub url: String,

    /// Filename prefix, e.g. `webots` in `webots-2023a-x86-64.tar.bz2`
    pub package: String,

    /// Architecture tag used in filenames
    pub arch: String,

    /// Archive suffix including the leading dot
    pub suffix: String,

    /// Read timeout for the listing request
    pub timeout_secs: u64,

    /// Where the last listing is cached; `None` disables caching
    pub cache: Option<PathBuf>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: format!("https://cyberbotics.com/archive/{}/", os_tag()),
            package: "webots".to_string(),
            arch: arch_tag().to_string(),
            suffix: ".tar.bz2".to_string(),
            timeout_secs: 30,
            cache: default_cache_path(),
        }
    }
}

/// Configuration shared by the version store and the overlay engine
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerConfig {
    /// Installation prefix
    pub prefix: PathBuf,

    /// Installation root holding one directory per version
    pub root: PathBuf,

    /// Stable alias pointing at `<root>/in_use`
    pub alias: PathBuf,

    /// Environment variable expected to point at the alias
    pub home_var: String,

    /// Value of `home_var` captured when the config was built
    pub home: Option<PathBuf>,

    /// Top-level directory expected inside release archives
    pub archive_root: String,

    /// Read timeout for archive downloads
    pub download_timeout_secs: u64,

    pub catalog: CatalogConfig,
}

/// On-disk form: every field is optional and overlays the defaults
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    prefix: Option<PathBuf>,
    root: Option<PathBuf>,
    alias: Option<PathBuf>,
    home_var: Option<String>,
    archive_root: Option<String>,
    download_timeout_secs: Option<u64>,
    catalog: Option<CatalogFile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    url: Option<String>,
    package: Option<String>,
    arch: Option<String>,
    suffix: Option<String>,
    timeout_secs: Option<u64>,
    cache: Option<PathBuf>,
    #[serde(default)]
    no_cache: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        let prefix = default_prefix();
        Self {
            root: prefix.join("webots_manager"),
            alias: prefix.join("webots"),
            prefix,
            home_var: DEFAULT_HOME_VAR.to_string(),
            home: None,
            archive_root: "webots".to_string(),
            download_timeout_secs: 60,
            catalog: CatalogConfig::default(),
        }
    }
}

impl ManagerConfig {
    /// Build a config rooted at an explicit directory.
    ///
    /// The alias sits next to the root and caching is off, so nothing
    /// outside `root`'s parent is touched. A relative root is taken from
    /// the current directory, since link targets must be absolute.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        let prefix = root
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.clone());
        Self {
            alias: prefix.join("webots"),
            prefix,
            root,
            catalog: CatalogConfig {
                cache: None,
                ..CatalogConfig::default()
            },
            ..Self::default()
        }
    }

    /// Load configuration from `path`, or from the default config file.
    ///
    /// A missing default file yields the defaults; a missing explicit file
    /// is an error. The home variable is read from the environment once here.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (file_path, required) = match path {
            Some(p) => (Some(p.to_path_buf()), true),
            None => (default_config_path(), false),
        };

        let mut config = Self::default();

        if let Some(file_path) = file_path {
            if file_path.exists() {
                let content = std::fs::read_to_string(&file_path)
                    .map_err(|e| ManagerError::io(&file_path, e))?;
                let file: ConfigFile =
                    serde_yaml_ng::from_str(&content).map_err(|e| ManagerError::Config {
                        path: file_path.clone(),
                        reason: e.to_string(),
                    })?;
                config.apply(file);
                tracing::debug!("Loaded configuration from {}", file_path.display());
            } else if required {
                return Err(ManagerError::Config {
                    path: file_path,
                    reason: "file does not exist".to_string(),
                });
            }
        }

        config.make_absolute()?;
        config.home = std::env::var_os(&config.home_var).map(PathBuf::from);
        Ok(config)
    }

    /// Resolve relative paths against the current directory
    fn make_absolute(&mut self) -> Result<()> {
        for path in [&mut self.prefix, &mut self.root, &mut self.alias] {
            *path = std::path::absolute(&*path).map_err(|e| ManagerError::io(&*path, e))?;
        }
        if let Some(cache) = self.catalog.cache.as_mut() {
            *cache = std::path::absolute(&*cache).map_err(|e| ManagerError::io(&*cache, e))?;
        }
        Ok(())
    }

    fn apply(&mut self, file: ConfigFile) {
        if let Some(prefix) = file.prefix {
            // Paths derived from the prefix follow it unless set explicitly
            self.root = prefix.join("webots_manager");
            self.alias = prefix.join("webots");
            self.prefix = prefix;
        }
        if let Some(root) = file.root {
            self.root = root;
        }
        if let Some(alias) = file.alias {
            self.alias = alias;
        }
        if let Some(home_var) = file.home_var {
            self.home_var = home_var;
        }
        if let Some(archive_root) = file.archive_root {
            self.archive_root = archive_root;
        }
        if let Some(secs) = file.download_timeout_secs {
            self.download_timeout_secs = secs;
        }
        if let Some(catalog) = file.catalog {
            if let Some(url) = catalog.url {
                self.catalog.url = url;
            }
            if let Some(package) = catalog.package {
                self.catalog.package = package;
            }
            if let Some(arch) = catalog.arch {
                self.catalog.arch = arch;
            }
            if let Some(suffix) = catalog.suffix {
                self.catalog.suffix = suffix;
            }
            if let Some(secs) = catalog.timeout_secs {
                self.catalog.timeout_secs = secs;
            }
            if catalog.cache.is_some() {
                self.catalog.cache = catalog.cache;
            }
            if catalog.no_cache {
                self.catalog.cache = None;
            }
        }
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.root.join(TEMPLATES_DIR)
    }

    pub fn in_use_link(&self) -> PathBuf {
        self.root.join(IN_USE_LINK)
    }

    pub fn version_dir(&self, version: &Version) -> PathBuf {
        self.root.join(version.as_str())
    }
}

fn default_prefix() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from("C:/Program Files")
    } else {
        PathBuf::from("/usr/local")
    }
}

fn os_tag() -> &'static str {
    match std::env::consts::OS {
        "macos" => "mac",
        "windows" => "windows",
        _ => "linux",
    }
}

fn arch_tag() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "x86-64",
        "x86" => "i386",
        other => other,
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("org", "webots", "webots-manager")
}

fn default_config_path() -> Option<PathBuf> {
    project_dirs()
        .map(|dirs| dirs.config_dir().to_path_buf())
        .or_else(|| dirs::config_dir().map(|d| d.join("webots-manager")))
        .map(|dir| dir.join("config.yaml"))
}

fn default_cache_path() -> Option<PathBuf> {
    project_dirs()
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .or_else(|| dirs::cache_dir().map(|d| d.join("webots-manager")))
        .map(|dir| dir.join("catalog.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_with_root_derives_paths() {
        let config = ManagerConfig::with_root("/opt/wm/root");
        assert_eq!(config.alias, PathBuf::from("/opt/wm/webots"));
        assert_eq!(config.templates_dir(), PathBuf::from("/opt/wm/root/templates"));
        assert_eq!(config.in_use_link(), PathBuf::from("/opt/wm/root/in_use"));
        assert!(config.catalog.cache.is_none());
        assert_eq!(config.catalog.suffix, ".tar.bz2");
    }

    #[test]
    fn test_relative_root_is_made_absolute() {
        let cwd = std::env::current_dir().unwrap();
        let config = ManagerConfig::with_root("data/webots_manager");
        assert_eq!(config.root, cwd.join("data/webots_manager"));
        assert_eq!(config.alias, cwd.join("data/webots"));
        assert!(config.in_use_link().is_absolute());
        assert!(config.templates_dir().is_absolute());
    }

    #[test]
    fn test_load_makes_relative_paths_absolute() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(&path, "prefix: local
alias: bin/webots
").unwrap();

        let cwd = std::env::current_dir().unwrap();
        let config = ManagerConfig::load(Some(&path)).unwrap();
        assert_eq!(config.root, cwd.join("local/webots_manager"));
        assert_eq!(config.alias, cwd.join("bin/webots"));
    }

    #[test]
    fn test_version_dir() {
        let config = ManagerConfig::with_root("/opt/wm/root");
        let v = Version::parse("2023a").unwrap();
        assert_eq!(config.version_dir(&v), PathBuf::from("/opt/wm/root/2023a"));
    }

    #[test]
    fn test_load_overlays_file_on_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
prefix: /srv
catalog:
  suffix: .tar
  no_cache: true
"#,
        )
        .unwrap();

        let config = ManagerConfig::load(Some(&path)).unwrap();
        assert_eq!(config.root, PathBuf::from("/srv/webots_manager"));
        assert_eq!(config.alias, PathBuf::from("/srv/webots"));
        assert_eq!(config.catalog.suffix, ".tar");
        assert_eq!(config.catalog.package, "webots");
        assert!(config.catalog.cache.is_none());
    }

    #[test]
    fn test_explicit_root_wins_over_prefix() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(&path, "prefix: /srv\nroot: /data/wm\n").unwrap();

        let config = ManagerConfig::load(Some(&path)).unwrap();
        assert_eq!(config.root, PathBuf::from("/data/wm"));
        assert_eq!(config.alias, PathBuf::from("/srv/webots"));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = ManagerConfig::load(Some(&temp_dir.path().join("absent.yaml")));
        assert!(matches!(result, Err(ManagerError::Config { .. })));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(&path, "instal_root: /typo\n").unwrap();
        assert!(ManagerConfig::load(Some(&path)).is_err());
    }
}
