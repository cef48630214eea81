// kegsmith-common/src/keg.rs
use std::fs;
use std::path::PathBuf;

use tracing::{debug, warn};

use super::config::Config;
use super::error::{KegError, Result};

/// Directory inside a keg holding installer metadata.
pub const KEG_METADATA_DIR: &str = ".kegsmith";
pub const RECEIPT_FILENAME: &str = "INSTALL_RECEIPT.json";

/// Represents information about an installed package (Keg).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledKeg {
    pub name: String,
    pub version_str: String,
    pub path: PathBuf,
}

impl InstalledKeg {
    pub fn libexec_path(&self) -> PathBuf {
        self.path.join("libexec")
    }

    pub fn receipt_path(&self) -> PathBuf {
        self.path.join(RECEIPT_FILENAME)
    }

    pub fn formula_snapshot_path(&self) -> PathBuf {
        self.path
            .join(KEG_METADATA_DIR)
            .join(format!("{}.json", self.name))
    }

    /// A keg counts as installed only once its receipt has been written.
    pub fn is_complete(&self) -> bool {
        self.receipt_path().is_file()
    }
}

/// Manages querying installed packages in the Cellar.
#[derive(Debug)]
pub struct KegRegistry {
    config: Config,
}

impl KegRegistry {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// All complete kegs for `name`, sorted by version string.
    pub fn installed_versions(&self, name: &str) -> Result<Vec<InstalledKeg>> {
        let formula_dir = self.config.formula_cellar_dir(name);
        if !formula_dir.is_dir() {
            debug!(
                "[KEG_REGISTRY:{}] No cellar directory at {}",
                name,
                formula_dir.display()
            );
            return Ok(Vec::new());
        }

        let mut kegs = Vec::new();
        for entry in fs::read_dir(&formula_dir)? {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(
                        "[KEG_REGISTRY:{}] Error reading entry in {}: {}. Skipping.",
                        name,
                        formula_dir.display(),
                        e
                    );
                    continue;
                }
            };
            let path = entry.path();
            let Some(version_str) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !path.is_dir() || version_str.starts_with('.') {
                continue;
            }
            let keg = InstalledKeg {
                name: name.to_string(),
                version_str: version_str.to_string(),
                path: path.clone(),
            };
            if keg.is_complete() {
                kegs.push(keg);
            } else {
                debug!(
                    "[KEG_REGISTRY:{}] Ignoring incomplete keg at {}",
                    name,
                    path.display()
                );
            }
        }
        kegs.sort_by(|a, b| a.version_str.cmp(&b.version_str));
        Ok(kegs)
    }

    /// The latest complete keg (lexicographical by version string).
    pub fn get_installed_keg(&self, name: &str) -> Result<Option<InstalledKeg>> {
        Ok(self.installed_versions(name)?.pop())
    }

    pub fn require_installed_keg(&self, name: &str) -> Result<InstalledKeg> {
        self.get_installed_keg(name)?
            .ok_or_else(|| KegError::NotInstalled(name.to_string()))
    }

    pub fn list_installed_kegs(&self) -> Result<Vec<InstalledKeg>> {
        let cellar_dir = self.cellar_path();
        if !cellar_dir.is_dir() {
            debug!("[KEG_REGISTRY] Cellar directory not found. Returning empty list.");
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&cellar_dir)? {
            match entry {
                Ok(e) if e.path().is_dir() => {
                    if let Some(name) = e.file_name().to_str() {
                        names.push(name.to_string());
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("[KEG_REGISTRY] Error reading entry in cellar: {}. Skipping.", e),
            }
        }
        names.sort();

        let mut installed = Vec::new();
        for name in names {
            installed.extend(self.installed_versions(&name)?);
        }
        debug!("[KEG_REGISTRY] Found {} installed kegs.", installed.len());
        Ok(installed)
    }

    pub fn cellar_path(&self) -> PathBuf {
        self.config.cellar_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keg(config: &Config, name: &str, version: &str, complete: bool) {
        let path = config.formula_keg_path(name, version);
        fs::create_dir_all(&path).unwrap();
        if complete {
            fs::write(path.join(RECEIPT_FILENAME), "{}").unwrap();
        }
    }

    #[test]
    fn only_complete_kegs_are_listed() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_root(dir.path());
        make_keg(&config, "founder-os", "1.0.0", true);
        make_keg(&config, "founder-os", "1.1.0", false);
        make_keg(&config, "other", "2.0", true);

        let registry = KegRegistry::new(config);
        let kegs = registry.list_installed_kegs().unwrap();
        let ids: Vec<_> = kegs
            .iter()
            .map(|k| format!("{}@{}", k.name, k.version_str))
            .collect();
        assert_eq!(ids, vec!["founder-os@1.0.0", "other@2.0"]);

        let latest = registry.get_installed_keg("founder-os").unwrap().unwrap();
        assert_eq!(latest.version_str, "1.0.0");
    }

    #[test]
    fn missing_keg_is_not_installed_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = KegRegistry::new(Config::with_root(dir.path()));
        assert!(matches!(
            registry.require_installed_keg("nope"),
            Err(KegError::NotInstalled(_))
        ));
    }

    #[test]
    fn snapshot_lives_in_metadata_dir() {
        let keg = InstalledKeg {
            name: "founder-os".to_string(),
            version_str: "1.0.0".to_string(),
            path: PathBuf::from("/k/Cellar/founder-os/1.0.0"),
        };
        assert_eq!(
            keg.formula_snapshot_path(),
            PathBuf::from("/k/Cellar/founder-os/1.0.0/.kegsmith/founder-os.json")
        );
    }
}
