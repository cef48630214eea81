// kegsmith-common/src/config.rs
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use super::error::{KegError, Result};

// Fallback if KEGSMITH_ROOT is not set or is empty.
const DEFAULT_FALLBACK_ROOT: &str = "/opt/kegsmith";
const ROOT_ENV_VAR: &str = "KEGSMITH_ROOT";
const CONFIG_FILE_RELATIVE: &str = "etc/kegsmith.toml";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct Config {
    pub root: PathBuf,
    pub connect_timeout: Duration,
    pub fetch_timeout: Duration,
}

/// On-disk overrides read from `<root>/etc/kegsmith.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileOverrides {
    #[serde(default, with = "humantime_serde_opt")]
    connect_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde_opt")]
    fetch_timeout: Option<Duration>,
}

mod humantime_serde_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

impl Config {
    /// Loads the configuration used by the command line front end.
    ///
    /// The install root comes from `KEGSMITH_ROOT` (falling back to
    /// `/opt/kegsmith`); timeouts may be overridden in `<root>/etc/kegsmith.toml`.
    pub fn load() -> Result<Self> {
        debug!("Loading kegsmith configuration");

        let root_str = env::var(ROOT_ENV_VAR)
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| {
                debug!(
                    "{} not set or empty, falling back to default: {}",
                    ROOT_ENV_VAR, DEFAULT_FALLBACK_ROOT
                );
                DEFAULT_FALLBACK_ROOT.to_string()
            });

        let config = Self::with_root(PathBuf::from(root_str)).apply_file_overrides()?;
        debug!("Effective root set to: {}", config.root.display());
        Ok(config)
    }

    /// Builds a configuration rooted at `root` with default timeouts, without
    /// looking at the environment or any config file.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    fn apply_file_overrides(mut self) -> Result<Self> {
        let path = self.config_file_path();
        if !path.is_file() {
            return Ok(self);
        }
        debug!("Reading configuration overrides from {}", path.display());
        let raw = fs::read_to_string(&path)?;
        let overrides: FileOverrides = toml::from_str(&raw).map_err(|e| {
            KegError::Config(format!("Invalid config file {}: {e}", path.display()))
        })?;

        if let Some(timeout) = overrides.connect_timeout {
            self.connect_timeout = timeout;
        }
        if let Some(timeout) = overrides.fetch_timeout {
            self.fetch_timeout = timeout;
        }
        if self.connect_timeout.is_zero() || self.fetch_timeout.is_zero() {
            return Err(KegError::Config(format!(
                "Timeouts in {} must be greater than zero",
                path.display()
            )));
        }
        Ok(self)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_RELATIVE)
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    pub fn cellar_dir(&self) -> PathBuf {
        self.root.join("Cellar")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("kegsmith_cache")
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.cache_dir().join("downloads")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("kegsmith_logs")
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    pub fn formula_cellar_dir(&self, formula_name: &str) -> PathBuf {
        self.cellar_dir().join(formula_name)
    }

    pub fn formula_keg_path(&self, formula_name: &str, version_str: &str) -> PathBuf {
        self.formula_cellar_dir(formula_name).join(version_str)
    }

    pub fn launcher_path(&self, launcher_name: &str) -> PathBuf {
        self.bin_dir().join(launcher_name)
    }
}
