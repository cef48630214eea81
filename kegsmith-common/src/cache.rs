// kegsmith-common/src/cache.rs
// Transient download cache. Entries are only ever written after verification,
// and are re-verified by the caller before reuse.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::error::{KegError, Result};
use crate::Config;

/// Cache struct to manage cache operations
#[derive(Debug, Clone)]
pub struct Cache {
    cache_dir: PathBuf,
}

impl Cache {
    /// Create a new Cache using the config's downloads dir
    pub fn new(config: &Config) -> Result<Self> {
        Self::at(config.downloads_dir())
    }

    pub fn at(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let cache_dir = cache_dir.into();
        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir).map_err(|e| {
                KegError::Cache(format!(
                    "Failed to create cache directory {}: {e}",
                    cache_dir.display()
                ))
            })?;
        }
        Ok(Self { cache_dir })
    }

    /// Cache file for an artifact, namespaced by the thing it belongs to.
    pub fn entry_path(&self, subject: &str, file_name: &str) -> PathBuf {
        self.cache_dir.join(format!("{subject}--{file_name}"))
    }

    /// Reads an entry if present.
    pub fn load(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(bytes) => {
                tracing::debug!("Loaded {} bytes from cache file {}", bytes.len(), path.display());
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(KegError::Cache(format!(
                "Failed to read cache file {}: {e}",
                path.display()
            ))),
        }
    }

    /// Writes an entry through a temp file so readers never see partial data.
    pub fn store(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        tracing::debug!("Saving {} bytes to cache file {}", bytes.len(), path.display());
        let mut tmp = NamedTempFile::new_in(&self.cache_dir).map_err(|e| {
            KegError::Cache(format!(
                "Failed to create temp file in {}: {e}",
                self.cache_dir.display()
            ))
        })?;
        tmp.write_all(bytes)
            .map_err(|e| KegError::Cache(format!("Failed to write cache temp file: {e}")))?;
        tmp.persist(path).map_err(|e| {
            KegError::Cache(format!(
                "Failed to move cache file into place at {}: {}",
                path.display(),
                e.error
            ))
        })?;
        Ok(())
    }

    /// Clears a specific cache file
    pub fn remove(&self, path: &Path) -> Result<()> {
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::at(dir.path().join("downloads")).unwrap();
        let path = cache.entry_path("google-auth", "google-auth-2.28.0.tar.gz");
        assert_eq!(cache.load(&path).unwrap(), None);

        cache.store(&path, b"archive").unwrap();
        assert_eq!(cache.load(&path).unwrap().as_deref(), Some(&b"archive"[..]));

        cache.remove(&path).unwrap();
        assert_eq!(cache.load(&path).unwrap(), None);
    }
}
