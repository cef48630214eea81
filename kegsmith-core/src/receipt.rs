// kegsmith-core/src/receipt.rs
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use kegsmith_common::error::{KegError, Result};
use kegsmith_common::keg::{InstalledKeg, KEG_METADATA_DIR, RECEIPT_FILENAME};
use kegsmith_common::model::Formula;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptResource {
    pub name: String,
    pub url: String,
    pub sha256: String,
}

/// Its presence marks the keg complete. Removed again if a launcher cannot be
/// written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReceipt {
    pub name: String,
    pub version: String,
    pub installed_at: DateTime<Utc>,
    pub installer_version: String,
    pub source_url: String,
    pub source_sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<PathBuf>,
    #[serde(default)]
    pub resources: Vec<ReceiptResource>,
    #[serde(default)]
    pub launchers: Vec<PathBuf>,
}

impl InstallReceipt {
    pub fn new(formula: &Formula) -> Self {
        Self {
            name: formula.name().to_string(),
            version: formula.version_str().to_string(),
            installed_at: Utc::now(),
            installer_version: env!("CARGO_PKG_VERSION").to_string(),
            source_url: formula.source_url().to_string(),
            source_sha256: formula.source_sha256().to_lowercase(),
            runtime: None,
            interpreter: None,
            resources: formula
                .resources()
                .iter()
                .map(|r| ReceiptResource {
                    name: r.name.clone(),
                    url: r.url.clone(),
                    sha256: r.sha256.to_lowercase(),
                })
                .collect(),
            launchers: Vec::new(),
        }
    }

    pub fn path_in(prefix: &Path) -> PathBuf {
        prefix.join(RECEIPT_FILENAME)
    }

    pub fn read(prefix: &Path) -> Result<Option<Self>> {
        let path = Self::path_in(prefix);
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn read_keg(keg: &InstalledKeg) -> Result<Self> {
        Self::read(&keg.path)?.ok_or_else(|| KegError::NotInstalled(keg.name.clone()))
    }

    pub fn write(&self, prefix: &Path) -> Result<()> {
        let path = Self::path_in(prefix);
        debug!("Writing install receipt: {}", path.display());
        let json = serde_json::to_vec_pretty(self)?;
        write_atomically(&path, &json)
    }
}

/// Stores the formula next to the receipt so lifecycle hooks can run later
/// without the original formula file.
pub fn write_formula_snapshot(prefix: &Path, formula: &Formula) -> Result<PathBuf> {
    let dir = prefix.join(KEG_METADATA_DIR);
    fs::create_dir_all(&dir).map_err(|e| KegError::WriteFailure {
        path: dir.clone(),
        reason: e.to_string(),
    })?;
    let path = dir.join(format!("{}.json", formula.name()));
    let json = serde_json::to_vec_pretty(formula)?;
    write_atomically(&path, &json)?;
    Ok(path)
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let failure = |reason: String| KegError::WriteFailure {
        path: path.to_path_buf(),
        reason,
    };
    let dir = path
        .parent()
        .ok_or_else(|| failure("path has no parent directory".to_string()))?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| failure(e.to_string()))?;
    tmp.write_all(bytes).map_err(|e| failure(e.to_string()))?;
    tmp.persist(path).map_err(|e| failure(e.error.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_formula;

    #[test]
    fn receipt_written_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let formula = sample_formula(&[("google-auth", b"a".as_slice())], b"src");
        let mut receipt = InstallReceipt::new(&formula);
        receipt.launchers.push(dir.path().join("bin/founder-os"));
        receipt.write(dir.path()).unwrap();

        let loaded = InstallReceipt::read(dir.path()).unwrap().unwrap();
        assert_eq!(loaded, receipt);
        assert_eq!(loaded.resources[0].name, "google-auth");
    }

    #[test]
    fn missing_receipt_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(InstallReceipt::read(dir.path()).unwrap().is_none());
    }
}
