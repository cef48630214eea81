use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::error::{KegError, Result};
use super::keg::InstalledKeg;
use super::model::formula::Formula;

/// On-disk encodings a formula definition may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormulaFormat {
    Json,
    Toml,
}

impl FormulaFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(FormulaFormat::Json),
            Some("toml") => Ok(FormulaFormat::Toml),
            _ => Err(KegError::Config(format!(
                "Unsupported formula file {}: expected a .json or .toml file",
                path.display()
            ))),
        }
    }
}

/// Parses and validates a formula definition.
pub fn parse_formula(raw: &str, format: FormulaFormat) -> Result<Formula> {
    let formula: Formula = match format {
        FormulaFormat::Json => serde_json::from_str(raw)?,
        FormulaFormat::Toml => toml::from_str(raw)?,
    };
    formula.validate()?;
    Ok(formula)
}

/// Loads formula definitions, keeping parsed copies around for repeat lookups.
#[derive(Debug, Default)]
pub struct Formulary {
    parsed_cache: Mutex<HashMap<PathBuf, Arc<Formula>>>,
}

impl Formulary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_path(&self, path: &Path) -> Result<Arc<Formula>> {
        if let Some(formula) = self.cached(path)? {
            debug!("Loaded formula from parsed cache: {}", path.display());
            return Ok(formula);
        }

        let format = FormulaFormat::from_path(path)?;
        let raw = fs::read_to_string(path).map_err(|e| {
            KegError::Config(format!("Failed to read formula {}: {e}", path.display()))
        })?;
        let formula = Arc::new(parse_formula(&raw, format).map_err(|e| match e {
            KegError::Config(msg) => KegError::Config(format!("{}: {msg}", path.display())),
            other => KegError::Config(format!("{}: {other}", path.display())),
        })?);
        debug!(
            "Successfully loaded formula '{}' version {} from {}",
            formula.name,
            formula.version,
            path.display()
        );

        self.parsed_cache
            .lock()
            .map_err(|_| KegError::Generic("formulary cache lock poisoned".to_string()))?
            .insert(path.to_path_buf(), Arc::clone(&formula));
        Ok(formula)
    }

    /// Loads the formula snapshot stored alongside an installed keg.
    pub fn load_installed(&self, keg: &InstalledKeg) -> Result<Arc<Formula>> {
        let path = keg.formula_snapshot_path();
        if !path.is_file() {
            return Err(KegError::NotInstalled(format!(
                "{} {} (no formula snapshot at {})",
                keg.name,
                keg.version_str,
                path.display()
            )));
        }
        self.load_path(&path)
    }

    fn cached(&self, path: &Path) -> Result<Option<Arc<Formula>>> {
        let guard = self
            .parsed_cache
            .lock()
            .map_err(|_| KegError::Generic("formulary cache lock poisoned".to_string()))?;
        Ok(guard.get(path).cloned())
    }
}
