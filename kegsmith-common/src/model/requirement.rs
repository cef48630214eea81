// kegsmith-common/src/model/requirement.rs
use std::fmt;
use std::str::FromStr;

use semver::Version;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{KegError, Result};

/// A host runtime a formula needs, written `<language>@<version>` (e.g. `python@3.11`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuntimeRequirement {
    pub language: String,
    pub version: Version,
    raw_version: String,
}

impl RuntimeRequirement {
    pub fn parse(s: &str) -> Result<Self> {
        let (language, raw_version) = s.split_once('@').ok_or_else(|| {
            KegError::Config(format!(
                "Invalid runtime requirement '{s}': expected '<language>@<version>'"
            ))
        })?;
        if language.is_empty()
            || !language
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(KegError::Config(format!(
                "Invalid runtime language in '{s}'"
            )));
        }
        let version = parse_lenient_version(raw_version).map_err(|e| {
            KegError::Config(format!("Invalid runtime version in '{s}': {e}"))
        })?;
        Ok(Self {
            language: language.to_string(),
            version,
            raw_version: raw_version.to_string(),
        })
    }

    /// Version as written in the formula, e.g. `3.11`.
    pub fn version_str(&self) -> &str {
        &self.raw_version
    }

    pub fn major_minor(&self) -> String {
        format!("{}.{}", self.version.major, self.version.minor)
    }

    /// Whether a host interpreter reporting `found` satisfies this requirement.
    pub fn is_satisfied_by(&self, found: &Version) -> bool {
        found.major == self.version.major && *found >= self.version
    }

    /// Executable names to look for, most specific first.
    pub fn interpreter_candidates(&self) -> Vec<String> {
        vec![
            format!("{}{}", self.language, self.major_minor()),
            format!("{}{}", self.language, self.version.major),
        ]
    }
}

/// Accepts `3`, `3.11` and `3.11.4`; missing components are zero.
pub fn parse_lenient_version(s: &str) -> Result<Version> {
    let trimmed = s.trim();
    let parts: Vec<&str> = trimmed.split('.').collect();
    let padded = match parts.len() {
        1 => format!("{trimmed}.0.0"),
        2 => format!("{trimmed}.0"),
        _ => trimmed.to_string(),
    };
    Ok(Version::parse(&padded)?)
}

impl fmt::Display for RuntimeRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.language, self.raw_version)
    }
}

impl FromStr for RuntimeRequirement {
    type Err = KegError;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        RuntimeRequirement::parse(s)
    }
}

impl Serialize for RuntimeRequirement {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RuntimeRequirement {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        RuntimeRequirement::parse(&s).map_err(serde::de::Error::custom)
    }
}
