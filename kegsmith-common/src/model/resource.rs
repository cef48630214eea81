use serde::{Deserialize, Serialize};

/// A pinned artifact installed into the formula's isolated runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceSpec {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub sha256: String,
}

impl ResourceSpec {
    pub fn new(name: impl Into<String>, url: impl Into<String>, sha256: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            sha256: sha256.into(),
        }
    }

    /// Last path segment of the URL, used to name the staged archive.
    pub fn file_name(&self) -> String {
        url_file_name(&self.url).unwrap_or_else(|| format!("{}-download", self.name))
    }
}

pub(crate) fn url_file_name(url: &str) -> Option<String> {
    url.split(['?', '#'])
        .next()
        .and_then(|u| u.trim_end_matches('/').rsplit('/').next())
        .filter(|s| !s.is_empty() && !s.contains(':'))
        .map(|s| s.to_string())
}
