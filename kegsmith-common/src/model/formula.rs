// kegsmith-common/src/model/formula.rs
// A formula is a declarative recipe: where the source lives, what it needs
// from the host, which resources go into its runtime and how it is checked.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use super::checksum::validate_sha256;
use super::requirement::RuntimeRequirement;
use super::resource::{url_file_name, ResourceSpec};
use super::steps::{validate_relative_path, InstallPlan, InstallStep, TestAssertion};
use super::template::{self, TemplateVars};
use crate::error::{KegError, Result};

/// Development checkout location. Recorded for information only; never fetched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeadSpec {
    pub url: String,
    #[serde(default)]
    pub branch: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Formula {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,

    /// Source archive URL.
    pub url: String,
    /// SHA256 checksum for the source archive.
    #[serde(default)]
    pub sha256: String,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub head: Option<HeadSpec>,

    /// Host runtimes the formula needs, e.g. `python@3.11`. Ordered, not resolved.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
    #[serde(default)]
    pub install: Vec<InstallStep>,
    #[serde(default)]
    pub post_install: Vec<String>,
    #[serde(default)]
    pub caveats: Option<String>,
    #[serde(default)]
    pub test: Vec<TestAssertion>,
}

impl Formula {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version_str(&self) -> &str {
        &self.version
    }

    pub fn source_url(&self) -> &str {
        &self.url
    }

    pub fn source_sha256(&self) -> &str {
        &self.sha256
    }

    pub fn source_file_name(&self) -> String {
        url_file_name(&self.url).unwrap_or_else(|| format!("{}-{}-source", self.name, self.version))
    }

    pub fn resources(&self) -> &[ResourceSpec] {
        &self.resources
    }

    pub fn runtime_requirements(&self) -> Result<Vec<RuntimeRequirement>> {
        self.dependencies
            .iter()
            .map(|d| RuntimeRequirement::parse(d))
            .collect()
    }

    pub fn install_plan(&self) -> Result<InstallPlan> {
        InstallPlan::from_steps(&self.install, &self.runtime_requirements()?)
    }

    /// Checks everything that can be checked without touching the network or disk.
    ///
    /// Any problem here is a configuration error; nothing about the formula is
    /// repaired or skipped.
    pub fn validate(&self) -> Result<()> {
        validate_formula_name(&self.name)?;
        if self.version.trim().is_empty()
            || self.version.contains('/')
            || matches!(self.version.as_str(), "." | "..")
        {
            return Err(KegError::Config(format!(
                "formula '{}': invalid version '{}'",
                self.name, self.version
            )));
        }

        validate_artifact_url(&format!("formula '{}' source", self.name), &self.url)?;
        validate_sha256(&format!("formula '{}' source", self.name), &self.sha256)?;

        let mut seen = HashSet::new();
        for resource in &self.resources {
            let owner = format!("resource '{}'", resource.name);
            if resource.name.trim().is_empty() {
                return Err(KegError::Config(format!(
                    "formula '{}': resource with empty name",
                    self.name
                )));
            }
            if !seen.insert(resource.name.as_str()) {
                return Err(KegError::Config(format!(
                    "formula '{}': resource '{}' is declared more than once",
                    self.name, resource.name
                )));
            }
            validate_artifact_url(&owner, &resource.url)?;
            validate_sha256(&owner, &resource.sha256)?;
        }

        let plan = self.install_plan()?;
        if plan.install_resources && self.resources.is_empty() {
            return Err(KegError::Config(format!(
                "formula '{}': 'install_resources' step but no resources declared",
                self.name
            )));
        }
        if !plan.install_resources && !self.resources.is_empty() {
            return Err(KegError::Config(format!(
                "formula '{}': resources declared but no 'install_resources' step",
                self.name
            )));
        }

        for line in &self.post_install {
            template::check(line)?;
        }
        if let Some(caveats) = &self.caveats {
            template::check(caveats)?;
        }
        for assertion in &self.test {
            match assertion {
                TestAssertion::FileExists { path } => {
                    validate_relative_path(&format!("test '{assertion}'"), path)?
                }
                TestAssertion::Importable { module } => validate_module_name(module)?,
            }
        }
        Ok(())
    }

    /// Template variables for a keg of this formula at `prefix`.
    pub fn template_vars<'a>(
        &'a self,
        prefix: &'a Path,
        libexec: &'a Path,
        bin: &'a Path,
    ) -> TemplateVars<'a> {
        TemplateVars {
            name: &self.name,
            version: &self.version,
            prefix,
            libexec,
            bin,
        }
    }

    pub fn libexec_path(prefix: &Path) -> PathBuf {
        prefix.join("libexec")
    }
}

fn validate_formula_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    let rest_ok = chars.all(|c| {
        c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.' | '+')
    });
    if first_ok && rest_ok {
        Ok(())
    } else {
        Err(KegError::Config(format!("invalid formula name '{name}'")))
    }
}

fn validate_module_name(module: &str) -> Result<()> {
    let ok = !module.is_empty()
        && module.split('.').all(|part| {
            !part.is_empty()
                && !part.starts_with(|c: char| c.is_ascii_digit())
                && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if ok {
        Ok(())
    } else {
        Err(KegError::Config(format!(
            "test: '{module}' is not a valid module name"
        )))
    }
}

/// Artifacts may only come from https:// or local file:// URLs.
pub fn validate_artifact_url(owner: &str, url_str: &str) -> Result<Url> {
    let url = Url::parse(url_str)
        .map_err(|e| KegError::Config(format!("{owner}: invalid URL '{url_str}': {e}")))?;
    match url.scheme() {
        "https" | "file" => Ok(url),
        other => Err(KegError::Config(format!(
            "{owner}: URL '{url_str}' must use https or file, not '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(c: char) -> String {
        std::iter::repeat(c).take(64).collect()
    }

    fn founder_os() -> Formula {
        serde_json::from_value(serde_json::json!({
            "name": "founder-os",
            "version": "1.0.0",
            "desc": "Personal operating system",
            "url": "https://github.com/example/Founder-OS/archive/refs/tags/v1.0.0.tar.gz",
            "sha256": digest('a'),
            "license": "MIT",
            "dependencies": ["python@3.11"],
            "resources": [
                {"name": "google-auth", "url": "https://files.example/google-auth-2.28.0.tar.gz", "sha256": digest('b')},
                {"name": "google-auth-oauthlib", "url": "https://files.example/google-auth-oauthlib-1.2.0.tar.gz", "sha256": digest('c')},
            ],
            "install": [
                {"step": "create_runtime"},
                {"step": "install_resources"},
                {"step": "install_files"},
                {"step": "write_launcher", "name": "founder-os-setup", "entry_point": "setup.py"},
            ],
            "post_install": ["Founder OS installed!", "  cd {prefix} && claude"],
            "caveats": "To start:\n  cd {prefix} && claude\n",
            "test": [
                {"assert": "importable", "module": "google.auth"},
                {"assert": "file_exists", "path": "setup.py"},
            ],
        }))
        .unwrap()
    }

    #[test]
    fn valid_formula_passes() {
        let formula = founder_os();
        formula.validate().unwrap();
        assert_eq!(formula.source_file_name(), "v1.0.0.tar.gz");
        assert_eq!(formula.install_plan().unwrap().launchers[0].name, "founder-os-setup");
    }

    #[test]
    fn placeholder_resource_checksum_names_the_resource() {
        let mut formula = founder_os();
        formula.resources[1].sha256 = "PLACEHOLDER".to_string();
        match formula.validate().unwrap_err() {
            KegError::Config(msg) => assert!(msg.contains("google-auth-oauthlib"), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_source_checksum_is_rejected() {
        let mut formula = founder_os();
        formula.sha256.clear();
        assert!(matches!(formula.validate(), Err(KegError::Config(_))));
    }

    #[test]
    fn plain_http_is_rejected() {
        let mut formula = founder_os();
        formula.resources[0].url = "http://files.example/google-auth.tar.gz".to_string();
        assert!(matches!(formula.validate(), Err(KegError::Config(_))));
    }

    #[test]
    fn duplicate_resources_are_rejected() {
        let mut formula = founder_os();
        let dup = formula.resources[0].clone();
        formula.resources.push(dup);
        assert!(matches!(formula.validate(), Err(KegError::Config(_))));
    }

    #[test]
    fn resources_without_install_step_are_rejected() {
        let mut formula = founder_os();
        formula
            .install
            .retain(|s| *s != InstallStep::InstallResources);
        assert!(matches!(formula.validate(), Err(KegError::Config(_))));
    }

    #[test]
    fn unknown_caveat_placeholder_is_rejected() {
        let mut formula = founder_os();
        formula.caveats = Some("cd {home}".to_string());
        assert!(matches!(formula.validate(), Err(KegError::Config(_))));
    }

    #[test]
    fn bad_names_are_rejected() {
        let mut formula = founder_os();
        formula.name = "../etc".to_string();
        assert!(formula.validate().is_err());
        let mut formula = founder_os();
        formula.version = "1.0/2".to_string();
        assert!(formula.validate().is_err());
    }
}
