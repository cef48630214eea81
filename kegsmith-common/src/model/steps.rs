// kegsmith-common/src/model/steps.rs
use std::fmt;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use super::requirement::RuntimeRequirement;
use crate::error::{KegError, Result};

/// One declarative step of a formula's install procedure.
///
/// Steps only describe what the install needs; the installer decides the
/// order in which the work actually happens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum InstallStep {
    CreateRuntime {
        #[serde(default)]
        runtime: Option<String>,
    },
    InstallResources,
    InstallFiles,
    WriteLauncher {
        name: String,
        entry_point: String,
    },
}

/// A post-install check run inside the isolated runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "assert", rename_all = "snake_case")]
pub enum TestAssertion {
    Importable { module: String },
    FileExists { path: String },
}

impl fmt::Display for TestAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestAssertion::Importable { module } => write!(f, "import {module}"),
            TestAssertion::FileExists { path } => write!(f, "{path} exists"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherSpec {
    pub name: String,
    pub entry_point: String,
}

/// The validated, order-independent reading of a formula's install steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallPlan {
    pub runtime: Option<RuntimeRequirement>,
    pub install_resources: bool,
    pub install_files: bool,
    pub launchers: Vec<LauncherSpec>,
}

impl InstallPlan {
    /// Builds the plan, resolving a bare `create_runtime` to the first declared
    /// dependency.
    pub fn from_steps(steps: &[InstallStep], dependencies: &[RuntimeRequirement]) -> Result<Self> {
        let mut plan = InstallPlan::default();
        for step in steps {
            match step {
                InstallStep::CreateRuntime { runtime } => {
                    if plan.runtime.is_some() {
                        return Err(KegError::Config(
                            "install: 'create_runtime' appears more than once".to_string(),
                        ));
                    }
                    let requirement = match runtime {
                        Some(raw) => RuntimeRequirement::parse(raw)?,
                        None => dependencies.first().cloned().ok_or_else(|| {
                            KegError::Config(
                                "install: 'create_runtime' has no runtime and the formula declares no dependencies".to_string(),
                            )
                        })?,
                    };
                    plan.runtime = Some(requirement);
                }
                InstallStep::InstallResources => {
                    if plan.runtime.is_none() {
                        return Err(KegError::Config(
                            "install: 'install_resources' must come after 'create_runtime'"
                                .to_string(),
                        ));
                    }
                    plan.install_resources = true;
                }
                InstallStep::InstallFiles => plan.install_files = true,
                InstallStep::WriteLauncher { name, entry_point } => {
                    validate_launcher_name(name)?;
                    validate_relative_path(&format!("launcher '{name}' entry point"), entry_point)?;
                    if plan.launchers.iter().any(|l| &l.name == name) {
                        return Err(KegError::Config(format!(
                            "install: launcher '{name}' is declared more than once"
                        )));
                    }
                    plan.launchers.push(LauncherSpec {
                        name: name.clone(),
                        entry_point: entry_point.clone(),
                    });
                }
            }
        }
        if !plan.launchers.is_empty() && (plan.runtime.is_none() || !plan.install_files) {
            return Err(KegError::Config(
                "install: 'write_launcher' requires both 'create_runtime' and 'install_files'"
                    .to_string(),
            ));
        }
        Ok(plan)
    }
}

fn validate_launcher_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(KegError::Config(format!("install: invalid launcher name '{name}'")))
    }
}

/// Paths inside the prefix must stay inside the prefix.
pub fn validate_relative_path(what: &str, path: &str) -> Result<()> {
    let p = Path::new(path);
    let escapes = p
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if path.is_empty() || escapes {
        return Err(KegError::Config(format!(
            "{what}: '{path}' must be a relative path inside the prefix"
        )));
    }
    Ok(())
}
