// kegsmith-core/src/runtime.rs
use std::ffi::OsStr;
use std::future::Future;
use std::path::{Path, PathBuf};

use kegsmith_common::config::Config;
use kegsmith_common::error::{KegError, Result};
use kegsmith_common::model::requirement::parse_lenient_version;
use kegsmith_common::model::{Formula, ResourceSpec, RuntimeRequirement};
use tracing::{debug, info, instrument, warn};

use crate::env::IsolatedEnv;
use crate::process::run_isolated;

const VERSION_PROBE: &str = "import sys; print('%d.%d.%d' % sys.version_info[:3])";

/// An interpreter environment owned by exactly one keg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeHandle {
    /// `<prefix>/libexec`
    pub root: PathBuf,
    pub interpreter: PathBuf,
}

impl RuntimeHandle {
    pub fn for_libexec(root: PathBuf) -> Self {
        let interpreter = root.join("bin").join("python3");
        Self { root, interpreter }
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }
}

/// Provisions isolated runtimes and installs packages into them.
pub trait RuntimeProvider: Send + Sync {
    /// Creates a fresh runtime at `<prefix>/libexec`.
    fn create_runtime(
        &self,
        prefix: &Path,
        requirement: &RuntimeRequirement,
    ) -> impl Future<Output = Result<RuntimeHandle>> + Send;

    /// Installs one already-verified resource archive into `runtime`.
    fn install_resource(
        &self,
        runtime: &RuntimeHandle,
        resource: &ResourceSpec,
        archive: &Path,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Whether `module` can be imported inside `runtime`.
    fn check_import(
        &self,
        runtime: &RuntimeHandle,
        module: &str,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Re-opens the runtime of an installed keg without recreating it.
    fn open_runtime(&self, prefix: &Path) -> Result<RuntimeHandle> {
        let handle = RuntimeHandle::for_libexec(Formula::libexec_path(prefix));
        if handle.interpreter.exists() {
            Ok(handle)
        } else {
            Err(KegError::RuntimeUnavailable {
                runtime: handle.interpreter.display().to_string(),
                hint: "the keg's runtime is missing; reinstall the formula".to_string(),
            })
        }
    }
}

/// Python runtimes built with `python -m venv` from a base interpreter found
/// on a fixed search path.
#[derive(Debug, Clone)]
pub struct PythonVenvProvider {
    env: IsolatedEnv,
    scratch_home: PathBuf,
}

impl PythonVenvProvider {
    pub fn new(config: &Config) -> Self {
        let scratch_home = config.tmp_dir().join("home");
        Self {
            env: IsolatedEnv::new(&config.bin_dir(), &scratch_home),
            scratch_home,
        }
    }

    fn env_for(&self, runtime: &RuntimeHandle) -> IsolatedEnv {
        let mut env = self.env.clone();
        env.prepend_path(&runtime.bin_dir());
        env.set_var("VIRTUAL_ENV", runtime.root.to_string_lossy());
        env
    }

    async fn ensure_scratch_home(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.scratch_home)
            .await
            .map_err(|e| KegError::WriteFailure {
                path: self.scratch_home.clone(),
                reason: e.to_string(),
            })
    }

    /// Finds a base interpreter satisfying `requirement`: the exact
    /// `python<major>.<minor>` first, then a new-enough `python3`.
    #[instrument(skip(self), fields(runtime = %requirement))]
    pub async fn find_base_interpreter(
        &self,
        requirement: &RuntimeRequirement,
    ) -> Result<PathBuf> {
        if requirement.language != "python" {
            return Err(KegError::RuntimeUnavailable {
                runtime: requirement.to_string(),
                hint: format!(
                    "only python runtimes can be provisioned, not '{}'",
                    requirement.language
                ),
            });
        }
        self.ensure_scratch_home().await?;

        let search_path = self.env.get_path_string().unwrap_or_default().to_string();
        for candidate in requirement.interpreter_candidates() {
            let Ok(path) = which::which_in(&candidate, Some(&search_path), &self.scratch_home)
            else {
                debug!("'{}' not found on {}", candidate, search_path);
                continue;
            };
            match self.probe_version(&path).await {
                Ok(found) if requirement.is_satisfied_by(&found) => {
                    debug!("Using base interpreter {} ({})", path.display(), found);
                    return Ok(path);
                }
                Ok(found) => debug!(
                    "Skipping {}: version {} does not satisfy {}",
                    path.display(),
                    found,
                    requirement
                ),
                Err(e) => warn!("Could not query {}: {}", path.display(), e),
            }
        }

        let searched = self
            .env
            .path_dirs()
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Err(KegError::RuntimeUnavailable {
            runtime: requirement.to_string(),
            hint: format!(
                "install Python {} so that python{} is available in one of: {}",
                requirement.version_str(),
                requirement.major_minor(),
                searched
            ),
        })
    }

    async fn probe_version(&self, interpreter: &Path) -> Result<semver::Version> {
        let output = run_isolated(
            interpreter,
            ["-c", VERSION_PROBE],
            &self.scratch_home,
            &self.env,
        )
        .await?;
        parse_lenient_version(String::from_utf8_lossy(&output.stdout).trim())
    }
}

impl RuntimeProvider for PythonVenvProvider {
    #[instrument(skip(self), fields(prefix = %prefix.display(), runtime = %requirement))]
    async fn create_runtime(
        &self,
        prefix: &Path,
        requirement: &RuntimeRequirement,
    ) -> Result<RuntimeHandle> {
        let base = self.find_base_interpreter(requirement).await?;
        let libexec = Formula::libexec_path(prefix);
        tokio::fs::create_dir_all(prefix)
            .await
            .map_err(|e| KegError::WriteFailure {
                path: prefix.to_path_buf(),
                reason: e.to_string(),
            })?;

        run_isolated(
            &base,
            [
                OsStr::new("-m"),
                OsStr::new("venv"),
                OsStr::new("--clear"),
                libexec.as_os_str(),
            ],
            prefix,
            &self.env,
        )
        .await?;

        let handle = RuntimeHandle::for_libexec(libexec);
        if !handle.interpreter.exists() {
            return Err(KegError::WriteFailure {
                path: handle.interpreter.clone(),
                reason: "venv did not produce an interpreter".to_string(),
            });
        }
        info!("Created isolated runtime at {}", handle.root.display());
        Ok(handle)
    }

    #[instrument(skip(self, runtime), fields(resource = %resource.name))]
    async fn install_resource(
        &self,
        runtime: &RuntimeHandle,
        resource: &ResourceSpec,
        archive: &Path,
    ) -> Result<()> {
        let cwd = archive.parent().unwrap_or(&runtime.root);
        run_isolated(
            &runtime.interpreter,
            [
                OsStr::new("-m"),
                OsStr::new("pip"),
                OsStr::new("install"),
                OsStr::new("--no-deps"),
                OsStr::new("--ignore-installed"),
                archive.as_os_str(),
            ],
            cwd,
            &self.env_for(runtime),
        )
        .await?;
        debug!(
            "Installed resource '{}' into {}",
            resource.name,
            runtime.root.display()
        );
        Ok(())
    }

    async fn check_import(&self, runtime: &RuntimeHandle, module: &str) -> Result<bool> {
        self.ensure_scratch_home().await?;
        let script = format!("import {module}");
        match run_isolated(
            &runtime.interpreter,
            ["-c", script.as_str()],
            &self.scratch_home,
            &self.env_for(runtime),
        )
        .await
        {
            Ok(_) => Ok(true),
            Err(KegError::CommandFailed { stderr, .. }) => {
                debug!("import {} failed: {}", module, stderr);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
