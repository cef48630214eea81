// kegsmith-core/src/install.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use kegsmith_common::cache::Cache;
use kegsmith_common::config::Config;
use kegsmith_common::error::{KegError, Result};
use kegsmith_common::keg::KegRegistry;
use kegsmith_common::model::{Formula, InstallPlan};
use kegsmith_common::pipeline::{InstallStage, InstallState, PipelineEvent};
use kegsmith_net::{ArtifactSource, Fetcher};
use tempfile::TempDir;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

use crate::extract::extract_archive;
use crate::hooks;
use crate::materialize::{generate_launcher, materialize, remove_launchers};
use crate::receipt::{write_formula_snapshot, InstallReceipt};
use crate::resources::install_resources;
use crate::runtime::{RuntimeHandle, RuntimeProvider};

/// What a successful install produced.
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub formula: String,
    pub version: String,
    pub prefix: PathBuf,
    pub runtime: Option<RuntimeHandle>,
    pub launchers: Vec<PathBuf>,
    pub post_install: Vec<String>,
    pub caveats: Option<String>,
    pub duration: Duration,
}

/// Runs one formula through fetch, runtime, resources, materialization and
/// post-install, strictly in that order, stopping at the first failure.
#[derive(Debug)]
pub struct Installer<S, R> {
    config: Config,
    fetcher: Fetcher<S>,
    provider: R,
    event_tx: Option<broadcast::Sender<PipelineEvent>>,
    state: InstallState,
}

impl<S: ArtifactSource, R: RuntimeProvider> Installer<S, R> {
    pub fn new(config: Config, source: S, provider: R) -> Result<Self> {
        let cache = Cache::new(&config)?;
        Ok(Self {
            config,
            fetcher: Fetcher::new(source, cache),
            provider,
            event_tx: None,
            state: InstallState::Pending,
        })
    }

    pub fn with_events(mut self, event_tx: broadcast::Sender<PipelineEvent>) -> Self {
        self.fetcher = self.fetcher.with_events(event_tx.clone());
        self.event_tx = Some(event_tx);
        self
    }

    pub fn state(&self) -> &InstallState {
        &self.state
    }

    pub fn provider(&self) -> &R {
        &self.provider
    }

    pub fn fetcher(&self) -> &Fetcher<S> {
        &self.fetcher
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn send_event(&self, event: PipelineEvent) {
        if let Some(tx) = &self.event_tx {
            if tx.send(event).is_err() {
                debug!("No pipeline event receivers; dropping event");
            }
        }
    }

    fn enter(&mut self, formula: &Formula, stage: InstallStage) {
        debug!("[{}] Entering stage: {}", formula.name(), stage);
        self.state = InstallState::Running(stage);
        self.send_event(PipelineEvent::StageStarted {
            formula: formula.name().to_string(),
            stage,
        });
    }

    fn fail(&mut self, formula: &Formula, stage: InstallStage, cause: KegError) -> KegError {
        error!("[{}] Install failed during {}: {}", formula.name(), stage, cause);
        self.send_event(PipelineEvent::install_failed(
            formula.name().to_string(),
            stage,
            &cause,
        ));
        self.state = InstallState::Failed {
            stage,
            cause: cause.clone(),
        };
        cause.in_stage(stage)
    }

    /// Installs `formula` into `<root>/Cellar/<name>/<version>`.
    ///
    /// Reinstalling the same version replaces the keg. Launchers are written
    /// last, so a failed install never leaves one behind.
    #[instrument(skip(self, formula), fields(formula = %formula.name(), version = %formula.version_str()))]
    pub async fn install(&mut self, formula: &Formula) -> Result<InstallReport> {
        let started = Instant::now();
        self.state = InstallState::Pending;
        formula.validate()?;
        let plan = formula.install_plan()?;

        let prefix = self
            .config
            .formula_keg_path(formula.name(), formula.version_str());
        info!(
            "Installing {} {} to {}",
            formula.name(),
            formula.version_str(),
            prefix.display()
        );
        self.send_event(PipelineEvent::InstallStarted {
            formula: formula.name().to_string(),
            version: formula.version_str().to_string(),
        });

        let staging = match self.staging_dir(formula) {
            Ok(staging) => staging,
            Err(e) => return Err(self.fail(formula, InstallStage::Fetching, e)),
        };

        self.enter(formula, InstallStage::Fetching);
        let source_dir = staging.path().join("source");
        if let Err(e) = self.fetch_source(formula, &source_dir).await {
            return Err(self.fail(formula, InstallStage::Fetching, e));
        }

        self.enter(formula, InstallStage::RuntimeBuilding);
        let previous_launchers = match self.prepare_prefix(formula, &prefix) {
            Ok(previous) => previous,
            Err(e) => return Err(self.fail(formula, InstallStage::RuntimeBuilding, e)),
        };
        let runtime = match self.build_runtime(formula, &plan, &prefix).await {
            Ok(runtime) => runtime,
            Err(e) => return Err(self.fail(formula, InstallStage::RuntimeBuilding, e)),
        };

        self.enter(formula, InstallStage::ResourceInstalling);
        if plan.install_resources {
            let result = match &runtime {
                Some(runtime) => {
                    let event_tx = self.event_tx.clone();
                    install_resources(
                        &self.fetcher,
                        &self.provider,
                        runtime,
                        formula.resources(),
                        &staging.path().join("resources"),
                        |resource| {
                            if let Some(tx) = &event_tx {
                                let _ = tx.send(PipelineEvent::ResourceInstalled {
                                    formula: formula.name().to_string(),
                                    resource: resource.name.clone(),
                                });
                            }
                        },
                    )
                    .await
                }
                None => Err(KegError::Config(
                    "install_resources requires a runtime".to_string(),
                )),
            };
            if let Err(e) = result {
                return Err(self.fail(formula, InstallStage::ResourceInstalling, e));
            }
        }

        self.enter(formula, InstallStage::Materializing);
        let launchers = match self.materialize_keg(
            formula,
            &plan,
            &prefix,
            &source_dir,
            runtime.as_ref(),
            &previous_launchers,
        ) {
            Ok(launchers) => launchers,
            Err(e) => return Err(self.fail(formula, InstallStage::Materializing, e)),
        };

        self.enter(formula, InstallStage::PostInstall);
        let libexec = Formula::libexec_path(&prefix);
        let bin = self.config.bin_dir();
        let vars = formula.template_vars(&prefix, &libexec, &bin);
        let post_install = hooks::post_install(formula, &vars);
        let caveats = hooks::caveats(formula, &vars);

        let duration = started.elapsed();
        self.state = InstallState::Ready;
        self.send_event(PipelineEvent::InstallFinished {
            formula: formula.name().to_string(),
            prefix: prefix.clone(),
            duration_secs: duration.as_secs_f64(),
        });
        info!(
            "Installed {} {} in {:.2}s",
            formula.name(),
            formula.version_str(),
            duration.as_secs_f64()
        );

        Ok(InstallReport {
            formula: formula.name().to_string(),
            version: formula.version_str().to_string(),
            prefix,
            runtime,
            launchers,
            post_install,
            caveats,
            duration,
        })
    }

    fn staging_dir(&self, formula: &Formula) -> Result<TempDir> {
        let tmp = self.config.tmp_dir();
        fs::create_dir_all(&tmp).map_err(|e| KegError::WriteFailure {
            path: tmp.clone(),
            reason: e.to_string(),
        })?;
        tempfile::Builder::new()
            .prefix(&format!("{}-", formula.name()))
            .tempdir_in(&tmp)
            .map_err(|e| KegError::WriteFailure {
                path: tmp,
                reason: format!("cannot create staging directory: {e}"),
            })
    }

    async fn fetch_source(&self, formula: &Formula, source_dir: &Path) -> Result<()> {
        let artifact = self
            .fetcher
            .fetch(
                formula.name(),
                formula.source_url(),
                &formula.source_file_name(),
                formula.source_sha256(),
            )
            .await?;
        extract_archive(&artifact.bytes, &artifact.file_name, source_dir)
    }

    /// Every launcher any installed version of this formula has recorded.
    fn recorded_launchers(&self, formula: &Formula) -> Result<Vec<PathBuf>> {
        let registry = KegRegistry::new(self.config.clone());
        let mut launchers = Vec::new();
        for keg in registry.installed_versions(formula.name())? {
            match InstallReceipt::read_keg(&keg) {
                Ok(receipt) => launchers.extend(receipt.launchers),
                Err(e) => warn!("Unreadable receipt in {}: {}", keg.path.display(), e),
            }
        }
        launchers.sort();
        launchers.dedup();
        Ok(launchers)
    }

    /// Removes recorded launchers, then empties the prefix. Returns the
    /// launchers removed; only those paths may be written again.
    fn prepare_prefix(&self, formula: &Formula, prefix: &Path) -> Result<Vec<PathBuf>> {
        let previous = self.recorded_launchers(formula)?;
        remove_launchers(&previous)?;

        if prefix.symlink_metadata().is_ok() {
            debug!("Removing previous keg at {}", prefix.display());
            fs::remove_dir_all(prefix).map_err(|e| KegError::WriteFailure {
                path: prefix.to_path_buf(),
                reason: format!("cannot remove previous keg: {e}"),
            })?;
        }
        fs::create_dir_all(prefix).map_err(|e| KegError::WriteFailure {
            path: prefix.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(previous)
    }

    async fn build_runtime(
        &self,
        formula: &Formula,
        plan: &InstallPlan,
        prefix: &Path,
    ) -> Result<Option<RuntimeHandle>> {
        let Some(requirement) = &plan.runtime else {
            return Ok(None);
        };
        let runtime = self.provider.create_runtime(prefix, requirement).await?;
        self.send_event(PipelineEvent::RuntimeCreated {
            formula: formula.name().to_string(),
            interpreter: runtime.interpreter.clone(),
        });
        Ok(Some(runtime))
    }

    fn materialize_keg(
        &self,
        formula: &Formula,
        plan: &InstallPlan,
        prefix: &Path,
        source_dir: &Path,
        runtime: Option<&RuntimeHandle>,
        previous_launchers: &[PathBuf],
    ) -> Result<Vec<PathBuf>> {
        if plan.install_files {
            materialize(source_dir, prefix)?;
        }
        write_formula_snapshot(prefix, formula)?;

        let bin_dir = self.config.bin_dir();
        let launcher_paths: Vec<PathBuf> = plan
            .launchers
            .iter()
            .map(|l| bin_dir.join(&l.name))
            .collect();

        let mut receipt = InstallReceipt::new(formula);
        receipt.runtime = plan.runtime.as_ref().map(|r| r.to_string());
        receipt.interpreter = runtime.map(|r| r.interpreter.clone());
        receipt.launchers = launcher_paths.clone();
        receipt.write(prefix)?;

        let Some(runtime) = runtime else {
            return Ok(Vec::new());
        };
        let mut written = Vec::with_capacity(plan.launchers.len());
        for spec in &plan.launchers {
            match generate_launcher(&bin_dir, prefix, runtime, spec, previous_launchers) {
                Ok(path) => {
                    self.send_event(PipelineEvent::LauncherWritten {
                        formula: formula.name().to_string(),
                        path: path.clone(),
                    });
                    written.push(path);
                }
                Err(e) => {
                    // Without every launcher the keg is not complete.
                    let receipt_path = InstallReceipt::path_in(prefix);
                    if let Err(cleanup) = fs::remove_file(&receipt_path) {
                        warn!(
                            "Failed to remove receipt {}: {}",
                            receipt_path.display(),
                            cleanup
                        );
                    }
                    if let Err(cleanup) = remove_launchers(&written) {
                        warn!("Failed to remove launchers written so far: {}", cleanup);
                    }
                    return Err(e);
                }
            }
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::os::unix::fs::PermissionsExt;

    use kegsmith_common::model::{InstallStep, TestAssertion};
    use kegsmith_net::MemorySource;
    use walkdir::WalkDir;

    use super::*;
    use crate::test_support::{sample_formula, sample_source, source_archive, FakeRuntime};

    const GOOGLE: [(&str, &[u8]); 3] = [
        ("google-auth", b"google-auth sdist"),
        ("google-auth-oauthlib", b"google-auth-oauthlib sdist"),
        ("google-api-python-client", b"google-api-python-client sdist"),
    ];

    fn installer(
        root: &Path,
        source: MemorySource,
        provider: FakeRuntime,
    ) -> Installer<MemorySource, FakeRuntime> {
        Installer::new(Config::with_root(root), source, provider).unwrap()
    }

    fn file_set(dir: &Path) -> BTreeSet<PathBuf> {
        WalkDir::new(dir)
            .into_iter()
            .map(|e| e.unwrap().path().strip_prefix(dir).unwrap().to_path_buf())
            .filter(|p| p.file_name().and_then(|n| n.to_str()) != Some("INSTALL_RECEIPT.json"))
            .collect()
    }

    #[tokio::test]
    async fn founder_os_reaches_ready_and_passes_its_tests() {
        let dir = tempfile::tempdir().unwrap();
        let archive = source_archive();
        let mut formula = sample_formula(&GOOGLE, &archive);
        formula.test = vec![
            TestAssertion::Importable { module: "google.auth".to_string() },
            TestAssertion::Importable { module: "google_auth_oauthlib".to_string() },
            TestAssertion::Importable { module: "googleapiclient".to_string() },
        ];
        let provider = FakeRuntime::default().with_modules(&[
            "google.auth",
            "google_auth_oauthlib",
            "googleapiclient",
        ]);
        let (tx, mut rx) = broadcast::channel(64);
        let mut installer =
            installer(dir.path(), sample_source(&archive, &GOOGLE), provider).with_events(tx);

        let report = installer.install(&formula).await.unwrap();
        assert!(matches!(installer.state(), InstallState::Ready));
        assert_eq!(
            installer.provider().installed(),
            vec!["google-auth", "google-auth-oauthlib", "google-api-python-client"]
        );

        let launcher = dir.path().join("bin/founder-os");
        assert_eq!(report.launchers, vec![launcher.clone()]);
        let mode = fs::metadata(&launcher).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
        assert!(report.prefix.join("main.py").is_file());
        assert!(report.prefix.join("agents/__init__.py").is_file());
        assert_eq!(
            report.post_install,
            vec![format!("founder-os installed to {}", report.prefix.display())]
        );

        let runtime = installer.provider().open_runtime(&report.prefix).unwrap();
        let test = hooks::run_test(installer.provider(), &runtime, &formula, &report.prefix).await;
        assert!(test.passed());
        assert_eq!(test.results.len(), 3);

        let mut stages = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let PipelineEvent::StageStarted { stage, .. } = event {
                stages.push(stage);
            }
        }
        assert_eq!(stages, InstallStage::ALL.to_vec());
    }

    #[tokio::test]
    async fn oauthlib_mismatch_halts_before_any_launcher() {
        let dir = tempfile::tempdir().unwrap();
        let archive = source_archive();
        let formula = sample_formula(&GOOGLE, &archive);
        let served = [
            GOOGLE[0],
            ("google-auth-oauthlib", b"tampered".as_slice()),
            GOOGLE[2],
        ];
        let mut installer =
            installer(dir.path(), sample_source(&archive, &served), FakeRuntime::default());

        let err = installer.install(&formula).await.unwrap_err();
        assert_eq!(err.stage(), Some(InstallStage::ResourceInstalling));
        match err.root_cause() {
            KegError::ChecksumMismatch { subject, .. } => {
                assert_eq!(subject, "google-auth-oauthlib")
            }
            other => panic!("unexpected root cause: {other:?}"),
        }
        assert!(matches!(
            installer.state(),
            InstallState::Failed { stage: InstallStage::ResourceInstalling, .. }
        ));
        assert_eq!(installer.provider().installed(), vec!["google-auth"]);
        assert!(!dir.path().join("bin/founder-os").exists());
        assert!(!installer
            .fetcher()
            .source()
            .requests()
            .iter()
            .any(|u| u.contains("google-api-python-client")));

        let registry = KegRegistry::new(installer.config().clone());
        assert!(registry.get_installed_keg("founder-os").unwrap().is_none());
    }

    #[tokio::test]
    async fn launcher_embeds_install_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let archive = source_archive();
        let formula = sample_formula(&[], &archive);
        let mut installer =
            installer(dir.path(), sample_source(&archive, &[]), FakeRuntime::default());

        let report = installer.install(&formula).await.unwrap();
        let script = fs::read_to_string(dir.path().join("bin/founder-os")).unwrap();
        let expected_prefix = dir.path().join("Cellar/founder-os/1.0.0");
        assert_eq!(report.prefix, expected_prefix);
        assert!(script.contains(&format!("cd '{}' || exit 1", expected_prefix.display())));
        assert!(script.contains(&format!(
            "exec '{}'",
            expected_prefix.join("libexec/bin/python3").display()
        )));
    }

    #[tokio::test]
    async fn reinstall_produces_identical_file_set() {
        let dir = tempfile::tempdir().unwrap();
        let archive = source_archive();
        let formula = sample_formula(&GOOGLE, &archive);
        let mut installer =
            installer(dir.path(), sample_source(&archive, &GOOGLE), FakeRuntime::default());

        let first = installer.install(&formula).await.unwrap();
        let before = file_set(&first.prefix);
        let second = installer.install(&formula).await.unwrap();
        assert_eq!(file_set(&second.prefix), before);
        assert!(dir.path().join("bin/founder-os").is_file());
        // Second run is served from the verified cache.
        assert_eq!(installer.fetcher().source().requests().len(), 4);
    }

    #[tokio::test]
    async fn failed_reinstall_removes_previous_launcher() {
        let dir = tempfile::tempdir().unwrap();
        let archive = source_archive();
        let formula = sample_formula(&[], &archive);
        let mut good = installer(dir.path(), sample_source(&archive, &[]), FakeRuntime::default());
        good.install(&formula).await.unwrap();
        assert!(dir.path().join("bin/founder-os").exists());

        let mut bad = installer(
            dir.path(),
            sample_source(&archive, &[]),
            FakeRuntime::default().unavailable(),
        );
        let err = bad.install(&formula).await.unwrap_err();
        assert_eq!(err.stage(), Some(InstallStage::RuntimeBuilding));
        assert!(matches!(err.root_cause(), KegError::RuntimeUnavailable { .. }));
        assert!(!dir.path().join("bin/founder-os").exists());
    }

    #[tokio::test]
    async fn source_mismatch_fails_while_fetching_without_touching_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let archive = source_archive();
        let formula = sample_formula(&[], &archive);
        let mut installer = installer(
            dir.path(),
            sample_source(b"not the archive", &[]),
            FakeRuntime::default(),
        );
        let err = installer.install(&formula).await.unwrap_err();
        assert_eq!(err.stage(), Some(InstallStage::Fetching));
        assert!(matches!(err.root_cause(), KegError::ChecksumMismatch { .. }));
        assert!(!dir.path().join("Cellar/founder-os/1.0.0").exists());
    }

    #[tokio::test]
    async fn foreign_launcher_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let archive = source_archive();
        let formula = sample_formula(&[], &archive);
        fs::create_dir_all(dir.path().join("bin")).unwrap();
        fs::write(dir.path().join("bin/founder-os"), "#!/bin/sh\necho other\n").unwrap();

        let mut installer =
            installer(dir.path(), sample_source(&archive, &[]), FakeRuntime::default());
        let err = installer.install(&formula).await.unwrap_err();
        assert_eq!(err.stage(), Some(InstallStage::Materializing));
        assert!(matches!(err.root_cause(), KegError::WriteFailure { .. }));
        assert_eq!(
            fs::read_to_string(dir.path().join("bin/founder-os")).unwrap(),
            "#!/bin/sh\necho other\n"
        );
        assert!(!dir.path().join("Cellar/founder-os/1.0.0/INSTALL_RECEIPT.json").exists());
    }

    #[tokio::test]
    async fn later_launcher_collision_rolls_back_earlier_launchers() {
        let dir = tempfile::tempdir().unwrap();
        let archive = source_archive();
        let mut formula = sample_formula(&[], &archive);
        formula.install.push(InstallStep::WriteLauncher {
            name: "founder-os-setup".to_string(),
            entry_point: "main.py".to_string(),
        });
        fs::create_dir_all(dir.path().join("bin")).unwrap();
        fs::write(dir.path().join("bin/founder-os-setup"), "#!/bin/sh
").unwrap();

        let mut installer =
            installer(dir.path(), sample_source(&archive, &[]), FakeRuntime::default());
        let err = installer.install(&formula).await.unwrap_err();
        assert_eq!(err.stage(), Some(InstallStage::Materializing));
        assert!(!dir.path().join("bin/founder-os").exists());
        assert!(dir.path().join("bin/founder-os-setup").exists());
        assert!(!dir.path().join("Cellar/founder-os/1.0.0/INSTALL_RECEIPT.json").exists());
    }
}
