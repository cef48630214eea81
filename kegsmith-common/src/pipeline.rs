// kegsmith-common/src/pipeline.rs
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::KegError;

/// Stages of a single formula install, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstallStage {
    Fetching,
    RuntimeBuilding,
    ResourceInstalling,
    Materializing,
    PostInstall,
}

impl InstallStage {
    pub const ALL: [InstallStage; 5] = [
        InstallStage::Fetching,
        InstallStage::RuntimeBuilding,
        InstallStage::ResourceInstalling,
        InstallStage::Materializing,
        InstallStage::PostInstall,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            InstallStage::Fetching => "fetching",
            InstallStage::RuntimeBuilding => "runtime setup",
            InstallStage::ResourceInstalling => "resource installation",
            InstallStage::Materializing => "prefix materialization",
            InstallStage::PostInstall => "post-install",
        }
    }
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Where an install currently is. `Ready` and `Failed` are terminal.
#[derive(Debug, Clone)]
pub enum InstallState {
    Pending,
    Running(InstallStage),
    Ready,
    Failed { stage: InstallStage, cause: KegError },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    InstallStarted {
        formula: String,
        version: String,
    },
    StageStarted {
        formula: String,
        stage: InstallStage,
    },
    DownloadStarted {
        subject: String,
        url: String,
    },
    DownloadFinished {
        subject: String,
        size_bytes: u64,
        from_cache: bool,
    },
    RuntimeCreated {
        formula: String,
        interpreter: PathBuf,
    },
    ResourceInstalled {
        formula: String,
        resource: String,
    },
    LauncherWritten {
        formula: String,
        path: PathBuf,
    },
    InstallFinished {
        formula: String,
        prefix: PathBuf,
        duration_secs: f64,
    },
    InstallFailed {
        formula: String,
        stage: InstallStage,
        error: String, // Keep as String for simplicity in events
    },
}

impl PipelineEvent {
    pub fn install_failed(formula: String, stage: InstallStage, error: &KegError) -> Self {
        PipelineEvent::InstallFailed {
            formula,
            stage,
            error: error.root_cause().to_string(),
        }
    }
}
