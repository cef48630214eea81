use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::pipeline::InstallStage;

#[derive(Error, Debug, Clone)]
pub enum KegError {
    #[error("I/O Error: {0}")]
    Io(#[from] Arc<std::io::Error>),

    #[error("HTTP Request Error: {0}")]
    Http(#[from] Arc<reqwest::Error>),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] Arc<serde_json::Error>),

    #[error("TOML Parsing Error: {0}")]
    Toml(#[from] Arc<toml::de::Error>),

    #[error("Semantic Versioning Error: {0}")]
    SemVer(#[from] Arc<semver::Error>),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Cache Error: {0}")]
    Cache(String),

    #[error("Failed to fetch '{url}': {reason}")]
    FetchFailure { url: String, reason: String },

    #[error("Checksum mismatch for '{subject}' from {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        subject: String,
        url: String,
        expected: String,
        actual: String,
    },

    #[error("Runtime '{runtime}' is not available on this host: {hint}")]
    RuntimeUnavailable { runtime: String, hint: String },

    #[error("Failed to install resource '{resource}': {cause}")]
    ResourceInstallFailure {
        resource: String,
        cause: Box<KegError>,
    },

    #[error("Failed to copy {}: {reason}", .path.display())]
    CopyFailure { path: PathBuf, reason: String },

    #[error("Failed to write {}: {reason}", .path.display())]
    WriteFailure { path: PathBuf, reason: String },

    #[error("Command `{command}` failed with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Post-install test of '{formula}' failed: {}", .failed.join("; "))]
    TestAssertionFailure { formula: String, failed: Vec<String> },

    #[error("Install failed during {stage}: {cause}")]
    Stage {
        stage: InstallStage,
        cause: Box<KegError>,
    },

    #[error("Formula '{0}' is not installed")]
    NotInstalled(String),

    #[error("Generic Error: {0}")]
    Generic(String),
}

impl KegError {
    /// Strips pipeline and resource wrappers down to the error that started it.
    pub fn root_cause(&self) -> &KegError {
        match self {
            KegError::Stage { cause, .. } | KegError::ResourceInstallFailure { cause, .. } => {
                cause.root_cause()
            }
            other => other,
        }
    }

    /// The pipeline stage an install failure halted at, if any.
    pub fn stage(&self) -> Option<InstallStage> {
        match self {
            KegError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Post-install verification failures can be fixed without reinstalling;
    /// everything else means the install itself did not complete.
    pub fn is_install_failure(&self) -> bool {
        !matches!(self, KegError::TestAssertionFailure { .. })
    }

    pub fn in_stage(self, stage: InstallStage) -> Self {
        KegError::Stage {
            stage,
            cause: Box::new(self),
        }
    }
}

impl From<std::io::Error> for KegError {
    fn from(err: std::io::Error) -> Self {
        KegError::Io(Arc::new(err))
    }
}

impl From<reqwest::Error> for KegError {
    fn from(err: reqwest::Error) -> Self {
        KegError::Http(Arc::new(err))
    }
}

impl From<serde_json::Error> for KegError {
    fn from(err: serde_json::Error) -> Self {
        KegError::Json(Arc::new(err))
    }
}

impl From<toml::de::Error> for KegError {
    fn from(err: toml::de::Error) -> Self {
        KegError::Toml(Arc::new(err))
    }
}

impl From<semver::Error> for KegError {
    fn from(err: semver::Error) -> Self {
        KegError::SemVer(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, KegError>;
