// kegsmith-core/src/env.rs
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::process::Command;

/// Directories searched for base interpreters and tools. The host `PATH` is
/// never consulted.
pub const SYSTEM_SEARCH_DIRS: &[&str] =
    &["/opt/homebrew/bin", "/usr/local/bin", "/usr/bin", "/bin"];

/// The complete environment handed to every child process of an install.
///
/// Commands start from an empty environment; nothing from the host leaks in.
#[derive(Debug, Clone)]
pub struct IsolatedEnv {
    vars: HashMap<String, String>,
    path_dirs: Vec<PathBuf>,
}

impl IsolatedEnv {
    /// `home` is a scratch directory owned by the installer, so tools that
    /// write under `$HOME` (pip's cache, for one) never touch the user's.
    pub fn new(root_bin: &Path, home: &Path) -> Self {
        let mut path_dirs = vec![root_bin.to_path_buf()];
        path_dirs.extend(SYSTEM_SEARCH_DIRS.iter().map(PathBuf::from));

        let mut vars = HashMap::new();
        vars.insert("HOME".to_string(), home.to_string_lossy().into_owned());
        vars.insert("LANG".to_string(), "en_US.UTF-8".to_string());
        vars.insert("LC_ALL".to_string(), "en_US.UTF-8".to_string());
        vars.insert("PYTHONNOUSERSITE".to_string(), "1".to_string());
        vars.insert("PYTHONDONTWRITEBYTECODE".to_string(), "1".to_string());
        vars.insert("PIP_DISABLE_PIP_VERSION_CHECK".to_string(), "1".to_string());
        vars.insert("PIP_NO_INPUT".to_string(), "1".to_string());
        vars.insert("PIP_NO_CACHE_DIR".to_string(), "1".to_string());

        let mut env = Self { vars, path_dirs };
        env.refresh_path();
        env
    }

    fn refresh_path(&mut self) {
        let joined = self
            .path_dirs
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(":");
        self.vars.insert("PATH".to_string(), joined);
    }

    /// Puts `dir` first on `PATH`.
    pub fn prepend_path(&mut self, dir: &Path) {
        self.path_dirs.insert(0, dir.to_path_buf());
        self.refresh_path();
    }

    pub fn set_var(&mut self, key: &str, value: impl Into<String>) {
        self.vars.insert(key.to_string(), value.into());
    }

    pub fn get_var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn path_dirs(&self) -> &[PathBuf] {
        &self.path_dirs
    }

    pub fn get_path_string(&self) -> Option<&str> {
        self.get_var("PATH")
    }

    pub fn apply_to_command(&self, command: &mut Command) {
        command.env_clear();
        command.envs(&self.vars);
    }
}
