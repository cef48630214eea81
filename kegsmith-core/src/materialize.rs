// kegsmith-core/src/materialize.rs
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use kegsmith_common::error::{KegError, Result};
use kegsmith_common::model::LauncherSpec;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::runtime::RuntimeHandle;

fn copy_failure(path: &Path, e: impl std::fmt::Display) -> KegError {
    KegError::CopyFailure {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

/// Copies every file of `source_dir` into `prefix`, keeping directory layout,
/// permissions and symlinks. Returns the number of files and links copied.
///
/// `libexec` belongs to the isolated runtime, so a source tree that ships its
/// own top-level `libexec` is refused.
pub fn materialize(source_dir: &Path, prefix: &Path) -> Result<usize> {
    let reserved = source_dir.join("libexec");
    if reserved.symlink_metadata().is_ok() {
        return Err(copy_failure(
            &reserved,
            "source tree contains a top-level 'libexec', which is reserved for the runtime",
        ));
    }
    fs::create_dir_all(prefix).map_err(|e| copy_failure(prefix, e))?;

    let mut copied = 0;
    for entry in WalkDir::new(source_dir).min_depth(1).follow_links(false) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(source_dir).to_path_buf();
            copy_failure(&path, e)
        })?;
        let src = entry.path();
        let rel = src.strip_prefix(source_dir).map_err(|e| copy_failure(src, e))?;
        let dest = prefix.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&dest).map_err(|e| copy_failure(src, e))?;
            let perms = entry.metadata().map_err(|e| copy_failure(src, e))?.permissions();
            fs::set_permissions(&dest, perms).map_err(|e| copy_failure(src, e))?;
        } else if file_type.is_symlink() {
            let target = fs::read_link(src).map_err(|e| copy_failure(src, e))?;
            if dest.symlink_metadata().is_ok() {
                fs::remove_file(&dest).map_err(|e| copy_failure(src, e))?;
            }
            #[cfg(unix)]
            std::os::unix::fs::symlink(&target, &dest).map_err(|e| copy_failure(src, e))?;
            copied += 1;
        } else {
            fs::copy(src, &dest).map_err(|e| copy_failure(src, e))?;
            copied += 1;
        }
    }
    debug!(
        "Copied {} entries from {} to {}",
        copied,
        source_dir.display(),
        prefix.display()
    );
    Ok(copied)
}

/// Single-quotes `s` for a POSIX shell.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// The launcher script for `entry_point` of the keg at `prefix`.
pub fn launcher_script(prefix: &Path, interpreter: &Path, entry_point: &str) -> String {
    let prefix_str = prefix.to_string_lossy();
    let entry = prefix.join(entry_point);
    format!(
        "#!/bin/bash\ncd {} || exit 1\nexec {} {} \"$@\"\n",
        shell_quote(&prefix_str),
        shell_quote(&interpreter.to_string_lossy()),
        shell_quote(&entry.to_string_lossy()),
    )
}

/// Writes an executable launcher for `spec` into `bin_dir`.
///
/// An existing file at the launcher path is only replaced when it appears in
/// `owned`, the launchers this formula recorded in earlier installs.
pub fn generate_launcher(
    bin_dir: &Path,
    prefix: &Path,
    runtime: &RuntimeHandle,
    spec: &LauncherSpec,
    owned: &[PathBuf],
) -> Result<PathBuf> {
    let path = bin_dir.join(&spec.name);
    let write_failure = |e: &dyn std::fmt::Display| KegError::WriteFailure {
        path: path.clone(),
        reason: e.to_string(),
    };

    if path.symlink_metadata().is_ok() && !owned.contains(&path) {
        return Err(write_failure(&"file exists and is not owned by this formula"));
    }
    fs::create_dir_all(bin_dir).map_err(|e| write_failure(&e))?;

    let script = launcher_script(prefix, &runtime.interpreter, &spec.entry_point);
    let mut tmp = NamedTempFile::new_in(bin_dir).map_err(|e| write_failure(&e))?;
    tmp.write_all(script.as_bytes())
        .map_err(|e| write_failure(&e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o755))
            .map_err(|e| write_failure(&e))?;
    }
    tmp.persist(&path).map_err(|e| write_failure(&e.error))?;

    info!("Wrote launcher {}", path.display());
    Ok(path)
}

/// Removes launchers recorded by earlier installs so no launcher points at a
/// prefix that is about to change.
pub fn remove_launchers(launchers: &[PathBuf]) -> Result<()> {
    for path in launchers {
        match fs::remove_file(path) {
            Ok(()) => debug!("Removed previous launcher {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(KegError::WriteFailure {
                    path: path.clone(),
                    reason: format!("cannot remove previous launcher: {e}"),
                })
            }
        }
    }
    Ok(())
}
