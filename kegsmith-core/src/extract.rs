// kegsmith-core/src/extract.rs
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Cursor, Read, Seek};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use kegsmith_common::error::{KegError, Result};
use tar::Archive;
use tracing::{debug, warn};
use zip::read::ZipArchive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Tar,
    TarGz,
    Zip,
}

/// Detects the archive format from the content, falling back to the file name.
pub fn detect_archive_kind(bytes: &[u8], file_name: &str) -> Result<ArchiveKind> {
    if let Some(kind) = infer::get(bytes) {
        match kind.extension() {
            "gz" => return Ok(ArchiveKind::TarGz),
            "zip" => return Ok(ArchiveKind::Zip),
            "tar" => return Ok(ArchiveKind::Tar),
            other => debug!("Content sniffed as '{}' for {}", other, file_name),
        }
    }
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
        Ok(ArchiveKind::TarGz)
    } else if lower.ends_with(".zip") || lower.ends_with(".whl") {
        Ok(ArchiveKind::Zip)
    } else if lower.ends_with(".tar") {
        Ok(ArchiveKind::Tar)
    } else {
        Err(KegError::Generic(format!(
            "Cannot determine archive type of '{file_name}'"
        )))
    }
}

/// Unpacks `bytes` into `target_dir`. When every entry lives under one top-level
/// directory, that directory is stripped so its contents land in `target_dir`.
pub fn extract_archive(bytes: &[u8], file_name: &str, target_dir: &Path) -> Result<()> {
    let kind = detect_archive_kind(bytes, file_name)?;
    debug!(
        "Extracting '{}' ({:?}) to '{}'",
        file_name,
        kind,
        target_dir.display()
    );
    fs::create_dir_all(target_dir).map_err(|e| KegError::WriteFailure {
        path: target_dir.to_path_buf(),
        reason: e.to_string(),
    })?;

    let strip = match kind {
        ArchiveKind::Zip => zip_single_root(Cursor::new(bytes), file_name)?,
        ArchiveKind::TarGz => tar_single_root(GzDecoder::new(bytes), file_name)?,
        ArchiveKind::Tar => tar_single_root(bytes, file_name)?,
    }
    .map_or(0, |root| {
        debug!("Stripping single root '{}' from {}", root.display(), file_name);
        1
    });

    match kind {
        ArchiveKind::Zip => extract_zip(Cursor::new(bytes), target_dir, strip, file_name),
        ArchiveKind::TarGz => extract_tar(GzDecoder::new(bytes), target_dir, strip, file_name),
        ArchiveKind::Tar => extract_tar(bytes, target_dir, strip, file_name),
    }
}

fn archive_error(file_name: &str, e: impl std::fmt::Display) -> KegError {
    KegError::Generic(format!("Error reading archive {file_name}: {e}"))
}

/// Returns the shared top-level directory if there is exactly one and it
/// contains at least one entry.
fn single_root<I>(paths: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut roots = HashSet::new();
    let mut nested = false;
    for path in paths {
        let mut components = path.components().filter(|c| !matches!(c, Component::CurDir));
        match components.next() {
            Some(Component::Normal(name)) => {
                roots.insert(PathBuf::from(name));
                if roots.len() > 1 {
                    return None;
                }
                nested |= components.next().is_some();
            }
            Some(_) => return None,
            None => {}
        }
    }
    if nested {
        roots.into_iter().next()
    } else {
        None
    }
}

fn tar_single_root<R: Read>(reader: R, file_name: &str) -> Result<Option<PathBuf>> {
    let mut archive = Archive::new(reader);
    let mut paths = Vec::new();
    for entry in archive.entries().map_err(|e| archive_error(file_name, e))? {
        let entry = entry.map_err(|e| archive_error(file_name, e))?;
        let path = entry.path().map_err(|e| archive_error(file_name, e))?;
        if entry.header().entry_type().is_pax_global_extensions() {
            continue;
        }
        paths.push(path.into_owned());
    }
    if paths.is_empty() {
        warn!("Archive {} appears to be empty", file_name);
    }
    Ok(single_root(paths))
}

fn zip_single_root<R: Read + Seek>(reader: R, file_name: &str) -> Result<Option<PathBuf>> {
    let archive = ZipArchive::new(reader).map_err(|e| archive_error(file_name, e))?;
    let paths: Vec<PathBuf> = archive.file_names().map(PathBuf::from).collect();
    Ok(single_root(paths))
}

fn unsafe_path(path: &Path, file_name: &str, why: &str) -> KegError {
    KegError::Generic(format!(
        "Unsafe path '{}' in archive {}: {}",
        path.display(),
        file_name,
        why
    ))
}

/// Maps an archive path onto `target_dir`. Only rejects absolute and `..`
/// components; symlinks on disk are checked by [`ensure_within`].
fn safe_target(
    target_dir: &Path,
    path: &Path,
    strip: usize,
    file_name: &str,
) -> Result<Option<PathBuf>> {
    let mut out = target_dir.to_path_buf();
    let mut pushed = false;
    for comp in path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .skip(strip)
    {
        match comp {
            Component::Normal(p) => {
                out.push(p);
                pushed = true;
            }
            _ => return Err(unsafe_path(path, file_name, "leaves the target directory")),
        }
    }
    Ok(pushed.then_some(out))
}

/// Refuses a symlink whose target is absolute or climbs above `root` when
/// resolved from the real directory the link is created in.
fn check_symlink_target(root: &Path, dest: &Path, link: &Path, file_name: &str) -> Result<()> {
    let mut depth = dest
        .parent()
        .and_then(|p| p.canonicalize().ok())
        .and_then(|p| p.strip_prefix(root).ok().map(|rel| rel.components().count()))
        .ok_or_else(|| unsafe_path(dest, file_name, "link directory is outside the target"))?;
    for comp in link.components() {
        match comp {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir if depth > 0 => depth -= 1,
            _ => {
                return Err(unsafe_path(
                    dest,
                    file_name,
                    &format!("symlink target '{}' leaves the target directory", link.display()),
                ))
            }
        }
    }
    Ok(())
}

/// Fails unless the nearest existing ancestor of `start` (or `start` itself)
/// resolves inside `root`, which must already be canonical. Stops an entry
/// from being written through a symlink planted by an earlier entry.
fn ensure_within(root: &Path, start: &Path, file_name: &str) -> Result<()> {
    let mut current = Some(start);
    while let Some(dir) = current {
        if dir.symlink_metadata().is_ok() {
            let real = dir.canonicalize().map_err(|e| KegError::WriteFailure {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            })?;
            if !real.starts_with(root) {
                return Err(unsafe_path(start, file_name, "resolves through a symlink"));
            }
            return Ok(());
        }
        current = dir.parent();
    }
    Ok(())
}

fn extract_tar<R: Read>(
    reader: R,
    target_dir: &Path,
    strip: usize,
    file_name: &str,
) -> Result<()> {
    let root = target_dir.canonicalize().map_err(|e| KegError::WriteFailure {
        path: target_dir.to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut archive = Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);

    // Hard links point at other archive members, which may not exist yet.
    let mut deferred_links: Vec<(PathBuf, PathBuf)> = Vec::new();

    for entry in archive.entries().map_err(|e| archive_error(file_name, e))? {
        let mut entry = entry.map_err(|e| archive_error(file_name, e))?;
        let entry_type = entry.header().entry_type();
        if entry_type.is_pax_global_extensions() || entry_type.is_pax_local_extensions() {
            continue;
        }
        let path = entry
            .path()
            .map_err(|e| archive_error(file_name, e))?
            .into_owned();
        let Some(dest) = safe_target(target_dir, &path, strip, file_name)? else {
            continue;
        };
        let start = if entry_type.is_dir() {
            dest.as_path()
        } else {
            dest.parent().unwrap_or(target_dir)
        };
        ensure_within(&root, start, file_name)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        if entry_type.is_hard_link() {
            if let Ok(Some(link)) = entry.link_name() {
                if let Some(src) = safe_target(target_dir, &link, strip, file_name)? {
                    deferred_links.push((src, dest));
                }
            }
            continue;
        }
        if entry_type.is_symlink() {
            let link = entry
                .link_name()
                .map_err(|e| archive_error(file_name, e))?
                .ok_or_else(|| unsafe_path(&path, file_name, "symlink without a target"))?
                .into_owned();
            check_symlink_target(&root, &dest, &link, file_name)?;
        }
        entry.unpack(&dest).map_err(|e| KegError::WriteFailure {
            path: dest.clone(),
            reason: format!("unpacking {file_name}: {e}"),
        })?;
    }

    for (src, dest) in deferred_links {
        ensure_within(&root, &src, file_name)?;
        fs::copy(&src, &dest).map_err(|e| KegError::WriteFailure {
            path: dest.clone(),
            reason: format!("linking to {}: {e}", src.display()),
        })?;
    }
    Ok(())
}

fn extract_zip<R: Read + Seek>(
    reader: R,
    target_dir: &Path,
    strip: usize,
    file_name: &str,
) -> Result<()> {
    let mut archive = ZipArchive::new(reader).map_err(|e| archive_error(file_name, e))?;
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(|e| archive_error(file_name, e))?;
        let Some(path) = file.enclosed_name() else {
            return Err(unsafe_path(
                Path::new(file.name()),
                file_name,
                "leaves the target directory",
            ));
        };
        let Some(dest) = safe_target(target_dir, &path, strip, file_name)? else {
            continue;
        };
        if file.is_dir() {
            fs::create_dir_all(&dest)?;
            continue;
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&dest).map_err(|e| KegError::WriteFailure {
            path: dest.clone(),
            reason: e.to_string(),
        })?;
        io::copy(&mut file, &mut out).map_err(|e| KegError::WriteFailure {
            path: dest.clone(),
            reason: e.to_string(),
        })?;
        #[cfg(unix)]
        if let Some(mode) = file.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&dest, fs::Permissions::from_mode(mode & 0o7777))?;
        }
    }
    Ok(())
}
