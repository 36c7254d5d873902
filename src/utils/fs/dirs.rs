//! Directory and file-replacement operations.
//!
//! Every write into a live installation goes through [`replace_file`]: the new
//! bytes land in a sibling temporary file which is then renamed over the target.
//! On Unix the rename gives the target a fresh inode, so a process still
//! executing the old image keeps running from the old one.
//!
//! Failures are raised as [`ToolupError::FileSystemError`] with the I/O error
//! kept underneath.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::core::ToolupError;

/// Create `path` and any missing parents.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path).with_context(|| ToolupError::file_system("create directory", path))?;
    } else if !path.is_dir() {
        return Err(anyhow::anyhow!("Path exists but is not a directory"))
            .with_context(|| ToolupError::file_system("create directory", path));
    }
    Ok(())
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        ensure_dir(parent)?;
    }
    Ok(())
}

fn sibling_temp_path(dst: &Path) -> Result<PathBuf> {
    let file_name = dst
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("Destination has no file name"))
        .with_context(|| ToolupError::file_system("replace file", dst))?;
    Ok(dst.with_file_name(format!(
        ".{}.{}.tmp",
        file_name.to_string_lossy(),
        uuid::Uuid::new_v4().simple()
    )))
}

/// Copy `src` over `dst` through a sibling temporary file and a rename.
///
/// Permission bits of `src` are carried over. The temporary file is removed if
/// the rename fails.
pub fn replace_file(src: &Path, dst: &Path) -> Result<()> {
    ensure_parent_dir(dst)?;
    let tmp = sibling_temp_path(dst)?;

    fs::copy(src, &tmp)
        .with_context(|| format!("Failed to copy {}", src.display()))
        .with_context(|| ToolupError::file_system("replace file", dst))?;

    if let Err(e) = fs::rename(&tmp, dst) {
        let _ = fs::remove_file(&tmp);
        return Err(e).with_context(|| ToolupError::file_system("replace file", dst));
    }
    Ok(())
}

/// Async flavour of [`replace_file`] built on `tokio::fs`.
pub async fn replace_file_async(src: &Path, dst: &Path) -> Result<()> {
    ensure_parent_dir(dst)?;
    let tmp = sibling_temp_path(dst)?;

    tokio::fs::copy(src, &tmp)
        .await
        .with_context(|| format!("Failed to copy {}", src.display()))
        .with_context(|| ToolupError::file_system("replace file", dst))?;

    if let Err(e) = tokio::fs::rename(&tmp, dst).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e).with_context(|| ToolupError::file_system("replace file", dst));
    }
    Ok(())
}

/// Point `dst` at `target`, replacing whatever is at `dst`.
#[cfg(unix)]
pub fn replace_symlink(target: &Path, dst: &Path) -> Result<()> {
    ensure_parent_dir(dst)?;
    if let Ok(meta) = fs::symlink_metadata(dst) {
        let removed = if meta.is_dir() { fs::remove_dir_all(dst) } else { fs::remove_file(dst) };
        removed.with_context(|| ToolupError::file_system("replace symlink", dst))?;
    }
    std::os::unix::fs::symlink(target, dst).with_context(|| ToolupError::file_system("create symlink", dst))
}

#[cfg(not(unix))]
pub fn replace_symlink(_target: &Path, dst: &Path) -> Result<()> {
    Err(anyhow::anyhow!("Symbolic links are only carried over on Unix"))
        .with_context(|| ToolupError::file_system("create symlink", dst))
}

/// Copy every file, directory and symlink below `src` into `dst`, overwriting
/// in place.
///
/// `skip` receives each entry's path relative to `src`; returning `true` leaves
/// that entry (and, for directories, everything below it) alone. Symlinks are
/// recreated with their original target, never followed. Returns the number
/// of files and symlinks copied.
pub async fn copy_dir_contents<F>(src: &Path, dst: &Path, skip: F) -> Result<usize>
where
    F: Fn(&Path) -> bool,
{
    ensure_dir(dst)?;

    let mut copied = 0;
    let walker = WalkDir::new(src).min_depth(1).sort_by_file_name().into_iter().filter_entry(|e| {
        e.path().strip_prefix(src).map(|rel| !skip(rel)).unwrap_or(true)
    });

    for entry in walker {
        let entry = entry.with_context(|| ToolupError::file_system("read directory", src))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .with_context(|| ToolupError::file_system("read directory", entry.path()))?;
        let target = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            ensure_dir(&target)?;
        } else if file_type.is_file() {
            replace_file_async(entry.path(), &target).await?;
            copied += 1;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())
                .with_context(|| ToolupError::file_system("read symlink", entry.path()))?;
            replace_symlink(&link, &target)?;
            copied += 1;
        } else {
            return Err(anyhow::anyhow!("Unsupported file type"))
                .with_context(|| ToolupError::file_system("copy", entry.path()));
        }
    }

    Ok(copied)
}

pub fn remove_dir_all(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path).with_context(|| ToolupError::file_system("remove directory", path))?;
    }
    Ok(())
}
