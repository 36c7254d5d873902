//! Zip extraction and creation.
//!
//! Both directions run on the blocking thread pool. Extraction refuses archives
//! containing any entry that would land outside the destination, including
//! symlinks whose target points outside it; the whole archive is checked
//! before the first byte is written.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::core::ToolupError;
use crate::utils::fs::{ensure_dir, replace_symlink};

const S_IFMT: u32 = 0o170_000;
const S_IFLNK: u32 = 0o120_000;

pub struct ArchiveExtractor;

impl ArchiveExtractor {
    /// Recreate the tree stored in `archive` below `dest`.
    ///
    /// Returns the number of files and symlinks written (directories not
    /// counted).
    pub async fn extract(archive: &Path, dest: &Path) -> Result<usize> {
        let archive = archive.to_path_buf();
        let dest = dest.to_path_buf();
        tokio::task::spawn_blocking(move || extract_blocking(&archive, &dest))
            .await
            .context("Extraction task panicked")?
    }
}

/// One validated entry: where it goes and, for a symlink, what it points at.
struct PlannedEntry {
    relative: PathBuf,
    link_target: Option<PathBuf>,
}

fn is_symlink_mode(mode: Option<u32>) -> bool {
    mode.is_some_and(|mode| mode & S_IFMT == S_IFLNK)
}

/// Whether a link stored at `entry` pointing at `target` resolves below the root.
fn link_stays_inside(entry: &Path, target: &Path) -> bool {
    let mut depth = entry
        .parent()
        .map_or(0, |parent| parent.components().filter(|c| matches!(c, Component::Normal(_))).count());
    for component in target.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => match depth.checked_sub(1) {
                Some(up) => depth = up,
                None => return false,
            },
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

fn extract_blocking(archive_path: &Path, dest: &Path) -> Result<usize> {
    let file =
        File::open(archive_path).with_context(|| ToolupError::file_system("open archive", archive_path))?;
    let mut archive =
        ZipArchive::new(file).with_context(|| ToolupError::file_system("read archive", archive_path))?;

    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry =
            archive.by_index(i).with_context(|| ToolupError::file_system("read archive", archive_path))?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(ToolupError::ArchiveEntryRejected {
                entry: entry.name().to_string(),
            }
            .into());
        };

        let link_target = if is_symlink_mode(entry.unix_mode()) {
            let mut target = String::new();
            entry
                .read_to_string(&mut target)
                .with_context(|| ToolupError::file_system("read archive", archive_path))?;
            let target = PathBuf::from(target);
            if !link_stays_inside(&relative, &target) {
                return Err(ToolupError::ArchiveEntryRejected {
                    entry: format!("{} -> {}", entry.name(), target.display()),
                }
                .into());
            }
            Some(target)
        } else {
            None
        };

        entries.push(PlannedEntry {
            relative,
            link_target,
        });
    }

    ensure_dir(dest)?;
    let mut written = 0;
    for (i, planned) in entries.iter().enumerate() {
        let out_path = dest.join(&planned.relative);

        if let Some(target) = &planned.link_target {
            if let Some(parent) = out_path.parent() {
                ensure_dir(parent)?;
            }
            replace_symlink(target, &out_path)?;
            written += 1;
            continue;
        }

        let mut entry =
            archive.by_index(i).with_context(|| ToolupError::file_system("read archive", archive_path))?;
        if entry.is_dir() {
            ensure_dir(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            ensure_dir(parent)?;
        }

        let mut out =
            File::create(&out_path).with_context(|| ToolupError::file_system("create file", &out_path))?;
        io::copy(&mut entry, &mut out).with_context(|| ToolupError::file_system("write file", &out_path))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out_path, fs::Permissions::from_mode(mode & 0o7777))
                .with_context(|| ToolupError::file_system("set permissions", &out_path))?;
        }
        written += 1;
    }

    debug!("Extracted {written} entries from {} into {}", archive_path.display(), dest.display());
    Ok(written)
}

/// Zip every file, directory and symlink below `src` into a new archive at
/// `dest`.
///
/// Entry names are relative to `src` with `/` separators. Directories,
/// including empty ones, are stored as directory entries; files are deflated;
/// symlinks are stored as links to their original target, not followed.
/// Paths in `exclude` (relative to `src`) are skipped together with everything
/// below them. Returns the number of file and symlink entries written.
pub async fn zip_directory(src: &Path, dest: &Path, exclude: Vec<PathBuf>) -> Result<usize> {
    let src = src.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || zip_directory_blocking(&src, &dest, &exclude))
        .await
        .context("Archive task panicked")?
}

fn zip_directory_blocking(src: &Path, dest: &Path, exclude: &[PathBuf]) -> Result<usize> {
    let file = File::create(dest).with_context(|| ToolupError::file_system("create archive", dest))?;
    let mut zip = ZipWriter::new(file);
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let walker = WalkDir::new(src).min_depth(1).sort_by_file_name().into_iter().filter_entry(|e| {
        e.path().strip_prefix(src).map(|rel| !exclude.iter().any(|x| rel == x)).unwrap_or(true)
    });

    let mut files = 0;
    for entry in walker {
        let entry = entry.with_context(|| ToolupError::file_system("read directory", src))?;
        let rel = entry.path().strip_prefix(src)?;
        let name = rel.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/");
        let file_type = entry.file_type();

        if file_type.is_dir() {
            zip.add_directory(format!("{name}/"), stored.unix_permissions(file_mode(entry.path())))?;
        } else if file_type.is_file() {
            zip.start_file(name, deflated.unix_permissions(file_mode(entry.path())))?;
            let mut input =
                File::open(entry.path()).with_context(|| ToolupError::file_system("read file", entry.path()))?;
            io::copy(&mut input, &mut zip).with_context(|| ToolupError::file_system("write archive", dest))?;
            files += 1;
        } else if file_type.is_symlink() {
            let target = fs::read_link(entry.path())
                .with_context(|| ToolupError::file_system("read symlink", entry.path()))?;
            zip.add_symlink(name, target.to_string_lossy().replace('\\', "/"), stored)?;
            files += 1;
        } else {
            return Err(anyhow::anyhow!("Unsupported file type"))
                .with_context(|| ToolupError::file_system("archive", entry.path()));
        }
    }

    zip.finish().with_context(|| ToolupError::file_system("write archive", dest))?;
    debug!("Archived {files} entries from {} into {}", src.display(), dest.display());
    Ok(files)
}

#[cfg(unix)]
fn file_mode(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).map(|m| m.permissions().mode() & 0o7777).unwrap_or(0o644)
}

#[cfg(not(unix))]
fn file_mode(path: &Path) -> u32 {
    if path.is_dir() { 0o755 } else { 0o644 }
}
