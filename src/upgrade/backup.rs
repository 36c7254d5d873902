use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::core::ToolupError;
use crate::upgrade::archive::{ArchiveExtractor, zip_directory};
use crate::upgrade::config::UpdaterConfig;
use crate::utils::fs::{TempDir, copy_dir_contents, ensure_dir, replace_file_async};

/// Name of the metadata record stored next to the backup archive.
pub const BACKUP_METADATA_FILE: &str = "backup.json";

/// The single retained snapshot of an installation.
///
/// Persisted as `.update/backup.json`. A backup past its
/// `retention_deadline` is still restorable until the deferred cleanup
/// actually removes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupArchive {
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub retention_deadline: DateTime<Utc>,
}

impl BackupArchive {
    pub fn new(path: PathBuf, created_at: DateTime<Utc>, retention: chrono::Duration) -> Self {
        Self {
            path,
            created_at,
            retention_deadline: created_at + retention,
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.retention_deadline
    }
}

/// Snapshots and restores a whole installation directory.
///
/// `BackupManager` protects an upgrade by zipping the complete installation
/// root before anything in it is overwritten. The archive is a full,
/// self-contained snapshot, so rollback never depends on earlier state.
///
/// # Backup Strategy
///
/// - Every file and directory below the root is archived with its relative
///   path. Empty directories are kept as stored directory entries and
///   symlinks are stored as links, never followed.
/// - The `.update/` subdirectory and the helper log are left out, so a backup
///   never nests the previous one.
/// - The archive is built in a temporary directory and then renamed into
///   `.update/<backup_file_name>`, superseding any earlier backup.
///
/// # Cross-Platform Considerations
///
/// Restoring copies files over the live installation. On Windows a file may
/// be briefly locked by another process, so restoration is retried up to three
/// times with one-second pauses.
///
/// # Examples
///
/// ```rust,no_run
/// use toolup_cli::upgrade::backup::BackupManager;
/// use toolup_cli::upgrade::config::UpdaterConfig;
/// use std::path::Path;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = UpdaterConfig::default();
/// let manager = BackupManager::new(&config, Path::new("/opt/toolup"));
///
/// let backup = manager.create_backup().await?;
/// println!("Backup kept until {}", backup.retention_deadline);
///
/// // ... later, from a separate copy of the tool ...
/// if manager.backup_exists() {
///     manager.restore_backup().await?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct BackupManager<'a> {
    config: &'a UpdaterConfig,
    install_root: PathBuf,
}

impl<'a> BackupManager<'a> {
    pub fn new(config: &'a UpdaterConfig, install_root: &Path) -> Self {
        Self {
            config,
            install_root: install_root.to_path_buf(),
        }
    }

    /// Relative paths below the root that never go into a backup.
    fn excluded(&self) -> Vec<PathBuf> {
        vec![PathBuf::from(&self.config.update_dir_name), PathBuf::from(&self.config.helper_log_name)]
    }

    /// Snapshot the installation root into the retained backup archive.
    ///
    /// # Errors
    ///
    /// Fails if the root cannot be walked, the archive cannot be written, or
    /// the archive cannot be moved into `.update/`. Any earlier backup is left
    /// untouched in that case.
    pub async fn create_backup(&self) -> Result<BackupArchive> {
        if !self.install_root.is_dir() {
            return Err(anyhow!("installation directory does not exist"))
                .with_context(|| ToolupError::file_system("create backup", &self.install_root));
        }

        let staging = TempDir::new("backup")?;
        let staged_archive = staging.path().join(&self.config.backup_file_name);
        let files = zip_directory(&self.install_root, &staged_archive, self.excluded())
            .await
            .with_context(|| ToolupError::file_system("create backup", &self.install_root))?;

        let backup_path = self.backup_path();
        info!("Creating backup at {}", backup_path.display());
        replace_file_async(&staged_archive, &backup_path)
            .await
            .with_context(|| ToolupError::file_system("store backup", &backup_path))?;

        let archive = BackupArchive::new(backup_path, Utc::now(), self.config.retention());
        let record = staging.path().join(BACKUP_METADATA_FILE);
        fs::write(&record, serde_json::to_vec_pretty(&archive)?)
            .await
            .with_context(|| ToolupError::file_system("write backup metadata", &record))?;
        replace_file_async(&record, &self.metadata_path()).await?;

        info!("Backup of {files} file(s) created, retained until {}", archive.retention_deadline);
        Ok(archive)
    }

    /// Restore the installation root from the retained backup.
    ///
    /// Extracts the archive into a temporary directory and copies its
    /// contents over the root, overwriting in place. Files that exist in the
    /// root but not in the backup are left alone. Returns the number of files
    /// restored.
    ///
    /// # Errors
    ///
    /// Fails if there is no backup, or if every restore attempt fails.
    pub async fn restore_backup(&self) -> Result<usize> {
        let backup_path = self.backup_path();
        if !backup_path.exists() {
            return Err(anyhow!("no backup archive"))
                .with_context(|| ToolupError::file_system("restore backup", &backup_path));
        }

        warn!("Restoring from backup at {}", backup_path.display());

        let mut attempts = 0;
        const MAX_ATTEMPTS: u32 = 3;

        loop {
            match self.attempt_restore(&backup_path).await {
                Ok(restored) => {
                    info!("Successfully restored {restored} file(s) from backup");
                    return Ok(restored);
                }
                Err(e) if attempts < MAX_ATTEMPTS - 1 => {
                    warn!("Restore attempt {} failed: {e:#}. Retrying...", attempts + 1);
                    tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
                    attempts += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt_restore(&self, backup_path: &Path) -> Result<usize> {
        let scratch = TempDir::new("restore")?;
        ArchiveExtractor::extract(backup_path, scratch.path())
            .await
            .with_context(|| ToolupError::file_system("extract backup", backup_path))?;

        ensure_dir(&self.install_root)?;
        let update_dir = Path::new(&self.config.update_dir_name);
        copy_dir_contents(scratch.path(), &self.install_root, |rel| rel == update_dir).await
    }

    /// The metadata of the retained backup, if it was recorded.
    pub async fn metadata(&self) -> Result<Option<BackupArchive>> {
        let path = self.metadata_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read(&path)
            .await
            .with_context(|| ToolupError::file_system("read backup metadata", &path))?;
        match serde_json::from_slice(&content) {
            Ok(archive) => Ok(Some(archive)),
            Err(e) => {
                debug!("Ignoring unreadable backup metadata: {e}");
                Ok(None)
            }
        }
    }

    pub fn backup_exists(&self) -> bool {
        self.backup_path().exists()
    }

    pub fn backup_path(&self) -> PathBuf {
        self.config.backup_path(&self.install_root)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.config.update_dir(&self.install_root).join(BACKUP_METADATA_FILE)
    }
}
