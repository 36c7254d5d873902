use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::upgrade::backup::BackupManager;
use crate::upgrade::config::UpdaterConfig;
use crate::upgrade::scheduler::CleanupScheduler;
use crate::upgrade::self_updater::query_version;
use crate::utils::fs::remove_dir_all;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// No retained backup: none was ever made, or it has expired.
    Unavailable,
    Restored {
        files: usize,
        /// Output of the restored executable's `version`, when it could be run.
        version: Option<String>,
    },
}

/// Restores the installation from the retained backup.
///
/// Restoration overwrites the live executable, so it must be started from a
/// different copy of the tool than the one being restored.
pub struct RollbackOrchestrator<'a> {
    config: &'a UpdaterConfig,
    install_root: PathBuf,
    scheduler: &'a dyn CleanupScheduler,
}

impl<'a> RollbackOrchestrator<'a> {
    pub fn new(
        config: &'a UpdaterConfig,
        install_root: &Path,
        scheduler: &'a dyn CleanupScheduler,
    ) -> Self {
        Self {
            config,
            install_root: install_root.to_path_buf(),
            scheduler,
        }
    }

    pub async fn run(&self) -> Result<RollbackOutcome> {
        let backups = BackupManager::new(self.config, &self.install_root);
        if !backups.backup_exists() {
            info!("No backup at {}", backups.backup_path().display());
            return Ok(RollbackOutcome::Unavailable);
        }

        if let Some(archive) = backups.metadata().await? {
            if archive.is_expired(Utc::now()) {
                info!("Backup from {} is past its retention deadline, restoring anyway", archive.created_at);
            } else {
                debug!("Backup from {} retained until {}", archive.created_at, archive.retention_deadline);
            }
        }

        let files = backups.restore_backup().await.context("Failed to restore backup")?;

        let update_dir = self.config.update_dir(&self.install_root);
        remove_dir_all(&update_dir)?;
        if let Err(e) = self.scheduler.cancel(&self.config.cleanup_task_name, &update_dir) {
            debug!("No scheduled cleanup to cancel: {e:#}");
        }

        let exe = self.config.live_executable(&self.install_root);
        let version = match query_version(&exe).await {
            Ok(version) => Some(version),
            Err(e) => {
                warn!("Could not query restored version: {e:#}");
                None
            }
        };

        Ok(RollbackOutcome::Restored {
            files,
            version,
        })
    }
}
