//! Deferred expiry of the `.update/` directory.
//!
//! After a successful swap the helper registers a one-time cleanup that removes
//! the staging directory (and with it the backup) once the retention window
//! has passed. Rollback cancels it. On Windows the OS task scheduler runs the
//! cleanup; elsewhere a deadline record inside the directory is honoured by the
//! sweep that runs before every `upgrade` command.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::utils::fs::{remove_dir_all, replace_file};

/// Deadline record written by [`DeadlineFileScheduler`].
pub const CLEANUP_RECORD_FILE: &str = "cleanup.json";

/// A one-time removal of `target` at `due_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredCleanup {
    pub task_name: String,
    pub target: PathBuf,
    pub due_at: DateTime<Utc>,
}

impl DeferredCleanup {
    pub fn new(task_name: impl Into<String>, target: PathBuf, delay: chrono::Duration) -> Self {
        Self {
            task_name: task_name.into(),
            target,
            due_at: Utc::now() + delay,
        }
    }
}

/// Register and cancel deferred cleanups.
pub trait CleanupScheduler: Send + Sync {
    fn register(&self, cleanup: &DeferredCleanup) -> Result<()>;

    /// Cancel the cleanup registered under `task_name` for `target`.
    fn cancel(&self, task_name: &str, target: &Path) -> Result<()>;
}

/// Keeps the deadline in `<target>/cleanup.json`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeadlineFileScheduler;

impl DeadlineFileScheduler {
    /// Remove `target` if it holds a cleanup record whose deadline has passed.
    ///
    /// Returns whether the directory was removed. A missing or unreadable
    /// record leaves the directory alone.
    pub fn sweep_due(target: &Path, now: DateTime<Utc>) -> Result<bool> {
        let record_path = target.join(CLEANUP_RECORD_FILE);
        if !record_path.is_file() {
            return Ok(false);
        }

        let content = std::fs::read(&record_path)
            .with_context(|| format!("Failed to read {}", record_path.display()))?;
        let cleanup: DeferredCleanup = match serde_json::from_slice(&content) {
            Ok(cleanup) => cleanup,
            Err(e) => {
                debug!("Ignoring unreadable cleanup record {}: {e}", record_path.display());
                return Ok(false);
            }
        };

        if now < cleanup.due_at {
            debug!("Cleanup of {} due at {}", target.display(), cleanup.due_at);
            return Ok(false);
        }

        info!("Retention window elapsed, removing {}", target.display());
        remove_dir_all(target)?;
        Ok(true)
    }
}

impl CleanupScheduler for DeadlineFileScheduler {
    fn register(&self, cleanup: &DeferredCleanup) -> Result<()> {
        let record_path = cleanup.target.join(CLEANUP_RECORD_FILE);
        let staged = cleanup.target.join(format!(".{CLEANUP_RECORD_FILE}.new"));
        std::fs::write(&staged, serde_json::to_vec_pretty(cleanup)?)
            .with_context(|| format!("Failed to write {}", staged.display()))?;
        let result = replace_file(&staged, &record_path);
        let _ = std::fs::remove_file(&staged);
        result?;
        debug!("Registered cleanup of {} at {}", cleanup.target.display(), cleanup.due_at);
        Ok(())
    }

    fn cancel(&self, _task_name: &str, target: &Path) -> Result<()> {
        let record_path = target.join(CLEANUP_RECORD_FILE);
        if record_path.exists() {
            std::fs::remove_file(&record_path)
                .with_context(|| format!("Failed to remove {}", record_path.display()))?;
        }
        Ok(())
    }
}

/// One-time task in the Windows task scheduler.
///
/// The task runs a small script that removes the target directory and then
/// deletes the task itself.
#[cfg(windows)]
#[derive(Debug, Default, Clone, Copy)]
pub struct SchtasksScheduler;

#[cfg(windows)]
impl SchtasksScheduler {
    fn script_path(task_name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("{task_name}.cmd"))
    }

    fn run(args: &[&str]) -> Result<()> {
        let output = std::process::Command::new("schtasks")
            .args(args)
            .output()
            .context("Failed to run schtasks")?;
        if !output.status.success() {
            anyhow::bail!(
                "schtasks {} failed: {}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

#[cfg(windows)]
impl CleanupScheduler for SchtasksScheduler {
    fn register(&self, cleanup: &DeferredCleanup) -> Result<()> {
        let script = Self::script_path(&cleanup.task_name);
        let body = format!(
            "@echo off\r\nrmdir /s /q \"{}\"\r\nschtasks /delete /tn \"{}\" /f\r\ndel \"%~f0\"\r\n",
            cleanup.target.display(),
            cleanup.task_name
        );
        std::fs::write(&script, body)
            .with_context(|| format!("Failed to write {}", script.display()))?;

        let local = cleanup.due_at.with_timezone(&chrono::Local);
        let date = local.format("%m/%d/%Y").to_string();
        let action = format!("\"{}\"", script.display());
        Self::run(&[
            "/create",
            "/tn",
            &cleanup.task_name,
            "/tr",
            &action,
            "/sc",
            "once",
            "/sd",
            &date,
            "/st",
            "12:00",
            "/f",
        ])?;
        info!("Scheduled task {} to remove {} on {date}", cleanup.task_name, cleanup.target.display());
        Ok(())
    }

    fn cancel(&self, task_name: &str, _target: &Path) -> Result<()> {
        Self::run(&["/delete", "/tn", task_name, "/f"])?;
        let _ = std::fs::remove_file(Self::script_path(task_name));
        Ok(())
    }
}

/// The scheduler for the current platform.
pub fn native_scheduler() -> Box<dyn CleanupScheduler> {
    #[cfg(windows)]
    {
        Box::new(SchtasksScheduler)
    }
    #[cfg(not(windows))]
    {
        Box::new(DeadlineFileScheduler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cleanup_for(target: &Path, days: i64) -> DeferredCleanup {
        DeferredCleanup::new("RemoveToolupBackup", target.to_path_buf(), chrono::Duration::days(days))
    }

    #[test]
    fn test_sweep_respects_deadline() {
        let temp = tempfile::TempDir::new().unwrap();
        let target = temp.path().join(".update");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("toolup-backup.zip"), b"zip").unwrap();

        let cleanup = cleanup_for(&target, 7);
        DeadlineFileScheduler.register(&cleanup).unwrap();

        let now = Utc::now();
        assert!(!DeadlineFileScheduler::sweep_due(&target, now + chrono::Duration::days(3)).unwrap());
        assert!(target.join("toolup-backup.zip").exists());

        assert!(DeadlineFileScheduler::sweep_due(&target, now + chrono::Duration::days(8)).unwrap());
        assert!(!target.exists());
    }

    #[test]
    fn test_cancel_removes_record() {
        let temp = tempfile::TempDir::new().unwrap();
        let target = temp.path().join(".update");
        std::fs::create_dir_all(&target).unwrap();

        DeadlineFileScheduler.register(&cleanup_for(&target, 0)).unwrap();
        DeadlineFileScheduler.cancel("RemoveToolupBackup", &target).unwrap();

        assert!(!DeadlineFileScheduler::sweep_due(&target, Utc::now()).unwrap());
        assert!(target.exists());

        // Cancelling twice is harmless
        DeadlineFileScheduler.cancel("RemoveToolupBackup", &target).unwrap();
    }

    #[test]
    fn test_sweep_without_directory() {
        let temp = tempfile::TempDir::new().unwrap();
        assert!(!DeadlineFileScheduler::sweep_due(&temp.path().join("absent"), Utc::now()).unwrap());
    }

    #[test]
    fn test_record_is_json() {
        let temp = tempfile::TempDir::new().unwrap();
        let cleanup = cleanup_for(temp.path(), 7);
        DeadlineFileScheduler.register(&cleanup).unwrap();

        let stored: DeferredCleanup =
            serde_json::from_slice(&std::fs::read(temp.path().join(CLEANUP_RECORD_FILE)).unwrap())
                .unwrap();
        assert_eq!(stored, cleanup);
    }
}
