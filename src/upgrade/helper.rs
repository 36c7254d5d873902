//! The detached process that swaps the executable after its parent exits.
//!
//! The main process cannot overwrite its own running image, so it stages the
//! new executable in `.update/`, serializes a [`PendingReplacement`] and spawns
//! a copy of itself as `toolup replace-helper --record <json>`. The helper walks
//! a fixed sequence of [`HelperState`]s, logging each transition, and exits with
//! a [`HelperExit`] code. Nobody is left to read an error message, so the log
//! file is the only report; it is removed only when every step succeeded.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::core::ToolupError;
use crate::upgrade::config::UpdaterConfig;
use crate::upgrade::scheduler::{CleanupScheduler, DeferredCleanup};
use crate::utils::fs::{ensure_dir, replace_file};
use crate::utils::platform::executable_file_name;

/// Prefix of the temporary directories holding helper binaries.
const HELPER_DIR_PREFIX: &str = "toolup_helper_";

/// Everything the helper needs, passed as a single JSON argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingReplacement {
    pub parent_pid: u32,
    pub staged_executable: PathBuf,
    pub live_executable: PathBuf,
    pub update_dir: PathBuf,
    pub log_path: PathBuf,
    pub retention_days: u32,
    pub task_name: String,
    pub poll_interval_ms: u64,
}

impl PendingReplacement {
    pub fn new(config: &UpdaterConfig, install_root: &Path, parent_pid: u32) -> Self {
        Self {
            parent_pid,
            staged_executable: config.staged_executable(install_root),
            live_executable: config.live_executable(install_root),
            update_dir: config.update_dir(install_root),
            log_path: config.helper_log(install_root),
            retention_days: config.retention_days,
            task_name: config.cleanup_task_name.clone(),
            poll_interval_ms: config.poll_interval_ms,
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(value: &str) -> Result<Self> {
        serde_json::from_str(value).map_err(|e| {
            ToolupError::ParseError {
                subject: "replacement record".to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

/// Steps of the helper, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperState {
    WaitForExit,
    ValidateSource,
    CheckWritable,
    Copy,
    VerifyCopy,
    DeleteSource,
    ScheduleCleanup,
    SelfDelete,
}

impl HelperState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::WaitForExit => "WAIT_FOR_EXIT",
            Self::ValidateSource => "VALIDATE_SOURCE",
            Self::CheckWritable => "CHECK_WRITABLE",
            Self::Copy => "COPY",
            Self::VerifyCopy => "VERIFY_COPY",
            Self::DeleteSource => "DELETE_SOURCE",
            Self::ScheduleCleanup => "SCHEDULE_CLEANUP",
            Self::SelfDelete => "SELF_DELETE",
        }
    }
}

impl fmt::Display for HelperState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Process exit status of the helper. Each failure state has its own code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperExit {
    Success,
    InvalidRecord,
    SourceMissing,
    DestinationNotWritable,
    CopyFailed,
    CopyMissing,
    SourceNotDeleted,
    ScheduleFailed,
}

impl HelperExit {
    pub const fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::InvalidRecord => 2,
            Self::SourceMissing => 10,
            Self::DestinationNotWritable => 11,
            Self::CopyFailed => 12,
            Self::CopyMissing => 13,
            Self::SourceNotDeleted => 14,
            Self::ScheduleFailed => 15,
        }
    }
}

/// Answers whether a process is still alive.
pub trait ProcessWatcher: Send + Sync {
    fn is_running(&self, pid: u32) -> bool;
}

/// Looks the PID up in the OS process table.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemWatcher;

impl ProcessWatcher for SystemWatcher {
    fn is_running(&self, pid: u32) -> bool {
        use sysinfo::{Pid, ProcessesToUpdate, System};

        let pid = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system.process(pid).is_some()
    }
}

/// Append-only, timestamped transition log.
pub struct HelperLog {
    path: PathBuf,
}

impl HelperLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line. Logging failures are not fatal to the helper.
    pub fn record(&self, state: HelperState, message: &str) {
        let line = format!("{} [{}] {}\n", Utc::now().to_rfc3339(), state, message);
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()));
        if let Err(e) = written {
            debug!("Could not write helper log {}: {e}", self.path.display());
        }
    }
}

/// Runs the swap described by a [`PendingReplacement`].
pub struct SelfReplaceHelper {
    record: PendingReplacement,
    log: HelperLog,
    watcher: Box<dyn ProcessWatcher>,
    scheduler: Box<dyn CleanupScheduler>,
    copier: fn(&Path, &Path) -> Result<()>,
    self_delete: bool,
}

impl SelfReplaceHelper {
    pub fn new(
        record: PendingReplacement,
        watcher: Box<dyn ProcessWatcher>,
        scheduler: Box<dyn CleanupScheduler>,
    ) -> Self {
        let log = HelperLog::new(record.log_path.clone());
        Self {
            record,
            log,
            watcher,
            scheduler,
            copier: replace_file,
            self_delete: true,
        }
    }

    #[cfg(test)]
    fn with_copier(mut self, copier: fn(&Path, &Path) -> Result<()>) -> Self {
        self.copier = copier;
        self
    }

    /// Leave the running binary in place on success (used when the helper
    /// runs in-process, as in tests).
    #[must_use]
    pub fn keep_own_binary(mut self) -> Self {
        self.self_delete = false;
        self
    }

    fn fail(&self, state: HelperState, exit: HelperExit, reason: impl Into<String>) -> HelperExit {
        let failure = ToolupError::HelperFailure {
            state: state.label().to_string(),
            reason: reason.into(),
        };
        self.log.record(state, &format!("FAILED: {failure} (exit code {})", exit.code()));
        error!("{failure}");
        exit
    }

    /// Run every state in order, stopping at the first failure.
    ///
    /// The staged source is only deleted after the copy has been verified, so
    /// any failure up to `VERIFY_COPY` leaves it in place for a manual rerun.
    pub fn run(&self) -> HelperExit {
        let record = &self.record;

        self.log.record(HelperState::WaitForExit, &format!("waiting for process {}", record.parent_pid));
        let interval = Duration::from_millis(record.poll_interval_ms);
        while self.watcher.is_running(record.parent_pid) {
            std::thread::sleep(interval);
        }
        self.log.record(HelperState::WaitForExit, "parent exited");

        self.log.record(
            HelperState::ValidateSource,
            &format!("checking {}", record.staged_executable.display()),
        );
        if !record.staged_executable.is_file() {
            return self.fail(
                HelperState::ValidateSource,
                HelperExit::SourceMissing,
                format!("{} does not exist", record.staged_executable.display()),
            );
        }

        let destination_dir = record.live_executable.parent().unwrap_or_else(|| Path::new("."));
        self.log.record(HelperState::CheckWritable, &format!("checking {}", destination_dir.display()));
        if let Err(e) = check_writable(destination_dir) {
            return self.fail(HelperState::CheckWritable, HelperExit::DestinationNotWritable, format!("{e:#}"));
        }

        self.log.record(
            HelperState::Copy,
            &format!(
                "{} -> {}",
                record.staged_executable.display(),
                record.live_executable.display()
            ),
        );
        if let Err(e) = (self.copier)(&record.staged_executable, &record.live_executable) {
            return self.fail(HelperState::Copy, HelperExit::CopyFailed, format!("{e:#}"));
        }

        self.log.record(HelperState::VerifyCopy, &format!("checking {}", record.live_executable.display()));
        if !record.live_executable.is_file() {
            return self.fail(
                HelperState::VerifyCopy,
                HelperExit::CopyMissing,
                format!("{} is missing after copy", record.live_executable.display()),
            );
        }

        self.log.record(
            HelperState::DeleteSource,
            &format!("removing {}", record.staged_executable.display()),
        );
        if let Err(e) = std::fs::remove_file(&record.staged_executable) {
            self.log.record(HelperState::DeleteSource, &format!("remove failed: {e}"));
        }
        if record.staged_executable.exists() {
            return self.fail(
                HelperState::DeleteSource,
                HelperExit::SourceNotDeleted,
                format!("{} still exists", record.staged_executable.display()),
            );
        }

        let cleanup = DeferredCleanup::new(
            record.task_name.clone(),
            record.update_dir.clone(),
            chrono::Duration::days(i64::from(record.retention_days)),
        );
        self.log.record(
            HelperState::ScheduleCleanup,
            &format!("removing {} at {}", cleanup.target.display(), cleanup.due_at),
        );
        if let Err(e) = self.scheduler.register(&cleanup) {
            return self.fail(HelperState::ScheduleCleanup, HelperExit::ScheduleFailed, format!("{e:#}"));
        }

        self.log.record(HelperState::SelfDelete, "done");
        if let Err(e) = std::fs::remove_file(self.log.path()) {
            debug!("Could not remove helper log: {e}");
        }
        if self.self_delete {
            remove_own_binary();
        }

        info!("Replaced {}", record.live_executable.display());
        HelperExit::Success
    }
}

fn check_writable(dir: &Path) -> Result<()> {
    let scratch = dir.join(format!(".toolup-write-check-{}", uuid::Uuid::new_v4().simple()));
    std::fs::write(&scratch, b"")
        .with_context(|| format!("{} is not writable", dir.display()))?;
    std::fs::remove_file(&scratch)
        .with_context(|| format!("Failed to remove scratch file {}", scratch.display()))?;
    Ok(())
}

/// Delete the helper binary and its temporary directory.
///
/// Only copies made by [`launch`] are removed; a helper started by hand from
/// the installation leaves its own executable alone.
fn remove_own_binary() {
    let Ok(exe) = std::env::current_exe() else {
        return;
    };
    let Some(dir) = exe
        .parent()
        .filter(|dir| dir.file_name().is_some_and(|name| name.to_string_lossy().starts_with(HELPER_DIR_PREFIX)))
    else {
        debug!("{} is not a launched helper copy, keeping it", exe.display());
        return;
    };
    if let Err(e) = self_replace::self_delete() {
        warn!("Could not delete helper binary: {e}");
        return;
    }
    // Fails on Windows while the image is still mapped
    let _ = std::fs::remove_dir_all(dir);
}

/// Spawn the helper as a detached copy of the running binary.
///
/// Returns the helper's process id. The helper outlives this process: it gets
/// null stdio and, on Unix, its own process group.
pub fn launch(record: &PendingReplacement) -> Result<u32> {
    let current = std::env::current_exe().context("Failed to locate the running executable")?;
    let dir = std::env::temp_dir().join(format!("{HELPER_DIR_PREFIX}{}", uuid::Uuid::new_v4().simple()));
    ensure_dir(&dir)?;
    let helper = dir.join(executable_file_name("toolup-helper"));
    std::fs::copy(&current, &helper)
        .with_context(|| format!("Failed to copy helper to {}", helper.display()))?;

    let mut command = Command::new(&helper);
    command
        .arg("replace-helper")
        .arg("--record")
        .arg(record.encode()?)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const DETACHED_PROCESS: u32 = 0x0000_0008;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
    }

    let child = command.spawn().with_context(|| format!("Failed to start {}", helper.display()))?;
    debug!("Launched replace helper {} as pid {}", helper.display(), child.id());
    Ok(child.id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::InstallFixture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Reports the parent alive for a fixed number of polls.
    struct CountdownWatcher {
        remaining: AtomicUsize,
        polls: Arc<AtomicUsize>,
    }

    impl CountdownWatcher {
        fn new(alive_polls: usize) -> (Self, Arc<AtomicUsize>) {
            let polls = Arc::new(AtomicUsize::new(0));
            let watcher = Self {
                remaining: AtomicUsize::new(alive_polls),
                polls: Arc::clone(&polls),
            };
            (watcher, polls)
        }
    }

    impl ProcessWatcher for CountdownWatcher {
        fn is_running(&self, _pid: u32) -> bool {
            self.polls.fetch_add(1, Ordering::SeqCst);
            self.remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    #[derive(Clone, Default)]
    struct RecordingScheduler {
        registered: Arc<Mutex<Vec<DeferredCleanup>>>,
        fail: bool,
    }

    impl CleanupScheduler for RecordingScheduler {
        fn register(&self, cleanup: &DeferredCleanup) -> Result<()> {
            if self.fail {
                anyhow::bail!("scheduler unavailable");
            }
            self.registered.lock().unwrap().push(cleanup.clone());
            Ok(())
        }

        fn cancel(&self, _task_name: &str, _target: &Path) -> Result<()> {
            Ok(())
        }
    }

    fn staged_fixture() -> (InstallFixture, PendingReplacement) {
        let fixture = InstallFixture::new();
        let exe = fixture.config.executable_file_name();
        fixture.write(&format!(".update/{exe}"), b"new executable");
        let mut record = PendingReplacement::new(&fixture.config, fixture.root(), 4242);
        record.poll_interval_ms = 1;
        (fixture, record)
    }

    fn helper(record: PendingReplacement, scheduler: RecordingScheduler) -> SelfReplaceHelper {
        let (watcher, _) = CountdownWatcher::new(0);
        SelfReplaceHelper::new(record, Box::new(watcher), Box::new(scheduler)).keep_own_binary()
    }

    #[test]
    fn test_record_round_trip() {
        let (_fixture, record) = staged_fixture();
        let decoded = PendingReplacement::decode(&record.encode().unwrap()).unwrap();
        assert_eq!(decoded, record);

        let err = PendingReplacement::decode("{\"parent_pid\": 1}").unwrap_err();
        assert!(matches!(err.downcast_ref::<ToolupError>(), Some(ToolupError::ParseError { .. })));
    }

    #[test]
    fn test_successful_swap() {
        let (fixture, record) = staged_fixture();
        let scheduler = RecordingScheduler::default();

        let exit = helper(record.clone(), scheduler.clone()).run();

        assert_eq!(exit, HelperExit::Success);
        assert_eq!(std::fs::read(&record.live_executable).unwrap(), b"new executable");
        assert!(!record.staged_executable.exists());
        assert!(!record.log_path.exists());

        let registered = scheduler.registered.lock().unwrap();
        assert_eq!(registered.len(), 1);
        assert_eq!(registered[0].target, fixture.update_dir());
        assert_eq!(registered[0].task_name, "RemoveToolupBackup");
        assert!(registered[0].due_at > Utc::now() + chrono::Duration::days(6));
    }

    #[test]
    fn test_waits_for_parent_exit() {
        let (_fixture, record) = staged_fixture();
        let (watcher, polls) = CountdownWatcher::new(3);

        let exit = SelfReplaceHelper::new(record, Box::new(watcher), Box::new(RecordingScheduler::default()))
            .keep_own_binary()
            .run();

        assert_eq!(exit, HelperExit::Success);
        assert_eq!(polls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_missing_source_leaves_destination_untouched() {
        let (fixture, record) = staged_fixture();
        std::fs::remove_file(&record.staged_executable).unwrap();

        let exit = helper(record.clone(), RecordingScheduler::default()).run();

        assert_eq!(exit, HelperExit::SourceMissing);
        assert_ne!(exit.code(), 0);
        assert_eq!(fixture.read(&fixture.config.executable_file_name()), b"old executable");
        let log = std::fs::read_to_string(&record.log_path).unwrap();
        assert!(log.contains("[VALIDATE_SOURCE] FAILED"));
    }

    #[test]
    fn test_unwritable_destination() {
        let (fixture, mut record) = staged_fixture();
        record.live_executable = fixture.path("missing-dir").join("toolup");

        let exit = helper(record.clone(), RecordingScheduler::default()).run();

        assert_eq!(exit, HelperExit::DestinationNotWritable);
        assert!(record.staged_executable.exists());
    }

    #[test]
    fn test_copy_failure_keeps_source() {
        let (fixture, mut record) = staged_fixture();
        // Renaming a file over a non-empty directory fails on every platform
        let blocker = fixture.path("blocker");
        std::fs::create_dir_all(blocker.join("inner")).unwrap();
        record.live_executable = blocker;

        let exit = helper(record.clone(), RecordingScheduler::default()).run();

        assert_eq!(exit, HelperExit::CopyFailed);
        assert!(record.staged_executable.exists());

        let log = std::fs::read_to_string(&record.log_path).unwrap();
        let mut last = 0;
        for label in ["WAIT_FOR_EXIT", "VALIDATE_SOURCE", "CHECK_WRITABLE", "[COPY]"] {
            let at = log.find(label).unwrap_or_else(|| panic!("{label} missing from log"));
            assert!(at >= last);
            last = at;
        }
        assert!(!log.contains("DELETE_SOURCE"));
    }

    #[test]
    fn test_source_survives_failed_verification() {
        let (_fixture, record) = staged_fixture();
        // A copy that reports success without producing the destination
        std::fs::remove_file(&record.live_executable).unwrap();

        let exit = helper(record.clone(), RecordingScheduler::default())
            .with_copier(|_, _| Ok(()))
            .run();

        assert_eq!(exit, HelperExit::CopyMissing);
        assert_eq!(std::fs::read(&record.staged_executable).unwrap(), b"new executable");
        assert!(!record.live_executable.exists());

        let log = std::fs::read_to_string(&record.log_path).unwrap();
        assert!(log.contains("[VERIFY_COPY] FAILED"));
        assert!(!log.contains("DELETE_SOURCE"));
    }

    #[test]
    fn test_schedule_failure_is_reported() {
        let (_fixture, record) = staged_fixture();
        let scheduler = RecordingScheduler {
            fail: true,
            ..RecordingScheduler::default()
        };

        let exit = helper(record.clone(), scheduler).run();

        assert_eq!(exit, HelperExit::ScheduleFailed);
        // The swap itself already happened
        assert_eq!(std::fs::read(&record.live_executable).unwrap(), b"new executable");
        assert!(record.log_path.exists());
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let exits = [
            HelperExit::Success,
            HelperExit::InvalidRecord,
            HelperExit::SourceMissing,
            HelperExit::DestinationNotWritable,
            HelperExit::CopyFailed,
            HelperExit::CopyMissing,
            HelperExit::SourceNotDeleted,
            HelperExit::ScheduleFailed,
        ];
        let mut codes: Vec<i32> = exits.iter().map(|e| e.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), exits.len());
    }
}
