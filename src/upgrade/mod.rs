//! Self-update functionality for toolup.
//!
//! Upgrades replace a running executable, which no operating system allows a
//! process to do to itself. The work is therefore split across two processes:
//! the main process stages everything it can, then a detached helper performs
//! the final executable swap once the main process has exited. A full backup
//! of the installation is taken first and kept for a bounded retention window,
//! during which `toolup upgrade rollback` can restore it.
//!
//! # Architecture Overview
//!
//! ## Main process ([`SelfUpdater`])
//!
//! ```text
//! 1. MetadataFetcher     fetch the update descriptor (JSON)
//! 2. VersionGate         print notices, compare installed vs advertised
//! 3. ArtifactDownloader  artifact + <artifact>.checksum.txt into a temp dir
//! 4. ChecksumVerifier    SHA-256 must match before anything is extracted
//! 5. ArchiveExtractor    unpack, then fetch auxiliary assets next to it
//! 6. BackupManager       zip the installation into .update/<backup>
//! 7. InPlaceReplacer     copy support files, park the executable in .update/
//! 8. helper::launch      spawn the detached replace helper and exit
//! ```
//!
//! ## Replace helper ([`helper::SelfReplaceHelper`])
//!
//! ```text
//! WAIT_FOR_EXIT → VALIDATE_SOURCE → CHECK_WRITABLE → COPY → VERIFY_COPY
//!               → DELETE_SOURCE → SCHEDULE_CLEANUP → SELF_DELETE
//! ```
//!
//! Each transition is appended to a diagnostic log in the installation root.
//! The log is removed only on success, so a failed swap leaves a postmortem
//! behind and the installation in its pre-swap (still working) state.
//!
//! ## Rollback ([`RollbackOrchestrator`])
//!
//! Restores the retained backup over the installation, removes `.update/` and
//! cancels the pending expiry. A missing backup is a normal outcome, not an
//! error.
//!
//! # Installation Layout
//!
//! ```text
//! <root>/
//! ├── toolup                 live executable
//! ├── ...                    support files
//! ├── toolup-update.log      helper log (only after a failed swap)
//! └── .update/               hidden
//!     ├── toolup             new executable awaiting the helper
//!     ├── update             optional companion installer
//!     ├── toolup-backup.zip  retained backup
//!     ├── backup.json        backup metadata
//!     └── cleanup.json       expiry deadline (non-Windows)
//! ```
//!
//! # Module Structure
//!
//! - [`config`]: the immutable [`UpdaterConfig`] passed to every component
//! - [`descriptor`]: descriptor schema and fetching
//! - [`version_check`]: version gate and notice rendering
//! - [`download`]: sequential HTTP transfers
//! - [`verification`]: checksum sidecar parsing and SHA-256 verification
//! - [`archive`]: zip extraction and creation
//! - [`backup`]: snapshot and restore of the installation
//! - [`replacer`]: in-place copy of support files
//! - [`helper`]: the detached replace helper
//! - [`scheduler`]: deferred expiry of `.update/`
//! - [`rollback`]: restore on request
//! - [`self_updater`]: the main-process pipeline

pub mod archive;
pub mod backup;
pub mod config;
pub mod descriptor;
pub mod download;
pub mod helper;
pub mod replacer;
pub mod rollback;
pub mod scheduler;
pub mod self_updater;
pub mod verification;
pub mod version_check;


pub use config::UpdaterConfig;
pub use descriptor::{MetadataFetcher, UpdateDescriptor};
pub use helper::{HelperExit, PendingReplacement, SelfReplaceHelper};
pub use rollback::{RollbackOrchestrator, RollbackOutcome};
pub use self_updater::{SelfUpdater, UpgradeOutcome};
pub use verification::ChecksumVerifier;
pub use version_check::{GateDecision, NoticeStyle, VersionGate};
