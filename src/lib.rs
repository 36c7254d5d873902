//! toolup - safe self-update for an installed command-line tool
//!
//! toolup upgrades its own installation in place. It fetches a remote update
//! descriptor, verifies and stages the new build, keeps a full backup of the
//! installation for a bounded retention window, and hands the final swap of
//! the running executable to a detached helper process.
//!
//! # Modules
//!
//! - [`upgrade`] - the update pipeline, replace helper and rollback
//! - [`cli`] - clap command definitions
//! - [`config`] - the global configuration file
//! - [`core`] - error taxonomy and user-facing error rendering
//! - [`utils`] - file replacement, temporary directories, platform capabilities
//!
//! # Example
//!
//! ```rust,no_run
//! use toolup_cli::upgrade::{SelfUpdater, UpdaterConfig, UpgradeOutcome};
//! use toolup_cli::utils::NativePlatform;
//! use std::path::Path;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = UpdaterConfig::default();
//! let platform = NativePlatform;
//! let updater = SelfUpdater::new(&config, Path::new("/opt/toolup"), &platform);
//!
//! match updater.stage(&mut std::io::stdout()).await? {
//!     UpgradeOutcome::UpToDate { .. } => println!("nothing to do"),
//!     UpgradeOutcome::Staged(record) => {
//!         toolup_cli::upgrade::helper::launch(&record)?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod upgrade;
pub mod utils;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
