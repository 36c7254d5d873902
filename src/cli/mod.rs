//! Command-line interface for toolup.
//!
//! ```text
//! toolup [--verbose|-v] [--quiet|-q] [--config PATH] [--install-dir DIR] <COMMAND>
//!
//!   upgrade              fetch, verify and stage the latest build
//!   upgrade rollback     restore the installation from the retained backup
//!   version              print the bare version
//! ```
//!
//! A hidden `replace-helper` subcommand is the entry point of the detached
//! process that swaps the executable; it is never meant to be typed.
//!
//! # Global Options
//!
//! - `--verbose` - debug logging, directory listings and test runs of the new build
//! - `--quiet` - no logging at all
//! - `--config` - configuration file (also `TOOLUP_CONFIG`)
//! - `--install-dir` - installation root; defaults to the directory of the running executable
//!
//! `RUST_LOG` always takes precedence over `--verbose` and `--quiet`.

mod helper;
mod upgrade;

pub use helper::ReplaceHelperArgs;
pub use upgrade::{UpgradeAction, UpgradeArgs};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::config::GlobalConfig;
use crate::upgrade::UpdaterConfig;
use crate::utils::platform::{NativePlatform, Platform};

/// Main CLI structure for toolup.
#[derive(Parser)]
#[command(
    name = "toolup",
    about = "Safely upgrade toolup in place, with backup and rollback",
    version,
    author
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output: debug logs, staged file listings and test runs
    /// of the new executable.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all logging. Progress messages and errors are still printed.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the configuration file.
    #[arg(long, global = true, env = "TOOLUP_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Installation root to upgrade or roll back.
    #[arg(long, global = true, value_name = "DIR")]
    install_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Upgrade to the latest version, or roll back the last upgrade.
    Upgrade(UpgradeArgs),

    /// Print the version of this executable.
    Version,

    #[command(hide = true)]
    ReplaceHelper(ReplaceHelperArgs),
}

/// Settings resolved from global flags and the configuration file.
pub struct CliContext {
    pub config: UpdaterConfig,
    pub install_root: PathBuf,
    pub verbose: bool,
    pub colorize: bool,
}

impl Cli {
    /// Run the selected command and return the process exit code.
    pub async fn execute(self) -> Result<i32> {
        self.init_logging();

        match self.command {
            Commands::Version => {
                println!("{}", env!("CARGO_PKG_VERSION"));
                Ok(0)
            }
            Commands::ReplaceHelper(args) => args.execute().await,
            Commands::Upgrade(args) => {
                let global = GlobalConfig::load_with_optional(self.config.clone()).await?;
                let install_root = match self.install_dir.clone() {
                    Some(dir) => dir,
                    None => default_install_root()?,
                };
                let colorize = NativePlatform.enable_ansi_output()
                    && colored::control::SHOULD_COLORIZE.should_colorize();

                let ctx = CliContext {
                    config: global.upgrade,
                    install_root,
                    verbose: self.verbose,
                    colorize,
                };
                upgrade::sweep_expired_backup(&ctx);
                upgrade::execute(args, &ctx).await
            }
        }
    }

    /// Install the global tracing subscriber. Logs go to stderr.
    fn init_logging(&self) {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else if self.quiet {
            return;
        } else if self.verbose {
            EnvFilter::new("toolup_cli=debug,toolup=debug")
        } else {
            EnvFilter::new("warn")
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }
}

fn default_install_root() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("Failed to locate the running executable")?;
    exe.parent()
        .map(std::path::Path::to_path_buf)
        .with_context(|| format!("{} has no parent directory", exe.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_rollback() {
        let cli = Cli::try_parse_from(["toolup", "upgrade", "rollback", "--install-dir", "/opt/toolup"])
            .unwrap();
        assert_eq!(cli.install_dir, Some(PathBuf::from("/opt/toolup")));
        match cli.command {
            Commands::Upgrade(args) => assert!(matches!(args.action, Some(UpgradeAction::Rollback))),
            _ => panic!("expected upgrade"),
        }
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["toolup", "-v", "-q", "upgrade"]).is_err());
    }

    #[test]
    fn test_verbose_after_subcommand() {
        let cli = Cli::try_parse_from(["toolup", "upgrade", "--verbose"]).unwrap();
        assert!(cli.verbose);
    }
}
