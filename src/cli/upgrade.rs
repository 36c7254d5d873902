use anyhow::Result;
use chrono::Utc;
use clap::{Args, Subcommand};
use colored::Colorize;
use tracing::{debug, warn};

use super::CliContext;
use crate::upgrade::helper;
use crate::upgrade::scheduler::{DeadlineFileScheduler, native_scheduler};
use crate::upgrade::{RollbackOrchestrator, RollbackOutcome, SelfUpdater, UpgradeOutcome};
use crate::utils::platform::NativePlatform;

/// Upgrade toolup in place.
///
/// Without a subcommand, fetches the update descriptor and, when a newer
/// version is advertised, downloads, verifies and stages it. The running
/// executable is swapped by a background helper right after this command
/// exits.
///
/// ```bash
/// toolup upgrade             # upgrade to the advertised version
/// toolup upgrade --verbose   # also list staged files and test-run the new build
/// toolup upgrade rollback    # restore the last backup
/// ```
#[derive(Args, Debug)]
pub struct UpgradeArgs {
    #[command(subcommand)]
    pub action: Option<UpgradeAction>,
}

#[derive(Subcommand, Debug)]
pub enum UpgradeAction {
    /// Restore the installation from the backup taken by the last upgrade.
    ///
    /// Backups are kept for a limited number of days (7 by default). Run this
    /// from a copy of toolup outside the installation being restored.
    Rollback,
}

pub async fn execute(args: UpgradeArgs, ctx: &CliContext) -> Result<i32> {
    match args.action {
        Some(UpgradeAction::Rollback) => rollback(ctx).await,
        None => upgrade(ctx).await,
    }
}

/// Remove `.update/` once its retention deadline has passed.
pub(super) fn sweep_expired_backup(ctx: &CliContext) {
    let update_dir = ctx.config.update_dir(&ctx.install_root);
    match DeadlineFileScheduler::sweep_due(&update_dir, Utc::now()) {
        Ok(true) => debug!("Expired backup removed from {}", update_dir.display()),
        Ok(false) => {}
        Err(e) => warn!("Could not remove expired backup: {e:#}"),
    }
}

async fn upgrade(ctx: &CliContext) -> Result<i32> {
    let platform = NativePlatform;
    let updater = SelfUpdater::new(&ctx.config, &ctx.install_root, &platform)
        .verbose(ctx.verbose)
        .colorize(ctx.colorize);

    let mut stdout = std::io::stdout();
    match updater.stage(&mut stdout).await? {
        UpgradeOutcome::UpToDate {
            installed,
            ..
        } => {
            println!("{} is up to date (v{installed})", ctx.config.executable_name);
        }
        UpgradeOutcome::Staged(record) => {
            let pid = helper::launch(&record)?;
            debug!("Replace helper running as pid {pid}");
            println!(
                "{}",
                format!(
                    "update staged: {} will be replaced once this process exits",
                    record.live_executable.display()
                )
                .green()
            );
        }
    }
    Ok(0)
}

async fn rollback(ctx: &CliContext) -> Result<i32> {
    println!("{}", "rolling back to the previous version...".yellow());

    let scheduler = native_scheduler();
    let outcome =
        RollbackOrchestrator::new(&ctx.config, &ctx.install_root, scheduler.as_ref()).run().await?;

    match outcome {
        RollbackOutcome::Unavailable => {
            println!(
                "no backup available: backups are only available for {} days after upgrading",
                ctx.config.retention_days
            );
        }
        RollbackOutcome::Restored {
            version,
            ..
        } => {
            println!("{}", "rollback complete".green());
            match version {
                Some(version) => println!("restored version: {version}"),
                None => println!("restored version: unknown"),
            }
        }
    }
    Ok(0)
}
