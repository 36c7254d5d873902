use anyhow::{Context, Result};
use clap::Args;
use tracing::error;

use crate::upgrade::helper::{HelperExit, PendingReplacement, SelfReplaceHelper, SystemWatcher};
use crate::upgrade::scheduler::native_scheduler;

/// Entry point of the detached replace helper.
#[derive(Args, Debug)]
pub struct ReplaceHelperArgs {
    /// JSON-encoded replacement record.
    #[arg(long)]
    pub record: String,
}

impl ReplaceHelperArgs {
    pub async fn execute(self) -> Result<i32> {
        let record = match PendingReplacement::decode(&self.record) {
            Ok(record) => record,
            Err(e) => {
                error!("{e:#}");
                return Ok(HelperExit::InvalidRecord.code());
            }
        };

        let helper = SelfReplaceHelper::new(record, Box::new(SystemWatcher), native_scheduler());
        let exit = tokio::task::spawn_blocking(move || helper.run())
            .await
            .context("Replace helper task panicked")?;
        Ok(exit.code())
    }
}
