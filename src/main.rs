//! toolup CLI entry point
//!
//! Parses arguments, runs the selected command and turns errors into a
//! readable message with a suggestion. The process exit code is the command's
//! own code (the replace helper reports its failure state this way), or 1 when
//! the command returned an error.

use anyhow::Result;
use clap::Parser;
use toolup_cli::cli;
use toolup_cli::core::user_friendly_error;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    match cli.execute().await {
        Ok(0) => Ok(()),
        Ok(code) => std::process::exit(code),
        Err(e) => {
            let error_ctx = user_friendly_error(e);
            error_ctx.display();
            std::process::exit(1);
        }
    }
}
