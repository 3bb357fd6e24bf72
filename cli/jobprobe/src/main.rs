//! jobprobe - end-to-end checks for batch workloads
//!
//! Runs scenario files against the cluster in the current kubeconfig context.

use anyhow::Result;
use clap::Parser;

mod commands;
mod error;
mod output;
mod scenario_file;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = cli.run().await {
        error::print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}
