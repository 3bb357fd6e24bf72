//! CLI commands.

mod check;
mod render;
mod run;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use jobprobe_harness::logging::{self, LogFormat};
use jobprobe_harness::HarnessConfig;

use crate::output::OutputFormat;

/// jobprobe - Run batch workload scenarios on a cluster and verify their outcome.
#[derive(Debug, Parser)]
#[command(name = "jobprobe")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (text or json).
    #[arg(long, global = true, default_value = "text")]
    format: String,

    /// Log format (pretty or json). Overrides JOBPROBE_LOG_FORMAT.
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Kubeconfig to use instead of the inferred one.
    #[arg(long, global = true, value_name = "PATH")]
    kubeconfig: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run scenarios and verify their outcome.
    Run(run::RunCommand),

    /// Validate scenario files without a cluster.
    Check(check::CheckCommand),

    /// Print the objects a scenario would submit.
    Render(render::RenderCommand),

    /// Show CLI version.
    Version,
}

impl Cli {
    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let mut config = HarnessConfig::from_env()?;
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        if self.kubeconfig.is_some() {
            config.kubeconfig = self.kubeconfig;
        }
        logging::init(config.log_format, &config.log_filter);

        let ctx = CommandContext {
            config,
            format: OutputFormat::parse(&self.format),
        };

        match self.command {
            Commands::Run(cmd) => cmd.run(ctx).await,
            Commands::Check(cmd) => cmd.run(ctx),
            Commands::Render(cmd) => cmd.run(ctx),
            Commands::Version => {
                println!("jobprobe {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub config: HarnessConfig,
    pub format: OutputFormat,
}
