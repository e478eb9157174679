//! CLI for the mdl media download server.

mod commands;
mod gate;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mdl_core::config;
use std::path::PathBuf;

use commands::{apply_overrides, run_config, run_serve, run_status, ServeOverrides};

/// Top-level CLI for the mdl server.
#[derive(Debug, Parser)]
#[command(name = "mdl")]
#[command(about = "mdl: media download queue server with an RPC interface", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Start the RPC server and the download workers.
    Serve {
        /// Config file to use instead of ~/.config/mdl/config.toml.
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
        /// HTTP port.
        #[arg(long)]
        port: Option<u16>,
        /// Root directory for downloads.
        #[arg(long, value_name = "DIR")]
        download_dir: Option<PathBuf>,
        /// External download tool (name on PATH or path).
        #[arg(long)]
        tool: Option<String>,
        /// Run up to N jobs concurrently.
        #[arg(long, value_name = "N")]
        jobs: Option<usize>,
    },

    /// Show the jobs recorded in the snapshot without starting the server.
    Status {
        /// Snapshot file (default: the configured one).
        #[arg(long, value_name = "PATH")]
        snapshot: Option<PathBuf>,
    },

    /// Print the config file path and the effective configuration.
    Config,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Serve {
                config: config_file,
                port,
                download_dir,
                tool,
                jobs,
            } => {
                let mut cfg = match config_file {
                    Some(path) => config::load_from_path(&path)?,
                    None => config::load_or_init()?,
                };
                apply_overrides(
                    &mut cfg,
                    ServeOverrides {
                        port,
                        download_dir,
                        tool,
                        jobs,
                    },
                );
                tracing::debug!("effective config: {:?}", cfg);
                run_serve(cfg).await?;
            }
            CliCommand::Status { snapshot } => {
                let path = match snapshot {
                    Some(p) => p,
                    None => config::load_or_init()?.resolved_snapshot_path()?,
                };
                run_status(&path)?;
            }
            CliCommand::Config => run_config()?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
