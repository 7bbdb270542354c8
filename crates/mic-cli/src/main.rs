//! MIC CLI - Command-line tool for MIC motor controllers
//!
//! Probes the CAN interface, pings controllers, reads device information and
//! uploads firmware through the configured flashing tool.

mod commands;
mod config;
mod output;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mic_can::{CommandFlasher, MicContext, SystemConnector};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Config;
use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "mic-cli")]
#[command(author, version, about = "MIC motor controller CAN tool")]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "MIC_CONFIG")]
    config: Option<PathBuf>,

    /// Output format (overrides the config file)
    #[arg(short, long, value_enum)]
    output: Option<OutputFormat>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the host CAN interface can be opened
    Probe,

    /// Check that a controller answers
    Ping {
        /// Controller ID (0-127)
        id: i64,
    },

    /// Read firmware and hardware information
    Info {
        /// Controller ID (0-127)
        id: i64,

        /// Reply timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Upload a firmware image
    Flash {
        /// Controller ID (0-127)
        id: i64,

        /// Firmware file path
        firmware: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load config file
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let merged = config.merge_with_args(cli.output, cli.no_color);
    let ctx = OutputContext::new(merged.output, merged.no_color, cli.quiet);

    let context = MicContext::new(
        config.mic.session.clone(),
        Arc::new(SystemConnector),
        Arc::new(CommandFlasher::from_config(&config.mic.flasher)),
    );

    match cli.command {
        Commands::Probe => commands::probe(&SystemConnector, &ctx).await?,
        Commands::Ping { id } => commands::ping(&context, id, &ctx).await?,
        Commands::Info { id, timeout_ms } => {
            commands::info(&context, id, timeout_ms, &ctx).await?
        }
        Commands::Flash { id, firmware } => commands::flash(&context, id, &firmware, &ctx).await?,
    }

    Ok(())
}
