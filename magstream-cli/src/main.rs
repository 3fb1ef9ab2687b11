//! Magstream CLI - Command-line interface
//!
//! Runs the streaming server or queries the search API from a terminal.

mod commands;

use std::path::PathBuf;

use anyhow::anyhow;
use clap::Parser;
use magstream_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "magstream")]
#[command(about = "Stream magnet links over HTTP with range support")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: commands::Commands,

    /// Console log level (RUST_LOG takes precedence)
    #[arg(long, value_enum, default_value_t = CliLogLevel::Info, global = true)]
    log_level: CliLogLevel,

    /// Directory for the full trace log of this run
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_level.as_tracing_level(), cli.logs_dir.as_deref())
        .map_err(|e| anyhow!("Failed to initialize logging: {e}"))?;

    commands::handle_command(cli.command).await
}
