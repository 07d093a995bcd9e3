//! VolleyStat CLI - record university volleyball results and export reports
//!
//! Usage:
//!   volleystat add-team "McMaster Marauders"
//!   volleystat add-player "Emma Davis" --position setter --team 1
//!   volleystat record-match --team 1 --opponent "Western Mustangs" \
//!       --date 2025-02-01 --sets-won 3 --sets-lost 1 --stat 1:30:15:3:2:8:1
//!   volleystat team-report 1
//!   volleystat list matches --team 1
//!   volleystat export --from 2025-01-01 --to 2025-04-30
//!   volleystat export --player 1

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use volleystat_core::config::AppConfig;

mod args;
mod commands;

use commands::Command;

#[derive(Parser, Debug)]
#[command(name = "volleystat")]
#[command(about = "Tracks volleyball matches, player stats and training, and exports reports to a spreadsheet")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (TOML); missing file means defaults
    #[arg(short, long, global = true, default_value = "volleystat.toml")]
    config: PathBuf,

    /// SQLite database path, overriding the configured one
    #[arg(short, long, global = true)]
    database: Option<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(path) = cli.database {
        config.database.path = path;
    }

    commands::run(cli.command, &config)
}
