//! Command-line argument surface (`SPEC_FULL.md` §3.4).

use std::path::PathBuf;

use clap::Parser;

/// A declarative Modbus/TCP holding-register simulator.
#[derive(Debug, Parser)]
#[command(name = "modsim", version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration document (spec.md §6).
    #[arg(long, env = "MODSIM_CONFIG")]
    pub config: PathBuf,

    /// Override every simulation's tick interval (default 300 ms).
    #[arg(long, env = "MODSIM_TICK_INTERVAL_MS", value_name = "MILLISECONDS")]
    pub tick_interval_ms: Option<u64>,

    /// Run headless: log only, no terminal dashboard.
    #[arg(long)]
    pub no_dashboard: bool,

    /// Increase log verbosity (repeatable: -v, -vv, -vvv).
    #[arg(short = 'v', long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Decrease log verbosity (repeatable).
    #[arg(short = 'q', long, action = clap::ArgAction::Count, conflicts_with = "verbose")]
    pub quiet: u8,
}
