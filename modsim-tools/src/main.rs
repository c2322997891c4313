//! `modsim` — a declarative Modbus/TCP holding-register simulator.
//!
//! Wires together configuration loading, logging, the `modsim` engine,
//! and the terminal dashboard at process start (`SPEC_FULL.md` §2).

mod cli;
mod config;
mod dashboard;
mod logging;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use modsim::{Supervisor, DEFAULT_TICK_INTERVAL};
use tracing::info;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::init(cli.verbose, cli.quiet)?;

    let root = config::load(&cli.config)?;
    let tick_interval = cli
        .tick_interval_ms
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_TICK_INTERVAL);

    let supervisor = Arc::new(Supervisor::new(tick_interval));
    for simulation in &root.simulations {
        let id = supervisor
            .add(simulation)
            .await
            .with_context(|| {
                format!(
                    "failed to start simulation on {}:{}",
                    simulation.defaults.ip, simulation.defaults.port
                )
            })?;
        info!(%id, ip = %simulation.defaults.ip, port = simulation.defaults.port, "simulation started");
    }

    if cli.no_dashboard {
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for ctrl-c")?;
        info!("received ctrl-c, shutting down");
    } else {
        // `add`'s register set is shared from the parsed configuration
        // (spec.md §4.7): the dashboard's add-simulation prompt only asks
        // for a new endpoint, reusing the first configured simulation's
        // register list as its template.
        let register_template = root
            .simulations
            .first()
            .map(|simulation| simulation.registers.clone());
        dashboard::run(supervisor.clone(), register_template).await?;
    }

    supervisor.shutdown_all().await;
    Ok(())
}
