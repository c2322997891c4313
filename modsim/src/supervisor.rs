//! The supervisor (spec.md §4.7): owns every running simulation's
//! lifetime and its private globals table — there is no cross-
//! simulation variable leakage, since each simulation keeps its
//! globals inside its own `RegisterBank` (spec.md §9).

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::info;

use crate::bank::{RegisterBank, RegisterSnapshot};
use crate::config::SimulationConfig;
use crate::error::SupervisorError;
use crate::schema::{self, ValidatedSchema};
use crate::server;
use crate::update_loop::UpdateLoop;

/// Identifies one running simulation within its owning `Supervisor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SimId(u64);

impl SimId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SimId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A simulation's read-only presentation summary (spec.md §4.7, §6).
#[derive(Debug, Clone)]
pub struct SimulationInfo {
    pub id: SimId,
    pub ip: Ipv4Addr,
    pub port: u16,
    pub slave_id: u8,
}

struct Simulation {
    ip: Ipv4Addr,
    port: u16,
    slave_id: u8,
    bank: Arc<RegisterBank>,
    cancel_tx: watch::Sender<bool>,
    update_task: JoinHandle<()>,
    server_task: JoinHandle<()>,
}

/// Owns the collection of simulations (spec.md §2, §4.7). The
/// simulation list itself is a `tokio::sync::RwLock`: presentation
/// reads (`list`, `snapshot`) are frequent, `add`/`remove` are rare
/// (spec.md §5).
pub struct Supervisor {
    simulations: RwLock<HashMap<u64, Simulation>>,
    next_id: AtomicU64,
    tick_interval: Duration,
}

impl Supervisor {
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            simulations: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            tick_interval,
        }
    }

    /// Validate `config`, build its bank, bind its endpoint, force the
    /// lifecycle's first tick, then spawn its update loop and server
    /// tasks (spec.md §3 "Lifecycle", §4.7). The endpoint is bound
    /// before anything is spawned so an `(ip, port)` already in use
    /// fails `add` outright, with no simulation left half-created.
    pub async fn add(&self, config: &SimulationConfig) -> Result<SimId, SupervisorError> {
        let ip = config.defaults.ip;
        let port = config.defaults.port;
        let slave_id = config.defaults.slave_id;
        let listener = server::bind(ip, port).await?;

        let ValidatedSchema {
            registers,
            eval_order,
        } = schema::validate(config)?;

        let bank = Arc::new(RegisterBank::new(registers));
        let update_loop = UpdateLoop::new(bank.clone(), eval_order, self.tick_interval);
        update_loop.tick_once();

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let update_task = tokio::spawn(update_loop.run(cancel_rx.clone()));
        let server_task = tokio::spawn(server::run(listener, bank.clone(), cancel_rx));

        let id = SimId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let simulation = Simulation {
            ip,
            port,
            slave_id,
            bank,
            cancel_tx,
            update_task,
            server_task,
        };
        self.simulations.write().await.insert(id.0, simulation);
        info!(id = id.0, %ip, port, slave_id, "simulation added");
        Ok(id)
    }

    /// Cancel `id`'s update loop and listener and wait for both tasks
    /// to finish before freeing its bank (spec.md §4.7).
    pub async fn remove(&self, id: SimId) -> Result<(), SupervisorError> {
        let simulation = self
            .simulations
            .write()
            .await
            .remove(&id.0)
            .ok_or(SupervisorError::UnknownSimulation(id.0))?;
        let _ = simulation.cancel_tx.send(true);
        let _ = simulation.update_task.await;
        let _ = simulation.server_task.await;
        info!(id = id.0, "simulation removed");
        Ok(())
    }

    /// Cancel every running simulation concurrently and await their
    /// completion (spec.md §5, "Process-wide Ctrl+C").
    pub async fn shutdown_all(&self) {
        let simulations: Vec<Simulation> = self.simulations.write().await.drain().map(|(_, s)| s).collect();
        let mut tasks = Vec::with_capacity(simulations.len() * 2);
        for simulation in simulations {
            let _ = simulation.cancel_tx.send(true);
            tasks.push(simulation.update_task);
            tasks.push(simulation.server_task);
        }
        for task in tasks {
            let _ = task.await;
        }
    }

    /// Read-only view of every running simulation, for the dashboard
    /// collaborator (spec.md §4.7, §6).
    pub async fn list(&self) -> Vec<SimulationInfo> {
        self.simulations
            .read()
            .await
            .iter()
            .map(|(&id, s)| SimulationInfo {
                id: SimId(id),
                ip: s.ip,
                port: s.port,
                slave_id: s.slave_id,
            })
            .collect()
    }

    /// Every register's current scaled value, raw words, and metadata
    /// for one simulation (spec.md §4.7, §6).
    pub async fn snapshot(&self, id: SimId) -> Result<Vec<RegisterSnapshot>, SupervisorError> {
        let simulations = self.simulations.read().await;
        let simulation = simulations
            .get(&id.0)
            .ok_or(SupervisorError::UnknownSimulation(id.0))?;
        Ok(simulation.bank.snapshot())
    }
}
