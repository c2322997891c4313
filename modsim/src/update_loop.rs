//! The periodic tick driver (spec.md §4.5).
//!
//! One `UpdateLoop` per simulation, run as a `tokio::task`. The globals
//! refresh, walk, and re-encode all happen inside
//! `RegisterBank::apply_tick`'s single write-lock critical section
//! (spec.md §5); this module only decides *what* each register's new
//! value should be.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::bank::RegisterBank;
use crate::error::EvalError;
use crate::expr;
use crate::schema::Role;

/// Default tick interval, spec.md §4.5.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(300);

pub struct UpdateLoop {
    bank: Arc<RegisterBank>,
    eval_order: Vec<String>,
    tick_interval: Duration,
}

impl UpdateLoop {
    pub fn new(bank: Arc<RegisterBank>, eval_order: Vec<String>, tick_interval: Duration) -> Self {
        Self {
            bank,
            eval_order,
            tick_interval,
        }
    }

    /// Run one tick synchronously. Used both by the periodic loop and
    /// to force the one tick spec.md §3's lifecycle requires before a
    /// simulation's server starts accepting traffic.
    pub fn tick_once(&self) {
        let now = Instant::now();
        let dt = self.bank.elapsed_since_last_tick(now).unwrap_or(0.0).max(0.0);
        self.tick_with_dt(dt);
        self.bank.set_last_update_time(now);
    }

    /// The tick's rule walk with an explicit `dt`, independent of the
    /// wall clock. `tick_once` is this plus real-time `dt` measurement
    /// and `last_update_time` bookkeeping; tests drive this directly to
    /// exercise the Accumulator rate formula (spec.md §4.5 step 3) with
    /// an exact, reproducible `dt` instead of racing the wall clock.
    pub fn tick_with_dt(&self, dt: f64) {
        self.bank.apply_tick(&self.eval_order, |name, role, env| match role {
            Role::Random {
                base_value,
                fluctuation,
            } => {
                let u = fastrand::f64() * 2.0 * fluctuation - fluctuation;
                Some(base_value * (1.0 + u))
            }
            Role::Expression { tree, .. } => {
                let value = expr::eval(tree, env);
                if value.is_finite() {
                    Some(value)
                } else {
                    let err = EvalError {
                        register: name.to_string(),
                        value,
                    };
                    warn!(%err, "retaining previous value");
                    None
                }
            }
            Role::Accumulator { source } => {
                let rate = env.lookup(source).unwrap_or(f64::NAN);
                if !rate.is_finite() {
                    let err = EvalError {
                        register: name.to_string(),
                        value: rate,
                    };
                    warn!(%err, source, "accumulator source is non-finite; retaining previous value");
                    return None;
                }
                let current = env.lookup(name).unwrap_or(0.0);
                Some(current + rate * (dt / 3600.0))
            }
            Role::Constant { .. } | Role::Writable { .. } => None,
        });
        debug!(dt, registers = self.eval_order.len(), "tick complete");
    }

    /// Run ticks on `tick_interval` until `cancel` is signalled true.
    /// A tick that overruns the interval simply shortens the next
    /// sleep (spec.md §5, "Timeouts") — `tokio::time::interval`'s
    /// default `Burst` behavior already does this.
    pub async fn run(self, mut cancel: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.tick_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick_once();
                }
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                }
            }
        }
    }
}
