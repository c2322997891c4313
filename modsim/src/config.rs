//! Deserialized shape of the configuration document (spec.md §6,
//! `SPEC_FULL.md` §3.3). This module is a dumb data carrier: it knows
//! nothing about role exclusivity, address disjointness, or any other
//! invariant — that's `schema::validate`'s job. Unknown fields are
//! rejected at this layer (`deny_unknown_fields`) per spec.md §6.

use std::net::Ipv4Addr;

use serde::Deserialize;

use crate::numeric::NumericType;

/// Top-level configuration document: one or more simulations.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RootConfig {
    #[serde(rename = "simulation")]
    pub simulations: Vec<SimulationConfig>,
}

/// One simulation's endpoint defaults plus its register list.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    pub defaults: Defaults,
    pub registers: Vec<RegisterConfig>,
}

/// `defaults` section: the endpoint a simulation's slave binds to.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    pub ip: Ipv4Addr,
    pub port: u16,
    pub slave_id: u8,
}

/// One entry of the `registers` sequence. Every field spec.md §3
/// describes is present; which ones are meaningful depends on which
/// role flag(s) are set, checked by `schema::validate`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterConfig {
    pub name: String,
    pub address: u16,
    #[serde(rename = "type")]
    pub numeric_type: NumericType,
    pub scale: f64,

    #[serde(default)]
    pub description: String,

    pub variable_name: Option<String>,

    pub base_value: Option<f64>,

    #[serde(default)]
    pub randomize: bool,
    pub fluctuation: Option<f64>,

    #[serde(default)]
    pub accumulate: bool,
    pub source: Option<String>,

    pub expression: Option<String>,

    #[serde(default)]
    pub writable: bool,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
}
