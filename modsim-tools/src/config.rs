//! Configuration loading (`SPEC_FULL.md` §3.3): TOML from `--config`,
//! layered with `MODSIM_`-prefixed environment overrides, via
//! `figment` — the same layering pattern the teacher uses for its own
//! configuration.

use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use modsim::RootConfig;

pub fn load(path: &Path) -> Result<RootConfig> {
    Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("MODSIM_").split("__"))
        .extract()
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}
