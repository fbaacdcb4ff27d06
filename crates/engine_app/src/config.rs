//! Application configuration.
//!
//! Everything has a default, so an empty file (or no file) is a valid
//! config. Command-line flags are applied on top in `main`.

use std::path::Path;

use anyhow::{Context, Result, ensure};
use engine_ecs::WorldConfig;
use serde::Deserialize;

use crate::swarm::SwarmConfig;
use crate::tick::TickConfig;

/// Top-level configuration for the demo.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub world: WorldConfig,
    pub tick: TickConfig,
    pub swarm: SwarmConfig,
}

impl AppConfig {
    /// Read a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reject values the world or tick loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.world.max_entities > 0, "max_entities must be positive");
        ensure!(
            self.tick.tick_rate.is_finite() && self.tick.tick_rate > 0.0,
            "tick_rate must be a positive number, got {}",
            self.tick.tick_rate
        );
        self.swarm.validate()
    }
}
