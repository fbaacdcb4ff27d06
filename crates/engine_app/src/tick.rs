//! Fixed-timestep tick loop.
//!
//! Each tick advances the world by one fixed `dt` through
//! [`World::update`], which runs the registered systems in order. In
//! realtime mode the loop sleeps off the rest of each tick's budget and
//! warns when a tick overruns it; otherwise ticks run back to back.

use std::time::{Duration, Instant};

use engine_ecs::World;
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Configuration for the tick loop.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Target ticks per second.
    pub tick_rate: f64,
    /// Maximum number of ticks to run (0 = unlimited).
    pub max_ticks: u64,
    /// Hold the tick rate against the wall clock.
    pub realtime: bool,
}

impl TickConfig {
    /// Simulated seconds per tick.
    #[must_use]
    pub fn dt(&self) -> f64 {
        1.0 / self.tick_rate
    }
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            max_ticks: 600,
            realtime: false,
        }
    }
}

/// The tick loop and the world it drives.
pub struct TickLoop {
    tick_id: u64,
    config: TickConfig,
    world: World,
}

impl TickLoop {
    #[must_use]
    pub fn new(config: TickConfig, world: World) -> Self {
        Self {
            tick_id: 0,
            config,
            world,
        }
    }

    /// Returns the current tick counter.
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Run one tick.
    pub fn tick(&mut self) {
        self.tick_id += 1;
        let dt = self.config.dt();
        debug!(
            tick_id = self.tick_id,
            dt,
            entities = self.world.entity_count(),
            "tick start"
        );
        self.world.update(dt);
    }

    /// Run ticks until `max_ticks` is reached, or forever if it is 0.
    pub fn run(&mut self) {
        let tick_duration = Duration::from_secs_f64(self.config.dt());
        let mut tick_count = 0u64;

        info!(
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            realtime = self.config.realtime,
            "starting tick loop"
        );

        loop {
            let start = Instant::now();
            self.tick();

            tick_count += 1;
            if self.config.max_ticks > 0 && tick_count >= self.config.max_ticks {
                info!(ticks = tick_count, "tick loop complete");
                break;
            }
            if !self.config.realtime {
                continue;
            }

            let elapsed = start.elapsed();
            if elapsed < tick_duration {
                std::thread::sleep(tick_duration - elapsed);
            } else {
                warn!(
                    tick_id = self.tick_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    budget_ms = tick_duration.as_millis() as u64,
                    "tick exceeded time budget"
                );
            }
        }
    }
}
