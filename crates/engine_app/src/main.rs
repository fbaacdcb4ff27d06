//! # engine_app: swarm demo
//!
//! Runs a swarm simulation on an ECS world for a fixed number of ticks and
//! logs the population statistics gathered by query listeners.
//!
//! ## Startup Sequence
//!
//! 1. Load the JSON config given by `--config`, if any, and apply flags.
//! 2. Build the world and install the swarm's components, queries and
//!    systems.
//! 3. Run the fixed-timestep tick loop.
//! 4. Report statistics and tear the world down.

mod config;
mod swarm;
mod tick;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use engine_ecs::World;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::AppConfig;
use tick::TickLoop;

#[derive(Parser)]
#[command(name = "engine_app", about = "Swarm simulation on the ECS world")]
struct Args {
    /// Path to a JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum number of live entities
    #[arg(long)]
    max_entities: Option<usize>,

    /// Number of ticks to run (0 runs forever)
    #[arg(long)]
    ticks: Option<u64>,

    /// Ticks per second
    #[arg(long)]
    tick_rate: Option<f64>,

    /// Target number of bodies
    #[arg(long)]
    bodies: Option<usize>,

    /// Hold the tick rate against the wall clock
    #[arg(long)]
    realtime: bool,
}

impl Args {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(max_entities) = self.max_entities {
            config.world.max_entities = max_entities;
        }
        if let Some(ticks) = self.ticks {
            config.tick.max_ticks = ticks;
        }
        if let Some(tick_rate) = self.tick_rate {
            config.tick.tick_rate = tick_rate;
        }
        if let Some(bodies) = self.bodies {
            config.swarm.bodies = bodies;
        }
        if self.realtime {
            config.tick.realtime = true;
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "engine_app=info".into()),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => {
            info!(path = %path.display(), "loading config");
            AppConfig::load(path)?
        }
        None => AppConfig::default(),
    };
    args.apply(&mut config);
    config.validate()?;

    info!(
        max_entities = config.world.max_entities,
        bodies = config.swarm.bodies,
        escorts = config.swarm.escorts,
        "swarm starting"
    );

    let mut world = World::with_config(config.world.clone());
    let stats = swarm::install(&mut world, &config.swarm)?;

    let mut tick_loop = TickLoop::new(config.tick.clone(), world);
    tick_loop.run();

    let stats = *stats.borrow();
    info!(
        ticks = tick_loop.tick_id(),
        spawned = stats.spawned,
        expired = stats.expired,
        escorts_lost = stats.escorts_lost,
        live_bodies = stats.live_bodies,
        peak_bodies = stats.peak_bodies,
        entities = tick_loop.world().entity_count(),
        "swarm finished"
    );

    tick_loop.world_mut().destroy();
    info!("swarm shut down");
    Ok(())
}
