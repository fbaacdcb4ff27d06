//! Swarm simulation.
//!
//! Bodies drift through a square arena that wraps at its edges. Every body
//! is trailed by a ring of escort entities, created as its children. Bodies
//! age out; the reaper removes expired bodies (their escorts go with them
//! through the relation cascade) and the spawner tops the population back up.
//!
//! Per tick the systems run in this order: aging, reaper, spawner, motion,
//! follow. Population bookkeeping is done by query listeners, not by the
//! systems themselves.

use std::cell::{Cell, RefCell};
use std::f32::consts::TAU;
use std::rc::Rc;

use anyhow::{Result, ensure};
use engine_component::{Component, Entity, QueryTerm, not};
use engine_ecs::{Query, System, World, WorldError};
use glam::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tracing::{debug, warn};

pub const BODY_TAG: &str = "body";
pub const ESCORT_TAG: &str = "escort";
pub const EXPIRED_TAG: &str = "expired";

/// Distance between an escort and its leader.
const ESCORT_RADIUS: f32 = 1.5;

// -- Components --

/// World-space position.
#[derive(Debug)]
pub struct Position(pub Cell<Vec2>);

impl Component for Position {
    fn type_name() -> &'static str {
        "Position"
    }
}

/// Units per second.
#[derive(Debug)]
pub struct Velocity(pub Cell<Vec2>);

impl Component for Velocity {
    fn type_name() -> &'static str {
        "Velocity"
    }
}

/// Seconds left before the body expires.
#[derive(Debug)]
pub struct Lifetime(pub Cell<f32>);

impl Component for Lifetime {
    fn type_name() -> &'static str {
        "Lifetime"
    }
}

/// An escort's fixed offset from its leader.
#[derive(Debug)]
pub struct Offset(pub Vec2);

impl Component for Offset {
    fn type_name() -> &'static str {
        "Offset"
    }
}

// -- Configuration --

/// Swarm parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    /// Target number of live bodies.
    pub bodies: usize,
    /// Escorts spawned with each body.
    pub escorts: usize,
    /// Half the side length of the arena.
    pub arena: f32,
    /// Upper bound on a body's speed.
    pub max_speed: f32,
    /// Upper bound on a body's lifetime in seconds; each body draws one
    /// between half of this and this.
    pub lifetime: f32,
    /// RNG seed. Equal seeds give equal runs.
    pub seed: u64,
}

impl SwarmConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.arena.is_finite() && self.arena > 0.0,
            "arena must be positive and finite, got {}",
            self.arena
        );
        ensure!(
            self.max_speed.is_finite() && self.max_speed >= 0.0,
            "max_speed must be finite and not negative, got {}",
            self.max_speed
        );
        ensure!(
            self.lifetime.is_finite() && self.lifetime > 0.0,
            "lifetime must be positive and finite, got {}",
            self.lifetime
        );
        Ok(())
    }
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            bodies: 64,
            escorts: 2,
            arena: 100.0,
            max_speed: 10.0,
            lifetime: 4.0,
            seed: 7,
        }
    }
}

// -- Bookkeeping --

/// Counters maintained by query listeners.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SwarmStats {
    pub spawned: u64,
    pub expired: u64,
    pub escorts_lost: u64,
    pub live_bodies: usize,
    pub peak_bodies: usize,
}

/// Register the swarm's components and tags, wire the bookkeeping
/// listeners and add the systems to `world`.
///
/// # Errors
///
/// Fails if the config is invalid or the world already registered one of
/// the swarm's component kinds or tags.
pub fn install(world: &mut World, config: &SwarmConfig) -> Result<Rc<RefCell<SwarmStats>>> {
    config.validate()?;
    world.register_components(&[
        Position::kind(),
        Velocity::kind(),
        Lifetime::kind(),
        Offset::kind(),
    ])?;
    world.register_tags(&[BODY_TAG, ESCORT_TAG, EXPIRED_TAG])?;

    let stats = Rc::new(RefCell::new(SwarmStats::default()));

    let bodies = world.create_query(&[BODY_TAG.into()], false)?;
    let sink = Rc::clone(&stats);
    bodies.on_add_subscribe(
        world,
        move |_, _| {
            let mut stats = sink.borrow_mut();
            stats.spawned += 1;
            stats.live_bodies += 1;
            stats.peak_bodies = stats.peak_bodies.max(stats.live_bodies);
        },
        false,
    );
    let sink = Rc::clone(&stats);
    bodies.on_remove_subscribe(move |_, _| {
        let mut stats = sink.borrow_mut();
        stats.live_bodies = stats.live_bodies.saturating_sub(1);
    });

    let expired = world.create_query(&[EXPIRED_TAG.into()], false)?;
    let sink = Rc::clone(&stats);
    expired.on_add_subscribe(world, move |_, _| sink.borrow_mut().expired += 1, true);

    let escorts = world.create_query(&[ESCORT_TAG.into()], false)?;
    let sink = Rc::clone(&stats);
    escorts.on_remove_subscribe(move |_, _| sink.borrow_mut().escorts_lost += 1);

    let aging = Aging {
        query: world.create_query(
            &[QueryTerm::with::<Lifetime>(), not(EXPIRED_TAG)],
            false,
        )?,
    };
    let spawner = Spawner {
        config: config.clone(),
        rng: StdRng::seed_from_u64(config.seed),
        bodies,
    };
    let motion = Motion {
        query: world.create_query(
            &[QueryTerm::with::<Position>(), QueryTerm::with::<Velocity>()],
            false,
        )?,
        arena: config.arena,
    };
    let follow = Follow {
        query: world.create_query(
            &[
                ESCORT_TAG.into(),
                QueryTerm::with::<Position>(),
                QueryTerm::with::<Offset>(),
            ],
            false,
        )?,
    };

    world.add_system(aging);
    world.add_system(Reaper { query: expired });
    world.add_system(spawner);
    world.add_system(motion);
    world.add_system(follow);
    debug!(bodies = config.bodies, escorts = config.escorts, "swarm installed");
    Ok(stats)
}

/// Wrap `position` back into the arena `[-arena, arena)` on both axes.
#[must_use]
pub fn wrap(position: Vec2, arena: f32) -> Vec2 {
    let span = 2.0 * arena;
    let wrap_axis = |v: f32| (v + arena).rem_euclid(span) - arena;
    Vec2::new(wrap_axis(position.x), wrap_axis(position.y))
}

fn report(system: &str, result: Result<(), WorldError>) {
    if let Err(err) = result {
        warn!(system, %err, "system step failed");
    }
}

// -- Systems --

/// Counts lifetimes down and tags bodies whose time is up.
struct Aging {
    query: Query,
}

impl Aging {
    fn step(&self, world: &mut World, dt: f32) -> Result<(), WorldError> {
        for entity in self.query.entities() {
            let Some(lifetime) = world.get_component::<Lifetime>(entity)? else {
                continue;
            };
            let left = lifetime.0.get() - dt;
            lifetime.0.set(left);
            if left <= 0.0 {
                world.add_tag(entity, EXPIRED_TAG)?;
            }
        }
        Ok(())
    }
}

impl System for Aging {
    fn name(&self) -> &str {
        "aging"
    }

    fn update(&mut self, world: &mut World, dt: f64) {
        report(self.name(), self.step(world, dt as f32));
    }
}

/// Removes expired bodies together with their escorts.
struct Reaper {
    query: Query,
}

impl System for Reaper {
    fn name(&self) -> &str {
        "reaper"
    }

    fn update(&mut self, world: &mut World, _dt: f64) {
        let expired = self.query.entities();
        if !expired.is_empty() {
            debug!(count = expired.len(), "reaping expired bodies");
        }
        report(self.name(), world.remove_entities(&expired));
    }
}

/// Keeps the body population at its target.
struct Spawner {
    config: SwarmConfig,
    rng: StdRng,
    bodies: Query,
}

impl Spawner {
    fn spawn_body(&mut self, world: &mut World) -> Result<Entity, WorldError> {
        let arena = self.config.arena;
        let position = Vec2::new(
            self.rng.gen_range(-arena..arena),
            self.rng.gen_range(-arena..arena),
        );
        let heading = Vec2::from_angle(self.rng.gen_range(0.0..TAU));
        let velocity = heading * self.rng.gen_range(0.0..=self.config.max_speed);
        let lifetime = self
            .rng
            .gen_range(0.5 * self.config.lifetime..=self.config.lifetime);

        let body = world.create_entity()?;
        world.add_component(body, Position(Cell::new(position)), false)?;
        world.add_component(body, Velocity(Cell::new(velocity)), false)?;
        world.add_component(body, Lifetime(Cell::new(lifetime)), false)?;
        world.add_tag(body, BODY_TAG)?;

        let escorts = self.config.escorts;
        for i in 0..escorts {
            let angle = TAU * i as f32 / escorts as f32;
            let offset = Vec2::from_angle(angle) * ESCORT_RADIUS;
            let escort = world.create_child_entity(body)?;
            world.add_component(escort, Offset(offset), false)?;
            world.add_component(escort, Position(Cell::new(position + offset)), false)?;
            world.add_tag(escort, ESCORT_TAG)?;
        }
        Ok(body)
    }

    fn step(&mut self, world: &mut World) -> Result<(), WorldError> {
        let per_body = 1 + self.config.escorts;
        while self.bodies.len() < self.config.bodies {
            let headroom = world.max_entities() - world.entity_count();
            if headroom < per_body {
                debug!(
                    live = self.bodies.len(),
                    target = self.config.bodies,
                    "entity capacity reached, spawning deferred"
                );
                break;
            }
            self.spawn_body(world)?;
        }
        Ok(())
    }
}

impl System for Spawner {
    fn name(&self) -> &str {
        "spawner"
    }

    fn update(&mut self, world: &mut World, _dt: f64) {
        let result = self.step(world);
        report(self.name(), result);
    }
}

/// Integrates velocity into position.
struct Motion {
    query: Query,
    arena: f32,
}

impl Motion {
    fn step(&self, world: &World, dt: f32) -> Result<(), WorldError> {
        for entity in self.query.entities() {
            let (Some(position), Some(velocity)) = (
                world.get_component::<Position>(entity)?,
                world.get_component::<Velocity>(entity)?,
            ) else {
                continue;
            };
            let next = position.0.get() + velocity.0.get() * dt;
            position.0.set(wrap(next, self.arena));
        }
        Ok(())
    }
}

impl System for Motion {
    fn name(&self) -> &str {
        "motion"
    }

    fn update(&mut self, world: &mut World, dt: f64) {
        report(self.name(), self.step(world, dt as f32));
    }
}

/// Places every escort at its offset from its leader.
struct Follow {
    query: Query,
}

impl Follow {
    fn step(&self, world: &World) -> Result<(), WorldError> {
        for escort in self.query.entities() {
            let Some(leader) = world.get_parent(escort)? else {
                continue;
            };
            let (Some(anchor), Some(position), Some(offset)) = (
                world.get_component::<Position>(leader)?,
                world.get_component::<Position>(escort)?,
                world.get_component::<Offset>(escort)?,
            ) else {
                continue;
            };
            position.0.set(anchor.0.get() + offset.0);
        }
        Ok(())
    }
}

impl System for Follow {
    fn name(&self) -> &str {
        "follow"
    }

    fn update(&mut self, world: &mut World, _dt: f64) {
        report(self.name(), self.step(world));
    }
}
