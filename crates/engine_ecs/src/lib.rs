//! # engine_ecs
//!
//! An in-memory entity/component world with live queries.
//!
//! Callers register component kinds and tags, create and remove entities,
//! attach components, and create [`Query`] handles that stay up to date as
//! the world changes. Each mutation re-tests only the mutated entity, once
//! per distinct query mask.
//!
//! ```rust
//! use engine_component::{Component, QueryTerm};
//! use engine_ecs::World;
//!
//! struct Position(f32, f32);
//!
//! impl Component for Position {
//!     fn type_name() -> &'static str { "Position" }
//! }
//!
//! let mut world = World::new(64);
//! world.register_component::<Position>().unwrap();
//! let moving = world.create_query(&[QueryTerm::with::<Position>()], false).unwrap();
//!
//! let e = world.create_entity().unwrap();
//! world.add_component(e, Position(0.0, 0.0), false).unwrap();
//! assert_eq!(moving.entities(), vec![e]);
//! ```
//!
//! Query listeners receive `&mut World` and may mutate it, including
//! creating or removing entities and queries. Listeners on named world
//! events ([`World::on_event`]) get the same access.

pub mod config;
pub mod error;
pub mod events;
pub mod query;
pub mod query_manager;
mod relation;
mod storage;
pub mod system;
pub mod world;

pub use config::{DEFAULT_MAX_ENTITIES, WorldConfig};
pub use error::WorldError;
pub use events::{EventBus, EventCallback};
pub use query::{Query, QueryCallback, SubscriptionId};
pub use query_manager::QueryManager;
pub use system::System;
pub use world::World;
