//! # engine_component
//!
//! The "C" in ECS: the primitives every world is built from.
//!
//! This crate provides:
//!
//! - [`BitSet`]: growable bit vector used for entity and query masks.
//! - [`Component`] trait: the contract all typed ECS data must satisfy.
//! - [`Entity`]: lightweight integer entity identifiers.
//! - [`EntityAllocator`]: fixed-capacity id allocator with id recycling.
//! - [`Registry`]: maps component kinds and tags to mask slots.
//! - [`QueryTerm`] / [`QueryMask`]: declarative membership predicates.

pub mod bitset;
pub mod component;
pub mod entity;
pub mod error;
pub mod query;
pub mod registry;

pub use bitset::BitSet;
pub use component::{Component, ComponentKind, ComponentTypeId};
pub use entity::{Entity, EntityAllocator};
pub use error::RegistryError;
pub use query::{QueryMask, QueryTerm, Selector, not};
pub use registry::{
    ALIVE_SLOT, CHILDREN_SLOT, NAME_SLOT, PARENT_SLOT, RESERVED_MASK_SLOTS, RESERVED_TAGS,
    Registry, SlotInfo, SlotKind,
};
