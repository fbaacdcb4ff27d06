//! ECS World: entity storage, typed components, tags and live queries.
//!
//! Every structural mutation follows the same order: storage first, then
//! the entity mask, then the query diff. Query listeners therefore always
//! see storage and mask in step, and a removed value stays readable until
//! every remove listener for that mutation has returned.

use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

use engine_component::{
    ALIVE_SLOT, BitSet, Component, ComponentKind, Entity, EntityAllocator, NAME_SLOT,
    QueryMask, QueryTerm, RESERVED_MASK_SLOTS, Registry, SlotKind,
};
use tracing::{debug, warn};

use crate::config::WorldConfig;
use crate::error::WorldError;
use crate::events::EventBus;
use crate::query::Query;
use crate::query_manager::{self, QueryManager};
use crate::storage::{ComponentStore, StoredValue};
use crate::system::System;

/// The ECS world.
pub struct World {
    config: WorldConfig,
    registry: Registry,
    entities: EntityAllocator,
    /// Indexed by entity id. Dead ids hold an empty mask.
    masks: Vec<BitSet>,
    pub(crate) components: ComponentStore,
    names: HashMap<String, Entity>,
    pub(crate) queries: QueryManager,
    systems: Vec<Box<dyn System>>,
    pub(crate) events: EventBus,
}

impl World {
    /// Create a world holding at most `max_entities` live entities.
    #[must_use]
    pub fn new(max_entities: usize) -> Self {
        Self::with_config(WorldConfig::new(max_entities))
    }

    /// Create a world from a config.
    #[must_use]
    pub fn with_config(config: WorldConfig) -> Self {
        Self {
            entities: EntityAllocator::with_capacity(config.max_entities),
            config,
            registry: Registry::new(),
            masks: Vec::new(),
            components: ComponentStore::default(),
            names: HashMap::new(),
            queries: QueryManager::default(),
            systems: Vec::new(),
            events: EventBus::default(),
        }
    }

    /// The config this world was built with.
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// The slot registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    // -- Entity lifecycle --

    /// Create an entity named after its id.
    ///
    /// # Errors
    ///
    /// [`WorldError::CapacityExceeded`] if every id is in use.
    pub fn create_entity(&mut self) -> Result<Entity, WorldError> {
        let entity = self.allocate_entity(None)?;
        query_manager::update_entity(self, entity);
        Ok(entity)
    }

    /// Create an entity with an explicit name.
    ///
    /// # Errors
    ///
    /// [`WorldError::CapacityExceeded`] if every id is in use,
    /// [`WorldError::DuplicateName`] if the name is taken.
    pub fn create_named_entity(&mut self, name: impl Into<String>) -> Result<Entity, WorldError> {
        let entity = self.allocate_entity(Some(name.into()))?;
        query_manager::update_entity(self, entity);
        Ok(entity)
    }

    /// Allocate an id and write the reserved slots without running the
    /// query diff.
    pub(crate) fn allocate_entity(&mut self, name: Option<String>) -> Result<Entity, WorldError> {
        let max = self.config.max_entities;
        if self.entities.peek().is_none() {
            warn!(max, "entity limit reached");
            return Err(WorldError::CapacityExceeded { max });
        }
        if let Some(name) = &name {
            if self.names.contains_key(name) {
                return Err(WorldError::DuplicateName(name.clone()));
            }
        }
        let entity = self
            .entities
            .allocate()
            .ok_or(WorldError::CapacityExceeded { max })?;

        let name = name.unwrap_or_else(|| entity.id().to_string());
        let index = entity.index();
        if index >= self.masks.len() {
            self.masks.resize_with(index + 1, BitSet::new);
        }
        self.masks[index] = BitSet::from_slots(&RESERVED_MASK_SLOTS);
        self.components.reset(entity);
        self.components.insert(entity, ALIVE_SLOT, StoredValue::Marker);
        self.components
            .insert(entity, NAME_SLOT, StoredValue::Name(name.clone()));
        debug!(%entity, name = %name, "entity created");
        // An explicit name keeps its mapping over a colliding default name.
        self.names.entry(name).or_insert(entity);
        Ok(entity)
    }

    /// Remove an entity and, recursively, its children.
    ///
    /// Remove listeners run while the entity's components are still
    /// readable; storage is cleared and the id pooled only afterwards.
    ///
    /// # Errors
    ///
    /// [`WorldError::EntityNotFound`] if the entity is not alive.
    pub fn remove_entity(&mut self, entity: Entity) -> Result<(), WorldError> {
        self.check_entity(entity)?;
        self.despawn(entity);
        Ok(())
    }

    /// Remove several entities. Every id is checked before any is removed;
    /// ids already removed by an earlier cascade are skipped.
    ///
    /// # Errors
    ///
    /// [`WorldError::EntityNotFound`] if any id is not alive.
    pub fn remove_entities(&mut self, entities: &[Entity]) -> Result<(), WorldError> {
        for &entity in entities {
            self.check_entity(entity)?;
        }
        for &entity in entities {
            if self.has_entity(entity) {
                self.despawn(entity);
            }
        }
        Ok(())
    }

    /// Remove every entity alive when the call starts.
    pub fn clear(&mut self) {
        let entities = self.entities.alive().to_vec();
        debug!(count = entities.len(), "clearing world");
        for entity in entities {
            if self.has_entity(entity) {
                self.despawn(entity);
            }
        }
    }

    fn despawn(&mut self, entity: Entity) {
        let Some(mask) = self.masks.get_mut(entity.index()) else {
            return;
        };
        // Removal already in flight higher up the stack.
        if !mask.has(ALIVE_SLOT) {
            return;
        }
        mask.remove(ALIVE_SLOT);
        debug!(%entity, "removing entity");

        for child in self.children_of(entity) {
            if self.has_entity(child) {
                self.despawn(child);
            }
        }
        query_manager::remove_entity(self, entity);
        self.detach_from_parent(entity);

        if let Some(StoredValue::Name(name)) = self.components.get(entity, NAME_SLOT) {
            if self.names.get(name) == Some(&entity) {
                self.names.remove(name.as_str());
            }
        }
        self.components.clear(entity);
        if let Some(mask) = self.masks.get_mut(entity.index()) {
            mask.clear();
        }
        self.entities.release(entity);
    }

    /// Returns `true` if `entity` is alive. An entity stays alive until its
    /// own removal listeners have all returned.
    #[must_use]
    pub fn has_entity(&self, entity: Entity) -> bool {
        self.entities.contains(entity)
    }

    /// Fail unless `entity` is alive.
    ///
    /// # Errors
    ///
    /// [`WorldError::EntityNotFound`] if the entity is not alive.
    pub fn check_entity(&self, entity: Entity) -> Result<(), WorldError> {
        if self.has_entity(entity) {
            Ok(())
        } else {
            Err(WorldError::EntityNotFound(entity))
        }
    }

    /// Look an entity up by name.
    #[must_use]
    pub fn get_entity(&self, name: &str) -> Option<Entity> {
        self.names.get(name).copied()
    }

    /// The display name of an entity.
    ///
    /// # Errors
    ///
    /// [`WorldError::EntityNotFound`] if the entity is not alive.
    pub fn entity_name(&self, entity: Entity) -> Result<&str, WorldError> {
        self.check_entity(entity)?;
        match self.components.get(entity, NAME_SLOT) {
            Some(StoredValue::Name(name)) => Ok(name),
            _ => Err(WorldError::EntityNotFound(entity)),
        }
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// The live entities, in storage order.
    pub fn entities(&self) -> &[Entity] {
        self.entities.alive()
    }

    /// The fixed entity capacity.
    pub fn max_entities(&self) -> usize {
        self.entities.capacity()
    }

    /// The slot mask of an entity.
    ///
    /// # Errors
    ///
    /// [`WorldError::EntityNotFound`] if the entity is not alive.
    pub fn mask(&self, entity: Entity) -> Result<&BitSet, WorldError> {
        self.check_entity(entity)?;
        self.masks
            .get(entity.index())
            .ok_or(WorldError::EntityNotFound(entity))
    }

    /// The slots holding a value for `entity`, ascending.
    ///
    /// # Errors
    ///
    /// [`WorldError::EntityNotFound`] if the entity is not alive.
    pub fn entity_slots(&self, entity: Entity) -> Result<Vec<usize>, WorldError> {
        self.check_entity(entity)?;
        Ok(self.components.occupied(entity).collect())
    }

    pub(crate) fn live_mask(&self, entity: Entity) -> Option<&BitSet> {
        self.masks.get(entity.index())
    }

    pub(crate) fn mask_mut(&mut self, entity: Entity) -> Option<&mut BitSet> {
        self.masks.get_mut(entity.index())
    }

    pub(crate) fn mask_has(&self, entity: Entity, slot: usize) -> bool {
        self.live_mask(entity).is_some_and(|mask| mask.has(slot))
    }

    /// Set a slot bit whose storage is already written, then run the diff.
    pub(crate) fn add_to_mask(&mut self, entity: Entity, slot: usize) {
        if let Some(mask) = self.mask_mut(entity) {
            mask.add(slot);
        }
        query_manager::update_entity(self, entity);
    }

    /// Clear a slot bit, run the diff, then drop the stored value unless a
    /// listener put the slot back in the meantime.
    pub(crate) fn remove_from_mask(&mut self, entity: Entity, slot: usize) {
        if let Some(mask) = self.mask_mut(entity) {
            mask.remove(slot);
        }
        query_manager::update_entity(self, entity);
        if !self.mask_has(entity, slot) {
            self.components.remove(entity, slot);
        }
    }

    // -- Registration --

    /// Register component type `T` and return its slot.
    ///
    /// # Errors
    ///
    /// [`WorldError::AlreadyRegistered`] on a repeat.
    pub fn register_component<T: Component>(&mut self) -> Result<usize, WorldError> {
        Ok(self.registry.register_component::<T>()?)
    }

    /// Register several component kinds, all or none.
    ///
    /// # Errors
    ///
    /// [`WorldError::AlreadyRegistered`] if any kind is taken.
    pub fn register_components(&mut self, kinds: &[ComponentKind]) -> Result<(), WorldError> {
        Ok(self.registry.register_kinds(kinds)?)
    }

    /// Register several tags, all or none.
    ///
    /// # Errors
    ///
    /// [`WorldError::AlreadyRegistered`] if any tag is taken.
    pub fn register_tags<S: AsRef<str>>(&mut self, tags: &[S]) -> Result<(), WorldError> {
        Ok(self.registry.register_tags(tags)?)
    }

    /// Returns `true` if `tag` is registered.
    pub fn is_tag_exist(&self, tag: &str) -> bool {
        self.registry.is_tag_registered(tag)
    }

    /// The slot of component type `T`.
    ///
    /// # Errors
    ///
    /// [`WorldError::NotRegistered`] if `T` is not registered.
    pub fn component_index<T: Component>(&self) -> Result<usize, WorldError> {
        Ok(self.registry.component_slot::<T>()?)
    }

    /// The slot of a tag.
    ///
    /// # Errors
    ///
    /// [`WorldError::NotRegistered`] if the tag is not registered.
    pub fn tag_index(&self, tag: &str) -> Result<usize, WorldError> {
        Ok(self.registry.tag_slot(tag)?)
    }

    /// Resolve a tag that callers may set or clear: reserved slots and
    /// component kinds are rejected.
    fn user_tag_slot(&self, tag: &str) -> Result<usize, WorldError> {
        let slot = self.registry.tag_slot(tag)?;
        match self.registry.info(slot) {
            Some(info) if info.kind == SlotKind::Tag => Ok(slot),
            _ => Err(WorldError::NotRegistered {
                kind: "tag",
                name: tag.to_string(),
            }),
        }
    }

    // -- Components --

    /// Attach a component to an entity.
    ///
    /// With `force_add` an existing value is replaced: remove listeners fire
    /// for the old value, then add listeners for the new one.
    ///
    /// # Errors
    ///
    /// [`WorldError::EntityNotFound`], [`WorldError::NotRegistered`], or
    /// [`WorldError::DuplicateComponent`] when the slot is occupied and
    /// `force_add` is off.
    pub fn add_component<T: Component>(
        &mut self,
        entity: Entity,
        component: T,
        force_add: bool,
    ) -> Result<Rc<T>, WorldError> {
        self.add_shared_component(entity, Rc::new(component), force_add)
    }

    /// Attach a shared component instance. The same `Rc` may be attached to
    /// any number of entities.
    ///
    /// # Errors
    ///
    /// As [`add_component`](Self::add_component).
    pub fn add_shared_component<T: Component>(
        &mut self,
        entity: Entity,
        component: Rc<T>,
        force_add: bool,
    ) -> Result<Rc<T>, WorldError> {
        self.check_entity(entity)?;
        let slot = self.registry.component_slot::<T>()?;
        if self.mask_has(entity, slot) {
            if !force_add {
                return Err(WorldError::DuplicateComponent {
                    entity,
                    component: T::type_name(),
                });
            }
            self.remove_from_mask(entity, slot);
            self.check_entity(entity)?;
        }
        let stored: Rc<dyn Any> = component.clone();
        self.components
            .insert(entity, slot, StoredValue::Component(stored));
        self.add_to_mask(entity, slot);
        Ok(component)
    }

    /// Detach component `T`. Absent components are a no-op.
    ///
    /// # Errors
    ///
    /// [`WorldError::EntityNotFound`] or [`WorldError::NotRegistered`].
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Result<(), WorldError> {
        self.check_entity(entity)?;
        let slot = self.registry.component_slot::<T>()?;
        if self.mask_has(entity, slot) {
            self.remove_from_mask(entity, slot);
        }
        Ok(())
    }

    /// Returns `true` if the entity has component `T`.
    ///
    /// # Errors
    ///
    /// [`WorldError::EntityNotFound`] or [`WorldError::NotRegistered`].
    pub fn has_component<T: Component>(&self, entity: Entity) -> Result<bool, WorldError> {
        self.check_entity(entity)?;
        let slot = self.registry.component_slot::<T>()?;
        Ok(self.mask_has(entity, slot))
    }

    /// The entity's instance of component `T`, if attached.
    ///
    /// # Errors
    ///
    /// [`WorldError::EntityNotFound`] or [`WorldError::NotRegistered`].
    pub fn get_component<T: Component>(&self, entity: Entity) -> Result<Option<Rc<T>>, WorldError> {
        self.check_entity(entity)?;
        let slot = self.registry.component_slot::<T>()?;
        Ok(match self.components.get(entity, slot) {
            Some(StoredValue::Component(value)) => Rc::clone(value).downcast::<T>().ok(),
            _ => None,
        })
    }

    // -- Tags --

    /// Set a tag. Setting a tag that is already present removes and re-adds
    /// it, firing both events.
    ///
    /// # Errors
    ///
    /// [`WorldError::EntityNotFound`] or [`WorldError::NotRegistered`].
    pub fn add_tag(&mut self, entity: Entity, tag: &str) -> Result<(), WorldError> {
        self.add_tags(entity, &[tag])
    }

    /// Set several tags. Every tag is resolved before any is set.
    ///
    /// # Errors
    ///
    /// [`WorldError::EntityNotFound`] or [`WorldError::NotRegistered`].
    pub fn add_tags<S: AsRef<str>>(&mut self, entity: Entity, tags: &[S]) -> Result<(), WorldError> {
        self.check_entity(entity)?;
        let slots = tags
            .iter()
            .map(|tag| self.user_tag_slot(tag.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        for slot in slots {
            if self.mask_has(entity, slot) {
                self.remove_from_mask(entity, slot);
            }
            self.check_entity(entity)?;
            self.components.insert(entity, slot, StoredValue::Marker);
            self.add_to_mask(entity, slot);
        }
        Ok(())
    }

    /// Clear a tag. Absent tags are a no-op.
    ///
    /// # Errors
    ///
    /// [`WorldError::EntityNotFound`] or [`WorldError::NotRegistered`].
    pub fn remove_tag(&mut self, entity: Entity, tag: &str) -> Result<(), WorldError> {
        self.check_entity(entity)?;
        let slot = self.user_tag_slot(tag)?;
        if self.mask_has(entity, slot) {
            self.remove_from_mask(entity, slot);
        }
        Ok(())
    }

    /// Returns `true` if the entity carries `tag`.
    ///
    /// # Errors
    ///
    /// [`WorldError::EntityNotFound`] or [`WorldError::NotRegistered`].
    pub fn has_tag(&self, entity: Entity, tag: &str) -> Result<bool, WorldError> {
        self.check_entity(entity)?;
        let slot = self.registry.tag_slot(tag)?;
        Ok(self.mask_has(entity, slot))
    }

    // -- Queries --

    /// Compile a term list against this world's registry.
    ///
    /// # Errors
    ///
    /// [`WorldError::NotRegistered`] if any term names an unknown slot.
    pub fn query_mask(&self, terms: &[QueryTerm]) -> Result<QueryMask, WorldError> {
        Ok(QueryMask::from_terms(&self.registry, terms)?)
    }

    /// One-shot scan: the live entities matching `terms`, in storage order.
    ///
    /// # Errors
    ///
    /// [`WorldError::NotRegistered`] if any term names an unknown slot.
    pub fn query_entities(&self, terms: &[QueryTerm]) -> Result<Vec<Entity>, WorldError> {
        let mask = self.query_mask(terms)?;
        Ok(self
            .entities
            .alive()
            .iter()
            .copied()
            .filter(|&entity| self.live_mask(entity).is_some_and(|m| mask.matches(m)))
            .collect())
    }

    /// Create a live query. Handles created from equal term sets share one
    /// entity set.
    ///
    /// # Errors
    ///
    /// [`WorldError::NotRegistered`] if any term names an unknown slot.
    pub fn create_query(
        &mut self,
        terms: &[QueryTerm],
        remove_on_empty: bool,
    ) -> Result<Query, WorldError> {
        let mask = self.query_mask(terms)?;
        let query = self
            .queries
            .create_query(mask, remove_on_empty, self.entities.alive(), &self.masks);
        debug!(?query, "query created");
        Ok(query)
    }

    /// Remove one query handle and drop its subscribers. Returns `false` if
    /// the handle was already removed.
    pub fn remove_query(&mut self, query: &Query) -> bool {
        let removed = self.queries.remove_query(query);
        if removed {
            debug!(?query, "query removed");
        }
        removed
    }

    /// Remove every handle created from `terms`; returns how many.
    ///
    /// # Errors
    ///
    /// [`WorldError::NotRegistered`] if any term names an unknown slot.
    pub fn remove_queries(&mut self, terms: &[QueryTerm]) -> Result<usize, WorldError> {
        let mask = self.query_mask(terms)?;
        Ok(self.queries.remove_queries(&mask))
    }

    /// The live handles created from `terms`.
    ///
    /// # Errors
    ///
    /// [`WorldError::NotRegistered`] if any term names an unknown slot.
    pub fn get_queries(&self, terms: &[QueryTerm]) -> Result<Vec<Query>, WorldError> {
        let mask = self.query_mask(terms)?;
        Ok(self.queries.get_queries(&mask))
    }

    /// Every live query handle.
    pub fn queries(&self) -> Vec<Query> {
        self.queries.queries()
    }

    /// The query index.
    pub fn query_manager(&self) -> &QueryManager {
        &self.queries
    }

    // -- Systems --

    /// Append a system to the update order.
    pub fn add_system(&mut self, system: impl System + 'static) {
        debug!(system = system.name(), "system added");
        self.systems.push(Box::new(system));
    }

    /// Remove the first system with `name`, calling its `exit` hook.
    /// Returns `false` if no system has that name.
    pub fn remove_system(&mut self, name: &str) -> bool {
        let Some(position) = self.systems.iter().position(|s| s.name() == name) else {
            return false;
        };
        let mut system = self.systems.remove(position);
        system.exit(self);
        debug!(system = name, "system removed");
        true
    }

    /// Remove every system, calling each `exit` hook in order.
    pub fn remove_all_systems(&mut self) {
        for mut system in std::mem::take(&mut self.systems) {
            system.exit(self);
        }
    }

    /// Names of the registered systems, in update order.
    pub fn system_names(&self) -> Vec<&str> {
        self.systems.iter().map(|s| s.name()).collect()
    }

    /// Run every system's `update` hook in insertion order. Systems added
    /// during the pass run from the next call on.
    pub fn update(&mut self, dt: f64) {
        let mut systems = std::mem::take(&mut self.systems);
        for system in &mut systems {
            system.update(self, dt);
        }
        let added = std::mem::replace(&mut self.systems, systems);
        self.systems.extend(added);
    }

    /// Tear the world down: remove every system, dispose every query, then
    /// remove every entity.
    pub fn destroy(&mut self) {
        self.remove_all_systems();
        self.queries.dispose();
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use engine_component::{CHILDREN_SLOT, not};

    use super::*;

    #[derive(Debug, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    impl Component for Position {
        fn type_name() -> &'static str {
            "Position"
        }
    }

    #[derive(Debug, PartialEq)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }

    impl Component for Velocity {
        fn type_name() -> &'static str {
            "Velocity"
        }
    }

    #[derive(Debug)]
    struct Health(Cell<u32>);

    impl Component for Health {
        fn type_name() -> &'static str {
            "Health"
        }
    }

    struct Unregistered;

    impl Component for Unregistered {
        fn type_name() -> &'static str {
            "Unregistered"
        }
    }

    fn make_test_world() -> World {
        let mut world = World::new(16);
        world
            .register_components(&[Position::kind(), Velocity::kind(), Health::kind()])
            .unwrap();
        world.register_tags(&["frozen", "player"]).unwrap();
        world
    }

    fn counter() -> Rc<Cell<u32>> {
        Rc::new(Cell::new(0))
    }

    fn bump(counter: &Rc<Cell<u32>>) -> impl Fn(&mut World, Entity) + 'static {
        let counter = Rc::clone(counter);
        move |_, _| counter.set(counter.get() + 1)
    }

    /// Every stored slot has its mask bit and vice versa; every query holds
    /// exactly the live entities its mask matches.
    fn assert_consistent(world: &World) {
        for &entity in world.entities() {
            let mask: Vec<usize> = world.mask(entity).unwrap().iter().collect();
            assert_eq!(mask, world.entity_slots(entity).unwrap(), "{entity}");
        }
        for query in world.queries() {
            let mut expected: Vec<Entity> = world
                .entities()
                .iter()
                .copied()
                .filter(|&e| query.mask().matches(world.mask(e).unwrap()))
                .collect();
            expected.sort();
            assert_eq!(query.entities(), expected, "{query:?}");
        }
    }

    #[test]
    fn test_create_and_capacity() {
        let mut world = World::new(5);
        world.register_component::<Position>().unwrap();
        let entities: Vec<Entity> = (0..5).map(|_| world.create_entity().unwrap()).collect();
        assert_eq!(entities, (0..5).map(Entity).collect::<Vec<_>>());

        world
            .add_component(entities[0], Position { x: 0.0, y: 0.0 }, false)
            .unwrap();
        world
            .add_component(entities[2], Position { x: 1.0, y: 1.0 }, false)
            .unwrap();
        assert_eq!(
            world.query_entities(&[QueryTerm::with::<Position>()]).unwrap(),
            vec![Entity(0), Entity(2)]
        );
        assert_eq!(
            world.create_entity(),
            Err(WorldError::CapacityExceeded { max: 5 })
        );
        assert_eq!(world.entity_count(), 5);
    }

    #[test]
    fn test_names() {
        let mut world = World::new(8);
        let hero = world.create_named_entity("hero").unwrap();
        assert_eq!(world.get_entity("hero"), Some(hero));
        assert_eq!(world.entity_name(hero).unwrap(), "hero");
        assert_eq!(
            world.create_named_entity("hero"),
            Err(WorldError::DuplicateName("hero".to_string()))
        );

        let plain = world.create_entity().unwrap();
        assert_eq!(world.entity_name(plain).unwrap(), plain.id().to_string());
        assert_eq!(world.get_entity(&plain.id().to_string()), Some(plain));

        world.remove_entity(hero).unwrap();
        assert_eq!(world.get_entity("hero"), None);
        assert!(world.create_named_entity("hero").is_ok());
    }

    #[test]
    fn test_default_name_does_not_steal_explicit_name() {
        let mut world = World::new(8);
        let explicit = world.create_named_entity("1").unwrap();
        let second = world.create_entity().unwrap();
        assert_eq!(second, Entity(1));
        assert_eq!(world.get_entity("1"), Some(explicit));

        world.remove_entity(second).unwrap();
        assert_eq!(world.get_entity("1"), Some(explicit));
    }

    #[test]
    fn test_failed_named_creation_changes_nothing() {
        let mut world = World::new(2);
        world.create_named_entity("a").unwrap();
        assert!(world.create_named_entity("a").is_err());
        assert_eq!(world.entity_count(), 1);
        assert_eq!(world.create_entity().unwrap(), Entity(1));
    }

    #[test]
    fn test_ids_recycle_last_freed_first() {
        let mut world = World::new(8);
        let a = world.create_entity().unwrap();
        let b = world.create_entity().unwrap();
        world.remove_entity(a).unwrap();
        world.remove_entity(b).unwrap();
        assert_eq!(world.create_entity().unwrap(), b);
        assert_eq!(world.create_entity().unwrap(), a);
    }

    #[test]
    fn test_dead_entity_operations_fail() {
        let mut world = make_test_world();
        let e = world.create_entity().unwrap();
        world.remove_entity(e).unwrap();

        let not_found = Err(WorldError::EntityNotFound(e));
        assert_eq!(world.remove_entity(e), not_found);
        assert_eq!(world.check_entity(e), not_found);
        assert!(world.add_component(e, Position { x: 0.0, y: 0.0 }, false).is_err());
        assert_eq!(world.has_component::<Position>(e), Err(WorldError::EntityNotFound(e)));
        assert!(world.get_component::<Position>(e).is_err());
        assert_eq!(world.add_tag(e, "frozen"), not_found);
        assert_eq!(world.has_tag(e, "frozen"), Err(WorldError::EntityNotFound(e)));
        assert!(!world.has_entity(e));
    }

    #[test]
    fn test_component_round_trip() {
        let mut world = make_test_world();
        let e = world.create_entity().unwrap();
        let before = world.mask(e).unwrap().clone();

        let position = world.add_component(e, Position { x: 1.0, y: 2.0 }, false).unwrap();
        assert_eq!(*position, Position { x: 1.0, y: 2.0 });
        assert_eq!(world.has_component::<Position>(e), Ok(true));
        assert_eq!(world.get_component::<Position>(e).unwrap(), Some(position));
        assert_eq!(world.has_component::<Velocity>(e), Ok(false));
        assert_eq!(world.get_component::<Velocity>(e), Ok(None));

        world.remove_component::<Position>(e).unwrap();
        assert_eq!(world.mask(e).unwrap(), &before);
        assert_eq!(world.get_component::<Position>(e), Ok(None));
        // Removing an absent component is a no-op.
        world.remove_component::<Position>(e).unwrap();
        assert_consistent(&world);
    }

    #[test]
    fn test_duplicate_component() {
        let mut world = make_test_world();
        let e = world.create_entity().unwrap();
        world.add_component(e, Position { x: 1.0, y: 1.0 }, false).unwrap();
        assert_eq!(
            world.add_component(e, Position { x: 2.0, y: 2.0 }, false),
            Err(WorldError::DuplicateComponent {
                entity: e,
                component: "Position",
            })
        );
        world.add_component(e, Position { x: 3.0, y: 3.0 }, true).unwrap();
        assert_eq!(
            world.get_component::<Position>(e).unwrap().as_deref(),
            Some(&Position { x: 3.0, y: 3.0 })
        );
    }

    #[test]
    fn test_unregistered_component_and_tag() {
        let mut world = make_test_world();
        let e = world.create_entity().unwrap();
        assert!(matches!(
            world.add_component(e, Unregistered, false),
            Err(WorldError::NotRegistered { kind: "component", .. })
        ));
        assert!(matches!(
            world.add_tag(e, "ghost"),
            Err(WorldError::NotRegistered { kind: "tag", .. })
        ));
        assert!(world.component_index::<Unregistered>().is_err());
        assert!(world.tag_index("ghost").is_err());
        assert!(world.is_tag_exist("frozen"));
        assert!(!world.is_tag_exist("ghost"));
    }

    #[test]
    fn test_shared_component_instance() {
        let mut world = make_test_world();
        let a = world.create_entity().unwrap();
        let b = world.create_entity().unwrap();
        let health = Rc::new(Health(Cell::new(10)));
        world.add_shared_component(a, Rc::clone(&health), false).unwrap();
        world.add_shared_component(b, Rc::clone(&health), false).unwrap();

        health.0.set(3);
        let seen = world.get_component::<Health>(b).unwrap().unwrap();
        assert_eq!(seen.0.get(), 3);
        assert!(Rc::ptr_eq(&seen, &health));
    }

    #[test]
    fn test_tags() {
        let mut world = make_test_world();
        let e = world.create_entity().unwrap();
        world.add_tags(e, &["frozen", "player"]).unwrap();
        assert_eq!(world.has_tag(e, "frozen"), Ok(true));
        assert_eq!(world.has_tag(e, "player"), Ok(true));

        world.remove_tag(e, "frozen").unwrap();
        assert_eq!(world.has_tag(e, "frozen"), Ok(false));
        world.remove_tag(e, "frozen").unwrap();
        assert_consistent(&world);
    }

    #[test]
    fn test_add_tags_resolves_all_before_mutating() {
        let mut world = make_test_world();
        let e = world.create_entity().unwrap();
        assert!(world.add_tags(e, &["frozen", "ghost"]).is_err());
        assert_eq!(world.has_tag(e, "frozen"), Ok(false));
    }

    #[test]
    fn test_reserved_and_component_slots_are_not_tags() {
        let mut world = make_test_world();
        let e = world.create_entity().unwrap();
        let alive = engine_component::RESERVED_TAGS[0];
        assert!(world.add_tag(e, alive).is_err());
        assert!(world.remove_tag(e, alive).is_err());
        assert!(world.add_tag(e, "Position").is_err());
        assert_eq!(world.has_tag(e, alive), Ok(true));
        assert!(world.has_entity(e));
    }

    #[test]
    fn test_re_adding_tag_fires_remove_then_add() {
        let mut world = make_test_world();
        let e = world.create_entity().unwrap();
        let query = world.create_query(&["frozen".into()], false).unwrap();
        let events = Rc::new(RefCell::new(Vec::new()));

        let log = Rc::clone(&events);
        query.on_add_subscribe(&mut world, move |_, _| log.borrow_mut().push("add"), true);
        let log = Rc::clone(&events);
        query.on_remove_subscribe(move |_, _| log.borrow_mut().push("remove"));

        world.add_tag(e, "frozen").unwrap();
        world.add_tag(e, "frozen").unwrap();
        assert_eq!(*events.borrow(), vec!["add", "remove", "add"]);
        assert!(query.contains(e));
    }

    #[test]
    fn test_query_tracks_membership() {
        let mut world = make_test_world();
        let query = world
            .create_query(&[QueryTerm::with::<Position>(), QueryTerm::with::<Velocity>()], false)
            .unwrap();
        let adds = counter();
        let removes = counter();
        query.on_add_subscribe(&mut world, bump(&adds), false);
        query.on_remove_subscribe(bump(&removes));

        let e = world.create_entity().unwrap();
        world.add_component(e, Position { x: 0.0, y: 0.0 }, false).unwrap();
        assert_eq!(adds.get(), 0);
        world.add_component(e, Velocity { dx: 1.0, dy: 0.0 }, false).unwrap();
        assert_eq!(adds.get(), 1);
        assert_eq!(query.entities(), vec![e]);

        // A forced re-add on a member fires remove then add.
        world.add_component(e, Position { x: 5.0, y: 5.0 }, true).unwrap();
        assert_eq!(removes.get(), 1);
        assert_eq!(adds.get(), 2);
        assert!(query.contains(e));

        world.remove_component::<Velocity>(e).unwrap();
        assert_eq!(removes.get(), 2);
        assert!(query.is_empty());
        assert_consistent(&world);
    }

    #[test]
    fn test_query_seeds_existing_entities() {
        let mut world = make_test_world();
        let a = world.create_entity().unwrap();
        let b = world.create_entity().unwrap();
        world.add_component(b, Position { x: 0.0, y: 0.0 }, false).unwrap();

        let query = world.create_query(&[QueryTerm::with::<Position>()], false).unwrap();
        assert_eq!(query.entities(), vec![b]);

        let everything = world.create_query(&[], false).unwrap();
        assert_eq!(everything.entities(), vec![a, b]);
        let c = world.create_entity().unwrap();
        assert!(everything.contains(c));
    }

    #[test]
    fn test_exclusion() {
        let mut world = make_test_world();
        assert!(matches!(
            world.create_query(&[not(QueryTerm::with::<Unregistered>())], false),
            Err(WorldError::NotRegistered { .. })
        ));

        let a = world.create_entity().unwrap();
        let b = world.create_entity().unwrap();
        world.add_component(a, Position { x: 0.0, y: 0.0 }, false).unwrap();
        world.add_component(b, Position { x: 0.0, y: 0.0 }, false).unwrap();
        world.add_tag(b, "frozen").unwrap();

        let terms = [QueryTerm::with::<Position>(), not("frozen")];
        let query = world.create_query(&terms, false).unwrap();
        assert_eq!(query.entities(), vec![a]);
        assert_eq!(world.query_entities(&terms).unwrap(), vec![a]);

        world.remove_tag(b, "frozen").unwrap();
        assert_eq!(query.entities(), vec![a, b]);
        world.add_tag(a, "frozen").unwrap();
        assert_eq!(query.entities(), vec![b]);
        assert_consistent(&world);
    }

    #[test]
    fn test_equal_masks_share_entities() {
        let mut world = make_test_world();
        let e = world.create_entity().unwrap();
        world.add_component(e, Position { x: 0.0, y: 0.0 }, false).unwrap();
        world.add_component(e, Velocity { dx: 0.0, dy: 0.0 }, false).unwrap();

        let first = world
            .create_query(&[QueryTerm::with::<Position>(), QueryTerm::with::<Velocity>()], false)
            .unwrap();
        let second = world
            .create_query(&[QueryTerm::with::<Velocity>(), QueryTerm::with::<Position>()], false)
            .unwrap();
        assert!(first.shares_entities_with(&second));
        assert_eq!(first.usage_counter(), 2);
        assert_eq!(world.query_manager().len(), 1);

        assert!(world.remove_query(&first));
        assert!(first.is_disposed());
        assert_eq!(second.entities(), vec![e]);
        assert_eq!(second.usage_counter(), 1);

        let other = world.create_entity().unwrap();
        world.add_component(other, Position { x: 0.0, y: 0.0 }, false).unwrap();
        world.add_component(other, Velocity { dx: 0.0, dy: 0.0 }, false).unwrap();
        assert_eq!(second.entities(), vec![e, other]);
    }

    #[test]
    fn test_get_and_remove_queries() {
        let mut world = make_test_world();
        let terms = [QueryTerm::with::<Position>()];
        let a = world.create_query(&terms, false).unwrap();
        let b = world.create_query(&terms, true).unwrap();
        world.create_query(&["player".into()], false).unwrap();

        assert_eq!(world.get_queries(&terms).unwrap(), vec![a.clone(), b.clone()]);
        assert_eq!(world.queries().len(), 3);
        assert_eq!(world.remove_queries(&terms), Ok(2));
        assert!(world.get_queries(&terms).unwrap().is_empty());
        assert!(a.is_disposed() && b.is_disposed());
        assert!(!world.remove_query(&a));
    }

    #[test]
    fn test_remove_listener_reads_removed_value() {
        let mut world = make_test_world();
        let query = world.create_query(&[QueryTerm::with::<Position>()], false).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        query.on_remove_subscribe(move |world, entity| {
            let position = world.get_component::<Position>(entity).unwrap();
            sink.borrow_mut().push(position.map(|p| p.x));
        });

        let a = world.create_entity().unwrap();
        world.add_component(a, Position { x: 1.0, y: 0.0 }, false).unwrap();
        world.remove_component::<Position>(a).unwrap();

        let b = world.create_entity().unwrap();
        world.add_component(b, Position { x: 2.0, y: 0.0 }, false).unwrap();
        world.remove_entity(b).unwrap();

        assert_eq!(*seen.borrow(), vec![Some(1.0), Some(2.0)]);
        assert_eq!(world.get_component::<Position>(a), Ok(None));
    }

    #[test]
    fn test_query_created_during_removal_excludes_removed_entity() {
        let mut world = make_test_world();
        let query = world.create_query(&[QueryTerm::with::<Position>()], false).unwrap();
        let late = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&late);
        query.on_remove_subscribe(move |world, entity| {
            assert!(world.has_entity(entity));
            let created = world.create_query(&[], false).unwrap();
            assert!(!created.contains(entity));
            *slot.borrow_mut() = Some(created);
        });

        let a = world.create_entity().unwrap();
        let b = world.create_entity().unwrap();
        world.add_component(a, Position { x: 0.0, y: 0.0 }, false).unwrap();
        world.remove_entity(a).unwrap();

        let created = late.borrow().clone().unwrap();
        assert_eq!(created.entities(), vec![b]);
        assert_consistent(&world);
    }

    #[test]
    fn test_re_add_inside_empty_listener_survives() {
        let mut world = make_test_world();
        let e = world.create_entity().unwrap();
        world.add_component(e, Position { x: 1.0, y: 1.0 }, false).unwrap();
        let query = world.create_query(&[QueryTerm::with::<Position>()], false).unwrap();
        query.on_empty_once_subscribe(|world, entity| {
            world
                .add_component(entity, Position { x: 9.0, y: 9.0 }, false)
                .unwrap();
        });

        world.remove_component::<Position>(e).unwrap();
        assert_eq!(world.has_component::<Position>(e), Ok(true));
        assert_eq!(
            world.get_component::<Position>(e).unwrap().as_deref(),
            Some(&Position { x: 9.0, y: 9.0 })
        );
        assert_eq!(query.entities(), vec![e]);
        assert_consistent(&world);
    }

    #[test]
    fn test_empty_fires_after_last_member_leaves() {
        let mut world = make_test_world();
        let query = world.create_query(&["player".into()], false).unwrap();
        let empties = counter();
        query.on_empty_subscribe(bump(&empties));

        let a = world.create_entity().unwrap();
        let b = world.create_entity().unwrap();
        world.add_tags(a, &["player"]).unwrap();
        world.add_tags(b, &["player"]).unwrap();
        world.remove_tag(a, "player").unwrap();
        assert_eq!(empties.get(), 0);
        world.remove_entity(b).unwrap();
        assert_eq!(empties.get(), 1);
        assert!(!query.is_disposed());
    }

    #[test]
    fn test_remove_on_empty_disposes_before_empty_listeners() {
        let mut world = make_test_world();
        let e = world.create_entity().unwrap();
        world.add_tag(e, "player").unwrap();

        let terms = [QueryTerm::tag("player")];
        let transient = world.create_query(&terms, true).unwrap();
        let lasting = world.create_query(&terms, false).unwrap();
        let remaining = Rc::new(Cell::new(usize::MAX));
        let seen = Rc::clone(&remaining);
        lasting.on_empty_subscribe(move |world, _| {
            seen.set(world.get_queries(&[QueryTerm::tag("player")]).unwrap().len());
        });
        let transient_empties = counter();
        transient.on_empty_subscribe(bump(&transient_empties));

        world.remove_entity(e).unwrap();
        assert_eq!(remaining.get(), 1);
        assert_eq!(transient_empties.get(), 1);
        assert!(transient.is_disposed());
        assert_eq!(transient.subscriber_count(), 0);
        assert!(!lasting.is_disposed());

        // The entry survives through the lasting handle.
        let next = world.create_entity().unwrap();
        world.add_tag(next, "player").unwrap();
        assert_eq!(lasting.entities(), vec![next]);
    }

    #[test]
    fn test_remove_on_empty_drops_entry() {
        let mut world = make_test_world();
        let e = world.create_entity().unwrap();
        world.add_tag(e, "player").unwrap();
        let query = world.create_query(&["player".into()], true).unwrap();

        world.remove_tag(e, "player").unwrap();
        assert!(query.is_disposed());
        assert!(world.query_manager().is_empty());
        world.add_tag(e, "player").unwrap();
        assert!(query.is_empty());
    }

    #[test]
    fn test_listener_removes_other_entities() {
        let mut world = make_test_world();
        let a = world.create_entity().unwrap();
        let b = world.create_entity().unwrap();
        world.add_component(a, Position { x: 0.0, y: 0.0 }, false).unwrap();
        world.add_component(b, Position { x: 0.0, y: 0.0 }, false).unwrap();

        let query = world.create_query(&[QueryTerm::with::<Position>()], false).unwrap();
        let tagged = world.create_query(&["frozen".into()], false).unwrap();
        tagged.on_add_subscribe(
            &mut world,
            move |world, entity| {
                if entity == a {
                    world.remove_entity(b).unwrap();
                }
            },
            true,
        );

        world.add_tag(a, "frozen").unwrap();
        assert!(!world.has_entity(b));
        assert_eq!(query.entities(), vec![a]);
        assert_consistent(&world);
    }

    #[test]
    fn test_listener_removing_its_own_entity() {
        let mut world = make_test_world();
        let e = world.create_entity().unwrap();
        let query = world.create_query(&[QueryTerm::with::<Position>()], false).unwrap();
        let removes = counter();
        query.on_add_subscribe(
            &mut world,
            |world, entity| world.remove_entity(entity).unwrap(),
            true,
        );
        query.on_remove_subscribe(bump(&removes));

        world.add_component(e, Position { x: 0.0, y: 0.0 }, false).unwrap();
        assert!(!world.has_entity(e));
        assert_eq!(removes.get(), 1);
        assert!(query.is_empty());
        assert_consistent(&world);
    }

    #[test]
    fn test_remove_entities_and_clear() {
        let mut world = make_test_world();
        let query = world.create_query(&[], false).unwrap();
        let removes = counter();
        query.on_remove_subscribe(bump(&removes));
        let ids: Vec<Entity> = (0..4).map(|_| world.create_entity().unwrap()).collect();

        assert_eq!(
            world.remove_entities(&[ids[0], Entity(99)]),
            Err(WorldError::EntityNotFound(Entity(99)))
        );
        assert_eq!(world.entity_count(), 4);

        world.remove_entities(&ids[..2]).unwrap();
        assert_eq!(removes.get(), 2);
        world.clear();
        assert_eq!(removes.get(), 4);
        assert_eq!(world.entity_count(), 0);
        assert!(query.is_empty());
    }

    #[test]
    fn test_children_mask_bit() {
        let mut world = make_test_world();
        let parent = world.create_entity().unwrap();
        let child = world.create_child_entity(parent).unwrap();
        assert!(world.mask(parent).unwrap().has(CHILDREN_SLOT));
        world.remove_entity(child).unwrap();
        assert!(!world.mask(parent).unwrap().has(CHILDREN_SLOT));
        assert_consistent(&world);
    }

    struct Counter {
        name: &'static str,
        ticks: Rc<Cell<u32>>,
        exits: Rc<Cell<u32>>,
    }

    impl System for Counter {
        fn name(&self) -> &str {
            self.name
        }

        fn update(&mut self, world: &mut World, _dt: f64) {
            self.ticks.set(self.ticks.get() + 1);
            if self.name == "spawner" && self.ticks.get() == 1 {
                world.add_system(Counter {
                    name: "late",
                    ticks: counter(),
                    exits: Rc::clone(&self.exits),
                });
            }
        }

        fn exit(&mut self, _world: &mut World) {
            self.exits.set(self.exits.get() + 1);
        }
    }

    #[test]
    fn test_systems() {
        let mut world = make_test_world();
        let ticks = counter();
        let exits = counter();
        world.add_system(Counter {
            name: "spawner",
            ticks: Rc::clone(&ticks),
            exits: Rc::clone(&exits),
        });

        world.update(0.016);
        assert_eq!(world.system_names(), vec!["spawner", "late"]);
        world.update(0.016);
        assert_eq!(ticks.get(), 2);

        assert!(world.remove_system("late"));
        assert!(!world.remove_system("late"));
        assert_eq!(exits.get(), 1);
        world.remove_all_systems();
        assert_eq!(exits.get(), 2);
        assert!(world.system_names().is_empty());
    }

    #[test]
    fn test_destroy() {
        let mut world = make_test_world();
        let exits = counter();
        world.add_system(Counter {
            name: "a",
            ticks: counter(),
            exits: Rc::clone(&exits),
        });
        let query = world.create_query(&[], false).unwrap();
        let removes = counter();
        query.on_remove_subscribe(bump(&removes));
        world.create_entity().unwrap();

        world.destroy();
        assert_eq!(exits.get(), 1);
        assert!(query.is_disposed());
        // Queries are disposed before the entities go.
        assert_eq!(removes.get(), 0);
        assert_eq!(world.entity_count(), 0);
    }
}
