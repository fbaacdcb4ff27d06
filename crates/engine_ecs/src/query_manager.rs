//! Incremental query index.
//!
//! The [`QueryManager`] keeps one [`QueryEntry`] per distinct [`QueryMask`].
//! Each entry owns the entity set that every [`Query`] handle created from
//! that mask observes. After a structural mutation the world calls
//! [`update_entity`], which re-tests the one mutated entity against every
//! entry: cost is linear in the number of distinct masks, independent of
//! both the entity count and the number of handles.
//!
//! Event callbacks may mutate the world, including this index. The free
//! functions below therefore never hold a borrow of the manager across a
//! callback: they walk a snapshot of the entries, skip entries detached in
//! the meantime, and re-read the live entity mask for every entry.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use engine_component::{BitSet, Entity, QueryMask};
use tracing::{debug, trace};

use crate::query::Query;
use crate::world::World;

/// One distinct mask and the handles observing its entity set.
pub(crate) struct QueryEntry {
    mask: QueryMask,
    entities: Rc<RefCell<BTreeSet<Entity>>>,
    queries: RefCell<Vec<Query>>,
    usage: Rc<Cell<usize>>,
    detached: Cell<bool>,
}

impl QueryEntry {
    fn handles(&self) -> Vec<Query> {
        self.queries.borrow().clone()
    }
}

/// The per-world registry of live queries.
#[derive(Default)]
pub struct QueryManager {
    index: HashMap<QueryMask, Rc<QueryEntry>>,
    /// Entries in creation order; notification order follows it.
    order: Vec<Rc<QueryEntry>>,
    next_query_id: u64,
}

impl QueryManager {
    /// Number of distinct masks with at least one live handle.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if no query is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Every live handle, grouped by mask in creation order.
    #[must_use]
    pub fn queries(&self) -> Vec<Query> {
        self.order.iter().flat_map(|entry| entry.handles()).collect()
    }

    /// The live handles created from `mask`.
    #[must_use]
    pub fn get_queries(&self, mask: &QueryMask) -> Vec<Query> {
        self.index
            .get(mask)
            .map(|entry| entry.handles())
            .unwrap_or_default()
    }

    /// Returns `true` if `mask` has a registered entry.
    #[must_use]
    pub fn has_query(&self, mask: &QueryMask) -> bool {
        self.index.contains_key(mask)
    }

    /// Create a handle for `mask`, seeding a new entry from `alive` when no
    /// handle for an equal mask exists yet. `masks` is indexed by entity id.
    pub(crate) fn create_query(
        &mut self,
        mask: QueryMask,
        remove_on_empty: bool,
        alive: &[Entity],
        masks: &[BitSet],
    ) -> Query {
        let entry = match self.index.get(&mask) {
            Some(entry) => Rc::clone(entry),
            None => {
                let seeded: BTreeSet<Entity> = alive
                    .iter()
                    .copied()
                    .filter(|entity| {
                        masks
                            .get(entity.index())
                            .is_some_and(|entity_mask| mask.matches(entity_mask))
                    })
                    .collect();
                debug!(members = seeded.len(), "query entry created");
                let entry = Rc::new(QueryEntry {
                    mask: mask.clone(),
                    entities: Rc::new(RefCell::new(seeded)),
                    queries: RefCell::new(Vec::new()),
                    usage: Rc::new(Cell::new(0)),
                    detached: Cell::new(false),
                });
                self.index.insert(mask, Rc::clone(&entry));
                self.order.push(Rc::clone(&entry));
                entry
            }
        };

        let id = self.next_query_id;
        self.next_query_id += 1;
        let query = Query::new(
            id,
            entry.mask.clone(),
            Rc::clone(&entry.entities),
            Rc::clone(&entry.usage),
            remove_on_empty,
        );
        entry.queries.borrow_mut().push(query.clone());
        query
    }

    /// Unregister `query` without touching its subscribers. Drops the entry
    /// once its last handle is gone. Returns `false` if the handle was not
    /// registered here.
    pub(crate) fn detach(&mut self, query: &Query) -> bool {
        let Some(entry) = self.index.get(query.mask()).cloned() else {
            return false;
        };
        {
            let mut handles = entry.queries.borrow_mut();
            let Some(position) = handles.iter().position(|q| q == query) else {
                return false;
            };
            handles.remove(position);
        }
        query.detach();

        if entry.queries.borrow().is_empty() {
            entry.detached.set(true);
            self.index.remove(query.mask());
            self.order.retain(|e| !Rc::ptr_eq(e, &entry));
            debug!(remaining = self.order.len(), "query entry dropped");
        }
        true
    }

    /// Unregister and dispose `query`.
    pub(crate) fn remove_query(&mut self, query: &Query) -> bool {
        let removed = self.detach(query);
        if removed {
            query.dispose();
        }
        removed
    }

    /// Unregister and dispose every handle created from `mask`.
    pub(crate) fn remove_queries(&mut self, mask: &QueryMask) -> usize {
        let handles = self.get_queries(mask);
        handles.iter().filter(|q| self.remove_query(q)).count()
    }

    /// Unregister and dispose every handle.
    pub(crate) fn dispose(&mut self) {
        for query in self.queries() {
            self.remove_query(&query);
        }
    }

    fn snapshot(&self) -> Vec<Rc<QueryEntry>> {
        self.order.clone()
    }
}

/// Re-test `entity` against every entry and fire the resulting events.
pub(crate) fn update_entity(world: &mut World, entity: Entity) {
    for entry in world.queries.snapshot() {
        if entry.detached.get() {
            continue;
        }
        let is_member = world
            .live_mask(entity)
            .is_some_and(|mask| entry.mask.matches(mask));
        let was_member = entry.entities.borrow().contains(&entity);
        match (was_member, is_member) {
            (false, true) => add_to_entry(world, &entry, entity),
            (true, false) => remove_from_entry(world, &entry, entity),
            _ => {}
        }
    }
}

/// Drop `entity` from every entry that holds it.
pub(crate) fn remove_entity(world: &mut World, entity: Entity) {
    for entry in world.queries.snapshot() {
        if entry.detached.get() {
            continue;
        }
        if entry.entities.borrow().contains(&entity) {
            remove_from_entry(world, &entry, entity);
        }
    }
}

fn add_to_entry(world: &mut World, entry: &QueryEntry, entity: Entity) {
    if !entry.entities.borrow_mut().insert(entity) {
        return;
    }
    trace!(%entity, "entered query");
    for query in entry.handles() {
        query.emit_add(world, entity);
    }
}

fn remove_from_entry(world: &mut World, entry: &QueryEntry, entity: Entity) {
    if !entry.entities.borrow_mut().remove(&entity) {
        return;
    }
    trace!(%entity, "left query");
    let handles = entry.handles();
    for query in &handles {
        query.emit_remove(world, entity);
    }
    // A remove listener may have refilled the set.
    if !entry.entities.borrow().is_empty() {
        return;
    }

    let mut expired = Vec::new();
    for query in &handles {
        if query.remove_on_empty() && world.queries.detach(query) {
            expired.push(query.clone());
        }
    }
    for query in &handles {
        query.emit_empty(world, entity);
    }
    for query in expired {
        query.dispose();
    }
}
