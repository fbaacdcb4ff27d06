//! Entity type and allocation utilities.
//!
//! An [`Entity`] is a lightweight integer identifier with no inherent data.
//! The [`EntityAllocator`] hands out identifiers up to a fixed capacity and
//! keeps the set of live entities as a dense array plus an id → index lookup
//! table, so creation, destruction and liveness checks are all O(1).

use std::fmt;

/// A unique entity identifier.
///
/// Entities are pure identifiers and carry no data of their own.
/// Identifiers are recycled once an entity is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity(pub u32);

impl Entity {
    /// Create an entity from a raw identifier.
    #[must_use]
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn id(self) -> u32 {
        self.0
    }

    /// Returns the identifier as an index into per-entity tables.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

/// Allocates entity IDs from a fixed-capacity id space.
///
/// Fresh IDs come from a monotonically increasing counter. Released IDs go
/// to a free pool and are handed out again **last-freed-first**: the most
/// recently released id is the next one returned.
#[derive(Debug)]
pub struct EntityAllocator {
    next_id: u32,
    capacity: usize,
    pool: Vec<Entity>,
    /// Live entities in no particular order.
    dense: Vec<Entity>,
    /// `lookup[id]` is the position of `id` in `dense`, `None` if not alive.
    lookup: Vec<Option<usize>>,
}

impl EntityAllocator {
    /// Creates an allocator that can hold at most `capacity` live entities.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            next_id: 0,
            capacity,
            pool: Vec::new(),
            dense: Vec::new(),
            lookup: Vec::new(),
        }
    }

    /// The id the next call to [`allocate`](Self::allocate) would return,
    /// or `None` if the capacity is exhausted.
    #[must_use]
    pub fn peek(&self) -> Option<Entity> {
        match self.pool.last() {
            Some(&entity) => Some(entity),
            None if (self.next_id as usize) < self.capacity => Some(Entity(self.next_id)),
            None => None,
        }
    }

    /// Allocates an entity ID and marks it alive.
    ///
    /// Returns `None` once every id below the capacity is alive.
    pub fn allocate(&mut self) -> Option<Entity> {
        let entity = match self.pool.pop() {
            Some(entity) => entity,
            None => {
                if self.next_id as usize >= self.capacity {
                    return None;
                }
                let entity = Entity(self.next_id);
                self.next_id += 1;
                entity
            }
        };

        if entity.index() >= self.lookup.len() {
            self.lookup.resize(entity.index() + 1, None);
        }
        self.lookup[entity.index()] = Some(self.dense.len());
        self.dense.push(entity);
        Some(entity)
    }

    /// Marks `entity` dead and returns its id to the pool.
    ///
    /// Returns `false` if the entity was not alive.
    pub fn release(&mut self, entity: Entity) -> bool {
        let Some(index) = self.lookup.get(entity.index()).copied().flatten() else {
            return false;
        };

        self.dense.swap_remove(index);
        if let Some(&moved) = self.dense.get(index) {
            self.lookup[moved.index()] = Some(index);
        }
        self.lookup[entity.index()] = None;
        self.pool.push(entity);
        true
    }

    /// Returns `true` if `entity` is alive.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        matches!(self.lookup.get(entity.index()), Some(Some(_)))
    }

    /// The live entities, in dense-array order.
    #[must_use]
    pub fn alive(&self) -> &[Entity] {
        &self.dense
    }

    /// Returns the number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dense.len()
    }

    /// Returns `true` if no entity is alive.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    /// The fixed maximum number of live entities.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of distinct ids handed out so far.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.next_id
    }
}
