//! Parent/child relations.
//!
//! Relations live in reserved slots: a child stores its parent id in the
//! parent slot, a parent stores the set of its children in the children
//! slot. Both are plain ids, so ownership stays with the world's entity
//! table. Removing a parent removes every descendant first.

use std::collections::BTreeSet;

use engine_component::{ALIVE_SLOT, CHILDREN_SLOT, Entity, PARENT_SLOT};
use tracing::debug;

use crate::error::WorldError;
use crate::query_manager;
use crate::storage::StoredValue;
use crate::world::World;

impl World {
    /// Create an entity as a child of `parent`.
    ///
    /// Query listeners first see the child with its parent already set.
    ///
    /// # Errors
    ///
    /// [`WorldError::EntityNotFound`] if the parent is not alive or is being
    /// removed, [`WorldError::CapacityExceeded`] if every id is in use.
    pub fn create_child_entity(&mut self, parent: Entity) -> Result<Entity, WorldError> {
        self.check_entity(parent)?;
        if !self.live_mask(parent).is_some_and(|mask| mask.has(ALIVE_SLOT)) {
            return Err(WorldError::EntityNotFound(parent));
        }
        let child = self.allocate_entity(None)?;

        self.components
            .insert(child, PARENT_SLOT, StoredValue::Parent(parent));
        if let Some(mask) = self.mask_mut(child) {
            mask.add(PARENT_SLOT);
        }
        // The set may outlive its mask bit while the parent's last child is
        // being unlinked; the bit decides whether the parent gains the slot.
        let first_child = !self.mask_has(parent, CHILDREN_SLOT);
        match self.components.get_mut(parent, CHILDREN_SLOT) {
            Some(StoredValue::Children(children)) => {
                children.insert(child);
            }
            _ => {
                self.components.insert(
                    parent,
                    CHILDREN_SLOT,
                    StoredValue::Children(BTreeSet::from([child])),
                );
            }
        }
        if first_child {
            if let Some(mask) = self.mask_mut(parent) {
                mask.add(CHILDREN_SLOT);
            }
        }
        debug!(%parent, %child, "child entity created");

        query_manager::update_entity(self, child);
        if first_child {
            query_manager::update_entity(self, parent);
        }
        Ok(child)
    }

    /// The parent of `entity`, if it has one.
    ///
    /// # Errors
    ///
    /// [`WorldError::EntityNotFound`] if the entity is not alive.
    pub fn get_parent(&self, entity: Entity) -> Result<Option<Entity>, WorldError> {
        self.check_entity(entity)?;
        Ok(match self.components.get(entity, PARENT_SLOT) {
            Some(StoredValue::Parent(parent)) => Some(*parent),
            _ => None,
        })
    }

    /// The children of `entity`; empty if it has none.
    ///
    /// # Errors
    ///
    /// [`WorldError::EntityNotFound`] if the entity is not alive.
    pub fn get_children(&self, entity: Entity) -> Result<BTreeSet<Entity>, WorldError> {
        self.check_entity(entity)?;
        Ok(self.children_of(entity).into_iter().collect())
    }

    pub(crate) fn children_of(&self, entity: Entity) -> Vec<Entity> {
        match self.components.get(entity, CHILDREN_SLOT) {
            Some(StoredValue::Children(children)) => children.iter().copied().collect(),
            _ => Vec::new(),
        }
    }

    /// Unlink `child` from its parent's children set. The child's own
    /// parent slot is left for the caller to clear.
    pub(crate) fn detach_from_parent(&mut self, child: Entity) {
        let Some(StoredValue::Parent(parent)) = self.components.get(child, PARENT_SLOT) else {
            return;
        };
        let parent = *parent;
        let now_empty = match self.components.get_mut(parent, CHILDREN_SLOT) {
            Some(StoredValue::Children(children)) => {
                children.remove(&child);
                children.is_empty()
            }
            _ => false,
        };
        if !now_empty {
            return;
        }

        if self.live_mask(parent).is_some_and(|mask| mask.has(ALIVE_SLOT)) {
            self.remove_from_mask(parent, CHILDREN_SLOT);
        } else {
            // Parent removal in flight: no listener may see it any more.
            self.components.remove(parent, CHILDREN_SLOT);
            if let Some(mask) = self.mask_mut(parent) {
                mask.remove(CHILDREN_SLOT);
            }
        }
    }
}
