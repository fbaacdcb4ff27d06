//! Per-entity component storage.
//!
//! Each entity owns a sparse row indexed by slot. A slot is either empty or
//! holds a [`StoredValue`]. The entity's mask bit for a slot is set exactly
//! when the row holds a value there; the world keeps the two in step.

use std::any::Any;
use std::collections::BTreeSet;
use std::rc::Rc;

use engine_component::Entity;

/// What a slot holds.
#[derive(Debug, Clone)]
pub(crate) enum StoredValue {
    /// Tag marker, also used for the alive slot.
    Marker,
    /// The entity's display name.
    Name(String),
    /// A typed component instance, shared by reference.
    Component(Rc<dyn Any>),
    /// Back-reference to the parent entity.
    Parent(Entity),
    /// The entity's children.
    Children(BTreeSet<Entity>),
}

/// Sparse rows of slot values, indexed by entity id.
#[derive(Debug, Default)]
pub(crate) struct ComponentStore {
    rows: Vec<Vec<Option<StoredValue>>>,
}

impl ComponentStore {
    /// Ensure `entity` has an empty row.
    pub(crate) fn reset(&mut self, entity: Entity) {
        let index = entity.index();
        if index >= self.rows.len() {
            self.rows.resize_with(index + 1, Vec::new);
        }
        self.rows[index].clear();
    }

    pub(crate) fn insert(&mut self, entity: Entity, slot: usize, value: StoredValue) {
        let index = entity.index();
        if index >= self.rows.len() {
            self.rows.resize_with(index + 1, Vec::new);
        }
        let row = &mut self.rows[index];
        if slot >= row.len() {
            row.resize_with(slot + 1, || None);
        }
        row[slot] = Some(value);
    }

    pub(crate) fn get(&self, entity: Entity, slot: usize) -> Option<&StoredValue> {
        self.rows.get(entity.index())?.get(slot)?.as_ref()
    }

    pub(crate) fn get_mut(&mut self, entity: Entity, slot: usize) -> Option<&mut StoredValue> {
        self.rows.get_mut(entity.index())?.get_mut(slot)?.as_mut()
    }

    pub(crate) fn remove(&mut self, entity: Entity, slot: usize) -> Option<StoredValue> {
        self.rows.get_mut(entity.index())?.get_mut(slot)?.take()
    }

    pub(crate) fn contains(&self, entity: Entity, slot: usize) -> bool {
        self.get(entity, slot).is_some()
    }

    /// Drop every value held by `entity`.
    pub(crate) fn clear(&mut self, entity: Entity) {
        if let Some(row) = self.rows.get_mut(entity.index()) {
            row.clear();
        }
    }

    /// The occupied slots of `entity`, ascending.
    pub(crate) fn occupied(&self, entity: Entity) -> impl Iterator<Item = usize> + '_ {
        self.rows
            .get(entity.index())
            .into_iter()
            .flat_map(|row| row.iter().enumerate())
            .filter(|(_, value)| value.is_some())
            .map(|(slot, _)| slot)
    }
}
