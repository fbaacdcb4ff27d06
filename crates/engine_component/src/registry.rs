//! Slot registry. Maps component kinds and tags to bit positions.
//!
//! Every component kind and every tag owns one integer **slot** in a single
//! shared index space. Slots come from a monotonic counter and are never
//! reclaimed. The four reserved slots are assigned before any user
//! registration and always occupy the lowest indices.

use std::collections::HashMap;

use tracing::debug;

use crate::component::{Component, ComponentKind, ComponentTypeId};
use crate::error::RegistryError;

/// Set on every live entity.
pub const ALIVE_SLOT: usize = 0;
/// Holds the entity's display name; set on every live entity.
pub const NAME_SLOT: usize = 1;
/// Holds the parent id of a child entity.
pub const PARENT_SLOT: usize = 2;
/// Holds the child id set of an entity with children.
pub const CHILDREN_SLOT: usize = 3;

/// Slots present in every live entity's mask and in every query's required set.
pub const RESERVED_MASK_SLOTS: [usize; 2] = [ALIVE_SLOT, NAME_SLOT];

/// Tag names backing the reserved slots, in slot order.
pub const RESERVED_TAGS: [&str; 4] = [
    "_reserved_entity_alive_tag_",
    "_reserved_entity_name_tag_",
    "_reserved_entity_parent_tag_",
    "_reserved_entity_children_tag_",
];

/// What a slot was registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// One of the engine's reserved slots.
    Reserved,
    /// A typed component kind.
    Component,
    /// A zero-payload tag.
    Tag,
}

impl SlotKind {
    fn label(self) -> &'static str {
        match self {
            SlotKind::Component => "component",
            SlotKind::Tag | SlotKind::Reserved => "tag",
        }
    }
}

/// Metadata about one registered slot.
#[derive(Debug, Clone)]
pub struct SlotInfo {
    /// The component type name or tag string.
    pub name: String,
    /// What the slot holds.
    pub kind: SlotKind,
}

/// The registry owned by one world.
#[derive(Debug)]
pub struct Registry {
    slots: HashMap<ComponentTypeId, usize>,
    /// Indexed by slot.
    infos: Vec<SlotInfo>,
}

impl Registry {
    /// Create a registry with the reserved slots already assigned.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self {
            slots: HashMap::new(),
            infos: Vec::new(),
        };
        for name in RESERVED_TAGS {
            registry.insert(ComponentTypeId::from_name(name), name, SlotKind::Reserved);
        }
        registry
    }

    fn insert(&mut self, type_id: ComponentTypeId, name: &str, kind: SlotKind) -> usize {
        let slot = self.infos.len();
        self.slots.insert(type_id, slot);
        self.infos.push(SlotInfo {
            name: name.to_string(),
            kind,
        });
        debug!(slot, name, kind = kind.label(), "slot registered");
        slot
    }

    /// Register component type `T` and return its slot.
    ///
    /// # Errors
    ///
    /// [`RegistryError::AlreadyRegistered`] if the name already has a slot.
    pub fn register_component<T: Component>(&mut self) -> Result<usize, RegistryError> {
        self.register_kind(T::kind())
    }

    /// Register a component kind and return its slot.
    ///
    /// # Errors
    ///
    /// [`RegistryError::AlreadyRegistered`] if the name already has a slot.
    pub fn register_kind(&mut self, kind: ComponentKind) -> Result<usize, RegistryError> {
        if self.slots.contains_key(&kind.type_id) {
            return Err(RegistryError::AlreadyRegistered {
                kind: SlotKind::Component.label(),
                name: kind.name.to_string(),
            });
        }
        Ok(self.insert(kind.type_id, kind.name, SlotKind::Component))
    }

    /// Register several component kinds. Either every kind is registered or
    /// none is.
    ///
    /// # Errors
    ///
    /// [`RegistryError::AlreadyRegistered`] if any kind is registered
    /// already or appears twice in `kinds`.
    pub fn register_kinds(&mut self, kinds: &[ComponentKind]) -> Result<(), RegistryError> {
        for (i, kind) in kinds.iter().enumerate() {
            let repeated = kinds[..i].iter().any(|k| k.type_id == kind.type_id);
            if repeated || self.slots.contains_key(&kind.type_id) {
                return Err(RegistryError::AlreadyRegistered {
                    kind: SlotKind::Component.label(),
                    name: kind.name.to_string(),
                });
            }
        }
        for kind in kinds {
            self.insert(kind.type_id, kind.name, SlotKind::Component);
        }
        Ok(())
    }

    /// Register several tags. Either every tag is registered or none is.
    ///
    /// # Errors
    ///
    /// [`RegistryError::AlreadyRegistered`] if any tag is registered already
    /// or appears twice in `tags`.
    pub fn register_tags<S: AsRef<str>>(&mut self, tags: &[S]) -> Result<(), RegistryError> {
        for (i, tag) in tags.iter().enumerate() {
            let tag = tag.as_ref();
            let repeated = tags[..i].iter().any(|t| t.as_ref() == tag);
            if repeated || self.slots.contains_key(&ComponentTypeId::from_name(tag)) {
                return Err(RegistryError::AlreadyRegistered {
                    kind: SlotKind::Tag.label(),
                    name: tag.to_string(),
                });
            }
        }
        for tag in tags {
            let tag = tag.as_ref();
            self.insert(ComponentTypeId::from_name(tag), tag, SlotKind::Tag);
        }
        Ok(())
    }

    /// The slot of a component kind.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotRegistered`] if the kind has no slot.
    pub fn kind_slot(&self, kind: ComponentKind) -> Result<usize, RegistryError> {
        self.slots
            .get(&kind.type_id)
            .copied()
            .ok_or_else(|| RegistryError::NotRegistered {
                kind: SlotKind::Component.label(),
                name: kind.name.to_string(),
            })
    }

    /// The slot of component type `T`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotRegistered`] if `T` has no slot.
    pub fn component_slot<T: Component>(&self) -> Result<usize, RegistryError> {
        self.kind_slot(T::kind())
    }

    /// The slot of a tag.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotRegistered`] if the tag has no slot.
    pub fn tag_slot(&self, tag: &str) -> Result<usize, RegistryError> {
        self.slots
            .get(&ComponentTypeId::from_name(tag))
            .copied()
            .ok_or_else(|| RegistryError::NotRegistered {
                kind: SlotKind::Tag.label(),
                name: tag.to_string(),
            })
    }

    /// Returns `true` if `tag` has a slot.
    #[must_use]
    pub fn is_tag_registered(&self, tag: &str) -> bool {
        self.slots.contains_key(&ComponentTypeId::from_name(tag))
    }

    /// Metadata for a slot.
    #[must_use]
    pub fn info(&self, slot: usize) -> Option<&SlotInfo> {
        self.infos.get(slot)
    }

    /// Number of slots assigned, reserved ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Always `false`: the reserved slots are assigned on construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
