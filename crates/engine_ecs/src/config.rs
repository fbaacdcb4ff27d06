//! World configuration.

use serde::Deserialize;

/// Default entity capacity.
pub const DEFAULT_MAX_ENTITIES: usize = 10_000;

/// Configuration for a [`World`](crate::World).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Fixed maximum number of live entities. There is no resizing: creating
    /// an entity beyond this fails with
    /// [`WorldError::CapacityExceeded`](crate::WorldError::CapacityExceeded).
    pub max_entities: usize,
}

impl WorldConfig {
    /// Create a config with the given entity capacity.
    #[must_use]
    pub fn new(max_entities: usize) -> Self {
        Self { max_entities }
    }

    /// Override the entity capacity.
    #[must_use]
    pub fn with_max_entities(mut self, max_entities: usize) -> Self {
        self.max_entities = max_entities;
        self
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            max_entities: DEFAULT_MAX_ENTITIES,
        }
    }
}
