//! World error types.

use engine_component::{Entity, RegistryError};

/// Errors returned by [`World`](crate::World) operations.
///
/// Every variant is a precondition violation. Operations fail before
/// mutating anything, so a failed call leaves the world unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    /// Entity creation beyond the fixed capacity.
    #[error("entity limit of {max} reached")]
    CapacityExceeded {
        /// The configured capacity.
        max: usize,
    },

    /// A named entity creation collided with an existing name.
    #[error("entity with name {0} already exists")]
    DuplicateName(String),

    /// A per-entity operation on a dead or unknown id.
    #[error("{0} does not exist")]
    EntityNotFound(Entity),

    /// An unregistered component kind or tag.
    #[error("{kind} {name} is not registered")]
    NotRegistered {
        /// `"component"` or `"tag"`.
        kind: &'static str,
        /// The offending name.
        name: String,
    },

    /// A duplicate registration.
    #[error("{kind} {name} already registered")]
    AlreadyRegistered {
        /// `"component"` or `"tag"`.
        kind: &'static str,
        /// The offending name.
        name: String,
    },

    /// A non-forced add onto an occupied component slot.
    #[error("{entity} already has component {component}")]
    DuplicateComponent {
        /// The target entity.
        entity: Entity,
        /// The component type name.
        component: &'static str,
    },
}

impl From<RegistryError> for WorldError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::AlreadyRegistered { kind, name } => {
                WorldError::AlreadyRegistered { kind, name }
            }
            RegistryError::NotRegistered { kind, name } => WorldError::NotRegistered { kind, name },
        }
    }
}
