//! Registration error types.

/// Errors raised while registering or resolving component kinds and tags.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The name was already assigned a slot.
    #[error("{kind} {name} already registered")]
    AlreadyRegistered {
        /// `"component"` or `"tag"`.
        kind: &'static str,
        /// The offending name.
        name: String,
    },

    /// The name has no slot.
    #[error("{kind} {name} is not registered")]
    NotRegistered {
        /// `"component"` or `"tag"`.
        kind: &'static str,
        /// The offending name.
        name: String,
    },
}
