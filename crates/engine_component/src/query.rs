//! Query terms and the masks they compile to.
//!
//! A query is declared as a list of [`QueryTerm`]s: each term either
//! requires or excludes one component kind or tag. Against a [`Registry`]
//! the list compiles to a [`QueryMask`], a pair of bitsets that tests an
//! entity mask in O(words).

use crate::bitset::BitSet;
use crate::component::{Component, ComponentKind};
use crate::error::RegistryError;
use crate::registry::{RESERVED_MASK_SLOTS, Registry};

/// Names one slot: a component kind or a tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// A typed component kind.
    Component(ComponentKind),
    /// A tag name.
    Tag(String),
}

impl Selector {
    fn slot(&self, registry: &Registry) -> Result<usize, RegistryError> {
        match self {
            Selector::Component(kind) => registry.kind_slot(*kind),
            Selector::Tag(tag) => registry.tag_slot(tag),
        }
    }
}

/// One element of a query declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryTerm {
    /// Only match entities that have this component or tag.
    With(Selector),
    /// Only match entities that do NOT have this component or tag.
    Without(Selector),
}

impl QueryTerm {
    /// Require component `T`.
    #[must_use]
    pub fn with<T: Component>() -> Self {
        QueryTerm::With(Selector::Component(T::kind()))
    }

    /// Exclude component `T`.
    #[must_use]
    pub fn without<T: Component>() -> Self {
        QueryTerm::Without(Selector::Component(T::kind()))
    }

    /// Require a tag.
    #[must_use]
    pub fn tag(name: impl Into<String>) -> Self {
        QueryTerm::With(Selector::Tag(name.into()))
    }

    /// Exclude a tag.
    #[must_use]
    pub fn without_tag(name: impl Into<String>) -> Self {
        QueryTerm::Without(Selector::Tag(name.into()))
    }
}

/// Turn a term into an exclusion. Excluding an exclusion keeps it excluded.
#[must_use]
pub fn not(term: impl Into<QueryTerm>) -> QueryTerm {
    match term.into() {
        QueryTerm::With(selector) | QueryTerm::Without(selector) => QueryTerm::Without(selector),
    }
}

impl From<&str> for QueryTerm {
    fn from(tag: &str) -> Self {
        QueryTerm::tag(tag)
    }
}

impl From<String> for QueryTerm {
    fn from(tag: String) -> Self {
        QueryTerm::tag(tag)
    }
}

impl From<ComponentKind> for QueryTerm {
    fn from(kind: ComponentKind) -> Self {
        QueryTerm::With(Selector::Component(kind))
    }
}

/// A compiled membership predicate: `(required, excluded)` slot sets.
///
/// Equality and hashing are bitset-for-bitset, so two masks built from the
/// same terms in any order are equal and share one query registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryMask {
    required: BitSet,
    excluded: BitSet,
}

impl QueryMask {
    /// Build a mask from raw slot sets.
    #[must_use]
    pub fn new(required: BitSet, excluded: BitSet) -> Self {
        Self { required, excluded }
    }

    /// Compile a term list against `registry`.
    ///
    /// The reserved alive and name slots are always required, so an empty
    /// term list matches every live entity.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotRegistered`] if any term, including an
    /// exclusion, names an unregistered kind or tag.
    pub fn from_terms(registry: &Registry, terms: &[QueryTerm]) -> Result<Self, RegistryError> {
        let mut required = BitSet::from_slots(&RESERVED_MASK_SLOTS);
        let mut excluded = BitSet::new();
        for term in terms {
            match term {
                QueryTerm::With(selector) => required.add(selector.slot(registry)?),
                QueryTerm::Without(selector) => excluded.add(selector.slot(registry)?),
            }
        }
        Ok(Self { required, excluded })
    }

    /// Returns `true` if an entity with `mask` belongs to this query:
    /// every required slot present and no excluded slot present.
    #[must_use]
    pub fn matches(&self, mask: &BitSet) -> bool {
        self.required.intersects(mask) && self.excluded.intersection_size(mask) == 0
    }

    /// The slots an entity must have.
    #[must_use]
    pub fn required(&self) -> &BitSet {
        &self.required
    }

    /// The slots an entity must not have.
    #[must_use]
    pub fn excluded(&self) -> &BitSet {
        &self.excluded
    }
}
