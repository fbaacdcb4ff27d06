//! Live query handles and their event subscriber lists.
//!
//! A [`Query`] is a cheap, clonable handle onto the entity set of one
//! [`QueryMask`]. Handles created from equal masks observe the same set but
//! keep their own subscribers and their own `remove_on_empty` policy.
//!
//! Callbacks receive `&mut World` and may mutate it freely, including
//! creating and removing entities or queries. Emission iterates a snapshot
//! of the subscriber list, so a callback that subscribes or unsubscribes
//! mid-emission neither skips a listener nor fires one twice.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use engine_component::{Entity, QueryMask};

use crate::world::World;

/// A query event listener.
pub type QueryCallback = Rc<dyn Fn(&mut World, Entity)>;

/// Identifies one subscription on one [`Query`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

#[derive(Clone)]
struct Subscriber {
    id: SubscriptionId,
    callback: QueryCallback,
    once: bool,
}

#[derive(Default)]
struct QueryEvents {
    subscribers: RefCell<Vec<Subscriber>>,
}

impl QueryEvents {
    fn subscribe(&self, id: SubscriptionId, callback: QueryCallback, once: bool) {
        self.subscribers.borrow_mut().push(Subscriber { id, callback, once });
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    fn clear(&self) {
        self.subscribers.borrow_mut().clear();
    }

    fn len(&self) -> usize {
        self.subscribers.borrow().len()
    }

    fn emit(&self, world: &mut World, entity: Entity) {
        let snapshot = self.subscribers.borrow().clone();
        for subscriber in snapshot {
            // A once-listener already consumed by a nested emission must not fire again.
            if subscriber.once && !self.unsubscribe(subscriber.id) {
                continue;
            }
            (subscriber.callback)(world, entity);
        }
    }
}

struct QueryInner {
    id: u64,
    mask: QueryMask,
    entities: Rc<RefCell<BTreeSet<Entity>>>,
    usage: Rc<Cell<usize>>,
    remove_on_empty: bool,
    attached: Cell<bool>,
    disposed: Cell<bool>,
    next_subscription: Cell<u64>,
    on_add: QueryEvents,
    on_remove: QueryEvents,
    on_empty: QueryEvents,
}

/// A live view onto the entities matching one [`QueryMask`].
///
/// Handles compare equal only to clones of themselves.
#[derive(Clone)]
pub struct Query {
    inner: Rc<QueryInner>,
}

impl Query {
    pub(crate) fn new(
        id: u64,
        mask: QueryMask,
        entities: Rc<RefCell<BTreeSet<Entity>>>,
        usage: Rc<Cell<usize>>,
        remove_on_empty: bool,
    ) -> Self {
        usage.set(usage.get() + 1);
        Self {
            inner: Rc::new(QueryInner {
                id,
                mask,
                entities,
                usage,
                remove_on_empty,
                attached: Cell::new(true),
                disposed: Cell::new(false),
                next_subscription: Cell::new(0),
                on_add: QueryEvents::default(),
                on_remove: QueryEvents::default(),
                on_empty: QueryEvents::default(),
            }),
        }
    }

    fn next_subscription(&self) -> SubscriptionId {
        let id = self.inner.next_subscription.get();
        self.inner.next_subscription.set(id + 1);
        SubscriptionId(id)
    }

    // -- Subscriptions --

    /// Listen for entities entering the query.
    ///
    /// Unless `no_emit_on_subscribe` is set, `callback` is invoked right away
    /// once for every entity already in the query.
    pub fn on_add_subscribe<F>(
        &self,
        world: &mut World,
        callback: F,
        no_emit_on_subscribe: bool,
    ) -> SubscriptionId
    where
        F: Fn(&mut World, Entity) + 'static,
    {
        let id = self.next_subscription();
        let callback: QueryCallback = Rc::new(callback);
        self.inner.on_add.subscribe(id, Rc::clone(&callback), false);
        if !no_emit_on_subscribe {
            for entity in self.entities() {
                if self.contains(entity) {
                    callback(world, entity);
                }
            }
        }
        id
    }

    /// Listen for the next entity entering the query, then unsubscribe.
    pub fn on_add_once_subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&mut World, Entity) + 'static,
    {
        let id = self.next_subscription();
        self.inner.on_add.subscribe(id, Rc::new(callback), true);
        id
    }

    /// Remove an add listener. Returns `false` if it was not subscribed.
    pub fn on_add_unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.on_add.unsubscribe(id)
    }

    /// Listen for entities leaving the query. The entity's components are
    /// still readable while the callback runs.
    pub fn on_remove_subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&mut World, Entity) + 'static,
    {
        let id = self.next_subscription();
        self.inner.on_remove.subscribe(id, Rc::new(callback), false);
        id
    }

    /// Listen for the next entity leaving the query, then unsubscribe.
    pub fn on_remove_once_subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&mut World, Entity) + 'static,
    {
        let id = self.next_subscription();
        self.inner.on_remove.subscribe(id, Rc::new(callback), true);
        id
    }

    /// Remove a remove listener. Returns `false` if it was not subscribed.
    pub fn on_remove_unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.on_remove.unsubscribe(id)
    }

    /// Listen for the query becoming empty. The callback receives the
    /// entity whose removal emptied it.
    pub fn on_empty_subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&mut World, Entity) + 'static,
    {
        let id = self.next_subscription();
        self.inner.on_empty.subscribe(id, Rc::new(callback), false);
        id
    }

    /// Listen for the query becoming empty once, then unsubscribe.
    pub fn on_empty_once_subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&mut World, Entity) + 'static,
    {
        let id = self.next_subscription();
        self.inner.on_empty.subscribe(id, Rc::new(callback), true);
        id
    }

    /// Remove an empty listener. Returns `false` if it was not subscribed.
    pub fn on_empty_unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.on_empty.unsubscribe(id)
    }

    /// Total number of listeners across all three events.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.on_add.len() + self.inner.on_remove.len() + self.inner.on_empty.len()
    }

    // -- Membership --

    /// The current members, ascending by id.
    #[must_use]
    pub fn entities(&self) -> Vec<Entity> {
        self.inner.entities.borrow().iter().copied().collect()
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entities.borrow().len()
    }

    /// Returns `true` if the query has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entities.borrow().is_empty()
    }

    /// Returns `true` if `entity` is a member.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.inner.entities.borrow().contains(&entity)
    }

    /// The first member satisfying `predicate`.
    pub fn find<P>(&self, mut predicate: P) -> Option<Entity>
    where
        P: FnMut(Entity) -> bool,
    {
        self.inner
            .entities
            .borrow()
            .iter()
            .copied()
            .find(|&entity| predicate(entity))
    }

    /// Every member satisfying `predicate`.
    pub fn filter<P>(&self, mut predicate: P) -> Vec<Entity>
    where
        P: FnMut(Entity) -> bool,
    {
        self.inner
            .entities
            .borrow()
            .iter()
            .copied()
            .filter(|&entity| predicate(entity))
            .collect()
    }

    // -- Metadata --

    /// The membership predicate.
    #[must_use]
    pub fn mask(&self) -> &QueryMask {
        &self.inner.mask
    }

    /// Number of live handles observing this query's entity set.
    #[must_use]
    pub fn usage_counter(&self) -> usize {
        self.inner.usage.get()
    }

    /// Whether this handle disposes itself once the set becomes empty.
    #[must_use]
    pub fn remove_on_empty(&self) -> bool {
        self.inner.remove_on_empty
    }

    /// Returns `true` once the handle has been removed from its world.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        !self.inner.attached.get()
    }

    /// Returns `true` if both handles observe the same entity set.
    #[must_use]
    pub fn shares_entities_with(&self, other: &Query) -> bool {
        Rc::ptr_eq(&self.inner.entities, &other.inner.entities)
    }

    // -- Engine side --

    pub(crate) fn emit_add(&self, world: &mut World, entity: Entity) {
        if !self.inner.disposed.get() {
            self.inner.on_add.emit(world, entity);
        }
    }

    pub(crate) fn emit_remove(&self, world: &mut World, entity: Entity) {
        if !self.inner.disposed.get() {
            self.inner.on_remove.emit(world, entity);
        }
    }

    pub(crate) fn emit_empty(&self, world: &mut World, entity: Entity) {
        if !self.inner.disposed.get() {
            self.inner.on_empty.emit(world, entity);
        }
    }

    /// Stop counting this handle as a user of its set. Subscribers stay.
    pub(crate) fn detach(&self) -> bool {
        if !self.inner.attached.replace(false) {
            return false;
        }
        let usage = &self.inner.usage;
        usage.set(usage.get().saturating_sub(1));
        true
    }

    /// Detach and drop every subscriber.
    pub(crate) fn dispose(&self) {
        self.detach();
        self.inner.disposed.set(true);
        self.inner.on_add.clear();
        self.inner.on_remove.clear();
        self.inner.on_empty.clear();
    }
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Query {}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("id", &self.inner.id)
            .field("len", &self.len())
            .field("remove_on_empty", &self.inner.remove_on_empty)
            .field("usage_counter", &self.usage_counter())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
