//! World-level named events.
//!
//! Any code holding the world can listen on an event name and emit a
//! payload under it. Payloads are passed as `&dyn Any`; listeners downcast
//! to the type they expect and ignore anything else.

use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::trace;

use crate::query::SubscriptionId;
use crate::world::World;

/// A named-event listener.
pub type EventCallback = Rc<dyn Fn(&mut World, &dyn Any)>;

/// Listeners keyed by event name.
#[derive(Default)]
pub struct EventBus {
    listeners: HashMap<String, Vec<(SubscriptionId, EventCallback)>>,
    next_subscription: u64,
}

impl EventBus {
    fn subscribe(&mut self, event: &str, callback: EventCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners
            .entry(event.to_owned())
            .or_default()
            .push((id, callback));
        id
    }

    fn unsubscribe(&mut self, event: &str, id: SubscriptionId) -> bool {
        let Some(listeners) = self.listeners.get_mut(event) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(listener, _)| *listener != id);
        let removed = listeners.len() != before;
        if listeners.is_empty() {
            self.listeners.remove(event);
        }
        removed
    }

    fn is_subscribed(&self, event: &str, id: SubscriptionId) -> bool {
        self.listeners
            .get(event)
            .is_some_and(|listeners| listeners.iter().any(|(listener, _)| *listener == id))
    }

    fn snapshot(&self, event: &str) -> Vec<(SubscriptionId, EventCallback)> {
        self.listeners.get(event).cloned().unwrap_or_default()
    }

    /// Number of listeners on `event`.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.get(event).map_or(0, Vec::len)
    }

    /// Event names with at least one listener.
    pub fn events(&self) -> impl Iterator<Item = &str> {
        self.listeners.keys().map(String::as_str)
    }
}

impl World {
    /// Listen for `event`.
    pub fn on_event<F>(&mut self, event: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&mut World, &dyn Any) + 'static,
    {
        self.events.subscribe(event, Rc::new(callback))
    }

    /// Stop the listener `id` on `event`. Returns `false` if it was not
    /// listening.
    pub fn remove_event_listener(&mut self, event: &str, id: SubscriptionId) -> bool {
        self.events.unsubscribe(event, id)
    }

    /// Call every listener on `event` with `payload`, in subscription
    /// order, and return how many ran.
    ///
    /// Listeners subscribed during the emission first hear the next one.
    /// A listener removed during the emission no longer runs.
    pub fn emit_event<T: Any>(&mut self, event: &str, payload: &T) -> usize {
        let payload: &dyn Any = payload;
        let snapshot = self.events.snapshot(event);
        let mut called = 0;
        for (id, callback) in snapshot {
            if !self.events.is_subscribed(event, id) {
                continue;
            }
            callback(self, payload);
            called += 1;
        }
        trace!(event, listeners = called, "event emitted");
        called
    }

    /// The named-event listeners.
    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }
}
