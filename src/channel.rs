//! Synchronous transition-event broadcasting.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Event published for every successful transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    /// State the transition is leaving.
    pub from: String,

    /// Target state.
    pub to: String,

    /// Payload carried by the transition, absent when the rule produced
    /// none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

type Listener = Arc<dyn Fn(&TransitionEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
    closed: bool,
}

/// Multi-subscriber broadcast channel.
///
/// Delivery is synchronous and in subscription order: `publish` invokes
/// every still-registered listener before it returns. The listener list is
/// snapshotted at publish time, so a listener may subscribe or unsubscribe
/// others without corrupting the dispatch in progress; additions made
/// during a publish are not seen by that publish. There is no buffering
/// and no replay: a listener attached after an event never sees it.
pub struct EventChannel {
    registry: Arc<Mutex<Registry>>,
}

impl EventChannel {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    /// Registers a listener and returns its cancellation handle.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&TransitionEvent) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        if !registry.closed {
            registry.listeners.push((id, Arc::new(listener)));
        }
        Subscription {
            id,
            registry: Arc::clone(&self.registry),
        }
    }

    /// Delivers an event to every registered listener, in subscription
    /// order, before returning.
    pub fn publish(&self, event: &TransitionEvent) {
        let snapshot: Vec<Listener> = {
            let registry = self.registry.lock();
            registry
                .listeners
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect()
        };

        for listener in snapshot {
            listener(event);
        }
    }

    /// Detaches all listeners and refuses further registrations. Handles
    /// issued earlier become inert.
    pub fn close(&self) {
        let mut registry = self.registry.lock();
        registry.closed = true;
        registry.listeners.clear();
    }

    pub fn listener_count(&self) -> usize {
        self.registry.lock().listeners.len()
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for a single registration.
///
/// Dropping the handle does not unsubscribe; delivery stops only via
/// [`Subscription::unsubscribe`] or when the channel is closed, after
/// which the handle is inert.
pub struct Subscription {
    id: u64,
    registry: Arc<Mutex<Registry>>,
}

impl Subscription {
    /// Stops further delivery to this listener only. No-op on a closed
    /// channel or when called twice.
    pub fn unsubscribe(&self) {
        let mut registry = self.registry.lock();
        if registry.closed {
            return;
        }
        registry.listeners.retain(|(id, _)| *id != self.id);
    }
}
