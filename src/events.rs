//! Named publish/subscribe primitive
//!
//! Every observable component (signal buffers, serial links, link pools)
//! embeds an [`EventHub`] and forwards `on`/`emit` to it. A hub is generic
//! over an event enum implementing [`Event`]; subscriptions are keyed by the
//! event's [`Event::Kind`], which also has a stable string name so that
//! subscriptions can be made by name (`"data"`, `"connection"`, ...).
//!
//! Handlers run synchronously on the emitting thread, in registration
//! order. A slow handler stalls the emitter; use
//! [`EventHub::subscribe_channel`] to hand events off to another thread
//! instead.

use crossbeam_channel::{unbounded, Receiver};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// An event that can be published through an [`EventHub`]
pub trait Event: Send + Sync + 'static {
    /// Discriminant used to route the event to its subscribers
    type Kind: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    /// The kind of this event
    fn kind(&self) -> Self::Kind;
}

/// Stable string names for event kinds
pub trait EventName: Sized {
    /// The wire/display name of this kind
    fn as_str(&self) -> &'static str;

    /// Look up a kind by name
    fn from_name(name: &str) -> Option<Self>;
}

enum Handler<E> {
    /// Receives the event payload
    Payload(Arc<dyn Fn(&E) + Send + Sync>),
    /// Only told that the event happened
    Signal(Arc<dyn Fn() + Send + Sync>),
}

impl<E> Clone for Handler<E> {
    fn clone(&self) -> Self {
        match self {
            Handler::Payload(f) => Handler::Payload(Arc::clone(f)),
            Handler::Signal(f) => Handler::Signal(Arc::clone(f)),
        }
    }
}

/// Registry of event handlers keyed by event kind
pub struct EventHub<E: Event> {
    enabled: AtomicBool,
    subscribers: RwLock<HashMap<E::Kind, Vec<Handler<E>>>>,
}

impl<E: Event> Default for EventHub<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> Debug for EventHub<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<E::Kind> = self
            .subscribers
            .read()
            .map(|subs| subs.keys().copied().collect())
            .unwrap_or_default();
        f.debug_struct("EventHub")
            .field("enabled", &self.is_enabled())
            .field("kinds", &kinds)
            .finish()
    }
}

impl<E: Event> EventHub<E> {
    /// Create an enabled hub with no subscribers
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Create a hub whose `emit` is inert until re-enabled
    pub fn disabled() -> Self {
        let hub = Self::new();
        hub.set_enabled(false);
        hub
    }

    /// Enable or disable event delivery
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Whether `emit` currently delivers events
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Register a handler that receives the event
    ///
    /// Handlers accumulate; registering never replaces an earlier handler.
    pub fn on<F>(&self, kind: E::Kind, handler: F)
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.push(kind, Handler::Payload(Arc::new(handler)));
    }

    /// Register a handler that is only notified, without the payload
    pub fn on_signal<F>(&self, kind: E::Kind, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.push(kind, Handler::Signal(Arc::new(handler)));
    }

    /// Subscribe through a channel instead of a callback
    ///
    /// Events are cloned into an unbounded channel; once the receiver is
    /// dropped, sends fail silently.
    pub fn subscribe_channel(&self, kind: E::Kind) -> Receiver<E>
    where
        E: Clone,
    {
        let (tx, rx) = unbounded();
        self.on(kind, move |event: &E| {
            let _ = tx.send(event.clone());
        });
        rx
    }

    /// Number of handlers registered for a kind
    pub fn subscriber_count(&self, kind: E::Kind) -> usize {
        self.subscribers
            .read()
            .map(|subs| subs.get(&kind).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    /// Deliver an event to every handler registered for its kind
    ///
    /// Emitting a kind without subscribers, or emitting on a disabled hub,
    /// does nothing.
    pub fn emit(&self, event: &E) {
        if !self.is_enabled() {
            return;
        }

        // Snapshot the handler list so handlers may subscribe re-entrantly.
        let handlers: Vec<Handler<E>> = match self.subscribers.read() {
            Ok(subs) => match subs.get(&event.kind()) {
                Some(list) => list.clone(),
                None => return,
            },
            Err(poisoned) => match poisoned.get_ref().get(&event.kind()) {
                Some(list) => list.clone(),
                None => return,
            },
        };

        for handler in &handlers {
            match handler {
                Handler::Payload(f) => f(event),
                Handler::Signal(f) => f(),
            }
        }
    }

    fn push(&self, kind: E::Kind, handler: Handler<E>) {
        let mut subs = self
            .subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subs.entry(kind).or_default().push(handler);
    }
}
