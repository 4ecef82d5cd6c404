//! Typed observer registries
//!
//! [`EventDispatcher`] is the synchronous counterpart of a broadcast channel:
//! `notify` calls every subscriber in registration order and returns only
//! after the last one has run. The subscriber list is copied before
//! dispatch, so handlers may subscribe or unsubscribe while being notified.
//!
//! # Example
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use hypercrud::events::EventDispatcher;
//!
//! let dispatcher = EventDispatcher::<u32>::new();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//!
//! let sink = seen.clone();
//! let id = dispatcher.subscribe(move |n| sink.lock().unwrap().push(*n));
//!
//! dispatcher.notify(&7);
//! assert!(dispatcher.unsubscribe(id));
//! dispatcher.notify(&8);
//!
//! assert_eq!(*seen.lock().unwrap(), vec![7]);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Handle returned by [`EventDispatcher::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Ordered, synchronous observer registry
pub struct EventDispatcher<T> {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(SubscriptionId, Handler<T>)>>,
}

impl<T> EventDispatcher<T> {
    /// Create an empty dispatcher
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            handlers: Mutex::new(Vec::new()),
        }
    }

    /// Register a handler; it runs after every handler registered before it
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.lock();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    /// Deliver `event` to every subscriber, in registration order
    pub fn notify(&self, event: &T) {
        let snapshot: Vec<Handler<T>> = self.lock().iter().map(|(_, h)| h.clone()).collect();
        for handler in snapshot {
            handler(event);
        }
    }

    /// Number of registered subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(SubscriptionId, Handler<T>)>> {
        // A panicking subscriber never holds this lock, so poisoning is benign
        self.handlers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl<T> Default for EventDispatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for EventDispatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
