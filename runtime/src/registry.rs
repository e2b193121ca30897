//! Ordered listener registry.
//!
//! The registry is owned by the table until `start()` and by the worker after
//! it, so it is never read and written concurrently.

use eventsource_core::error::ListenerError;
use eventsource_core::listener::{CacheSnapshot, EventSourceListener};
use eventsource_core::message::Message;
use std::fmt;
use std::sync::Arc;

/// Handle identifying a registered listener, used to remove it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Boxed listener as stored in the registry.
pub type BoxedListener<K, V> = Box<dyn EventSourceListener<K, V>>;

/// Listeners in registration order.
pub struct ListenerRegistry<K, V> {
    entries: Vec<(ListenerId, BoxedListener<K, V>)>,
    next_id: u64,
}

impl<K, V> Default for ListenerRegistry<K, V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
        }
    }
}

impl<K, V> fmt::Debug for ListenerRegistry<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field(
                "listeners",
                &self.entries.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<K, V> ListenerRegistry<K, V> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener; it is notified after every listener added before it.
    pub fn add(&mut self, listener: BoxedListener<K, V>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, listener));
        id
    }

    /// Remove a listener. Returns `false` if `id` is not registered.
    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no listeners are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deliver a batch to every listener, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first [`ListenerError`] raised.
    pub fn dispatch_batch(
        &mut self,
        messages: &[Message<K, V>],
        highwater_reached: bool,
    ) -> Result<(), ListenerError> {
        for (_, listener) in &mut self.entries {
            listener.on_batch(messages, highwater_reached)?;
        }
        Ok(())
    }

    /// Deliver the highwater cache to every listener, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first [`ListenerError`] raised.
    pub fn dispatch_highwater(&mut self, cache: &CacheSnapshot<K, V>) -> Result<(), ListenerError> {
        for (_, listener) in &mut self.entries {
            listener.on_highwater(Arc::clone(cache))?;
        }
        Ok(())
    }
}
