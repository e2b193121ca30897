//! A listener that keeps the highwater cache, and record export over it.

use eventsource_core::listener::{CacheSnapshot, EventSourceListener, ListenerResult};
use eventsource_core::message::Message;
use std::sync::{Arc, OnceLock};

/// Records the cache delivered by `on_highwater`.
///
/// Pair it with the [`CacheHandle`] returned by [`CacheListener::new`] to read
/// the cache from outside the worker.
#[derive(Debug)]
pub struct CacheListener<K, V> {
    slot: Arc<OnceLock<CacheSnapshot<K, V>>>,
}

impl<K, V> CacheListener<K, V> {
    /// Create a listener and the handle that reads what it records.
    #[must_use]
    pub fn new() -> (Self, CacheHandle<K, V>) {
        let slot = Arc::new(OnceLock::new());
        let handle = CacheHandle {
            slot: Arc::clone(&slot),
        };
        (Self { slot }, handle)
    }
}

impl<K: Send + Sync, V: Send + Sync> EventSourceListener<K, V> for CacheListener<K, V> {
    fn on_highwater(&mut self, cache: CacheSnapshot<K, V>) -> ListenerResult {
        if self.slot.set(cache).is_err() {
            tracing::warn!("Highwater cache delivered twice, keeping the first");
        }
        Ok(())
    }

    fn on_batch(&mut self, _messages: &[Message<K, V>], _highwater_reached: bool) -> ListenerResult {
        Ok(())
    }
}

/// Read side of a [`CacheListener`].
#[derive(Debug)]
pub struct CacheHandle<K, V> {
    slot: Arc<OnceLock<CacheSnapshot<K, V>>>,
}

impl<K, V> Clone for CacheHandle<K, V> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<K, V> CacheHandle<K, V> {
    /// The highwater cache, once the highwater was reached.
    #[must_use]
    pub fn snapshot(&self) -> Option<CacheSnapshot<K, V>> {
        self.slot.get().map(Arc::clone)
    }
}

/// Cached records accepted by `filter`, ordered by key.
///
/// Tombstones never appear: the cache does not hold them.
pub fn export_records<K, V, F>(cache: &CacheSnapshot<K, V>, mut filter: F) -> Vec<&Message<K, V>>
where
    K: Ord,
    F: FnMut(&K, &V) -> bool,
{
    let mut records: Vec<&Message<K, V>> = cache
        .values()
        .filter(|message| {
            message
                .value()
                .is_some_and(|value| filter(message.key(), value))
        })
        .collect();
    records.sort_by(|a, b| a.key().cmp(b.key()));
    records
}
