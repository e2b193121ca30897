//! Compacted cache and the batch buffer.
//!
//! Both containers are owned by the table's worker thread and never shared
//! while they are being written, so neither needs a lock.

use eventsource_core::listener::CacheSnapshot;
use eventsource_core::message::Message;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

/// Key to latest-message map, emulating log compaction on the client.
///
/// A tombstone evicts its key. When disabled, [`apply`](Self::apply) is a
/// no-op and the snapshot is empty.
#[derive(Clone, Debug)]
pub struct CompactedCache<K, V> {
    enabled: bool,
    entries: HashMap<K, Message<K, V>>,
}

impl<K, V> CompactedCache<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    /// Create an empty cache.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: HashMap::new(),
        }
    }

    /// Whether messages are being retained.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Upsert the message under its key, or evict the key for a tombstone.
    pub fn apply(&mut self, message: &Message<K, V>) {
        if !self.enabled {
            return;
        }
        if message.is_tombstone() {
            self.entries.remove(message.key());
        } else {
            self.entries.insert(message.key().clone(), message.clone());
        }
    }

    /// The latest message for `key`.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&Message<K, V>> {
        self.entries.get(key)
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no keys are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Freeze the cache into a shareable snapshot.
    #[must_use]
    pub fn into_snapshot(self) -> CacheSnapshot<K, V> {
        Arc::new(self.entries)
    }
}

/// Messages accumulated since the last listener notification.
#[derive(Clone, Debug)]
pub struct StateBuffer<K, V> {
    messages: Vec<Message<K, V>>,
}

impl<K, V> Default for StateBuffer<K, V> {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
        }
    }
}

impl<K, V> StateBuffer<K, V> {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message, preserving poll order.
    pub fn push(&mut self, message: Message<K, V>) {
        self.messages.push(message);
    }

    /// The buffered messages in poll order.
    #[must_use]
    pub fn as_slice(&self) -> &[Message<K, V>] {
        &self.messages
    }

    /// Number of buffered messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop the buffered messages, keeping the allocation.
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
