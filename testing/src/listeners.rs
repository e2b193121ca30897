//! Listeners for asserting on table notifications.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on a poisoned mutex

use eventsource_core::error::ListenerError;
use eventsource_core::listener::{CacheSnapshot, EventSourceListener, ListenerResult};
use eventsource_core::message::Message;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// One `on_batch` call.
#[derive(Clone, Debug)]
pub struct RecordedBatch<K, V> {
    /// Messages delivered
    pub messages: Vec<Message<K, V>>,
    /// The `highwater_reached` flag passed with them
    pub highwater_reached: bool,
}

#[derive(Debug)]
struct RecordingState<K, V> {
    batches: Vec<RecordedBatch<K, V>>,
    highwater: Vec<CacheSnapshot<K, V>>,
    /// Number of batches received before the first `on_highwater`
    batches_before_highwater: Option<usize>,
}

impl<K, V> Default for RecordingState<K, V> {
    fn default() -> Self {
        Self {
            batches: Vec::new(),
            highwater: Vec::new(),
            batches_before_highwater: None,
        }
    }
}

type Shared<K, V> = Arc<(Mutex<RecordingState<K, V>>, Condvar)>;

/// Records every callback it receives.
///
/// The paired [`Recording`] reads them from the test thread.
#[derive(Debug)]
pub struct RecordingListener<K, V> {
    shared: Shared<K, V>,
}

impl<K, V> RecordingListener<K, V> {
    /// Create a listener and the handle that reads what it records.
    #[must_use]
    pub fn new() -> (Self, Recording<K, V>) {
        let shared: Shared<K, V> = Arc::new((Mutex::new(RecordingState::default()), Condvar::new()));
        let recording = Recording {
            shared: Arc::clone(&shared),
        };
        (Self { shared }, recording)
    }
}

impl<K, V> EventSourceListener<K, V> for RecordingListener<K, V>
where
    K: Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn on_highwater(&mut self, cache: CacheSnapshot<K, V>) -> ListenerResult {
        let (lock, condvar) = &*self.shared;
        let mut state = lock.lock().unwrap();
        if state.batches_before_highwater.is_none() {
            state.batches_before_highwater = Some(state.batches.len());
        }
        state.highwater.push(cache);
        condvar.notify_all();
        Ok(())
    }

    fn on_batch(&mut self, messages: &[Message<K, V>], highwater_reached: bool) -> ListenerResult {
        let (lock, condvar) = &*self.shared;
        lock.lock().unwrap().batches.push(RecordedBatch {
            messages: messages.to_vec(),
            highwater_reached,
        });
        condvar.notify_all();
        Ok(())
    }
}

/// Read side of a [`RecordingListener`].
#[derive(Debug)]
pub struct Recording<K, V> {
    shared: Shared<K, V>,
}

impl<K, V> Clone for Recording<K, V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K: Clone, V: Clone> Recording<K, V> {
    fn lock(&self) -> MutexGuard<'_, RecordingState<K, V>> {
        self.shared.0.lock().unwrap()
    }

    /// Every batch, in delivery order.
    #[must_use]
    pub fn batches(&self) -> Vec<RecordedBatch<K, V>> {
        self.lock().batches.clone()
    }

    /// Messages delivered with `highwater_reached = false`, in order.
    #[must_use]
    pub fn catch_up_messages(&self) -> Vec<Message<K, V>> {
        self.messages(false)
    }

    /// Messages delivered with `highwater_reached = true`, in order.
    #[must_use]
    pub fn live_messages(&self) -> Vec<Message<K, V>> {
        self.messages(true)
    }

    fn messages(&self, highwater_reached: bool) -> Vec<Message<K, V>> {
        self.lock()
            .batches
            .iter()
            .filter(|batch| batch.highwater_reached == highwater_reached)
            .flat_map(|batch| batch.messages.iter().cloned())
            .collect()
    }

    /// Number of `on_highwater` calls.
    #[must_use]
    pub fn highwater_count(&self) -> usize {
        self.lock().highwater.len()
    }

    /// The cache passed to the first `on_highwater`.
    #[must_use]
    pub fn highwater_cache(&self) -> Option<CacheSnapshot<K, V>> {
        self.lock().highwater.first().map(Arc::clone)
    }

    /// Number of batches received before `on_highwater`, if it was called.
    #[must_use]
    pub fn batches_before_highwater(&self) -> Option<usize> {
        self.lock().batches_before_highwater
    }

    /// Block until at least `count` live messages were delivered, or `timeout`
    /// elapses. Returns whether the count was reached.
    #[must_use]
    pub fn wait_for_live_messages(&self, count: usize, timeout: Duration) -> bool {
        let (lock, condvar) = &*self.shared;
        let guard = lock.lock().unwrap();
        let (guard, _) = condvar
            .wait_timeout_while(guard, timeout, |state| {
                live_count(&state.batches) < count
            })
            .unwrap();
        live_count(&guard.batches) >= count
    }
}

fn live_count<K, V>(batches: &[RecordedBatch<K, V>]) -> usize {
    batches
        .iter()
        .filter(|batch| batch.highwater_reached)
        .map(|batch| batch.messages.len())
        .sum()
}

/// Where a [`FailingListener`] returns its error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailOn {
    /// The first `on_batch` call
    Batch,
    /// The `on_highwater` call
    Highwater,
}

/// A listener that returns an error from one callback.
#[derive(Clone, Copy, Debug)]
pub struct FailingListener {
    fail_on: FailOn,
}

impl FailingListener {
    /// Fail on the first `on_batch`.
    #[must_use]
    pub const fn at_batch() -> Self {
        Self {
            fail_on: FailOn::Batch,
        }
    }

    /// Fail on `on_highwater`.
    #[must_use]
    pub const fn at_highwater() -> Self {
        Self {
            fail_on: FailOn::Highwater,
        }
    }
}

impl<K, V> EventSourceListener<K, V> for FailingListener {
    fn on_highwater(&mut self, _cache: CacheSnapshot<K, V>) -> ListenerResult {
        if self.fail_on == FailOn::Highwater {
            return Err(ListenerError::new("highwater rejected"));
        }
        Ok(())
    }

    fn on_batch(&mut self, _messages: &[Message<K, V>], _highwater_reached: bool) -> ListenerResult {
        if self.fail_on == FailOn::Batch {
            return Err(ListenerError::new("batch rejected"));
        }
        Ok(())
    }
}

/// A listener that panics on its first `on_batch`.
#[derive(Clone, Copy, Debug, Default)]
pub struct PanickingListener;

impl<K, V> EventSourceListener<K, V> for PanickingListener {
    fn on_highwater(&mut self, _cache: CacheSnapshot<K, V>) -> ListenerResult {
        Ok(())
    }

    #[allow(clippy::panic)] // Panicking is the point
    fn on_batch(&mut self, _messages: &[Message<K, V>], _highwater_reached: bool) -> ListenerResult {
        panic!("listener exploded");
    }
}
