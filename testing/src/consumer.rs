//! In-memory topic and consumer.
//!
//! [`MockTopic`] is shared between the test body (which appends records) and a
//! [`MockConsumer`] (which the table polls on its worker thread). Appending
//! wakes a blocked poll, so tests never need to sleep for data.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on a poisoned mutex

use chrono::Utc;
use eventsource_core::consumer::{ConsumerEvent, TableConsumer};
use eventsource_core::error::ConsumerError;
use eventsource_core::message::{Message, Offset, PartitionId, PartitionWatermark};
use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

type Record = Message<String, String>;

#[derive(Debug, Default)]
struct PartitionLog {
    low: Offset,
    records: Vec<Record>,
}

impl PartitionLog {
    fn high(&self) -> Offset {
        self.low + Offset::try_from(self.records.len()).unwrap()
    }

    fn get(&self, offset: Offset) -> Option<&Record> {
        let index = usize::try_from(offset - self.low).ok()?;
        self.records.get(index)
    }
}

#[derive(Debug, Default)]
struct TopicState {
    partitions: Vec<PartitionLog>,
    unreachable: bool,
    rebalance_pending: bool,
    poll_failure: Option<ConsumerError>,
    subscriptions: Vec<String>,
    seeks: usize,
    polls: usize,
    closed: bool,
}

/// An in-memory, partitioned, append-only topic with string keys and values.
///
/// Clones share the same log.
///
/// # Example
///
/// ```
/// use eventsource_testing::MockTopic;
///
/// let topic = MockTopic::new(1);
/// assert_eq!(topic.append(0, "A", "1"), 0);
/// assert_eq!(topic.tombstone(0, "A"), 1);
/// assert_eq!(topic.watermarks(0).high, 2);
/// ```
#[derive(Clone, Debug)]
pub struct MockTopic {
    shared: Arc<(Mutex<TopicState>, Condvar)>,
}

impl MockTopic {
    /// Create a topic with `partitions` empty partitions, numbered from 0.
    #[must_use]
    pub fn new(partitions: usize) -> Self {
        let state = TopicState {
            partitions: (0..partitions).map(|_| PartitionLog::default()).collect(),
            ..TopicState::default()
        };
        Self {
            shared: Arc::new((Mutex::new(state), Condvar::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TopicState> {
        self.shared.0.lock().unwrap()
    }

    fn update<R>(&self, f: impl FnOnce(&mut TopicState) -> R) -> R {
        let result = f(&mut self.lock());
        self.shared.1.notify_all();
        result
    }

    /// Append a record and return its offset.
    pub fn append(&self, partition: PartitionId, key: &str, value: &str) -> Offset {
        self.push(partition, key, Some(value.to_string()))
    }

    /// Append a tombstone for `key` and return its offset.
    pub fn tombstone(&self, partition: PartitionId, key: &str) -> Offset {
        self.push(partition, key, None)
    }

    fn push(&self, partition: PartitionId, key: &str, value: Option<String>) -> Offset {
        self.update(|state| {
            let log = &mut state.partitions[usize::try_from(partition).unwrap()];
            let offset = log.high();
            let record = Message::new(key.to_string(), value, partition, offset)
                .with_timestamp(Utc::now());
            log.records.push(record);
            offset
        })
    }

    /// Discard every record before `offset`, as retention would.
    pub fn truncate_before(&self, partition: PartitionId, offset: Offset) {
        self.update(|state| {
            let log = &mut state.partitions[usize::try_from(partition).unwrap()];
            let offset = offset.min(log.high());
            let drop = usize::try_from(offset - log.low).unwrap_or(0);
            log.records.drain(..drop.min(log.records.len()));
            log.low = log.low.max(offset);
        });
    }

    /// Current `(low, high)` of a partition.
    #[must_use]
    pub fn watermarks(&self, partition: PartitionId) -> PartitionWatermark {
        let state = self.lock();
        let log = &state.partitions[usize::try_from(partition).unwrap()];
        PartitionWatermark::new(log.low, log.high())
    }

    /// Never deliver a partition assignment, as if the broker were down.
    pub fn make_unreachable(&self) {
        self.update(|state| state.unreachable = true);
    }

    /// Deliver another assignment of every partition on the next poll.
    pub fn trigger_rebalance(&self) {
        self.update(|state| state.rebalance_pending = true);
    }

    /// Make the next poll return `error`.
    pub fn fail_next_poll(&self, error: ConsumerError) {
        self.update(|state| state.poll_failure = Some(error));
    }

    /// Whether a consumer of this topic was closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Block until a consumer of this topic is closed, or `timeout` elapses.
    ///
    /// Returns whether the consumer was closed.
    #[must_use]
    pub fn wait_closed(&self, timeout: Duration) -> bool {
        let (lock, condvar) = &*self.shared;
        let guard = lock.lock().unwrap();
        let (guard, _) = condvar
            .wait_timeout_while(guard, timeout, |state| !state.closed)
            .unwrap();
        guard.closed
    }

    /// Topics subscribed to, in call order.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        self.lock().subscriptions.clone()
    }

    /// Number of `seek_to_beginning` calls.
    #[must_use]
    pub fn seek_count(&self) -> usize {
        self.lock().seeks
    }

    /// Number of `poll` calls.
    #[must_use]
    pub fn poll_count(&self) -> usize {
        self.lock().polls
    }
}

/// A [`TableConsumer`] over a [`MockTopic`].
///
/// The first poll after subscribing yields an assignment of every partition.
/// Messages are then yielded round-robin across partitions, in offset order
/// within each one. A poll with nothing to return blocks until a record is
/// appended or the timeout elapses.
#[derive(Debug)]
pub struct MockConsumer {
    topic: MockTopic,
    subscribed: bool,
    assigned: Vec<PartitionId>,
    positions: BTreeMap<PartitionId, Offset>,
    cursor: usize,
}

impl MockConsumer {
    /// Create a consumer reading `topic`.
    #[must_use]
    pub fn new(topic: &MockTopic) -> Self {
        Self {
            topic: topic.clone(),
            subscribed: false,
            assigned: Vec::new(),
            positions: BTreeMap::new(),
            cursor: 0,
        }
    }

    /// Take the next record from the assigned partitions, round-robin.
    fn next_record(&mut self, state: &TopicState) -> Option<Record> {
        let count = self.assigned.len();
        for step in 0..count {
            let index = (self.cursor + step) % count;
            let partition = self.assigned[index];
            let log = &state.partitions[usize::try_from(partition).ok()?];
            let position = self.positions.entry(partition).or_insert(log.low);
            *position = (*position).max(log.low);
            if let Some(record) = log.get(*position) {
                *position += 1;
                self.cursor = (index + 1) % count;
                return Some(record.clone());
            }
        }
        None
    }

    fn known_partition(
        state: &TopicState,
        partition: PartitionId,
    ) -> Option<&PartitionLog> {
        usize::try_from(partition)
            .ok()
            .and_then(|index| state.partitions.get(index))
    }
}

impl TableConsumer for MockConsumer {
    type Key = String;
    type Value = String;

    fn subscribe(&mut self, topic: &str) -> Result<(), ConsumerError> {
        self.topic.update(|state| state.subscriptions.push(topic.to_string()));
        self.subscribed = true;
        Ok(())
    }

    fn poll(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<ConsumerEvent<String, String>>, ConsumerError> {
        if !self.subscribed {
            return Err(ConsumerError::NotSubscribed);
        }

        let deadline = Instant::now() + timeout;
        let shared = Arc::clone(&self.topic.shared);
        let (lock, condvar) = &*shared;
        let mut state = lock.lock().unwrap();
        state.polls += 1;

        loop {
            if let Some(error) = state.poll_failure.take() {
                return Err(error);
            }
            if !state.unreachable && (self.assigned.is_empty() || state.rebalance_pending) {
                state.rebalance_pending = false;
                let all = (0..state.partitions.len())
                    .map(|p| PartitionId::try_from(p).unwrap())
                    .collect::<Vec<_>>();
                self.assigned.clone_from(&all);
                if !all.is_empty() {
                    return Ok(Some(ConsumerEvent::Assigned(all)));
                }
            }
            if let Some(record) = self.next_record(&state) {
                return Ok(Some(ConsumerEvent::Message(record)));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            state = condvar.wait_timeout(state, remaining).unwrap().0;
        }
    }

    fn seek_to_beginning(&mut self, partitions: &[PartitionId]) -> Result<(), ConsumerError> {
        let mut state = self.topic.lock();
        state.seeks += 1;
        for &partition in partitions {
            let low = Self::known_partition(&state, partition)
                .map(|log| log.low)
                .ok_or_else(|| ConsumerError::SeekFailed {
                    partition,
                    reason: "unknown partition".to_string(),
                })?;
            self.positions.insert(partition, low);
        }
        Ok(())
    }

    fn watermarks(&mut self, partition: PartitionId) -> Result<PartitionWatermark, ConsumerError> {
        let state = self.topic.lock();
        Self::known_partition(&state, partition)
            .map(|log| PartitionWatermark::new(log.low, log.high()))
            .ok_or_else(|| ConsumerError::WatermarkFetchFailed {
                partition,
                reason: "unknown partition".to_string(),
            })
    }

    fn close(&mut self) {
        self.topic.update(|state| state.closed = true);
    }
}
