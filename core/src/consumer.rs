//! Collaborator consumer abstraction.
//!
//! The table never talks to a broker directly. It drives a [`TableConsumer`],
//! which hides the client library (rdkafka in `eventsource-redpanda`, an
//! in-memory topic in `eventsource-testing`).
//!
//! # Assignment notifications
//!
//! Client libraries usually report partition assignment through a rebalance
//! callback that fires *inside* `poll`. Rather than threading a callback
//! through the trait, implementations surface the assignment as a
//! [`ConsumerEvent::Assigned`] returned from [`TableConsumer::poll`]. The table
//! reacts by rewinding the partitions and capturing their watermarks, which is
//! what the callback would have done.

use crate::error::ConsumerError;
use crate::message::{Message, PartitionId, PartitionWatermark};
use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;

/// Something observed during a single poll.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsumerEvent<K, V> {
    /// The group coordinator assigned these partitions to the consumer.
    Assigned(Vec<PartitionId>),
    /// A message was read.
    Message(Message<K, V>),
}

/// A blocking consumer bound to a single subscription.
///
/// Every method is called from the table's worker thread only, so
/// implementations need `Send` but not `Sync`.
///
/// # Contract
///
/// - [`subscribe`](Self::subscribe) is called exactly once, before any poll.
/// - [`poll`](Self::poll) blocks for at most `timeout` and yields at most one event.
/// - Messages are yielded in partition order.
/// - [`close`](Self::close) is called exactly once, when the worker exits.
pub trait TableConsumer: Send + 'static {
    /// Decoded message key
    type Key: Clone + Eq + Hash + Debug + Send + Sync + 'static;
    /// Decoded message value
    type Value: Clone + Debug + Send + Sync + 'static;

    /// Subscribe to a topic.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::SubscriptionFailed`] if the client rejects the subscription.
    fn subscribe(&mut self, topic: &str) -> Result<(), ConsumerError>;

    /// Wait up to `timeout` for the next event.
    ///
    /// Returns `Ok(None)` when the timeout elapses without activity.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError`] on transport or decode failures.
    fn poll(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<ConsumerEvent<Self::Key, Self::Value>>, ConsumerError>;

    /// Position the given partitions at their earliest available offset.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::SeekFailed`] if any partition cannot be repositioned.
    fn seek_to_beginning(&mut self, partitions: &[PartitionId]) -> Result<(), ConsumerError>;

    /// Fetch the current `(low, high)` offsets of a partition.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::WatermarkFetchFailed`] if the broker cannot be queried.
    fn watermarks(&mut self, partition: PartitionId) -> Result<PartitionWatermark, ConsumerError>;

    /// Release the client. Must not fail; implementations log their own errors.
    fn close(&mut self);
}
