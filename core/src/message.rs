//! Messages and partition watermarks carried in from the collaborator consumer.
//!
//! Both types are passive data: the consumer produces them, the table routes
//! them, listeners read them. Nothing here performs I/O.

use chrono::{DateTime, Utc};

/// Partition identifier within a topic.
pub type PartitionId = i32;

/// Position of a message within a partition.
pub type Offset = i64;

/// A single message header.
///
/// Headers are ordered and may repeat keys, so they are kept as a list of pairs
/// rather than a map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// Header name
    pub key: String,
    /// Header payload (`None` for a header without a value)
    pub value: Option<Vec<u8>>,
}

impl Header {
    /// Create a new header.
    #[must_use]
    pub fn new(key: impl Into<String>, value: Option<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// A keyed record read from a topic.
///
/// A message with no value is a **tombstone**: it signals that its key was
/// deleted and must be evicted from any compacted view.
///
/// Messages are immutable once constructed; the builder-style `with_*` methods
/// consume and return the message so they are only useful while the consumer
/// is assembling it.
///
/// # Example
///
/// ```
/// use eventsource_core::message::Message;
///
/// let message = Message::new("alarm-1".to_string(), Some(42), 0, 17);
/// assert_eq!(message.key(), "alarm-1");
/// assert_eq!(message.value(), Some(&42));
/// assert!(!message.is_tombstone());
///
/// let deleted: Message<String, i32> = Message::new("alarm-1".to_string(), None, 0, 18);
/// assert!(deleted.is_tombstone());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message<K, V> {
    key: K,
    value: Option<V>,
    partition: PartitionId,
    offset: Offset,
    timestamp: Option<DateTime<Utc>>,
    headers: Vec<Header>,
}

impl<K, V> Message<K, V> {
    /// Create a message without timestamp or headers.
    #[must_use]
    pub const fn new(key: K, value: Option<V>, partition: PartitionId, offset: Offset) -> Self {
        Self {
            key,
            value,
            partition,
            offset,
            timestamp: None,
            headers: Vec::new(),
        }
    }

    /// Attach the broker or producer timestamp.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Attach the message headers, preserving their order.
    #[must_use]
    pub fn with_headers(mut self, headers: Vec<Header>) -> Self {
        self.headers = headers;
        self
    }

    /// The message key.
    #[must_use]
    pub const fn key(&self) -> &K {
        &self.key
    }

    /// The message value, `None` for a tombstone.
    #[must_use]
    pub const fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    /// Whether this message deletes its key.
    #[must_use]
    pub const fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// The partition the message was read from.
    #[must_use]
    pub const fn partition(&self) -> PartitionId {
        self.partition
    }

    /// The message offset within its partition.
    #[must_use]
    pub const fn offset(&self) -> Offset {
        self.offset
    }

    /// The message timestamp, when the consumer provided one.
    #[must_use]
    pub const fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    /// The message headers in wire order.
    #[must_use]
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }
}

/// The `(low, high)` offsets of a partition.
///
/// `high` is the offset one past the last message present when the watermark
/// was captured. A partition with `high == low` holds no messages and counts
/// as reached immediately.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PartitionWatermark {
    /// First offset still present in the partition
    pub low: Offset,
    /// Offset one past the last message in the partition
    pub high: Offset,
}

impl PartitionWatermark {
    /// Create a watermark from its low and high offsets.
    #[must_use]
    pub const fn new(low: Offset, high: Offset) -> Self {
        Self { low, high }
    }

    /// Whether the partition held no messages when the watermark was captured.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.high <= self.low
    }

    /// Number of offsets between low and high.
    #[must_use]
    pub const fn span(&self) -> i64 {
        if self.is_empty() { 0 } else { self.high - self.low }
    }

    /// Whether a message at `offset` is the last one before the highwater.
    ///
    /// Offsets past the high mark also count: a transaction marker or a
    /// compacted record may occupy the final slot.
    #[must_use]
    pub const fn is_reached_by(&self, offset: Offset) -> bool {
        offset + 1 >= self.high
    }
}
