//! Error taxonomy for event-sourced tables.
//!
//! - [`ConfigError`]: rejected synchronously when a table is constructed
//! - [`ConsumerError`]: raised by the collaborator consumer on the worker thread
//! - [`ListenerError`]: raised by a listener callback on the worker thread
//! - [`TableError`]: everything the table reports, wrapping the three above
//!
//! Errors raised on the worker thread are fatal to the table instance. They are
//! delivered to the exception handler, never propagated as panics.

use crate::message::PartitionId;
use std::time::Duration;
use thiserror::Error;

/// Errors detected while validating a table configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The required `topic` option is absent or empty
    #[error("Configuration is missing required option 'topic'")]
    MissingTopic,

    /// An option was present but could not be used
    #[error("Invalid value '{value}' for option '{key}': {reason}")]
    InvalidValue {
        /// The option name
        key: String,
        /// The rejected value
        value: String,
        /// Why the value was rejected
        reason: String,
    },
}

/// Errors raised by a [`TableConsumer`](crate::consumer::TableConsumer).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsumerError {
    /// Failed to create the underlying client
    #[error("Failed to create consumer: {0}")]
    CreationFailed(String),

    /// Failed to subscribe to the topic
    #[error("Subscription failed for topic '{topic}': {reason}")]
    SubscriptionFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Polling was attempted before subscribing
    #[error("Consumer is not subscribed")]
    NotSubscribed,

    /// Failed to reposition a partition
    #[error("Seek failed for partition {partition}: {reason}")]
    SeekFailed {
        /// The partition that failed
        partition: PartitionId,
        /// The reason for failure
        reason: String,
    },

    /// Failed to query the watermark offsets of a partition
    #[error("Watermark fetch failed for partition {partition}: {reason}")]
    WatermarkFetchFailed {
        /// The partition that failed
        partition: PartitionId,
        /// The reason for failure
        reason: String,
    },

    /// Failed to decode a message key or value
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// Error returned by a listener callback.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Listener failed: {0}")]
pub struct ListenerError(pub String);

impl ListenerError {
    /// Create a listener error from any displayable reason.
    #[must_use]
    pub fn new(reason: impl std::fmt::Display) -> Self {
        Self(reason.to_string())
    }
}

/// Errors reported by an event-sourced table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    /// The configuration was rejected at construction
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The collaborator consumer failed
    #[error(transparent)]
    Consumer(#[from] ConsumerError),

    /// A listener callback failed
    #[error(transparent)]
    Listener(#[from] ListenerError),

    /// The highwater was not reached within the configured window
    #[error("Highwater not reached for topic '{topic}' within {timeout:?}")]
    HighwaterTimeout {
        /// The topic being consumed
        topic: String,
        /// The configured highwater timeout
        timeout: Duration,
    },

    /// `start()` was called twice, or the registry was mutated after `start()`
    #[error("Table already started")]
    AlreadyStarted,

    /// The operation requires a started table
    #[error("Table not started")]
    NotStarted,

    /// `await_highwater_cache()` was called on a table without a cache listener
    #[error("No cache listener registered on this table")]
    CacheNotTracked,

    /// The worker exited before the highwater was reached
    #[error("Table worker terminated before reaching highwater")]
    Terminated,

    /// The worker thread panicked (typically inside a listener)
    #[error("Table worker panicked: {0}")]
    WorkerPanicked(String),

    /// The worker thread could not be spawned
    #[error("Failed to spawn table worker: {0}")]
    Spawn(String),
}

impl TableError {
    /// Whether this error reports a highwater timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::HighwaterTimeout { .. })
    }
}
