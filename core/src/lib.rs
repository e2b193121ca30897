//! # Eventsource Core
//!
//! Core traits and types for event-sourced tables.
//!
//! An event-sourced table turns an append-only (optionally log-compacted) topic
//! into a locally materialized view. The table itself lives in
//! `eventsource-runtime`; this crate holds the vocabulary shared by the table,
//! the collaborator consumers that feed it, and the listeners it notifies.
//!
//! ## Core Concepts
//!
//! - **Message**: a keyed record with a nullable value (a `None` value is a tombstone)
//! - **Watermark**: the `(low, high)` offsets of a partition at assignment time
//! - **Consumer**: the collaborator that subscribes to a topic and polls messages
//! - **Listener**: an observer notified of batches and of the highwater transition
//! - **Configuration**: topic, highwater timeout, cache toggle and pass-through client properties
//!
//! ## Example
//!
//! ```ignore
//! use eventsource_core::config::TableConfig;
//! use eventsource_core::listener::{CacheSnapshot, EventSourceListener, ListenerResult};
//! use eventsource_core::message::Message;
//!
//! struct Printer;
//!
//! impl EventSourceListener<String, String> for Printer {
//!     fn on_highwater(&mut self, cache: CacheSnapshot<String, String>) -> ListenerResult {
//!         println!("{} live keys", cache.len());
//!         Ok(())
//!     }
//!
//!     fn on_batch(&mut self, messages: &[Message<String, String>], highwater_reached: bool) -> ListenerResult {
//!         println!("{} messages (live: {highwater_reached})", messages.len());
//!         Ok(())
//!     }
//! }
//!
//! let config = TableConfig::new("alarm-registrations");
//! ```

pub mod config;
pub mod consumer;
pub mod error;
pub mod listener;
pub mod message;

// Re-export commonly used types
pub use config::TableConfig;
pub use consumer::{ConsumerEvent, TableConsumer};
pub use error::{ConfigError, ConsumerError, ListenerError, TableError};
pub use listener::{CacheSnapshot, EventSourceListener, ListenerResult};
pub use message::{Header, Message, Offset, PartitionId, PartitionWatermark};
