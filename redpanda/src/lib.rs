//! Redpanda/Kafka consumer for event-sourced tables.
//!
//! This crate provides [`RedpandaTableConsumer`], a blocking rdkafka consumer
//! that implements the [`TableConsumer`](eventsource_core::TableConsumer)
//! trait from `eventsource-core`, so an `EventSourceTable` can read any
//! Kafka-compatible topic.
//!
//! # Defaults
//!
//! A table reads its topic from the start every time it runs, so the consumer
//! is created with a unique group id and never commits offsets:
//!
//! | Property | Default |
//! |---|---|
//! | `bootstrap.servers` | `$BOOTSTRAP_SERVERS`, else `localhost:9092` |
//! | `group.id` | `<client name><unix timestamp>` |
//! | `enable.auto.commit` | `false` |
//! | `auto.offset.reset` | `earliest` |
//! | `enable.partition.eof` | `false` |
//!
//! Any property in `TableConfig::client_properties` overrides these.
//!
//! # Example
//!
//! ```no_run
//! use eventsource_core::TableConfig;
//! use eventsource_redpanda::RedpandaTableConsumer;
//! use eventsource_redpanda::deserializer::{JsonDeserializer, Utf8Deserializer};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TableConfig::from_properties([
//!     ("topic", "alarm-registrations"),
//!     ("highwater.timeout", "10"),
//!     ("bootstrap.servers", "localhost:9092"),
//! ])?;
//! let consumer = RedpandaTableConsumer::from_config(
//!     &config,
//!     Utf8Deserializer,
//!     JsonDeserializer::<serde_json::Value>::new(),
//! )?;
//! # Ok(())
//! # }
//! ```

pub mod consumer;
pub mod defaults;
pub mod deserializer;

pub use consumer::{RedpandaTableConsumer, RedpandaTableConsumerBuilder};
pub use deserializer::{
    BytesDeserializer, DeserializeError, Deserializer, JsonDeserializer, Utf8Deserializer,
};
