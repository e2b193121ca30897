//! # Eventsource Testing
//!
//! Testing utilities for event-sourced tables.
//!
//! This crate provides:
//! - [`MockTopic`]: an in-memory, partitioned topic shared with the test body
//! - [`MockConsumer`]: a [`TableConsumer`](eventsource_core::TableConsumer) reading a `MockTopic`
//! - [`RecordingListener`]: records every callback for later assertions
//! - [`FailingListener`] and [`PanickingListener`]: exercise the failure path
//!
//! ## Example
//!
//! ```ignore
//! use eventsource_core::TableConfig;
//! use eventsource_runtime::EventSourceTable;
//! use eventsource_testing::{MockConsumer, MockTopic, RecordingListener};
//!
//! let topic = MockTopic::new(2);
//! topic.append(0, "A", "1");
//! topic.append(1, "B", "2");
//!
//! let (listener, recording) = RecordingListener::new();
//! let mut table = EventSourceTable::new(TableConfig::new("alarms"), MockConsumer::new(&topic))?;
//! table.add_listener(listener)?;
//! table.start()?;
//! table.await_highwater()?;
//!
//! assert_eq!(recording.catch_up_messages().len(), 2);
//! ```

pub mod consumer;
pub mod listeners;

pub use consumer::{MockConsumer, MockTopic};
pub use listeners::{
    FailOn, FailingListener, PanickingListener, RecordedBatch, Recording, RecordingListener,
};
