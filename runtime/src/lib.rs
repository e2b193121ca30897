//! # Eventsource Runtime
//!
//! The event-sourced table: a worker that reads a topic from the beginning up
//! to its highwater, then tails it, notifying listeners as it goes.
//!
//! ## Core Components
//!
//! - **[`EventSourceTable`]**: public façade; owns the worker thread and the highwater latch
//! - **Monitor**: the two-phase loop (catch-up, then live) run by the worker
//! - **[`WatermarkTracker`]**: per-partition highwater recorded at assignment
//! - **[`CompactedCache`]**: key → latest message, maintained during catch-up only
//! - **[`HighwaterSignal`]**: one-shot, multi-waiter readiness signal
//! - **[`ListenerRegistry`]**: listeners in registration order
//!
//! ## Example
//!
//! ```ignore
//! use eventsource_core::TableConfig;
//! use eventsource_runtime::EventSourceTable;
//!
//! let mut table = EventSourceTable::new(TableConfig::new("alarms"), consumer)?
//!     .with_exception_handler(|error| eprintln!("table failed: {error}"));
//! let cache = table.track_cache()?;
//! table.start()?;
//!
//! table.await_highwater()?;
//! println!("{} live keys", cache.snapshot().map_or(0, |c| c.len()));
//! table.stop();
//! table.join()?;
//! ```

/// Compacted cache and batch buffer
pub mod cache;

/// Listener that records the highwater cache, and record export
pub mod cache_listener;

/// Highwater latch and signal handles
pub mod latch;

/// Table metrics
pub mod metrics;

mod monitor;

/// Ordered listener registry
pub mod registry;

/// Table lifecycle states
pub mod state;

/// The table façade
pub mod table;

/// Highwater timeout guard
pub mod timeout;

/// Per-partition highwater tracking
pub mod watermark;

pub use cache::{CompactedCache, StateBuffer};
pub use cache_listener::{CacheHandle, CacheListener, export_records};
pub use latch::{HighwaterSignal, HighwaterStatus};
pub use metrics::describe_metrics;
pub use registry::{ListenerId, ListenerRegistry};
pub use state::TableState;
pub use table::{EventSourceTable, ExceptionHandler, log_exception};
pub use timeout::TimeoutGuard;
pub use watermark::WatermarkTracker;
