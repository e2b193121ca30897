//! Listener interface for table observers.
//!
//! Listeners are called synchronously on the table's worker thread, in
//! registration order. A slow listener therefore stalls consumption; that
//! backpressure is intentional.

use crate::error::ListenerError;
use crate::message::Message;
use std::collections::HashMap;
use std::sync::Arc;

/// The compacted state of a topic as of the highwater point.
///
/// Shared between all listeners, so each one can keep it without copying.
pub type CacheSnapshot<K, V> = Arc<HashMap<K, Message<K, V>>>;

/// Result returned by listener callbacks.
///
/// An error is fatal to the table: the worker reports it through the exception
/// handler, closes the consumer and exits.
pub type ListenerResult = Result<(), ListenerError>;

/// Observer of an event-sourced table.
///
/// # Call order
///
/// 1. Zero or more `on_batch(.., false)` calls while catching up
/// 2. Exactly one `on_highwater` call, if the highwater is reached
/// 3. Zero or more `on_batch(.., true)` calls while tailing
///
/// If the highwater wait times out, `on_highwater` is never called.
///
/// # Example
///
/// ```
/// use eventsource_core::listener::{CacheSnapshot, EventSourceListener, ListenerResult};
/// use eventsource_core::message::Message;
///
/// #[derive(Default)]
/// struct Counter {
///     seen: usize,
/// }
///
/// impl EventSourceListener<String, String> for Counter {
///     fn on_highwater(&mut self, cache: CacheSnapshot<String, String>) -> ListenerResult {
///         println!("caught up with {} live keys after {} messages", cache.len(), self.seen);
///         Ok(())
///     }
///
///     fn on_batch(
///         &mut self,
///         messages: &[Message<String, String>],
///         _highwater_reached: bool,
///     ) -> ListenerResult {
///         self.seen += messages.len();
///         Ok(())
///     }
/// }
/// ```
pub trait EventSourceListener<K, V>: Send {
    /// Called once when every assigned partition has reached its highwater.
    ///
    /// `cache` is empty when caching is disabled.
    ///
    /// # Errors
    ///
    /// Returning an error terminates the table.
    fn on_highwater(&mut self, cache: CacheSnapshot<K, V>) -> ListenerResult;

    /// Called with the messages accumulated during one poll cycle.
    ///
    /// `highwater_reached` is `false` during catch-up and `true` afterwards.
    ///
    /// # Errors
    ///
    /// Returning an error terminates the table.
    fn on_batch(&mut self, messages: &[Message<K, V>], highwater_reached: bool) -> ListenerResult;
}
