//! The event-sourced table façade.

use crate::cache_listener::{CacheHandle, CacheListener};
use crate::latch::{HighwaterLatch, HighwaterSignal};
use crate::metrics::TableMetrics;
use crate::monitor::Monitor;
use crate::registry::{ListenerId, ListenerRegistry};
use crate::state::{SharedState, TableState};
use eventsource_core::config::TableConfig;
use eventsource_core::consumer::TableConsumer;
use eventsource_core::error::TableError;
use eventsource_core::listener::{CacheSnapshot, EventSourceListener};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

/// Receives every fatal error raised on the worker thread.
pub type ExceptionHandler = Arc<dyn Fn(&TableError) + Send + Sync>;

/// Default exception handler: log at error level.
pub fn log_exception(error: &TableError) {
    tracing::error!(error = %error, "Event-sourced table failed");
}

struct Unstarted<C: TableConsumer> {
    consumer: C,
    registry: ListenerRegistry<C::Key, C::Value>,
    latch: HighwaterLatch,
}

/// A topic materialized into listener notifications.
///
/// The table reads the topic from the beginning up to the highwater recorded
/// at assignment, building an optional compacted cache, then tails new
/// messages until stopped. All consumption happens on one worker thread
/// spawned by [`start`](Self::start).
///
/// # Example
///
/// ```ignore
/// let config = TableConfig::new("alarms").with_highwater_timeout(Duration::from_secs(10));
/// let mut table = EventSourceTable::new(config, consumer)?;
/// let cache = table.track_cache()?;
/// table.add_listener(MyListener::default())?;
/// table.start()?;
///
/// table.await_highwater()?;
/// let snapshot = cache.snapshot();
/// ```
pub struct EventSourceTable<C: TableConsumer> {
    config: TableConfig,
    unstarted: Option<Unstarted<C>>,
    on_exception: ExceptionHandler,
    running: Arc<AtomicBool>,
    state: SharedState,
    signal: HighwaterSignal,
    worker: Option<JoinHandle<()>>,
    cache: Option<CacheHandle<C::Key, C::Value>>,
}

impl<C: TableConsumer> EventSourceTable<C> {
    /// Create a table reading `config.topic` through `consumer`.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::Config`] if the configuration is invalid.
    pub fn new(config: TableConfig, consumer: C) -> Result<Self, TableError> {
        config.validate()?;
        let (latch, signal) = HighwaterLatch::new(&config.topic, config.highwater_timeout);
        Ok(Self {
            config,
            unstarted: Some(Unstarted {
                consumer,
                registry: ListenerRegistry::new(),
                latch,
            }),
            on_exception: Arc::new(log_exception),
            running: Arc::new(AtomicBool::new(false)),
            state: SharedState::new(),
            signal,
            worker: None,
            cache: None,
        })
    }

    /// Replace the default logging exception handler.
    #[must_use]
    pub fn with_exception_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&TableError) + Send + Sync + 'static,
    {
        self.on_exception = Arc::new(handler);
        self
    }

    /// The table's configuration.
    #[must_use]
    pub const fn config(&self) -> &TableConfig {
        &self.config
    }

    /// Register a listener. Listeners are notified in registration order.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::AlreadyStarted`] after [`start`](Self::start).
    pub fn add_listener<L>(&mut self, listener: L) -> Result<ListenerId, TableError>
    where
        L: EventSourceListener<C::Key, C::Value> + 'static,
    {
        let unstarted = self.unstarted.as_mut().ok_or(TableError::AlreadyStarted)?;
        Ok(unstarted.registry.add(Box::new(listener)))
    }

    /// Unregister a listener. Returns whether it was registered.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::AlreadyStarted`] after [`start`](Self::start).
    pub fn remove_listener(&mut self, id: ListenerId) -> Result<bool, TableError> {
        let unstarted = self.unstarted.as_mut().ok_or(TableError::AlreadyStarted)?;
        Ok(unstarted.registry.remove(id))
    }

    /// Register a [`CacheListener`] and keep its handle for
    /// [`await_highwater_cache`](Self::await_highwater_cache).
    ///
    /// # Errors
    ///
    /// Returns [`TableError::AlreadyStarted`] after [`start`](Self::start).
    pub fn track_cache(&mut self) -> Result<CacheHandle<C::Key, C::Value>, TableError> {
        if let Some(handle) = &self.cache {
            return Ok(handle.clone());
        }
        let (listener, handle) = CacheListener::new();
        self.add_listener(listener)?;
        self.cache = Some(handle.clone());
        Ok(handle)
    }

    /// Spawn the worker thread.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::AlreadyStarted`] on a second call, or
    /// [`TableError::Spawn`] if the thread could not be created.
    pub fn start(&mut self) -> Result<(), TableError> {
        let Unstarted {
            consumer,
            registry,
            latch,
        } = self.unstarted.take().ok_or(TableError::AlreadyStarted)?;

        self.running.store(true, Ordering::Release);
        let monitor = Monitor {
            consumer,
            config: self.config.clone(),
            registry,
            running: Arc::clone(&self.running),
            state: self.state.clone(),
            latch,
            metrics: TableMetrics::new(&self.config.topic),
        };
        let on_exception = Arc::clone(&self.on_exception);
        let span = tracing::info_span!("eventsource_table", topic = %self.config.topic);

        let worker = thread::Builder::new()
            .name("eventsource-table".to_string())
            .spawn(move || {
                let _entered = span.enter();
                monitor.run(&on_exception);
            })
            .map_err(|e| {
                self.running.store(false, Ordering::Release);
                TableError::Spawn(e.to_string())
            })?;

        tracing::info!(topic = %self.config.topic, "Event-sourced table started");
        self.worker = Some(worker);
        Ok(())
    }

    /// Ask the worker to stop. It exits within one poll timeout.
    ///
    /// Stopping before the highwater ends catch-up without notifying
    /// `on_highwater`. Calling this more than once has no further effect.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            tracing::info!(topic = %self.config.topic, "Stopping event-sourced table");
        }
    }

    /// Whether the highwater was reached.
    #[must_use]
    pub fn highwater_reached(&self) -> bool {
        self.signal.is_reached()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TableState {
        self.state.get()
    }

    /// A handle for waiting on the highwater from other threads or tasks.
    #[must_use]
    pub fn highwater_signal(&self) -> HighwaterSignal {
        self.signal.clone()
    }

    /// Block until the highwater is reached.
    ///
    /// # Errors
    ///
    /// - [`TableError::NotStarted`] if [`start`](Self::start) was not called
    /// - [`TableError::HighwaterTimeout`] if the timeout fired first
    /// - [`TableError::Terminated`] if the worker exited first
    pub fn await_highwater(&self) -> Result<(), TableError> {
        self.ensure_started()?;
        self.signal.wait()
    }

    /// Async counterpart of [`await_highwater`](Self::await_highwater).
    ///
    /// # Errors
    ///
    /// Same as [`await_highwater`](Self::await_highwater).
    pub async fn wait_for_highwater(&self) -> Result<(), TableError> {
        self.ensure_started()?;
        self.signal.wait_async().await
    }

    /// Block until the highwater, then return the compacted cache.
    ///
    /// # Errors
    ///
    /// [`TableError::CacheNotTracked`] without a prior
    /// [`track_cache`](Self::track_cache), otherwise the errors of
    /// [`await_highwater`](Self::await_highwater).
    pub fn await_highwater_cache(&self) -> Result<CacheSnapshot<C::Key, C::Value>, TableError> {
        let handle = self.cache.as_ref().ok_or(TableError::CacheNotTracked)?;
        self.await_highwater()?;
        handle.snapshot().ok_or(TableError::Terminated)
    }

    /// Wait for the worker thread to exit.
    ///
    /// # Errors
    ///
    /// [`TableError::NotStarted`] if there is no worker to join, or
    /// [`TableError::WorkerPanicked`] if the thread panicked outside the
    /// worker's own panic boundary.
    pub fn join(&mut self) -> Result<(), TableError> {
        let worker = self.worker.take().ok_or(TableError::NotStarted)?;
        worker
            .join()
            .map_err(|_| TableError::WorkerPanicked("worker thread panicked".to_string()))
    }

    fn ensure_started(&self) -> Result<(), TableError> {
        if self.unstarted.is_some() {
            return Err(TableError::NotStarted);
        }
        Ok(())
    }
}

impl<C: TableConsumer> fmt::Debug for EventSourceTable<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSourceTable")
            .field("topic", &self.config.topic)
            .field("state", &self.state.get())
            .field("highwater_reached", &self.highwater_reached())
            .finish_non_exhaustive()
    }
}

impl<C: TableConsumer> Drop for EventSourceTable<C> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use eventsource_testing::{MockConsumer, MockTopic};

    #[test]
    fn rejects_invalid_config() {
        let topic = MockTopic::new(1);
        let err = EventSourceTable::new(TableConfig::new(" "), MockConsumer::new(&topic))
            .unwrap_err();
        assert!(matches!(err, TableError::Config(_)));
    }

    #[test]
    fn waiting_before_start_is_an_error() {
        let topic = MockTopic::new(1);
        let table = EventSourceTable::new(TableConfig::new("alarms"), MockConsumer::new(&topic))
            .unwrap();
        assert_eq!(table.await_highwater(), Err(TableError::NotStarted));
        assert_eq!(table.state(), TableState::Initial);
        assert!(!table.highwater_reached());
    }

    #[test]
    fn cache_must_be_tracked() {
        let topic = MockTopic::new(1);
        let table = EventSourceTable::new(TableConfig::new("alarms"), MockConsumer::new(&topic))
            .unwrap();
        assert_eq!(
            table.await_highwater_cache().unwrap_err(),
            TableError::CacheNotTracked
        );
    }

    #[test]
    fn join_without_start() {
        let topic = MockTopic::new(1);
        let mut table =
            EventSourceTable::new(TableConfig::new("alarms"), MockConsumer::new(&topic)).unwrap();
        assert_eq!(table.join(), Err(TableError::NotStarted));
    }
}
