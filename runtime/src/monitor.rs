//! The table's worker: catch-up to the highwater, then live tailing.

use crate::cache::{CompactedCache, StateBuffer};
use crate::latch::{HighwaterLatch, HighwaterStatus};
use crate::metrics::{Phase, TableMetrics};
use crate::registry::ListenerRegistry;
use crate::state::{SharedState, TableState};
use crate::table::ExceptionHandler;
use crate::timeout::TimeoutGuard;
use crate::watermark::WatermarkTracker;
use eventsource_core::config::TableConfig;
use eventsource_core::consumer::{ConsumerEvent, TableConsumer};
use eventsource_core::error::TableError;
use eventsource_core::message::{Message, PartitionId};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Everything the worker thread owns.
pub(crate) struct Monitor<C: TableConsumer> {
    pub(crate) consumer: C,
    pub(crate) config: TableConfig,
    pub(crate) registry: ListenerRegistry<C::Key, C::Value>,
    pub(crate) running: Arc<AtomicBool>,
    pub(crate) state: SharedState,
    pub(crate) latch: HighwaterLatch,
    pub(crate) metrics: TableMetrics,
}

impl<C: TableConsumer> Monitor<C> {
    /// Run the worker to completion.
    ///
    /// Never panics and never returns an error: failures go to `on_exception`.
    /// The consumer is closed on every exit path.
    pub(crate) fn run(mut self, on_exception: &ExceptionHandler) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.drive()))
            .unwrap_or_else(|payload| Err(TableError::WorkerPanicked(panic_message(&*payload))));

        match outcome {
            Ok(()) => self.state.set(TableState::Stopped),
            Err(error) => {
                if error.is_timeout() {
                    self.metrics.timeout();
                    self.state.set(TableState::TimedOut);
                } else {
                    self.metrics.failure();
                    self.state.set(TableState::Failed);
                }
                on_exception(&error);
            }
        }

        self.running.store(false, Ordering::Release);
        self.consumer.close();
        tracing::info!(state = %self.state.get(), "Table worker stopped");
    }

    fn drive(&mut self) -> Result<(), TableError> {
        self.state.set(TableState::Assigning);
        self.consumer.subscribe(&self.config.topic)?;
        tracing::info!("Subscribed, waiting for partition assignment");

        // Armed at subscribe so an assignment that never arrives still times out.
        let mut guard = TimeoutGuard::start(self.config.highwater_timeout);
        let mut tracker = WatermarkTracker::new();
        let mut cache = CompactedCache::new(self.config.compacted_cache);
        let mut buffer = StateBuffer::new();

        while !tracker.all_reached() {
            if !self.is_running() {
                tracing::info!(pending = ?tracker.pending(), "Stopped before highwater");
                return Ok(());
            }
            if guard.is_expired() {
                tracing::warn!(
                    timeout = ?guard.timeout(),
                    pending = ?tracker.pending(),
                    "Highwater not reached in time"
                );
                self.state.set(TableState::TimedOut);
                self.latch.release(HighwaterStatus::TimedOut);
                return Err(TableError::HighwaterTimeout {
                    topic: self.config.topic.clone(),
                    timeout: guard.timeout(),
                });
            }

            let wait = guard.remaining().min(self.config.poll_timeout);
            match self.consumer.poll(wait)? {
                Some(ConsumerEvent::Assigned(partitions)) => {
                    self.record_assignment(&mut tracker, &partitions)?;
                }
                Some(ConsumerEvent::Message(message)) => {
                    self.metrics.message(Phase::CatchUp);
                    if tracker.observe(message.partition(), message.offset()) {
                        tracing::debug!(
                            partition = message.partition(),
                            offset = message.offset(),
                            "Partition reached highwater"
                        );
                    }
                    cache.apply(&message);
                    buffer.push(message);
                }
                None => {}
            }
            self.flush(&mut buffer, false)?;
        }

        guard.cancel();
        let snapshot = cache.into_snapshot();
        self.metrics
            .highwater_reached(guard.elapsed(), snapshot.len());
        tracing::info!(
            partitions = tracker.len(),
            cached_keys = snapshot.len(),
            elapsed = ?guard.elapsed(),
            "Highwater reached"
        );
        self.registry.dispatch_highwater(&snapshot)?;
        self.state.set(TableState::Live);
        self.latch.release(HighwaterStatus::Reached);

        while self.is_running() {
            match self.consumer.poll(self.config.poll_timeout)? {
                Some(ConsumerEvent::Message(message)) => {
                    self.metrics.message(Phase::Live);
                    buffer.push(message);
                }
                Some(ConsumerEvent::Assigned(partitions)) => {
                    tracing::info!(?partitions, "Reassigned after highwater, not tracked");
                }
                None => {}
            }
            self.flush(&mut buffer, true)?;
        }

        Ok(())
    }

    /// Seek a fresh assignment to the beginning and capture its watermarks.
    ///
    /// Only the first assignment is tracked.
    fn record_assignment(
        &mut self,
        tracker: &mut WatermarkTracker,
        partitions: &[PartitionId],
    ) -> Result<(), TableError> {
        if tracker.is_assigned() {
            tracing::info!(?partitions, "Later assignment ignored for highwater");
            return Ok(());
        }

        self.consumer.seek_to_beginning(partitions)?;
        let mut watermarks = Vec::with_capacity(partitions.len());
        for &partition in partitions {
            let watermark = self.consumer.watermarks(partition)?;
            tracing::debug!(
                partition,
                low = watermark.low,
                high = watermark.high,
                "Captured watermark"
            );
            watermarks.push((partition, watermark));
        }

        tracker.record_assignment(watermarks);
        self.state.set(TableState::CatchingUp);
        tracing::info!(
            partitions = tracker.len(),
            expected_messages = tracker.expected_messages(),
            "Partitions assigned, catching up"
        );
        Ok(())
    }

    fn flush(
        &mut self,
        buffer: &mut StateBuffer<C::Key, C::Value>,
        highwater_reached: bool,
    ) -> Result<(), TableError> {
        if buffer.is_empty() {
            return Ok(());
        }
        let messages: &[Message<C::Key, C::Value>] = buffer.as_slice();
        tracing::trace!(count = messages.len(), highwater_reached, "Dispatching batch");
        self.registry.dispatch_batch(messages, highwater_reached)?;
        self.metrics.batch(Phase::from_live(highwater_reached));
        buffer.clear();
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_become_messages() {
        let from_str: Box<dyn Any + Send> = Box::new("boom");
        let from_string: Box<dyn Any + Send> = Box::new(String::from("bang"));
        let other: Box<dyn Any + Send> = Box::new(7_u8);

        assert_eq!(panic_message(&*from_str), "boom");
        assert_eq!(panic_message(&*from_string), "bang");
        assert_eq!(panic_message(&*other), "unknown panic");
    }
}
