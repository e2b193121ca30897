//! Highwater latch: a one-shot, multi-waiter broadcast.
//!
//! The worker owns the [`HighwaterLatch`] and releases it exactly once, either
//! as [`HighwaterStatus::Reached`] or [`HighwaterStatus::TimedOut`]. Any number
//! of [`HighwaterSignal`] handles observe it, from threads or async tasks.
//!
//! The latch is a `tokio::sync::watch` channel. Dropping the latch without
//! releasing it (the worker stopped or failed first) wakes every waiter with
//! [`TableError::Terminated`], so nobody blocks forever on a dead table.

use eventsource_core::error::TableError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Outcome of the highwater wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HighwaterStatus {
    /// Still catching up
    Pending,
    /// Every assigned partition reached its highwater
    Reached,
    /// The highwater timeout fired first
    TimedOut,
}

/// Worker-side half of the latch.
#[derive(Debug)]
pub(crate) struct HighwaterLatch {
    tx: watch::Sender<HighwaterStatus>,
}

impl HighwaterLatch {
    /// Create a pending latch and the first signal handle observing it.
    pub(crate) fn new(topic: &str, timeout: Duration) -> (Self, HighwaterSignal) {
        let (tx, rx) = watch::channel(HighwaterStatus::Pending);
        let signal = HighwaterSignal {
            rx,
            topic: Arc::from(topic),
            timeout,
        };
        (Self { tx }, signal)
    }

    /// Release the latch with `status`.
    ///
    /// Only the first release takes effect; returns whether this call did.
    pub(crate) fn release(&self, status: HighwaterStatus) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == HighwaterStatus::Pending && status != HighwaterStatus::Pending {
                *current = status;
                true
            } else {
                false
            }
        })
    }
}

/// Caller-side view of the highwater latch.
///
/// Cheap to clone; every clone observes the same latch.
///
/// # Example
///
/// ```ignore
/// let signal = table.highwater_signal();
/// std::thread::spawn(move || {
///     match signal.wait() {
///         Ok(()) => println!("caught up"),
///         Err(e) => eprintln!("not caught up: {e}"),
///     }
/// });
/// ```
#[derive(Clone, Debug)]
pub struct HighwaterSignal {
    rx: watch::Receiver<HighwaterStatus>,
    topic: Arc<str>,
    timeout: Duration,
}

impl HighwaterSignal {
    /// The current status, without waiting.
    #[must_use]
    pub fn status(&self) -> HighwaterStatus {
        *self.rx.borrow()
    }

    /// Whether the highwater was reached.
    #[must_use]
    pub fn is_reached(&self) -> bool {
        self.status() == HighwaterStatus::Reached
    }

    /// Wait asynchronously until the latch is released.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::HighwaterTimeout`] if the latch was released on
    /// timeout, or [`TableError::Terminated`] if the worker exited first.
    pub async fn wait_async(&self) -> Result<(), TableError> {
        let mut rx = self.rx.clone();
        let status = rx
            .wait_for(|status| *status != HighwaterStatus::Pending)
            .await
            .map(|status| *status)
            .map_err(|_| TableError::Terminated)?;
        self.outcome(status)
    }

    /// Block the calling thread until the latch is released.
    ///
    /// Do not call this from inside an async runtime worker; use
    /// [`wait_async`](Self::wait_async) there.
    ///
    /// # Errors
    ///
    /// Same as [`wait_async`](Self::wait_async).
    pub fn wait(&self) -> Result<(), TableError> {
        futures::executor::block_on(self.wait_async())
    }

    fn outcome(&self, status: HighwaterStatus) -> Result<(), TableError> {
        match status {
            HighwaterStatus::Reached => Ok(()),
            HighwaterStatus::TimedOut => Err(TableError::HighwaterTimeout {
                topic: self.topic.to_string(),
                timeout: self.timeout,
            }),
            HighwaterStatus::Pending => Err(TableError::Terminated),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code: waiter threads should not panic
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn only_first_release_counts() {
        let (latch, signal) = HighwaterLatch::new("alarms", Duration::from_secs(1));
        assert_eq!(signal.status(), HighwaterStatus::Pending);

        assert!(latch.release(HighwaterStatus::Reached));
        assert!(!latch.release(HighwaterStatus::TimedOut));
        assert!(signal.is_reached());
        assert_eq!(signal.wait(), Ok(()));
    }

    #[test]
    fn timed_out_latch_reports_timeout() {
        let (latch, signal) = HighwaterLatch::new("alarms", Duration::from_secs(3));
        latch.release(HighwaterStatus::TimedOut);

        let err = signal.wait().unwrap_err();
        assert_eq!(
            err,
            TableError::HighwaterTimeout {
                topic: "alarms".to_string(),
                timeout: Duration::from_secs(3),
            }
        );
        assert!(!signal.is_reached());
    }

    #[test]
    fn dropped_latch_wakes_waiters() {
        let (latch, signal) = HighwaterLatch::new("alarms", Duration::from_secs(1));
        let waiter = thread::spawn(move || signal.wait());
        thread::sleep(Duration::from_millis(20));
        drop(latch);
        assert_eq!(waiter.join().unwrap(), Err(TableError::Terminated));
    }

    #[test]
    fn release_wakes_every_waiter() {
        let (latch, signal) = HighwaterLatch::new("alarms", Duration::from_secs(1));
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let signal = signal.clone();
                thread::spawn(move || signal.wait())
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        latch.release(HighwaterStatus::Reached);

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), Ok(()));
        }
    }

    #[tokio::test]
    async fn async_waiters_observe_release() {
        let (latch, signal) = HighwaterLatch::new("alarms", Duration::from_secs(1));
        let task = tokio::spawn({
            let signal = signal.clone();
            async move { signal.wait_async().await }
        });
        latch.release(HighwaterStatus::Reached);
        assert_eq!(task.await.unwrap(), Ok(()));
    }
}
