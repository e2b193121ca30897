//! One-shot highwater timeout.

use std::time::{Duration, Instant};

/// Deadline for reaching the highwater.
///
/// The guard fires once its deadline passes, unless it was cancelled first.
/// The worker checks it between polls and shortens each poll to the remaining
/// time, so expiry is observed close to the deadline.
#[derive(Clone, Copy, Debug)]
pub struct TimeoutGuard {
    timeout: Duration,
    started: Instant,
    deadline: Instant,
    cancelled: bool,
}

impl TimeoutGuard {
    /// Arm a guard that fires `timeout` from now.
    #[must_use]
    pub fn start(timeout: Duration) -> Self {
        let started = Instant::now();
        Self {
            timeout,
            started,
            deadline: started + timeout,
            cancelled: false,
        }
    }

    /// The configured timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether the deadline passed without the guard being cancelled.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        !self.cancelled && Instant::now() >= self.deadline
    }

    /// Time left before the guard fires; zero once expired or cancelled.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        if self.cancelled {
            return Duration::ZERO;
        }
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Time since the guard was armed.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Disarm the guard. It never fires afterwards.
    pub const fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Whether the guard was disarmed.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn fires_after_deadline() {
        let guard = TimeoutGuard::start(Duration::from_millis(20));
        assert!(!guard.is_expired());
        assert!(guard.remaining() <= Duration::from_millis(20));

        thread::sleep(Duration::from_millis(30));
        assert!(guard.is_expired());
        assert_eq!(guard.remaining(), Duration::ZERO);
        assert!(guard.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn cancelled_guard_never_fires() {
        let mut guard = TimeoutGuard::start(Duration::from_millis(10));
        guard.cancel();
        thread::sleep(Duration::from_millis(20));
        assert!(guard.is_cancelled());
        assert!(!guard.is_expired());
        assert_eq!(guard.timeout(), Duration::from_millis(10));
    }
}
