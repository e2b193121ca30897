//! Table lifecycle states.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Where the table is in its lifecycle.
///
/// ```text
/// Initial → Assigning → CatchingUp → Live → Stopped
///                           │
///                           └──→ TimedOut
/// ```
///
/// `Failed` can follow any running state; `Stopped` can also follow
/// `Assigning` or `CatchingUp` when `stop()` is called before the highwater.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TableState {
    /// Constructed, worker not started
    Initial = 0,
    /// Subscribed, waiting for a partition assignment
    Assigning = 1,
    /// Reading history up to the recorded highwater
    CatchingUp = 2,
    /// Highwater reached, tailing new messages
    Live = 3,
    /// Worker exited after `stop()`
    Stopped = 4,
    /// Worker exited because the highwater timeout fired
    TimedOut = 5,
    /// Worker exited on a consumer or listener error
    Failed = 6,
}

impl TableState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Initial,
            1 => Self::Assigning,
            2 => Self::CatchingUp,
            3 => Self::Live,
            4 => Self::Stopped,
            5 => Self::TimedOut,
            _ => Self::Failed,
        }
    }

    /// Whether the worker has exited.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::TimedOut | Self::Failed)
    }
}

impl fmt::Display for TableState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initial => "initial",
            Self::Assigning => "assigning",
            Self::CatchingUp => "catching_up",
            Self::Live => "live",
            Self::Stopped => "stopped",
            Self::TimedOut => "timed_out",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// State shared between the table façade and its worker.
#[derive(Clone, Debug)]
pub(crate) struct SharedState(Arc<AtomicU8>);

impl SharedState {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicU8::new(TableState::Initial as u8)))
    }

    pub(crate) fn get(&self) -> TableState {
        TableState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: TableState) {
        let previous = TableState::from_u8(self.0.swap(state as u8, Ordering::AcqRel));
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "Table state changed");
        }
    }
}
