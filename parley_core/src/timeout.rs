//! Abstract one-shot timer facility.
//!
//! Hosts back this with whatever timer they have (a tokio runtime, a game
//! tick loop, a thread pool). The engine only needs three things from it:
//! run an action once after a delay, tell whether it already fired, and
//! cancel it with a truthful "too late" answer.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Work scheduled to run once when a timer expires.
pub type TimeoutAction = Box<dyn FnOnce() + Send + 'static>;

/// Failure to arm a timer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("timer facility unavailable: {0}")]
    Unavailable(String),

    #[error("timer facility has been shut down")]
    ShutDown,
}

/// Handle to one armed timer.
pub trait TimeoutHandle: Send + Sync {
    /// Whether the action has started (or finished) running.
    fn has_fired(&self) -> bool;

    /// Prevent the action from running.
    ///
    /// Returns `true` if the timer will never fire afterwards, `false` if it
    /// already fired (or is firing). Cancelling twice returns `true` again.
    fn cancel(&self) -> bool;
}

/// Schedules one-shot timeout actions.
///
/// `schedule` must never run `action` on the calling thread before it
/// returns.
pub trait TimeoutScheduler: Send + Sync {
    fn schedule(
        &self,
        action: TimeoutAction,
        after: Duration,
    ) -> Result<Box<dyn TimeoutHandle>, ScheduleError>;

    /// Release timer resources. Pending timers are cancelled.
    fn shutdown(&self) {}
}

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

/// One-way `Pending -> Fired | Cancelled` latch shared by a timer and its
/// handle.
///
/// Exactly one of `try_fire` and `try_cancel` can win.
#[derive(Debug, Default)]
pub struct TimerLatch {
    state: AtomicU8,
}

impl TimerLatch {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(PENDING),
        }
    }

    /// Claim the right to run the action. Returns `false` if cancelled.
    pub fn try_fire(&self) -> bool {
        self.state
            .compare_exchange(PENDING, FIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Prevent firing. Returns `false` if the timer already fired.
    pub fn try_cancel(&self) -> bool {
        match self
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => true,
            Err(current) => current == CANCELLED,
        }
    }

    #[must_use]
    pub fn has_fired(&self) -> bool {
        self.state.load(Ordering::Acquire) == FIRED
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state.load(Ordering::Acquire) == PENDING
    }
}

/// Unit attached to a timeout amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
}

impl TimeUnit {
    #[must_use]
    pub const fn duration(self, amount: u64) -> Duration {
        match self {
            Self::Milliseconds => Duration::from_millis(amount),
            Self::Seconds => Duration::from_secs(amount),
            Self::Minutes => Duration::from_secs(amount.saturating_mul(60)),
            Self::Hours => Duration::from_secs(amount.saturating_mul(3600)),
        }
    }
}
