//! A virtual clock that only moves when told to.

use parley_core::{ScheduleError, TimeoutAction, TimeoutHandle, TimeoutScheduler, TimerLatch};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::trace;

struct Timer {
    due: Duration,
    seq: u64,
    latch: Arc<TimerLatch>,
    action: TimeoutAction,
}

#[derive(Default)]
struct Clock {
    now: Duration,
    next_seq: u64,
    timers: Vec<Timer>,
    shut_down: bool,
}

impl Clock {
    /// Remove and return the earliest live timer due at or before `limit`.
    fn pop_due(&mut self, limit: Duration) -> Option<Timer> {
        self.timers.retain(|timer| timer.latch.is_pending());
        let index = self
            .timers
            .iter()
            .enumerate()
            .filter(|(_, timer)| timer.due <= limit)
            .min_by_key(|(_, timer)| (timer.due, timer.seq))
            .map(|(index, _)| index)?;
        Some(self.timers.swap_remove(index))
    }
}

/// Deterministic scheduler driven by `advance`.
///
/// Timers fire in due order, ties in scheduling order. Actions run on the
/// thread calling `advance`, never while the clock is locked, so an action
/// may schedule further timers; those fire within the same `advance` if
/// they fall inside it.
#[derive(Default)]
pub struct ManualScheduler {
    clock: Mutex<Clock>,
}

impl ManualScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed on the virtual clock.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    /// Timers that have neither fired nor been cancelled.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock()
            .timers
            .iter()
            .filter(|timer| timer.latch.is_pending())
            .count()
    }

    /// Move the clock forward by `by`, firing every timer that comes due.
    ///
    /// Returns the number of actions run.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.lock().now.saturating_add(by);
        let mut fired = 0;
        loop {
            let next = {
                let mut clock = self.lock();
                let next = clock.pop_due(target);
                if let Some(timer) = &next {
                    clock.now = clock.now.max(timer.due);
                } else {
                    clock.now = target;
                }
                next
            };
            let Some(timer) = next else {
                return fired;
            };
            if timer.latch.try_fire() {
                trace!("Firing timer {} at {:?}", timer.seq, timer.due);
                (timer.action)();
                fired += 1;
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Clock> {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TimeoutScheduler for ManualScheduler {
    fn schedule(
        &self,
        action: TimeoutAction,
        after: Duration,
    ) -> Result<Box<dyn TimeoutHandle>, ScheduleError> {
        let mut clock = self.lock();
        if clock.shut_down {
            return Err(ScheduleError::ShutDown);
        }
        // Drop timers cancelled since the last tick.
        clock.timers.retain(|timer| timer.latch.is_pending());
        let latch = Arc::new(TimerLatch::new());
        let seq = clock.next_seq;
        clock.next_seq += 1;
        let due = clock.now.saturating_add(after);
        clock.timers.push(Timer {
            due,
            seq,
            latch: Arc::clone(&latch),
            action,
        });
        Ok(Box::new(ManualTimeout { latch }))
    }

    fn shutdown(&self) {
        let mut clock = self.lock();
        clock.shut_down = true;
        for timer in clock.timers.drain(..) {
            timer.latch.try_cancel();
        }
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clock = self.lock();
        f.debug_struct("ManualScheduler")
            .field("now", &clock.now)
            .field("timers", &clock.timers.len())
            .field("shut_down", &clock.shut_down)
            .finish()
    }
}

struct ManualTimeout {
    latch: Arc<TimerLatch>,
}

impl TimeoutHandle for ManualTimeout {
    fn has_fired(&self) -> bool {
        self.latch.has_fired()
    }

    fn cancel(&self) -> bool {
        self.latch.try_cancel()
    }
}
