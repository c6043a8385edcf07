//! Shared fixtures for the conversation integration tests.

#![allow(dead_code)]

use parley_conversation::{
    ConversationContext, Partner, PartnerId, ScheduleError, TimeoutAction, TimeoutHandle,
    TimeoutScheduler,
};
use parley_core::TimerLatch;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

pub type Context = ConversationContext<String, DummyPartner>;

/// Partner that records everything sent to it.
#[derive(Debug)]
pub struct DummyPartner {
    id: PartnerId,
    sent: Mutex<Vec<String>>,
}

impl DummyPartner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: PartnerId::new(),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Partner<String> for DummyPartner {
    fn id(&self) -> PartnerId {
        self.id
    }

    fn send(&self, message: String) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }
}

/// Collects every terminal record handed to a completion callback.
#[derive(Clone, Default)]
pub struct Outcomes(Arc<Mutex<Vec<Context>>>);

impl Outcomes {
    pub fn handler(&self) -> impl Fn(Context) + Send + Sync + 'static {
        let outcomes = Arc::clone(&self.0);
        move |context| {
            outcomes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(context);
        }
    }

    pub fn all(&self) -> Vec<Context> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn count(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// The only outcome; panics unless there is exactly one.
    pub fn single(&self) -> Context {
        let all = self.all();
        assert_eq!(all.len(), 1, "expected exactly one outcome, got {all:?}");
        all.into_iter().next().expect("one outcome")
    }
}

/// Scheduler that never fires by itself: the test decides when a timer
/// counts as fired and when its action actually runs.
#[derive(Default)]
pub struct StubScheduler {
    timers: Mutex<Vec<(Arc<TimerLatch>, TimeoutAction)>>,
}

impl StubScheduler {
    /// Mark every armed timer as fired and hand back the actions without
    /// running them.
    pub fn begin_firing(&self) -> Vec<TimeoutAction> {
        let timers = std::mem::take(
            &mut *self.timers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        timers
            .into_iter()
            .filter(|(latch, _)| latch.try_fire())
            .map(|(_, action)| action)
            .collect()
    }
}

impl TimeoutScheduler for StubScheduler {
    fn schedule(
        &self,
        action: TimeoutAction,
        _after: Duration,
    ) -> Result<Box<dyn TimeoutHandle>, ScheduleError> {
        let latch = Arc::new(TimerLatch::new());
        self.timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((Arc::clone(&latch), action));
        Ok(Box::new(StubHandle(latch)))
    }
}

struct StubHandle(Arc<TimerLatch>);

impl TimeoutHandle for StubHandle {
    fn has_fired(&self) -> bool {
        self.0.has_fired()
    }

    fn cancel(&self) -> bool {
        self.0.try_cancel()
    }
}

/// Scheduler that refuses every timer.
pub struct BrokenScheduler;

impl TimeoutScheduler for BrokenScheduler {
    fn schedule(
        &self,
        _action: TimeoutAction,
        _after: Duration,
    ) -> Result<Box<dyn TimeoutHandle>, ScheduleError> {
        Err(ScheduleError::Unavailable("timer pool exhausted".to_string()))
    }
}
