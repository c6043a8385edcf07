//! Timeouts on a tokio runtime.

use parley_core::{ScheduleError, TimeoutAction, TimeoutHandle, TimeoutScheduler, TimerLatch};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::debug;

/// Spawns one sleeping task per timer on a tokio runtime.
#[derive(Debug)]
pub struct TokioScheduler {
    handle: Handle,
    shutdown: watch::Sender<bool>,
}

impl TokioScheduler {
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self { handle, shutdown }
    }

    /// Scheduler on the runtime the caller is running in.
    pub fn current() -> Result<Self, ScheduleError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| ScheduleError::Unavailable(e.to_string()))
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }
}

impl TimeoutScheduler for TokioScheduler {
    fn schedule(
        &self,
        action: TimeoutAction,
        after: Duration,
    ) -> Result<Box<dyn TimeoutHandle>, ScheduleError> {
        if self.is_shut_down() {
            return Err(ScheduleError::ShutDown);
        }

        let latch = Arc::new(TimerLatch::new());
        let timer = Arc::clone(&latch);
        let stop = self.shutdown.subscribe();
        let task = self.handle.spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(after) => {
                    if timer.try_fire() {
                        action();
                    }
                }
                () = stopped(stop) => {
                    timer.try_cancel();
                }
            }
        });

        Ok(Box::new(TokioTimeout {
            latch,
            task: task.abort_handle(),
        }))
    }

    fn shutdown(&self) {
        if !self.shutdown.send_replace(true) {
            debug!("Timeout scheduler shut down");
        }
    }
}

/// Resolves once the scheduler is shut down. Never resolves if the
/// scheduler is dropped first.
async fn stopped(mut stop: watch::Receiver<bool>) {
    loop {
        let shut_down = *stop.borrow_and_update();
        if shut_down {
            return;
        }
        if stop.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

struct TokioTimeout {
    latch: Arc<TimerLatch>,
    task: AbortHandle,
}

impl TimeoutHandle for TokioTimeout {
    fn has_fired(&self) -> bool {
        self.latch.has_fired()
    }

    fn cancel(&self) -> bool {
        let cancelled = self.latch.try_cancel();
        if cancelled {
            self.task.abort();
        }
        cancelled
    }
}
