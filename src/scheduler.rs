use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

const ARMED: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    wake: CancellationToken,
}

/// Handle to a one-shot timer.
///
/// The timer leaves the armed state exactly once, either by firing or by
/// being cancelled. Both sides race on the same compare-exchange, so a
/// successful `cancel` means the fire action never runs, and a failed one
/// means it has already started.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    shared: Arc<Shared>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: AtomicU8::new(ARMED),
                wake: CancellationToken::new(),
            }),
        }
    }

    /// Stop the timer if it has not fired yet.
    pub fn cancel(&self) -> bool {
        let won = self.transition(CANCELLED);
        if won {
            self.shared.wake.cancel();
        }
        won
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.state.load(Ordering::Acquire) == CANCELLED
    }

    pub fn has_fired(&self) -> bool {
        self.shared.state.load(Ordering::Acquire) == FIRED
    }

    pub fn is_armed(&self) -> bool {
        self.shared.state.load(Ordering::Acquire) == ARMED
    }

    fn try_fire(&self) -> bool {
        self.transition(FIRED)
    }

    fn transition(&self, to: u8) -> bool {
        self.shared
            .state
            .compare_exchange(ARMED, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Runs one-shot timers, each on its own task.
///
/// Scheduling never blocks the caller. A fire action may take as long as it
/// likes without delaying other timers.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    tracker: TaskTracker,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `on_fire` once after `delay`, unless cancelled first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F, Fut>(&self, delay: Duration, on_fire: F) -> CancelHandle
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = CancelHandle::new();
        let timer = handle.clone();

        self.tracker.spawn(async move {
            tokio::select! {
                _ = sleep(delay) => {}
                _ = timer.shared.wake.cancelled() => return,
            }

            if timer.try_fire() {
                on_fire().await;
            }
        });

        handle
    }

    /// Attempt to stop a pending timer. See [`CancelHandle::cancel`].
    pub fn cancel(&self, handle: &CancelHandle) -> bool {
        handle.cancel()
    }

    /// Number of timer tasks that have not finished, including fire actions
    /// still in progress.
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for every timer task to finish.
    ///
    /// The tracker stays closed, so concurrent and repeated callers all
    /// return once no task is left.
    pub async fn close_and_wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}
