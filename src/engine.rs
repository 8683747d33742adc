use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::dispatcher::{Dispatcher, HttpDispatcher, OutboundRequest};
use crate::error::EngineError;
use crate::registry::{CallbackEntry, Registry};
use crate::scheduler::Scheduler;
use crate::types::{CallbackId, CallbackStatus, CancelOutcome, NewCallback, Registration, MAX_DELAY};

#[cfg(feature = "metrics")]
fn metric_inc(name: &'static str) {
    metrics::increment_counter!(name);
}

#[cfg(not(feature = "metrics"))]
fn metric_inc(_name: &'static str) {}

/// Holds deferred requests and fires them when their delay elapses.
///
/// Cheap to clone; clones share the same registry. Separate engines built
/// with [`Engine::new`] are fully independent, ids included.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    registry: Registry,
    scheduler: Scheduler,
    dispatcher: Arc<dyn Dispatcher>,
    is_running: AtomicBool,
}

impl Engine {
    pub fn new(dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                registry: Registry::new(),
                scheduler: Scheduler::new(),
                dispatcher,
                is_running: AtomicBool::new(true),
            }),
        }
    }

    /// Engine that sends callbacks over HTTP with a default client.
    pub fn with_http() -> Self {
        Self::new(Arc::new(HttpDispatcher::new()))
    }

    /// Register a callback and arm its timer. Returns immediately.
    pub async fn register(&self, callback: NewCallback) -> Result<Registration, EngineError> {
        if !self.is_running() {
            return Err(EngineError::Shutdown);
        }

        let NewCallback { method, url, delay, headers, body } = callback;
        if delay > MAX_DELAY {
            return Err(EngineError::DelayOutOfRange);
        }
        let fire_at = Instant::now()
            .checked_add(delay)
            .ok_or(EngineError::DelayOutOfRange)?;
        let weak = Arc::downgrade(&self.inner);
        let mut armed = None;

        let id = self
            .inner
            .registry
            .insert(|id| {
                let cancel_handle = self.inner.scheduler.schedule(delay, move || fire(weak, id));
                armed = Some(cancel_handle.clone());
                CallbackEntry {
                    method: method.clone(),
                    url: url.clone(),
                    headers,
                    body,
                    fire_at,
                    cancel_handle,
                }
            })
            .await;

        // Raced with shutdown: undo unless the timer is already firing.
        if !self.is_running() {
            self.cancel(id).await;
            if armed.is_some_and(|handle| handle.is_cancelled()) {
                return Err(EngineError::Shutdown);
            }
        }

        info!(id = %id, method = %method, url = %url, delay_secs = delay.as_secs(), "callback registered");
        metric_inc("callback.registered");

        Ok(Registration { id, method, url, delay, fire_at })
    }

    /// Poll a pending callback. `None` once it has fired or been cancelled.
    pub async fn status(&self, id: CallbackId) -> Option<CallbackStatus> {
        let entry = self.inner.registry.get(id).await?;
        Some(CallbackStatus {
            request_id: id,
            callback_info: format!("{} {}", entry.method, entry.url),
            time_remaining: remaining_secs(entry.fire_at, Instant::now()),
        })
    }

    /// Stop a pending callback.
    ///
    /// Reports [`CancelOutcome::NotFound`] if the timer already started
    /// firing; that dispatch still happens exactly once.
    pub async fn cancel(&self, id: CallbackId) -> CancelOutcome {
        let scheduler = &self.inner.scheduler;
        let removed = self
            .inner
            .registry
            .remove_if(id, |entry| scheduler.cancel(&entry.cancel_handle))
            .await;

        match removed {
            Some(true) => {
                info!(id = %id, "callback cancelled");
                metric_inc("callback.cancelled");
                CancelOutcome::Cancelled
            }
            Some(false) => {
                debug!(id = %id, "cancel lost the race to firing");
                CancelOutcome::NotFound
            }
            None => CancelOutcome::NotFound,
        }
    }

    /// Number of callbacks waiting to fire.
    pub async fn pending(&self) -> usize {
        self.inner.registry.len().await
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_running.load(Ordering::SeqCst)
    }

    /// Refuse new registrations, cancel every pending timer, and wait for
    /// dispatches already in flight.
    pub async fn shutdown(&self) {
        self.inner.is_running.store(false, Ordering::SeqCst);

        let scheduler = &self.inner.scheduler;
        let cancelled = self
            .inner
            .registry
            .drain_where(|entry| scheduler.cancel(&entry.cancel_handle))
            .await;

        info!(cancelled = cancelled.len(), "engine shutting down");
        scheduler.close_and_wait().await;
    }
}

impl Drop for EngineInner {
    /// Pending timers would otherwise sleep out their full delay.
    fn drop(&mut self) {
        for entry in self.registry.drain_all() {
            entry.cancel_handle.cancel();
        }
    }
}

/// Fire action of one timer: take the entry, then send it.
///
/// The entry leaves the registry before the send starts, whatever the
/// outcome. Failures are logged, never retried.
async fn fire(engine: Weak<EngineInner>, id: CallbackId) {
    let Some(engine) = engine.upgrade() else {
        return;
    };

    let Some(entry) = engine.registry.take(id).await else {
        debug!(id = %id, "callback already resolved");
        return;
    };

    let info = entry.info();
    let request = OutboundRequest {
        method: entry.method,
        url: entry.url,
        headers: entry.headers,
        body: entry.body,
    };

    match engine.dispatcher.send(request).await {
        Ok(()) => {
            info!(id = %id, callback = %info, "callback executed");
            metric_inc("callback.fired");
        }
        Err(err) => {
            warn!(id = %id, callback = %info, error = %err, "callback dispatch failed");
            metric_inc("callback.dispatch_failed");
        }
    }
}

/// Whole seconds from `now` until `fire_at`, truncated toward zero.
fn remaining_secs(fire_at: Instant, now: Instant) -> i64 {
    let secs = |d: std::time::Duration| i64::try_from(d.as_secs()).unwrap_or(i64::MAX);
    if fire_at >= now {
        secs(fire_at - now)
    } else {
        -secs(now - fire_at)
    }
}
