use std::collections::HashMap;

use bytes::Bytes;
use http::{HeaderMap, Method};
use tokio::sync::RwLock;
use tokio::time::Instant;
use url::Url;

use crate::scheduler::CancelHandle;
use crate::types::CallbackId;

/// One pending deferred request.
///
/// Present in the registry only while pending: firing and cancellation both
/// take it out, and whichever does so first owns it.
#[derive(Debug)]
pub struct CallbackEntry {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub fire_at: Instant,
    pub cancel_handle: CancelHandle,
}

impl CallbackEntry {
    pub fn info(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

/// Read-only copy of the fields callers may poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySnapshot {
    pub method: Method,
    pub url: Url,
    pub fire_at: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    entries: HashMap<CallbackId, CallbackEntry>,
}

/// Concurrent store of pending callbacks, keyed by id.
///
/// The id counter lives under the same lock as the map, so ids are issued
/// in insertion order and an entry is visible as soon as its id exists.
#[derive(Debug, Default)]
pub struct Registry {
    inner: RwLock<Inner>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id and store the entry built for it.
    ///
    /// `build` runs under the write lock. Anything it schedules that reads
    /// the registry back waits until the entry is in place.
    pub async fn insert<F>(&self, build: F) -> CallbackId
    where
        F: FnOnce(CallbackId) -> CallbackEntry,
    {
        let mut guard = self.inner.write().await;
        guard.next_id += 1;
        let id = CallbackId(guard.next_id);
        let entry = build(id);
        guard.entries.insert(id, entry);
        id
    }

    pub async fn get(&self, id: CallbackId) -> Option<EntrySnapshot> {
        let guard = self.inner.read().await;
        guard.entries.get(&id).map(|entry| EntrySnapshot {
            method: entry.method.clone(),
            url: entry.url.clone(),
            fire_at: entry.fire_at,
        })
    }

    /// Remove and return the entry. Absent ids are a no-op.
    pub async fn take(&self, id: CallbackId) -> Option<CallbackEntry> {
        let mut guard = self.inner.write().await;
        guard.entries.remove(&id)
    }

    pub async fn remove(&self, id: CallbackId) -> bool {
        self.take(id).await.is_some()
    }

    /// Remove the entry only if `decide` accepts it, as one step.
    ///
    /// Returns `None` when the id is absent, `Some(false)` when it was kept.
    pub async fn remove_if<F>(&self, id: CallbackId, decide: F) -> Option<bool>
    where
        F: FnOnce(&CallbackEntry) -> bool,
    {
        let mut guard = self.inner.write().await;
        let entry = guard.entries.get(&id)?;
        if !decide(entry) {
            return Some(false);
        }
        guard.entries.remove(&id);
        Some(true)
    }

    /// Remove every entry `decide` accepts; returns the removed ids.
    pub async fn drain_where<F>(&self, mut decide: F) -> Vec<CallbackId>
    where
        F: FnMut(&CallbackEntry) -> bool,
    {
        let mut guard = self.inner.write().await;
        let selected: Vec<CallbackId> = guard
            .entries
            .iter()
            .filter(|(_, entry)| decide(entry))
            .map(|(id, _)| *id)
            .collect();
        for id in &selected {
            guard.entries.remove(id);
        }
        selected
    }

    /// Remove every entry. Needs exclusive access, so it never waits.
    pub fn drain_all(&mut self) -> Vec<CallbackEntry> {
        self.inner.get_mut().entries.drain().map(|(_, entry)| entry).collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
