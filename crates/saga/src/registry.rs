//! Correlation of asynchronous replies with the requests that caused them.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use common::CorrelationId;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::oneshot;

struct Waiter<T> {
    token: u64,
    sender: oneshot::Sender<T>,
}

/// Map of correlation id to a single-slot reply signal.
///
/// A waiter is registered before the request is published and removed when
/// its [`Pending`] handle is dropped, whichever way the wait ended.
pub struct CompletionRegistry<T> {
    waiters: Arc<DashMap<CorrelationId, Waiter<T>>>,
    next_token: Arc<AtomicU64>,
}

impl<T> Clone for CompletionRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            waiters: Arc::clone(&self.waiters),
            next_token: Arc::clone(&self.next_token),
        }
    }
}

impl<T> Default for CompletionRegistry<T> {
    fn default() -> Self {
        Self {
            waiters: Arc::new(DashMap::new()),
            next_token: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<T> CompletionRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter for `id`. Returns None if one is already registered.
    pub fn register(&self, id: CorrelationId) -> Option<Pending<T>> {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();

        match self.waiters.entry(id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(entry) => {
                entry.insert(Waiter { token, sender });
                Some(Pending {
                    id,
                    token,
                    receiver,
                    waiters: Arc::clone(&self.waiters),
                })
            }
        }
    }

    /// Delivers `value` to the waiter for `id`.
    ///
    /// Returns false if nobody is waiting: the wait already resolved, timed
    /// out, or never existed.
    pub fn resolve(&self, id: CorrelationId, value: T) -> bool {
        match self.waiters.remove(&id) {
            Some((_, waiter)) => waiter.sender.send(value).is_ok(),
            None => false,
        }
    }

    /// Returns true if a waiter is registered for `id`.
    pub fn is_registered(&self, id: CorrelationId) -> bool {
        self.waiters.contains_key(&id)
    }

    /// Number of registered waiters.
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

/// The receiving side of one registration.
pub struct Pending<T> {
    id: CorrelationId,
    token: u64,
    receiver: oneshot::Receiver<T>,
    waiters: Arc<DashMap<CorrelationId, Waiter<T>>>,
}

impl<T> Pending<T> {
    pub fn correlation_id(&self) -> CorrelationId {
        self.id
    }

    /// Waits for the reply. Returns None if the registry dropped the waiter.
    pub async fn recv(&mut self) -> Option<T> {
        (&mut self.receiver).await.ok()
    }
}

impl<T> Drop for Pending<T> {
    fn drop(&mut self) {
        // Only remove our own registration; the id may have been reused.
        self.waiters
            .remove_if(&self.id, |_, waiter| waiter.token == self.token);
    }
}
