//! Process-wide fetch cache with in-flight request coalescing

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{AbortHandle, Abortable, Aborted, BoxFuture, FutureExt};
use serde_json::Value;
use tracing::{debug, warn};

use super::entry::{CacheEntry, FetchFailure, FetchOutcome, PendingFetch, ResolvedValue, Subscription};
use crate::domain::{CacheKey, DomainError, FetchError};

/// Computation handed to the store on a cache miss
pub type FetchComputation = BoxFuture<'static, Result<Value, DomainError>>;

/// Result of the atomic lookup-or-start step
#[derive(Debug)]
pub enum Acquired {
    /// A resolved value was already cached
    Hit(ResolvedValue),
    /// Another caller's fetch is in flight for the key
    Joined(Subscription),
    /// This caller started the fetch
    Started(Subscription),
}

#[derive(Default)]
pub(super) struct StoreInner {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    next_fetch_id: AtomicU64,
}

/// Shared store mapping cache keys to pending or resolved entries.
///
/// Cloning is cheap and every clone sees the same entries. At most one
/// fetch per key is in flight through [`CacheStore::acquire`]; concurrent
/// callers for the same key join it.
#[derive(Clone, Default)]
pub struct CacheStore {
    inner: Arc<StoreInner>,
}

impl CacheStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry for `key`, if any
    pub fn lookup(&self, key: &CacheKey) -> Result<Option<CacheEntry>, DomainError> {
        Ok(self.inner.lock()?.get(key).cloned())
    }

    /// Publishes `computation` as the pending entry for `key`, replacing
    /// whatever was stored. Returns the publisher's subscription.
    pub fn publish_pending(
        &self,
        key: CacheKey,
        computation: FetchComputation,
    ) -> Result<Subscription, DomainError> {
        let pending = self.new_pending(&key, computation);
        let mut entries = self.inner.lock()?;
        let subscription = pending.subscribe(&key, Arc::downgrade(&self.inner));
        let replaced = entries.insert(key, CacheEntry::Pending(pending));
        drop(entries);
        drop(replaced);

        Ok(subscription)
    }

    /// Stores `value` as the resolved entry for `key`
    pub fn publish_resolved(&self, key: CacheKey, value: Value) -> Result<(), DomainError> {
        let resolved = ResolvedValue::new(Arc::new(value));
        let replaced = self.inner.lock()?.insert(key, CacheEntry::Resolved(resolved));
        drop(replaced);
        Ok(())
    }

    /// Removes the entry for `key`, returning it
    pub fn remove(&self, key: &CacheKey) -> Result<Option<CacheEntry>, DomainError> {
        Ok(self.inner.lock()?.remove(key))
    }

    /// Subscribes to the pending fetch for `key`, if one is in flight
    pub fn join(&self, key: &CacheKey) -> Result<Option<Subscription>, DomainError> {
        let entries = self.inner.lock()?;

        Ok(match entries.get(key) {
            Some(CacheEntry::Pending(pending)) => {
                Some(pending.subscribe(key, Arc::downgrade(&self.inner)))
            }
            _ => None,
        })
    }

    /// Serves, joins or starts the fetch for `key` in one atomic step.
    ///
    /// A resolved entry is only reused when `reuse_resolved` is set. A
    /// pending entry is always joined. Otherwise `start` builds the
    /// computation, which is published as pending.
    pub fn acquire<F>(
        &self,
        key: &CacheKey,
        reuse_resolved: bool,
        start: F,
    ) -> Result<Acquired, DomainError>
    where
        F: FnOnce() -> FetchComputation,
    {
        let mut entries = self.inner.lock()?;

        match entries.get(key) {
            Some(CacheEntry::Resolved(resolved)) if reuse_resolved => {
                return Ok(Acquired::Hit(resolved.clone()));
            }
            Some(CacheEntry::Pending(pending)) => {
                return Ok(Acquired::Joined(
                    pending.subscribe(key, Arc::downgrade(&self.inner)),
                ));
            }
            _ => {}
        }

        let pending = self.new_pending(key, start());
        let subscription = pending.subscribe(key, Arc::downgrade(&self.inner));
        let replaced = entries.insert(key.clone(), CacheEntry::Pending(pending));
        drop(entries);
        drop(replaced);

        Ok(Acquired::Started(subscription))
    }

    /// Number of stored entries, pending and resolved
    pub fn len(&self) -> Result<usize, DomainError> {
        Ok(self.inner.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, DomainError> {
        Ok(self.len()? == 0)
    }

    /// Drops every entry. Subscribers of pending fetches keep waiting on
    /// their computation, which no longer publishes into the store.
    pub fn clear(&self) -> Result<(), DomainError> {
        let drained = std::mem::take(&mut *self.inner.lock()?);
        drop(drained);
        Ok(())
    }

    fn new_pending(&self, key: &CacheKey, computation: FetchComputation) -> PendingFetch {
        let fetch_id = self.inner.next_fetch_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (abort, registration) = AbortHandle::new_pair();
        let store = Arc::downgrade(&self.inner);
        let key = key.clone();

        let future = async move {
            let outcome: FetchOutcome = match Abortable::new(computation, registration).await {
                Ok(Ok(body)) => Ok(Arc::new(body)),
                Ok(Err(error)) => Err(FetchFailure::Failed(FetchError::from(&error))),
                Err(Aborted) => Err(FetchFailure::Cancelled),
            };

            if let Some(store) = store.upgrade() {
                store.settle(&key, fetch_id, &outcome);
            }

            outcome
        }
        .boxed()
        .shared();

        PendingFetch::new(fetch_id, future, abort)
    }
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("CacheStore");
        match self.len() {
            Ok(len) => debug.field("entries", &len),
            Err(_) => debug.field("entries", &"<poisoned>"),
        };
        debug.finish()
    }
}

impl StoreInner {
    fn lock(&self) -> Result<MutexGuard<'_, HashMap<CacheKey, CacheEntry>>, DomainError> {
        self.entries
            .lock()
            .map_err(|_| DomainError::internal("Failed to acquire cache lock"))
    }

    fn is_current(entries: &HashMap<CacheKey, CacheEntry>, key: &CacheKey, fetch_id: u64) -> bool {
        matches!(entries.get(key), Some(CacheEntry::Pending(pending)) if pending.id() == fetch_id)
    }

    /// Publishes the outcome of fetch `fetch_id`, unless a newer entry has
    /// taken its place
    fn settle(&self, key: &CacheKey, fetch_id: u64, outcome: &FetchOutcome) {
        let mut entries = match self.lock() {
            Ok(entries) => entries,
            Err(e) => {
                warn!(key = %key, error = %e, "Dropping settled fetch");
                return;
            }
        };

        if !Self::is_current(&entries, key, fetch_id) {
            debug!(key = %key, fetch_id, "Settled fetch was superseded, leaving entry untouched");
            return;
        }

        let replaced = match outcome {
            Ok(value) => entries.insert(
                key.clone(),
                CacheEntry::Resolved(ResolvedValue::new(value.clone())),
            ),
            Err(_) => entries.remove(key),
        };
        drop(entries);
        drop(replaced);

        debug!(key = %key, fetch_id, ok = outcome.is_ok(), "Pending fetch settled");
    }

    /// Releases one subscription; the last one out cancels an unsettled
    /// fetch
    pub(super) fn release(&self, subscription: &Subscription) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        let remaining = subscription.interest.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining > 0 || subscription.future.peek().is_some() {
            return;
        }

        subscription.abort.abort();
        let removed = if Self::is_current(&entries, &subscription.key, subscription.fetch_id) {
            entries.remove(&subscription.key)
        } else {
            None
        };
        drop(entries);
        drop(removed);

        debug!(
            key = %subscription.key,
            fetch_id = subscription.fetch_id,
            "Last subscriber left, pending fetch cancelled"
        );
    }
}
