//! Cache entries and subscriptions to in-flight fetches

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use futures::future::{AbortHandle, BoxFuture, Shared};
use serde_json::Value;

use super::store::StoreInner;
use crate::domain::{CacheKey, FetchError};

/// Result every subscriber of a pending fetch observes
pub type FetchOutcome = Result<Arc<Value>, FetchFailure>;

pub(super) type SharedFetch = Shared<BoxFuture<'static, FetchOutcome>>;

/// Why a pending fetch did not produce a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// The transport call failed
    Failed(FetchError),
    /// Every subscriber went away and the transport call was abandoned
    Cancelled,
}

/// Last successfully fetched body for a key
#[derive(Debug, Clone)]
pub struct ResolvedValue {
    value: Arc<Value>,
    resolved_at: DateTime<Utc>,
}

impl ResolvedValue {
    pub fn new(value: Arc<Value>) -> Self {
        Self {
            value,
            resolved_at: Utc::now(),
        }
    }

    pub fn value(&self) -> &Arc<Value> {
        &self.value
    }

    pub fn resolved_at(&self) -> DateTime<Utc> {
        self.resolved_at
    }
}

/// Handle to an in-flight computation stored in the cache.
///
/// The computation can only be awaited through a [`Subscription`], which
/// is what keeps it alive.
#[derive(Clone)]
pub struct PendingFetch {
    id: u64,
    future: SharedFetch,
    abort: AbortHandle,
    interest: Arc<AtomicUsize>,
    started_at: DateTime<Utc>,
}

impl PendingFetch {
    pub(super) fn new(id: u64, future: SharedFetch, abort: AbortHandle) -> Self {
        Self {
            id,
            future,
            abort,
            interest: Arc::new(AtomicUsize::new(0)),
            started_at: Utc::now(),
        }
    }

    /// Store-unique id of this fetch
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of live subscriptions
    pub fn interest(&self) -> usize {
        self.interest.load(Ordering::SeqCst)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Registers one more subscriber. The caller must hold the store lock.
    pub(super) fn subscribe(&self, key: &CacheKey, store: Weak<StoreInner>) -> Subscription {
        self.interest.fetch_add(1, Ordering::SeqCst);

        Subscription {
            key: key.clone(),
            fetch_id: self.id,
            future: self.future.clone(),
            abort: self.abort.clone(),
            interest: self.interest.clone(),
            store,
        }
    }
}

impl fmt::Debug for PendingFetch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingFetch")
            .field("id", &self.id)
            .field("interest", &self.interest())
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

/// Stored state for a cache key
#[derive(Debug, Clone)]
pub enum CacheEntry {
    Pending(PendingFetch),
    Resolved(ResolvedValue),
}

impl CacheEntry {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    pub fn resolved_value(&self) -> Option<&Arc<Value>> {
        match self {
            Self::Resolved(resolved) => Some(resolved.value()),
            Self::Pending(_) => None,
        }
    }
}

/// One subscriber's interest in a pending fetch.
///
/// Dropping the last subscription before the fetch settles cancels the
/// transport call and removes the pending entry.
pub struct Subscription {
    pub(super) key: CacheKey,
    pub(super) fetch_id: u64,
    pub(super) future: SharedFetch,
    pub(super) abort: AbortHandle,
    pub(super) interest: Arc<AtomicUsize>,
    store: Weak<StoreInner>,
}

impl Subscription {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn fetch_id(&self) -> u64 {
        self.fetch_id
    }

    /// Waits for the shared computation to settle
    pub async fn wait(&self) -> FetchOutcome {
        self.future.clone().await
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("fetch_id", &self.fetch_id)
            .finish_non_exhaustive()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        match self.store.upgrade() {
            Some(store) => store.release(self),
            None => {
                let remaining = self.interest.fetch_sub(1, Ordering::SeqCst) - 1;
                if remaining == 0 && self.future.peek().is_none() {
                    self.abort.abort();
                }
            }
        }
    }
}
