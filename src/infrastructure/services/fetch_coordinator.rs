//! Per-consumer fetch coordination on top of the shared cache store

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::future::FutureExt;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{
    CacheKeyGenerator, DomainError, Endpoint, FetchError, FetchOptions, FetchParams, FetchState,
    Transport,
};
use crate::infrastructure::cache::{
    Acquired, CacheStore, FetchComputation, FetchFailure, FetchOutcome,
};
use crate::infrastructure::observability::{
    record_cache_lookup, record_transport_request, CacheOutcome,
};

/// Drives one consumer's view of an endpoint.
///
/// Decides per call whether to serve from the shared [`CacheStore`], join an
/// in-flight request or start a new one, and keeps the consumer's
/// [`FetchState`] consistent. Only the most recently started call may write
/// the state; older calls stop waiting as soon as they are superseded.
pub struct FetchCoordinator<T> {
    consumer_id: Uuid,
    endpoint: Endpoint,
    initial_params: FetchParams,
    options: FetchOptions,
    store: CacheStore,
    transport: Arc<dyn Transport>,
    key_generator: CacheKeyGenerator,
    /// Params of the last successful fetch
    snapshot: Mutex<Option<FetchParams>>,
    initialized: AtomicBool,
    /// Sequence number of the latest call
    latest: watch::Sender<u64>,
    state: watch::Sender<FetchState<T>>,
}

impl<T> FetchCoordinator<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Creates a coordinator for `endpoint`. Nothing is fetched until
    /// [`initialize`](Self::initialize) or another operation runs.
    pub fn new(
        endpoint: impl Into<String>,
        initial_params: FetchParams,
        store: CacheStore,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, DomainError> {
        let endpoint = Endpoint::new(endpoint)?;
        let (latest, _) = watch::channel(0);
        let (state, _) = watch::channel(FetchState::idle());

        Ok(Self {
            consumer_id: Uuid::new_v4(),
            endpoint,
            initial_params,
            options: FetchOptions::default(),
            store,
            transport,
            key_generator: CacheKeyGenerator::new(),
            snapshot: Mutex::new(None),
            initialized: AtomicBool::new(false),
            latest,
            state,
        })
    }

    pub fn with_options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_key_generator(mut self, key_generator: CacheKeyGenerator) -> Self {
        self.key_generator = key_generator;
        self
    }

    pub fn consumer_id(&self) -> Uuid {
        self.consumer_id
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn initial_params(&self) -> &FetchParams {
        &self.initial_params
    }

    /// Current view state
    pub fn state(&self) -> FetchState<T> {
        self.state.borrow().clone()
    }

    /// Read-only stream of view state changes
    pub fn subscribe(&self) -> watch::Receiver<FetchState<T>> {
        self.state.subscribe()
    }

    /// First activation: fetches the initial params once, unless the
    /// coordinator is in manual mode. Later calls return the current state.
    pub async fn initialize(&self) -> FetchState<T> {
        if self.initialized.swap(true, Ordering::SeqCst) || self.options.manual {
            return self.state();
        }

        info!(
            consumer = %self.consumer_id,
            endpoint = %self.endpoint,
            "Initializing fetch coordinator"
        );
        self.ensure_fetched(self.initial_params.clone(), false).await
    }

    /// Fetches again, bypassing the cache. Uses the initial params when
    /// `params` is `None`.
    pub async fn refetch(&self, params: Option<FetchParams>) -> FetchState<T> {
        let params = params.unwrap_or_else(|| self.initial_params.clone());
        self.ensure_fetched(params, true).await
    }

    /// Makes the state reflect `params`, from cache when possible.
    ///
    /// With `force_refresh` the cached entry is discarded first. A resolved
    /// entry is served without a loading phase only when `params` equal the
    /// params of this consumer's last successful fetch; an in-flight request
    /// for the same key is always joined.
    ///
    /// A call that is superseded by a later call on this coordinator returns
    /// the state as it was at that moment, which may still be loading. The
    /// latest call's result is the one to read.
    pub async fn ensure_fetched(&self, params: FetchParams, force_refresh: bool) -> FetchState<T> {
        let seq = self.next_sequence();
        let key = self.key_generator.generate(&self.endpoint, &params);

        if force_refresh {
            if let Err(e) = self.store.remove(&key) {
                return self.settle(seq, &params, Err(FetchFailure::Failed(e.into())));
            }
        }

        let reuse_resolved = !self.options.manual && self.snapshot_matches(&params);
        let acquired = self
            .store
            .acquire(&key, reuse_resolved, || self.start_transport(&params));

        let subscription = match acquired {
            Ok(Acquired::Hit(resolved)) => {
                record_cache_lookup(CacheOutcome::Hit);
                debug!(
                    consumer = %self.consumer_id,
                    key = %key,
                    seq,
                    resolved_at = %resolved.resolved_at(),
                    "Cache hit"
                );
                return self.settle(seq, &params, Ok(resolved.value().clone()));
            }
            Ok(Acquired::Joined(subscription)) => {
                record_cache_lookup(CacheOutcome::Join);
                debug!(
                    consumer = %self.consumer_id,
                    key = %key,
                    seq,
                    fetch_id = subscription.fetch_id(),
                    "Joining in-flight fetch"
                );
                subscription
            }
            Ok(Acquired::Started(subscription)) => {
                record_cache_lookup(CacheOutcome::Miss);
                debug!(
                    consumer = %self.consumer_id,
                    key = %key,
                    seq,
                    fetch_id = subscription.fetch_id(),
                    force_refresh,
                    "Cache miss, fetching"
                );
                subscription
            }
            Err(e) => return self.settle(seq, &params, Err(FetchFailure::Failed(e.into()))),
        };

        self.begin_loading(seq);

        let outcome = tokio::select! {
            outcome = subscription.wait() => outcome,
            _ = self.superseded(seq) => {
                debug!(consumer = %self.consumer_id, key = %key, seq, "Superseded, no longer waiting");
                return self.state();
            }
        };
        drop(subscription);

        self.settle(seq, &params, outcome)
    }

    /// Supersedes every in-flight call of this consumer. Their interest in
    /// shared fetches is released; fetches other consumers await keep
    /// running.
    pub fn teardown(&self) {
        let seq = self.next_sequence();
        info!(consumer = %self.consumer_id, seq, "Fetch coordinator torn down");
    }

    fn next_sequence(&self) -> u64 {
        let mut seq = 0;
        self.latest.send_modify(|latest| {
            *latest += 1;
            seq = *latest;
        });
        seq
    }

    fn is_latest(&self, seq: u64) -> bool {
        *self.latest.borrow() == seq
    }

    async fn superseded(&self, seq: u64) {
        let mut latest = self.latest.subscribe();
        let closed = latest.wait_for(|current| *current != seq).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }

    fn snapshot_matches(&self, params: &FetchParams) -> bool {
        self.snapshot
            .lock()
            .map(|snapshot| snapshot.as_ref() == Some(params))
            .unwrap_or(false)
    }

    fn record_snapshot(&self, params: &FetchParams) {
        match self.snapshot.lock() {
            Ok(mut snapshot) => *snapshot = Some(params.clone()),
            Err(_) => warn!(consumer = %self.consumer_id, "Parameter snapshot lock poisoned"),
        }
    }

    fn begin_loading(&self, seq: u64) {
        self.state.send_if_modified(|state| {
            if !self.is_latest(seq) {
                return false;
            }
            state.loading = true;
            state.error = None;
            true
        });
    }

    /// Applies `outcome` if `seq` is still the latest call. A successful
    /// outcome also makes `params` the snapshot for later cache hits.
    fn settle(&self, seq: u64, params: &FetchParams, outcome: FetchOutcome) -> FetchState<T> {
        let (data, error) = match outcome {
            Ok(body) => match T::deserialize(&*body) {
                Ok(data) => (Some(data), None),
                Err(e) => (
                    None,
                    Some(FetchError::new(format!("Failed to decode response: {}", e), None)),
                ),
            },
            Err(FetchFailure::Failed(error)) => (None, Some(error)),
            Err(FetchFailure::Cancelled) => (None, Some(FetchError::new("Request was cancelled", None))),
        };

        let succeeded = data.is_some();
        let applied = self.state.send_if_modified(|state| {
            if !self.is_latest(seq) {
                return false;
            }
            if succeeded {
                self.record_snapshot(params);
            }
            state.loading = false;
            state.data = data;
            state.error = error;
            true
        });

        if !applied {
            debug!(consumer = %self.consumer_id, seq, "Stale result ignored");
        } else if let Some(error) = &self.state.borrow().error {
            warn!(
                consumer = %self.consumer_id,
                endpoint = %self.endpoint,
                status_code = ?error.status_code,
                error = %error,
                "Fetch failed"
            );
        }

        self.state()
    }

    fn start_transport(&self, params: &FetchParams) -> FetchComputation {
        let transport = self.transport.clone();
        let endpoint = self.endpoint.clone();
        let params = params.clone();

        async move {
            let mut timer = RequestTimer::start();
            let result = transport.get(endpoint.as_str(), &params).await;
            timer.finish(if result.is_ok() { "ok" } else { "error" });
            result
        }
        .boxed()
    }
}

impl<T> fmt::Debug for FetchCoordinator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchCoordinator")
            .field("consumer_id", &self.consumer_id)
            .field("endpoint", &self.endpoint)
            .field("initial_params", &self.initial_params)
            .field("options", &self.options)
            .field("key_generator", &self.key_generator)
            .finish_non_exhaustive()
    }
}

/// Records a transport request when finished, or as cancelled when dropped
/// first
struct RequestTimer {
    started: Instant,
    finished: bool,
}

impl RequestTimer {
    fn start() -> Self {
        Self {
            started: Instant::now(),
            finished: false,
        }
    }

    fn finish(&mut self, result: &'static str) {
        self.finished = true;
        record_transport_request(result, self.started.elapsed());
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        if !self.finished {
            record_transport_request("cancelled", self.started.elapsed());
        }
    }
}
