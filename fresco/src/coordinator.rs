//! Request deduplication and background producer execution.
//!
//! [`FetchCoordinator::ensure_fresh`] guarantees at most one outstanding
//! producer call per key. The check of the entry's in-flight slot and the
//! marking of a new request happen under the same shard lock of the store, so
//! concurrent callers on a multi-threaded runtime still share one call.
//!
//! The producer runs as an offloaded tokio task. Its outcome is written back
//! into the store (which notifies every listener of the key) and broadcast to
//! every [`Waiter`] that joined the request. Failures never escape the task.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use fresco_core::{CacheKey, CachePolicy, FetchError, FetchResult, SharedProducer};
use futures::FutureExt;
use tracing::{Instrument, debug, info_span, warn};

use crate::metrics;
use crate::offload::{OffloadKey, OffloadManager};
use crate::store::{BeginFetch, CacheStore, FetchKind, Waiter};

/// What [`FetchCoordinator::ensure_fresh`] did.
pub enum EnsureFresh<T> {
    /// Data was fresh; no call was made.
    Fresh(Arc<T>),
    /// A call was already in flight and the caller joined it.
    Joined(Waiter<T>),
    /// A new call was started.
    Started(Waiter<T>),
}

impl<T> EnsureFresh<T> {
    /// Whether this invocation started a producer call.
    pub fn is_started(&self) -> bool {
        matches!(self, EnsureFresh::Started(_))
    }

    /// Resolves to the fresh data or to the outcome of the in-flight call.
    pub async fn into_result(self) -> FetchResult<Arc<T>> {
        match self {
            EnsureFresh::Fresh(data) => Ok(data),
            EnsureFresh::Joined(waiter) | EnsureFresh::Started(waiter) => waiter.wait().await,
        }
    }
}

impl<T> fmt::Debug for EnsureFresh<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnsureFresh::Fresh(_) => f.write_str("Fresh"),
            EnsureFresh::Joined(_) => f.write_str("Joined"),
            EnsureFresh::Started(_) => f.write_str("Started"),
        }
    }
}

/// Starts, deduplicates and completes producer calls.
pub struct FetchCoordinator<T> {
    store: CacheStore<T>,
    offload: OffloadManager,
    fetch_timeout: Option<Duration>,
}

impl<T> Clone for FetchCoordinator<T> {
    fn clone(&self) -> Self {
        FetchCoordinator {
            store: self.store.clone(),
            offload: self.offload.clone(),
            fetch_timeout: self.fetch_timeout,
        }
    }
}

impl<T> fmt::Debug for FetchCoordinator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchCoordinator")
            .field("offload", &self.offload)
            .field("fetch_timeout", &self.fetch_timeout)
            .finish()
    }
}

impl<T> FetchCoordinator<T>
where
    T: Send + Sync + 'static,
{
    /// Creates a coordinator writing into `store`.
    ///
    /// A producer call running longer than `fetch_timeout` fails with
    /// [`FetchError::Network`].
    pub fn new(
        store: CacheStore<T>,
        offload: OffloadManager,
        fetch_timeout: Option<Duration>,
    ) -> Self {
        FetchCoordinator {
            store,
            offload,
            fetch_timeout,
        }
    }

    /// Store the coordinator writes into.
    pub fn store(&self) -> &CacheStore<T> {
        &self.store
    }

    /// Manager running the producer calls.
    pub fn offload(&self) -> &OffloadManager {
        &self.offload
    }

    /// Makes sure `key` is fresh or being refreshed.
    ///
    /// Does nothing when the data is fresh, joins the in-flight call when
    /// there is one, and otherwise starts `producer` in the background.
    /// Must be called from within a tokio runtime.
    pub fn ensure_fresh(
        &self,
        key: &CacheKey,
        producer: &SharedProducer<T>,
        policy: &CachePolicy,
        now: Instant,
    ) -> EnsureFresh<T> {
        match self.store.begin_fetch(key, policy, now) {
            BeginFetch::Fresh(data) => EnsureFresh::Fresh(data),
            BeginFetch::Joined { kind, waiter } => {
                debug!(%key, kind = kind.as_str(), "joining request already in flight");
                metrics::record_fetch_start(kind, true);
                EnsureFresh::Joined(waiter)
            }
            BeginFetch::Started { id, kind, waiter } => {
                self.spawn_fetch(key.clone(), id, kind, producer.clone());
                EnsureFresh::Started(waiter)
            }
        }
    }

    fn spawn_fetch(&self, key: CacheKey, id: u64, kind: FetchKind, producer: SharedProducer<T>) {
        debug!(%key, id, kind = kind.as_str(), "starting fetch");
        metrics::record_fetch_start(kind, false);

        let span = info_span!("fresco.fetch", key = %key, kind = kind.as_str(), request = id);
        let guard = CompletionGuard {
            coordinator: self.clone(),
            key: key.clone(),
            id,
            completed: false,
        };
        let fetch_timeout = self.fetch_timeout;

        self.offload.spawn_with_key(
            OffloadKey::new(key, id, kind),
            async move {
                let start = Instant::now();
                let result = run_producer(&producer, fetch_timeout).await;
                if let Err(error) = &result {
                    warn!(error = %error, error_kind = error.kind(), "fetch failed");
                }
                metrics::record_fetch_outcome(
                    kind,
                    start.elapsed(),
                    result.as_ref().err().map(FetchError::kind),
                );
                guard.complete(result);
            }
            .instrument(span),
        );
    }
}

async fn run_producer<T>(
    producer: &SharedProducer<T>,
    fetch_timeout: Option<Duration>,
) -> FetchResult<T> {
    let call = AssertUnwindSafe(producer.call()).catch_unwind();
    let outcome = match fetch_timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(outcome) => outcome,
            Err(_) => return Err(FetchError::network(format!("fetch timed out after {limit:?}"))),
        },
        None => call.await,
    };
    outcome.unwrap_or_else(|_| Err(FetchError::network("producer panicked")))
}

/// Writes the outcome of one request back into the store.
///
/// Dropping it without an outcome (task aborted or runtime shut down) fails
/// the request, so the key never stays marked as in flight.
struct CompletionGuard<T>
where
    T: Send + Sync + 'static,
{
    coordinator: FetchCoordinator<T>,
    key: CacheKey,
    id: u64,
    completed: bool,
}

impl<T> CompletionGuard<T>
where
    T: Send + Sync + 'static,
{
    fn complete(mut self, result: FetchResult<T>) {
        self.completed = true;
        if !self.finish(result) {
            return;
        }
        // invalidated while in flight: observers get a fresh request
        let store = self.coordinator.store();
        if let Some((producer, policy)) = store.observer_context(&self.key) {
            debug!(key = %self.key, "refetching entry invalidated during request");
            let now = store.clock().now();
            self.coordinator.ensure_fresh(&self.key, &producer, &policy, now);
        }
    }

    /// Returns whether the request was superseded by an invalidation.
    fn finish(&self, result: FetchResult<T>) -> bool {
        let store = self.coordinator.store();
        let now = store.clock().now();
        match store.finish_fetch(&self.key, self.id, result, now) {
            Some((pending, outcome)) => {
                let superseded = pending.superseded;
                pending.resolve(outcome);
                superseded
            }
            None => false,
        }
    }
}

impl<T> Drop for CompletionGuard<T>
where
    T: Send + Sync + 'static,
{
    fn drop(&mut self) {
        if !self.completed {
            warn!(key = %self.key, id = self.id, "fetch aborted before completion");
            self.finish(Err(FetchError::network("fetch aborted")));
        }
    }
}
