//! Keyed table of cache entries.
//!
//! [`CacheStore`] owns the entry lifecycle (create, update, evict) and the
//! listener registry of every key. It never fails for an unknown key: reading
//! one creates an [`EntryStatus::Empty`] entry.
//!
//! ## Notification
//!
//! Every write delivers the resulting [`CacheEntry`] to each listener that was
//! registered on the key at the time of the write, exactly once, before the
//! write returns. Listeners run after the table lock is released, so they may
//! call back into the store.
//!
//! ## Eviction
//!
//! An entry is evicted once nobody observes it, no request is in flight for
//! it and its data has outlived the policy's cache time. Eviction runs from
//! [`CacheStore::sweep`], opportunistically when the last listener of a key
//! goes away, and lazily when an expired entry is accessed again.

mod entry;
mod pending;
mod subscription;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use dashmap::DashMap;
use fresco_core::{CacheKey, CachePolicy, FetchResult, Freshness, SharedClock, SharedProducer};
use tracing::debug;

pub use entry::{CacheEntry, EntryPatch, EntryStatus, Listener};
pub(crate) use pending::PendingRequest;
pub use pending::{FetchKind, Waiter};
pub use subscription::Subscription;

use crate::metrics;
use entry::Slot;

/// Outcome of trying to start a fetch for a key.
pub(crate) enum BeginFetch<T> {
    /// Data is fresh, nothing to do.
    Fresh(Arc<T>),
    /// A request is already in flight; the caller joins it.
    Joined { kind: FetchKind, waiter: Waiter<T> },
    /// The caller owns a new request and must run the producer.
    Started {
        id: u64,
        kind: FetchKind,
        waiter: Waiter<T>,
    },
}

struct StoreInner<T> {
    entries: DashMap<CacheKey, Slot<T>>,
    clock: SharedClock,
    default_policy: CachePolicy,
    versions: AtomicU64,
    listener_ids: AtomicU64,
    request_ids: AtomicU64,
}

/// Shared table of cache entries.
///
/// Cloning is cheap; clones share the same table.
pub struct CacheStore<T> {
    inner: Arc<StoreInner<T>>,
}

impl<T> Clone for CacheStore<T> {
    fn clone(&self) -> Self {
        CacheStore {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for CacheStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("entries", &self.inner.entries.len())
            .field("clock", &self.inner.clock)
            .field("default_policy", &self.inner.default_policy)
            .finish()
    }
}

/// Non-owning handle to a [`CacheStore`].
pub struct WeakCacheStore<T> {
    inner: Weak<StoreInner<T>>,
}

impl<T> WeakCacheStore<T> {
    /// Returns the store if it is still alive.
    pub fn upgrade(&self) -> Option<CacheStore<T>> {
        self.inner.upgrade().map(|inner| CacheStore { inner })
    }
}

impl<T> CacheStore<T>
where
    T: Send + Sync + 'static,
{
    /// Creates an empty store.
    ///
    /// `default_policy` governs eviction of entries created by direct writes,
    /// before any observation assigns them a policy.
    pub fn new(clock: SharedClock, default_policy: CachePolicy) -> Self {
        CacheStore {
            inner: Arc::new(StoreInner {
                entries: DashMap::new(),
                clock,
                default_policy,
                versions: AtomicU64::new(0),
                listener_ids: AtomicU64::new(0),
                request_ids: AtomicU64::new(0),
            }),
        }
    }

    /// Clock used for all staleness math.
    pub fn clock(&self) -> &SharedClock {
        &self.inner.clock
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Keys of all entries currently held.
    pub fn keys(&self) -> Vec<CacheKey> {
        self.inner
            .entries
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Returns a handle that does not keep the store alive.
    pub fn downgrade(&self) -> WeakCacheStore<T> {
        WeakCacheStore {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Returns the entry for `key`, creating an empty one if needed.
    ///
    /// An entry that is already past its eviction point is reset to empty
    /// instead of being served.
    pub fn get_or_create(&self, key: &CacheKey) -> CacheEntry<T> {
        let now = self.inner.clock.now();
        let mut slot = self
            .inner
            .entries
            .entry(key.clone())
            .or_insert_with(|| Slot::new(self.inner.default_policy));

        if slot.fetched_at.is_some() && slot.is_evictable(now) {
            debug!(%key, "discarding expired entry on access");
            let policy = slot.policy;
            *slot = Slot::new(policy);
            slot.version = self.next_version();
            metrics::record_evictions(1);
        }
        slot.view(key)
    }

    /// Returns the entry for `key` without creating it.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry<T>> {
        self.inner.entries.get(key).map(|slot| slot.view(key))
    }

    /// Registers `listener` on `key` and increments its subscriber count.
    pub fn subscribe<F>(&self, key: &CacheKey, listener: F) -> Subscription<T>
    where
        F: Fn(&CacheEntry<T>) + Send + Sync + 'static,
    {
        let id = self.inner.listener_ids.fetch_add(1, Ordering::Relaxed);
        let listener: Listener<T> = Arc::new(listener);
        self.inner
            .entries
            .entry(key.clone())
            .or_insert_with(|| Slot::new(self.inner.default_policy))
            .listeners
            .push((id, listener));
        Subscription::new(key.clone(), id, self.clone())
    }

    /// Applies `patch` to the entry and notifies every listener of the key.
    pub fn write(&self, key: &CacheKey, patch: EntryPatch<T>) -> CacheEntry<T> {
        let (view, listeners) = {
            let mut slot = self
                .inner
                .entries
                .entry(key.clone())
                .or_insert_with(|| Slot::new(self.inner.default_policy));
            slot.apply(patch);
            slot.version = self.next_version();
            (slot.view(key), slot.listeners())
        };
        notify(&listeners, &view);
        view
    }

    /// Marks the entry stale regardless of its age.
    ///
    /// Data is kept and still served; the next observation refetches it.
    /// Returns `None` for an unknown key.
    pub fn invalidate(&self, key: &CacheKey) -> Option<CacheEntry<T>> {
        let (view, listeners) = {
            let mut slot = self.inner.entries.get_mut(key)?;
            slot.invalidated = true;
            if slot.status == EntryStatus::Fresh {
                slot.status = EntryStatus::Stale;
            }
            if let Some(pending) = slot.in_flight.as_mut() {
                pending.superseded = true;
            }
            slot.version = self.next_version();
            (slot.view(key), slot.listeners())
        };
        debug!(%key, subscribers = view.subscriber_count, "entry invalidated");
        notify(&listeners, &view);
        Some(view)
    }

    /// Evicts every entry satisfying the eviction condition at `now`.
    ///
    /// Returns the number of evicted entries.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut evicted = 0;
        self.inner.entries.retain(|key, slot| {
            if slot.is_evictable(now) {
                debug!(%key, "evicting entry");
                evicted += 1;
                false
            } else {
                true
            }
        });
        if evicted > 0 {
            debug!(evicted, remaining = self.inner.entries.len(), "sweep finished");
            metrics::record_evictions(evicted);
        }
        evicted
    }

    pub(crate) fn remove_listener(&self, key: &CacheKey, id: u64) {
        let emptied = match self.inner.entries.get_mut(key) {
            Some(mut slot) => {
                let before = slot.listeners.len();
                slot.listeners.retain(|(listener, _)| *listener != id);
                slot.listeners.len() < before && slot.listeners.is_empty()
            }
            None => false,
        };
        if emptied {
            let now = self.inner.clock.now();
            if self
                .inner
                .entries
                .remove_if(key, |_, slot| slot.is_evictable(now))
                .is_some()
            {
                debug!(%key, "evicting entry after last unsubscribe");
                metrics::record_evictions(1);
            }
        }
    }

    /// Remembers the policy and producer of the latest observation.
    pub(crate) fn remember(
        &self,
        key: &CacheKey,
        policy: CachePolicy,
        producer: SharedProducer<T>,
    ) {
        let mut slot = self
            .inner
            .entries
            .entry(key.clone())
            .or_insert_with(|| Slot::new(policy));
        slot.policy = policy;
        slot.producer = Some(producer);
    }

    /// Producer and policy remembered for `key`, if it is observed.
    pub(crate) fn observer_context(
        &self,
        key: &CacheKey,
    ) -> Option<(SharedProducer<T>, CachePolicy)> {
        let slot = self.inner.entries.get(key)?;
        if slot.listeners.is_empty() {
            return None;
        }
        slot.producer.clone().map(|producer| (producer, slot.policy))
    }

    /// Atomically checks the entry and, unless it is fresh or already being
    /// fetched, marks a new request in flight.
    pub(crate) fn begin_fetch(
        &self,
        key: &CacheKey,
        policy: &CachePolicy,
        now: Instant,
    ) -> BeginFetch<T> {
        let (started, view, listeners) = {
            let mut slot = self
                .inner
                .entries
                .entry(key.clone())
                .or_insert_with(|| Slot::new(*policy));

            if let Some(pending) = slot.in_flight.as_ref() {
                return BeginFetch::Joined {
                    kind: pending.kind,
                    waiter: pending.waiter(),
                };
            }

            let kind = match (&slot.data, slot.fetched_at) {
                (Some(data), Some(fetched_at))
                    if !slot.invalidated
                        && policy.freshness(fetched_at, now) == Freshness::Fresh =>
                {
                    return BeginFetch::Fresh(Arc::clone(data));
                }
                (Some(_), _) => FetchKind::Revalidate,
                (None, _) => FetchKind::Load,
            };

            let id = self.inner.request_ids.fetch_add(1, Ordering::Relaxed);
            let pending = PendingRequest::new(id, kind, now);
            let waiter = pending.waiter();
            slot.in_flight = Some(pending);
            slot.status = match (kind, slot.status) {
                (FetchKind::Load, _) => EntryStatus::Loading,
                (FetchKind::Revalidate, EntryStatus::Fresh) => EntryStatus::Stale,
                (FetchKind::Revalidate, status) => status,
            };
            slot.version = self.next_version();
            ((id, kind, waiter), slot.view(key), slot.listeners())
        };
        notify(&listeners, &view);

        let (id, kind, waiter) = started;
        BeginFetch::Started { id, kind, waiter }
    }

    /// Writes the outcome of request `id` and clears it from the entry.
    ///
    /// Failures keep previously fetched data. A request superseded by an
    /// invalidation lands its data as [`EntryStatus::Stale`]. Returns `None`
    /// if the request is no longer the one in flight for `key`.
    pub(crate) fn finish_fetch(
        &self,
        key: &CacheKey,
        id: u64,
        result: FetchResult<T>,
        now: Instant,
    ) -> Option<(PendingRequest<T>, FetchResult<Arc<T>>)> {
        let (pending, outcome, view, listeners) = {
            let mut slot = self.inner.entries.get_mut(key)?;
            if slot.in_flight.as_ref().map(|pending| pending.id) != Some(id) {
                debug!(%key, id, "dropping result of a request that is no longer in flight");
                return None;
            }
            let pending = slot.in_flight.take()?;
            debug!(
                %key,
                id,
                kind = pending.kind.as_str(),
                waiters = pending.waiter_count(),
                elapsed_ms = now.saturating_duration_since(pending.started_at).as_millis(),
                "request finished"
            );
            let outcome = match result {
                Ok(value) => {
                    let data = Arc::new(value);
                    let mut patch = EntryPatch::fetched(Arc::clone(&data), now);
                    // invalidated while in flight: the result predates the invalidation
                    if pending.superseded {
                        patch = patch.status(EntryStatus::Stale).invalidated(true);
                    }
                    slot.apply(patch);
                    Ok(data)
                }
                Err(error) => {
                    slot.apply(
                        EntryPatch::new()
                            .status(EntryStatus::Error)
                            .error(error.clone()),
                    );
                    Err(error)
                }
            };
            slot.version = self.next_version();
            (pending, outcome, slot.view(key), slot.listeners())
        };
        notify(&listeners, &view);
        Some((pending, outcome))
    }

    fn next_version(&self) -> u64 {
        self.inner.versions.fetch_add(1, Ordering::Relaxed) + 1
    }
}

fn notify<T>(listeners: &[Listener<T>], entry: &CacheEntry<T>) {
    for listener in listeners {
        listener(entry);
    }
}
