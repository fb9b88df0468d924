//! Composition root.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use fresco_core::{
    CacheKey, CachePolicy, FetchResult, Freshness, Producer, SharedClock, SystemClock,
};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::bridge::{Observation, Snapshot, SnapshotPublisher};
use crate::config::CacheConfig;
use crate::coordinator::FetchCoordinator;
use crate::metrics;
use crate::offload::OffloadManager;
use crate::store::{CacheEntry, CacheStore, EntryPatch};
use crate::suggest::SuggestionEngine;

/// One shared request cache for the whole application.
///
/// Build it once at startup and hand clones to every consumer; clones share
/// the same store and background tasks.
///
/// # Example
///
/// ```no_run
/// use fresco::{Cache, CacheConfig, CacheKey, CachePolicy, FetchError};
/// use std::time::Duration;
///
/// # async fn run() {
/// let cache = Cache::<Vec<String>>::new(CacheConfig::default());
/// let key = CacheKey::builder("institutions").part("type", Some("university")).build();
/// let policy = CachePolicy::new(Duration::from_secs(30), Duration::from_secs(300)).unwrap();
///
/// let mut observation = cache.observe(
///     &key,
///     || async { Ok::<_, FetchError>(vec!["Data Science".to_string()]) },
///     policy,
/// );
/// while let Some(snapshot) = observation.changed().await {
///     if !snapshot.is_loading {
///         break;
///     }
/// }
/// # }
/// ```
pub struct Cache<T> {
    store: CacheStore<T>,
    coordinator: FetchCoordinator<T>,
    config: Arc<CacheConfig>,
}

impl<T> Clone for Cache<T> {
    fn clone(&self) -> Self {
        Cache {
            store: self.store.clone(),
            coordinator: self.coordinator.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<T> fmt::Debug for Cache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("store", &self.store)
            .field("config", &self.config)
            .finish()
    }
}

impl<T> Cache<T>
where
    T: Send + Sync + 'static,
{
    /// Creates a cache driven by the system clock.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, SystemClock::shared())
    }

    /// Creates a cache driven by `clock`.
    pub fn with_clock(config: CacheConfig, clock: SharedClock) -> Self {
        let store = CacheStore::new(clock, config.policy);
        let offload = OffloadManager::new(config.offload.clone());
        let coordinator = FetchCoordinator::new(store.clone(), offload, config.fetch_timeout);
        Cache {
            store,
            coordinator,
            config: Arc::new(config),
        }
    }

    /// Configuration the cache was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Underlying store.
    pub fn store(&self) -> &CacheStore<T> {
        &self.store
    }

    /// Coordinator running producer calls.
    pub fn coordinator(&self) -> &FetchCoordinator<T> {
        &self.coordinator
    }

    /// Manager of background producer calls.
    pub fn offload(&self) -> &OffloadManager {
        self.coordinator.offload()
    }

    /// Observes `key`, fetching it with `producer` as `policy` requires.
    ///
    /// The returned observation starts with the current state of the entry:
    /// stale data is served immediately while it is revalidated. Must be
    /// called from within a tokio runtime.
    pub fn observe<P>(&self, key: &CacheKey, producer: P, policy: CachePolicy) -> Observation<T>
    where
        P: Producer<T>,
    {
        let producer = producer.into_shared();
        let entry = self.store.get_or_create(key);
        metrics::record_observe(observed_state(&entry, &policy, self.store.clock().now()));

        self.store.remember(key, policy, producer.clone());

        let (publisher, receiver) = SnapshotPublisher::channel(Snapshot::from_entry(&entry));
        let subscription = {
            let publisher = Arc::clone(&publisher);
            self.store
                .subscribe(key, move |entry: &CacheEntry<T>| publisher.publish(entry))
        };
        // catch writes that landed before the listener was registered
        if let Some(current) = self.store.get(key) {
            publisher.publish(&current);
        }

        let now = self.store.clock().now();
        self.coordinator.ensure_fresh(key, &producer, &policy, now);

        Observation::new(receiver, subscription)
    }

    /// Fetches `key` without observing it.
    ///
    /// Returns fresh data right away, otherwise the outcome of the in-flight
    /// or a newly started producer call.
    pub async fn fetch<P>(
        &self,
        key: &CacheKey,
        producer: P,
        policy: CachePolicy,
    ) -> FetchResult<Arc<T>>
    where
        P: Producer<T>,
    {
        let producer = producer.into_shared();
        let now = self.store.clock().now();
        self.coordinator
            .ensure_fresh(key, &producer, &policy, now)
            .into_result()
            .await
    }

    /// Writes `value` as freshly fetched data of `key`.
    pub fn set(&self, key: &CacheKey, value: impl Into<Arc<T>>) -> CacheEntry<T> {
        let now = self.store.clock().now();
        self.store.write(key, EntryPatch::fetched(value, now))
    }

    /// Current snapshot of `key`, empty for an unknown key.
    pub fn snapshot(&self, key: &CacheKey) -> Snapshot<T> {
        self.store
            .get(key)
            .map(|entry| Snapshot::from_entry(&entry))
            .unwrap_or_default()
    }

    /// Marks `key` stale.
    ///
    /// An observed key is refetched right away with the producer of its latest
    /// observation; otherwise the next observation refetches. Returns `false`
    /// for an unknown key.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        if self.store.invalidate(key).is_none() {
            return false;
        }
        if let Some((producer, policy)) = self.store.observer_context(key) {
            let now = self.store.clock().now();
            self.coordinator.ensure_fresh(key, &producer, &policy, now);
        }
        true
    }

    /// Evicts every entry that is unobserved, idle and expired.
    pub fn sweep(&self) -> usize {
        self.store.sweep(self.store.clock().now())
    }

    /// Suggestion engine sized by this cache's configuration.
    pub fn suggestion_engine<F>(&self, extract: F) -> SuggestionEngine<T>
    where
        F: Fn(&T) -> Vec<String> + Send + Sync + 'static,
    {
        SuggestionEngine::new(extract).with_limit(self.config.suggestions.limit)
    }

    /// Runs [`sweep`](Cache::sweep) every `sweep_interval` until the cache is
    /// dropped.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let store = self.store.downgrade();
        let period = self.config.sweep_interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(store) = store.upgrade() else {
                    debug!("cache dropped, stopping sweeper");
                    break;
                };
                store.sweep(store.clock().now());
            }
        })
    }
}

fn observed_state<T>(entry: &CacheEntry<T>, policy: &CachePolicy, now: Instant) -> &'static str {
    match (entry.data.is_some(), entry.fetched_at) {
        (true, Some(fetched_at))
            if !entry.invalidated && policy.freshness(fetched_at, now) == Freshness::Fresh =>
        {
            "fresh"
        }
        (true, _) => "stale",
        (false, _) => "miss",
    }
}
