#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// Keyed table of cache entries and their listeners.
///
/// [`CacheStore`](store::CacheStore) owns entry lifecycle (create, update,
/// evict) and delivers every write to the listeners of the key.
pub mod store;

/// Request deduplication.
///
/// [`FetchCoordinator`](coordinator::FetchCoordinator) keeps at most one
/// producer call in flight per key and writes its outcome back into the
/// store.
pub mod coordinator;

/// Live snapshots for views.
pub mod bridge;

/// Composition root.
pub mod cache;

/// Cache configuration.
pub mod config;

/// Error types for configuration.
pub mod error;

/// Metrics collection for cache observability.
///
/// When the `metrics` feature is enabled, this module provides counters
/// and histograms for:
/// - Observations by entry state (fresh, stale, miss)
/// - Started, deduplicated and failed producer calls
/// - Evictions and background task activity
pub mod metrics;

/// Background task offloading for producer calls.
pub mod offload;

/// Autocomplete suggestions over cached lists.
///
/// Provides the ranking [`SuggestionEngine`](suggest::SuggestionEngine), a
/// [`SuggestionMemo`](suggest::SuggestionMemo) that recomputes only when the
/// query or the data changes, and a [`QueryDebouncer`](suggest::QueryDebouncer)
/// for live query input.
pub mod suggest;

pub use bridge::{Observation, Snapshot};
pub use cache::Cache;
pub use config::{CacheConfig, CacheConfigBuilder, SuggestionConfig};
pub use coordinator::{EnsureFresh, FetchCoordinator};
pub use error::ConfigError;
pub use store::{
    CacheEntry, CacheStore, EntryPatch, EntryStatus, FetchKind, Listener, Subscription, Waiter,
    WeakCacheStore,
};
pub use suggest::{SuggestionEngine, SuggestionLimit};

pub use fresco_core::{
    CacheKey, CachePolicy, Clock, FetchError, FetchResult, Freshness, KeyPart, KeyParts,
    ManualClock, PolicyError, Producer, SharedClock, SharedProducer, SystemClock,
    TransportFailure,
};

/// The `fresco` prelude.
///
/// ```rust
/// use fresco::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{Cache, CacheConfig, CacheKey, CachePolicy, FetchError, Observation, Snapshot};
}
