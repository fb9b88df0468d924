//! Cache entry state.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use fresco_core::{CacheKey, CachePolicy, FetchError, SharedProducer};

use super::pending::{FetchKind, PendingRequest};

/// Lifecycle status of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EntryStatus {
    /// Created, never fetched.
    #[default]
    Empty,
    /// First load in flight, no data yet.
    Loading,
    /// Data younger than the stale time.
    Fresh,
    /// Data past the stale time or explicitly invalidated.
    Stale,
    /// Last fetch failed. Data from an earlier success may still be present.
    Error,
}

impl EntryStatus {
    /// Label used in spans and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Empty => "empty",
            EntryStatus::Loading => "loading",
            EntryStatus::Fresh => "fresh",
            EntryStatus::Stale => "stale",
            EntryStatus::Error => "error",
        }
    }
}

/// Point-in-time view of one cache entry, as handed to listeners.
pub struct CacheEntry<T> {
    /// Key of the entry.
    pub key: CacheKey,
    /// Last successfully fetched value.
    pub data: Option<Arc<T>>,
    /// Lifecycle status.
    pub status: EntryStatus,
    /// When `data` was last written.
    pub fetched_at: Option<Instant>,
    /// Last failure, cleared by the next success.
    pub error: Option<FetchError>,
    /// Kind of the outstanding producer call, if any.
    pub in_flight: Option<FetchKind>,
    /// Number of active observers.
    pub subscriber_count: usize,
    /// Whether the entry was invalidated since its last successful fetch.
    pub invalidated: bool,
    /// Store-wide write counter; later writes carry larger versions.
    pub version: u64,
}

impl<T> Clone for CacheEntry<T> {
    fn clone(&self) -> Self {
        CacheEntry {
            key: self.key.clone(),
            data: self.data.clone(),
            status: self.status,
            fetched_at: self.fetched_at,
            error: self.error.clone(),
            in_flight: self.in_flight,
            subscriber_count: self.subscriber_count,
            invalidated: self.invalidated,
            version: self.version,
        }
    }
}

impl<T> fmt::Debug for CacheEntry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("key", &self.key)
            .field("has_data", &self.data.is_some())
            .field("status", &self.status)
            .field("error", &self.error)
            .field("in_flight", &self.in_flight)
            .field("subscriber_count", &self.subscriber_count)
            .field("invalidated", &self.invalidated)
            .field("version", &self.version)
            .finish()
    }
}

/// Partial update applied by [`CacheStore::write`](super::CacheStore::write).
pub struct EntryPatch<T> {
    pub(crate) data: Option<Arc<T>>,
    pub(crate) status: Option<EntryStatus>,
    pub(crate) fetched_at: Option<Instant>,
    pub(crate) error: Option<Option<FetchError>>,
    pub(crate) invalidated: Option<bool>,
}

impl<T> Default for EntryPatch<T> {
    fn default() -> Self {
        EntryPatch {
            data: None,
            status: None,
            fetched_at: None,
            error: None,
            invalidated: None,
        }
    }
}

impl<T> EntryPatch<T> {
    /// Empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Patch that records a successful fetch of `data` at `now`.
    pub fn fetched(data: impl Into<Arc<T>>, now: Instant) -> Self {
        Self::new()
            .data(data)
            .status(EntryStatus::Fresh)
            .fetched_at(now)
            .clear_error()
            .invalidated(false)
    }

    /// Sets the data.
    pub fn data(self, data: impl Into<Arc<T>>) -> Self {
        Self {
            data: Some(data.into()),
            ..self
        }
    }

    /// Sets the status.
    pub fn status(self, status: EntryStatus) -> Self {
        Self {
            status: Some(status),
            ..self
        }
    }

    /// Sets the fetch timestamp.
    pub fn fetched_at(self, fetched_at: Instant) -> Self {
        Self {
            fetched_at: Some(fetched_at),
            ..self
        }
    }

    /// Records a failure.
    pub fn error(self, error: FetchError) -> Self {
        Self {
            error: Some(Some(error)),
            ..self
        }
    }

    /// Clears the last failure.
    pub fn clear_error(self) -> Self {
        Self {
            error: Some(None),
            ..self
        }
    }

    /// Sets or clears the invalidation flag.
    pub fn invalidated(self, invalidated: bool) -> Self {
        Self {
            invalidated: Some(invalidated),
            ..self
        }
    }
}

/// Listener invoked with the entry after every write.
pub type Listener<T> = Arc<dyn Fn(&CacheEntry<T>) + Send + Sync>;

/// Mutable state behind one key.
pub(crate) struct Slot<T> {
    pub(crate) data: Option<Arc<T>>,
    pub(crate) status: EntryStatus,
    pub(crate) fetched_at: Option<Instant>,
    pub(crate) error: Option<FetchError>,
    pub(crate) in_flight: Option<PendingRequest<T>>,
    pub(crate) listeners: Vec<(u64, Listener<T>)>,
    pub(crate) invalidated: bool,
    /// Policy of the latest observation, used for eviction.
    pub(crate) policy: CachePolicy,
    /// Producer of the latest observation, used to refetch on invalidation.
    pub(crate) producer: Option<SharedProducer<T>>,
    pub(crate) version: u64,
}

impl<T> Slot<T> {
    pub(crate) fn new(policy: CachePolicy) -> Self {
        Slot {
            data: None,
            status: EntryStatus::Empty,
            fetched_at: None,
            error: None,
            in_flight: None,
            listeners: Vec::new(),
            invalidated: false,
            policy,
            producer: None,
            version: 0,
        }
    }

    pub(crate) fn apply(&mut self, patch: EntryPatch<T>) {
        if let Some(data) = patch.data {
            self.data = Some(data);
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(fetched_at) = patch.fetched_at {
            self.fetched_at = Some(fetched_at);
        }
        if let Some(error) = patch.error {
            self.error = error;
        }
        if let Some(invalidated) = patch.invalidated {
            self.invalidated = invalidated;
        }
    }

    /// An entry may go only when nobody observes it, nothing is in flight and
    /// its data (if any) has outlived the cache time.
    pub(crate) fn is_evictable(&self, now: Instant) -> bool {
        if !self.listeners.is_empty() || self.in_flight.is_some() {
            return false;
        }
        match self.fetched_at {
            Some(fetched_at) => self.policy.is_expired(fetched_at, now),
            None => self.data.is_none(),
        }
    }

    pub(crate) fn view(&self, key: &CacheKey) -> CacheEntry<T> {
        CacheEntry {
            key: key.clone(),
            data: self.data.clone(),
            status: self.status,
            fetched_at: self.fetched_at,
            error: self.error.clone(),
            in_flight: self.in_flight.as_ref().map(|pending| pending.kind),
            subscriber_count: self.listeners.len(),
            invalidated: self.invalidated,
            version: self.version,
        }
    }

    pub(crate) fn listeners(&self) -> Vec<Listener<T>> {
        self.listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }
}
