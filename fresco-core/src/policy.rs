//! Staleness policy and freshness math.
//!
//! A [`CachePolicy`] carries two windows measured from the moment data was
//! last fetched successfully:
//!
//! - **stale time** - while younger than this, data is served as-is
//! - **cache time** - while younger than this, stale data is served and
//!   revalidated in the background; past it, an unobserved entry is evicted
//!
//! ```text
//! fetched_at        +stale_time          +cache_time
//!     |-----Fresh-----|--------Stale--------|----Expired---->
//! ```

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default window during which unobserved data is retained.
pub const DEFAULT_CACHE_TIME: Duration = Duration::from_secs(5 * 60);

/// Invalid policy windows.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PolicyError {
    /// `stale_time` exceeds `cache_time`.
    #[error("stale time ({stale_time:?}) must not exceed cache time ({cache_time:?})")]
    StaleExceedsCache {
        /// Configured stale time.
        stale_time: Duration,
        /// Configured cache time.
        cache_time: Duration,
    },
}

/// Freshness of cached data at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Younger than `stale_time`: serve, no refresh.
    Fresh,
    /// Between `stale_time` and `cache_time`: serve, refresh in background.
    Stale,
    /// Older than `cache_time`.
    Expired,
}

/// Stale/cache windows for one observation.
///
/// Deserialization validates the windows, accepting human readable durations:
///
/// ```
/// use std::time::Duration;
/// use fresco_core::CachePolicy;
///
/// let policy = CachePolicy::new(Duration::from_millis(100), Duration::from_secs(1)).unwrap();
/// assert_eq!(policy.stale_time(), Duration::from_millis(100));
///
/// assert!(CachePolicy::new(Duration::from_secs(2), Duration::from_secs(1)).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCachePolicy", into = "RawCachePolicy")]
pub struct CachePolicy {
    stale_time: Duration,
    cache_time: Duration,
}

#[derive(Serialize, Deserialize)]
struct RawCachePolicy {
    #[serde(default, with = "humantime_serde")]
    stale_time: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    cache_time: Option<Duration>,
}

impl TryFrom<RawCachePolicy> for CachePolicy {
    type Error = PolicyError;

    fn try_from(raw: RawCachePolicy) -> Result<Self, Self::Error> {
        CachePolicy::new(
            raw.stale_time.unwrap_or(Duration::ZERO),
            raw.cache_time.unwrap_or(DEFAULT_CACHE_TIME),
        )
    }
}

impl From<CachePolicy> for RawCachePolicy {
    fn from(policy: CachePolicy) -> Self {
        RawCachePolicy {
            stale_time: Some(policy.stale_time),
            cache_time: Some(policy.cache_time),
        }
    }
}

impl Default for CachePolicy {
    /// Data is stale immediately and kept for five minutes once unobserved.
    fn default() -> Self {
        CachePolicy {
            stale_time: Duration::ZERO,
            cache_time: DEFAULT_CACHE_TIME,
        }
    }
}

impl CachePolicy {
    /// Creates a policy, rejecting `stale_time > cache_time`.
    pub fn new(stale_time: Duration, cache_time: Duration) -> Result<Self, PolicyError> {
        if stale_time > cache_time {
            return Err(PolicyError::StaleExceedsCache {
                stale_time,
                cache_time,
            });
        }
        Ok(CachePolicy {
            stale_time,
            cache_time,
        })
    }

    /// Creates a new builder starting from the defaults.
    pub fn builder() -> CachePolicyBuilder {
        CachePolicyBuilder::default()
    }

    /// Window after fetch during which data needs no refresh.
    pub fn stale_time(&self) -> Duration {
        self.stale_time
    }

    /// Window after fetch after which unobserved data is evicted.
    pub fn cache_time(&self) -> Duration {
        self.cache_time
    }

    /// Classifies data fetched at `fetched_at` as seen at `now`.
    pub fn freshness(&self, fetched_at: Instant, now: Instant) -> Freshness {
        let age = now.saturating_duration_since(fetched_at);
        if age < self.stale_time {
            Freshness::Fresh
        } else if age < self.cache_time {
            Freshness::Stale
        } else {
            Freshness::Expired
        }
    }

    /// Whether data fetched at `fetched_at` has outlived `cache_time`.
    pub fn is_expired(&self, fetched_at: Instant, now: Instant) -> bool {
        self.freshness(fetched_at, now) == Freshness::Expired
    }
}

/// Builder for [`CachePolicy`].
#[derive(Debug, Clone, Default)]
pub struct CachePolicyBuilder {
    stale_time: Option<Duration>,
    cache_time: Option<Duration>,
}

impl CachePolicyBuilder {
    /// Sets the stale time.
    pub fn stale_time(self, stale_time: Duration) -> Self {
        Self {
            stale_time: Some(stale_time),
            ..self
        }
    }

    /// Sets the cache time.
    pub fn cache_time(self, cache_time: Duration) -> Self {
        Self {
            cache_time: Some(cache_time),
            ..self
        }
    }

    /// Validates and builds the policy.
    pub fn build(self) -> Result<CachePolicy, PolicyError> {
        CachePolicy::new(
            self.stale_time.unwrap_or(Duration::ZERO),
            self.cache_time.unwrap_or(DEFAULT_CACHE_TIME),
        )
    }
}
