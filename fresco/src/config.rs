//! Cache configuration.
//!
//! Durations use humantime notation (`"100ms"`, `"30s"`, `"5m"`):
//!
//! ```yaml
//! policy:
//!   stale_time: 30s
//!   cache_time: 5m
//! sweep_interval: 1m
//! fetch_timeout: 10s
//! offload:
//!   timeout_policy:
//!     warn: 2s
//! suggestions:
//!   limit: 8
//! ```

use std::time::Duration;

use fresco_core::CachePolicy;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::offload::{OffloadConfig, TimeoutPolicy};
use crate::suggest::SuggestionLimit;

/// Default period of the background sweeper.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Settings of the suggestion engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionConfig {
    /// Maximum number of suggestions returned.
    pub limit: SuggestionLimit,
}

/// Configuration of a [`Cache`](crate::Cache).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Policy for entries that are written directly rather than observed.
    pub policy: CachePolicy,
    /// Period of the background sweeper.
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
    /// Deadline for one producer call. `None` lets calls run indefinitely.
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Option<Duration>,
    /// Background task execution.
    pub offload: OffloadConfig,
    /// Suggestion engine settings.
    pub suggestions: SuggestionConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            policy: CachePolicy::default(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            fetch_timeout: None,
            offload: OffloadConfig::default(),
            suggestions: SuggestionConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Creates a new builder for CacheConfig.
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Parses and validates a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: CacheConfig =
            serde_saphyr::from_str(yaml).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values serde cannot reject on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::ZeroSweepInterval);
        }
        Ok(())
    }
}

/// Builder for CacheConfig.
#[derive(Debug, Clone, Default)]
pub struct CacheConfigBuilder {
    stale_time: Option<Duration>,
    cache_time: Option<Duration>,
    sweep_interval: Option<Duration>,
    fetch_timeout: Option<Duration>,
    timeout_policy: TimeoutPolicy,
    suggestion_limit: SuggestionLimit,
}

impl CacheConfigBuilder {
    /// Sets the default stale time.
    pub fn stale_time(self, stale_time: Duration) -> Self {
        Self {
            stale_time: Some(stale_time),
            ..self
        }
    }

    /// Sets the default cache time.
    pub fn cache_time(self, cache_time: Duration) -> Self {
        Self {
            cache_time: Some(cache_time),
            ..self
        }
    }

    /// Sets the sweeper period.
    pub fn sweep_interval(self, sweep_interval: Duration) -> Self {
        Self {
            sweep_interval: Some(sweep_interval),
            ..self
        }
    }

    /// Sets the producer call deadline.
    pub fn fetch_timeout(self, fetch_timeout: Duration) -> Self {
        Self {
            fetch_timeout: Some(fetch_timeout),
            ..self
        }
    }

    /// Sets the offload timeout policy.
    pub fn timeout_policy(self, timeout_policy: TimeoutPolicy) -> Self {
        Self {
            timeout_policy,
            ..self
        }
    }

    /// Sets the suggestion limit.
    pub fn suggestion_limit(self, suggestion_limit: SuggestionLimit) -> Self {
        Self {
            suggestion_limit,
            ..self
        }
    }

    /// Builds and validates the CacheConfig.
    pub fn build(self) -> Result<CacheConfig, ConfigError> {
        let mut policy = CachePolicy::builder();
        if let Some(stale_time) = self.stale_time {
            policy = policy.stale_time(stale_time);
        }
        if let Some(cache_time) = self.cache_time {
            policy = policy.cache_time(cache_time);
        }

        let config = CacheConfig {
            policy: policy.build()?,
            sweep_interval: self.sweep_interval.unwrap_or(DEFAULT_SWEEP_INTERVAL),
            fetch_timeout: self.fetch_timeout,
            offload: OffloadConfig::builder()
                .timeout_policy(self.timeout_policy)
                .build(),
            suggestions: SuggestionConfig {
                limit: self.suggestion_limit,
            },
        };
        config.validate()?;
        Ok(config)
    }
}
