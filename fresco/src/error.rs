//! Configuration errors.

use fresco_core::PolicyError;
use thiserror::Error;

/// Error loading or validating a [`CacheConfig`](crate::CacheConfig).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Policy windows are inconsistent.
    #[error("invalid cache policy: {0}")]
    InvalidPolicy(#[from] PolicyError),
    /// Sweep interval is zero.
    #[error("sweep interval must be greater than zero")]
    ZeroSweepInterval,
    /// Document could not be parsed.
    #[error("failed to parse cache configuration: {0}")]
    Parse(String),
}
