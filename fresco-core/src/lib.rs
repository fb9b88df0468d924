#![warn(missing_docs)]
//! # fresco-core
//!
//! Core types for the fresco request cache.
//!
//! This crate holds the leaf abstractions the cache is built from, with no
//! runtime dependency:
//!
//! - **Identify** resources ([`CacheKey`], [`KeyPart`])
//! - **Measure** time ([`Clock`], [`SystemClock`], [`ManualClock`])
//! - **Classify** data age ([`CachePolicy`], [`Freshness`])
//! - **Fetch** remote data ([`Producer`], [`SharedProducer`])
//! - **Report** failures ([`FetchError`], [`TransportFailure`])

pub mod clock;
pub mod error;
pub mod key;
pub mod policy;
pub mod producer;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::{FetchError, TransportFailure};
pub use key::{CacheKey, KeyPart, KeyParts};
pub use policy::{CachePolicy, CachePolicyBuilder, DEFAULT_CACHE_TIME, Freshness, PolicyError};
pub use producer::{FetchResult, Producer, SharedProducer};
#[doc(hidden)]
pub use smol_str::SmolStr;
