//! Background execution of producer calls.
//!
//! Every fetch started by the [`FetchCoordinator`](crate::FetchCoordinator)
//! runs as a tracked tokio task, so callers can wait for outstanding work
//! (tests, graceful shutdown) or abort it.
//!
//! # Example
//!
//! ```
//! use fresco::offload::{OffloadConfig, OffloadKey, OffloadManager};
//! use fresco::{CacheKey, FetchKind};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let manager = OffloadManager::new(OffloadConfig::default());
//! let key = OffloadKey::new(CacheKey::from_raw("institutions"), 1, FetchKind::Load);
//! manager.spawn_with_key(key, async { /* run the producer */ });
//! manager.wait_all().await;
//! assert_eq!(manager.active_task_count(), 0);
//! # }
//! ```

mod manager;
mod policy;

pub use manager::{OffloadHandle, OffloadKey, OffloadManager};
pub use policy::{OffloadConfig, OffloadConfigBuilder, TimeoutPolicy};
