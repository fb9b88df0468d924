//! OffloadManager implementation for background task execution.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use fresco_core::CacheKey;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info_span, warn};

use super::policy::{OffloadConfig, TimeoutPolicy};
use crate::metrics;
use crate::store::FetchKind;

/// Key of one offloaded producer call.
///
/// `request` is the id the store assigned to the in-flight request, so two
/// fetches of the same cache key never share a slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OffloadKey {
    /// Key being fetched.
    pub key: CacheKey,
    /// Request id assigned by the store.
    pub request: u64,
    /// Why the fetch was started.
    pub kind: FetchKind,
}

impl OffloadKey {
    /// Creates the key of request `request` for `key`.
    pub fn new(key: CacheKey, request: u64, kind: FetchKind) -> Self {
        OffloadKey { key, request, kind }
    }
}

/// Handle to a spawned offload task.
#[derive(Debug)]
pub struct OffloadHandle {
    handle: JoinHandle<()>,
}

impl OffloadHandle {
    /// Check if the task is finished.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Abort the task.
    pub fn abort(&self) {
        self.handle.abort();
    }
}

#[derive(Debug)]
struct OffloadManagerInner {
    config: OffloadConfig,
    tasks: DashMap<OffloadKey, OffloadHandle>,
}

/// Manager for offloading producer calls to background execution.
///
/// Clones share the same task table.
#[derive(Clone, Debug)]
pub struct OffloadManager {
    inner: Arc<OffloadManagerInner>,
}

impl OffloadManager {
    /// Create a new OffloadManager with the given configuration.
    pub fn new(config: OffloadConfig) -> Self {
        Self {
            inner: Arc::new(OffloadManagerInner {
                config,
                tasks: DashMap::new(),
            }),
        }
    }

    /// Create a new OffloadManager with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(OffloadConfig::default())
    }

    /// Configuration this manager was built with.
    pub fn config(&self) -> &OffloadConfig {
        &self.inner.config
    }

    /// Spawn a task under `key`.
    ///
    /// A task already tracked under the same key is replaced in the table but
    /// keeps running.
    pub fn spawn_with_key<F>(&self, key: OffloadKey, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        debug!(key = %key.key, request = key.request, "offloading task");
        metrics::record_offload_spawned(key.kind);
        let handle = self.spawn_inner(task, key.clone());
        self.inner.tasks.insert(key, handle);
    }

    /// Get the number of currently active tasks.
    pub fn active_task_count(&self) -> usize {
        self.inner.tasks.iter().filter(|e| !e.is_finished()).count()
    }

    /// Clean up finished task handles.
    pub fn cleanup_finished(&self) {
        self.inner.tasks.retain(|_, handle| !handle.is_finished());
    }

    /// Abort all running tasks.
    ///
    /// Aborted fetches resolve their waiters with a network error.
    pub fn cancel_all(&self) {
        for entry in self.inner.tasks.iter() {
            entry.abort();
        }
    }

    /// Check if a task with the given key is in flight.
    pub fn is_in_flight(&self, key: &OffloadKey) -> bool {
        self.inner.tasks.get(key).is_some_and(|h| !h.is_finished())
    }

    /// Wait for all currently tracked tasks to complete.
    ///
    /// Tasks spawned by the awaited tasks are waited for too.
    pub async fn wait_all(&self) {
        loop {
            self.cleanup_finished();
            if self.inner.tasks.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
    }

    /// Wait for all tasks with a timeout.
    ///
    /// Returns `true` if all tasks completed within the timeout,
    /// `false` if the timeout was reached.
    pub async fn wait_all_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait_all()).await.is_ok()
    }

    fn spawn_inner<F>(&self, task: F, key: OffloadKey) -> OffloadHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let timeout_policy = self.inner.config.timeout_policy;
        let span = info_span!(
            "fresco.offload",
            kind = key.kind.as_str(),
            key = %key.key,
            request = key.request,
        );
        let mut guard = TaskGuard {
            inner: Arc::clone(&self.inner),
            key,
            start: Instant::now(),
            completed: false,
        };

        let handle = tokio::spawn(
            async move {
                task.await;
                if let TimeoutPolicy::Warn(threshold) = timeout_policy {
                    let elapsed = guard.start.elapsed();
                    if elapsed > threshold {
                        warn!(
                            elapsed_ms = elapsed.as_millis(),
                            threshold_ms = threshold.as_millis(),
                            "offload task exceeded timeout threshold"
                        );
                    }
                }
                guard.completed = true;
            }
            .instrument(span),
        );

        OffloadHandle { handle }
    }
}

impl Default for OffloadManager {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Untracks a task once its future is gone, finished or aborted.
struct TaskGuard {
    inner: Arc<OffloadManagerInner>,
    key: OffloadKey,
    start: Instant,
    completed: bool,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.inner.tasks.remove(&self.key);
        if !self.completed {
            debug!(key = %self.key.key, request = self.key.request, "offload task aborted");
        }
        metrics::record_offload_finished(self.key.kind, self.start.elapsed(), self.completed);
    }
}
