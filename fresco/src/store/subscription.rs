use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use fresco_core::CacheKey;

use super::CacheStore;

/// Registration of one listener on one key.
///
/// [`unsubscribe`](Subscription::unsubscribe) removes the listener and
/// decrements the subscriber count exactly once; later calls and the
/// implicit call on drop are no-ops.
pub struct Subscription<T>
where
    T: Send + Sync + 'static,
{
    key: CacheKey,
    id: u64,
    store: CacheStore<T>,
    active: AtomicBool,
}

impl<T> Subscription<T>
where
    T: Send + Sync + 'static,
{
    pub(crate) fn new(key: CacheKey, id: u64, store: CacheStore<T>) -> Self {
        Subscription {
            key,
            id,
            store,
            active: AtomicBool::new(true),
        }
    }

    /// Key this subscription listens on.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Whether the listener is still registered.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Removes the listener. Returns `false` if it was already removed.
    pub fn unsubscribe(&self) -> bool {
        if self.active.swap(false, Ordering::AcqRel) {
            self.store.remove_listener(&self.key, self.id);
            true
        } else {
            false
        }
    }
}

impl<T> Drop for Subscription<T>
where
    T: Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl<T> fmt::Debug for Subscription<T>
where
    T: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
