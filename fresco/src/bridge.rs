//! Live views of observed entries.
//!
//! An [`Observation`] is what a view binds to: the current [`Snapshot`] of an
//! entry plus a channel that carries every later one. Snapshots are pushed
//! from a store listener, so every write to the key reaches the observation
//! before the write returns.

use std::fmt;
use std::sync::Arc;

use fresco_core::{CacheKey, FetchError};
use tokio::sync::watch;

use crate::store::{CacheEntry, EntryStatus, Subscription};

/// Externally visible state of an entry.
pub struct Snapshot<T> {
    /// Last successfully fetched value, possibly stale.
    pub data: Option<Arc<T>>,
    /// Whether a producer call is outstanding. Also true while data that is
    /// already present is being revalidated.
    pub is_loading: bool,
    /// Last failure, reported even when older data is still present.
    pub error: Option<FetchError>,
    /// Lifecycle status of the entry.
    pub status: EntryStatus,
    pub(crate) version: u64,
}

impl<T> Snapshot<T> {
    /// Snapshot of `entry`.
    pub fn from_entry(entry: &CacheEntry<T>) -> Self {
        Snapshot {
            data: entry.data.clone(),
            is_loading: entry.in_flight.is_some(),
            error: entry.error.clone(),
            status: entry.status,
            version: entry.version,
        }
    }

    /// Whether data is present.
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// Whether present data is being refreshed in the background.
    pub fn is_revalidating(&self) -> bool {
        self.is_loading && self.data.is_some()
    }

    /// Store-wide version of the write this snapshot reflects.
    pub fn version(&self) -> u64 {
        self.version
    }
}

impl<T> Default for Snapshot<T> {
    fn default() -> Self {
        Snapshot {
            data: None,
            is_loading: false,
            error: None,
            status: EntryStatus::Empty,
            version: 0,
        }
    }
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Snapshot {
            data: self.data.clone(),
            is_loading: self.is_loading,
            error: self.error.clone(),
            status: self.status,
            version: self.version,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Snapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("data", &self.data)
            .field("is_loading", &self.is_loading)
            .field("error", &self.error)
            .field("status", &self.status)
            .field("version", &self.version)
            .finish()
    }
}

/// Publishes snapshots into a watch channel, dropping deliveries older than
/// what the channel already holds.
pub(crate) struct SnapshotPublisher<T> {
    sender: watch::Sender<Snapshot<T>>,
}

impl<T> SnapshotPublisher<T> {
    pub(crate) fn channel(initial: Snapshot<T>) -> (Arc<Self>, watch::Receiver<Snapshot<T>>) {
        let (sender, receiver) = watch::channel(initial);
        (Arc::new(SnapshotPublisher { sender }), receiver)
    }

    pub(crate) fn publish(&self, entry: &CacheEntry<T>) {
        let next = Snapshot::from_entry(entry);
        self.sender.send_if_modified(|current| {
            if next.version > current.version {
                *current = next;
                true
            } else {
                false
            }
        });
    }
}

/// Live binding of one view to one key.
///
/// Holds the key's subscription; [`unobserve`](Observation::unobserve) or
/// dropping the observation releases it exactly once.
pub struct Observation<T>
where
    T: Send + Sync + 'static,
{
    receiver: watch::Receiver<Snapshot<T>>,
    subscription: Subscription<T>,
}

impl<T> Observation<T>
where
    T: Send + Sync + 'static,
{
    pub(crate) fn new(
        receiver: watch::Receiver<Snapshot<T>>,
        subscription: Subscription<T>,
    ) -> Self {
        Observation {
            receiver,
            subscription,
        }
    }

    /// Observed key.
    pub fn key(&self) -> &CacheKey {
        self.subscription.key()
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Snapshot<T> {
        self.receiver.borrow().clone()
    }

    /// Waits for the next snapshot.
    ///
    /// Returns `None` once the observation has been torn down.
    pub async fn changed(&mut self) -> Option<Snapshot<T>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Additional receiver of the same snapshots.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot<T>> {
        self.receiver.clone()
    }

    /// Whether the observation still holds its subscription.
    pub fn is_active(&self) -> bool {
        self.subscription.is_active()
    }

    /// Releases the subscription. Returns `false` if already released.
    pub fn unobserve(&self) -> bool {
        self.subscription.unsubscribe()
    }
}

impl<T> fmt::Debug for Observation<T>
where
    T: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observation")
            .field("subscription", &self.subscription)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn entry(version: u64, data: Option<&str>, in_flight: bool) -> CacheEntry<String> {
        CacheEntry {
            key: CacheKey::from_raw("institutions"),
            data: data.map(|d| Arc::new(d.to_string())),
            status: if data.is_some() {
                EntryStatus::Stale
            } else {
                EntryStatus::Loading
            },
            fetched_at: data.map(|_| Instant::now()),
            error: None,
            in_flight: in_flight.then_some(crate::store::FetchKind::Revalidate),
            subscriber_count: 1,
            invalidated: false,
            version,
        }
    }

    #[test]
    fn test_revalidation_shows_data_while_loading() {
        let snapshot = Snapshot::from_entry(&entry(3, Some("V"), true));
        assert!(snapshot.is_loading);
        assert!(snapshot.is_revalidating());
        assert_eq!(snapshot.data.as_deref().map(String::as_str), Some("V"));
    }

    #[test]
    fn test_publisher_drops_out_of_order_deliveries() {
        let (publisher, receiver) = SnapshotPublisher::channel(Snapshot::default());

        publisher.publish(&entry(5, Some("new"), false));
        publisher.publish(&entry(4, Some("old"), true));

        let current = receiver.borrow();
        assert_eq!(current.version(), 5);
        assert_eq!(current.data.as_deref().map(String::as_str), Some("new"));
        assert!(!current.is_loading);
    }
}
