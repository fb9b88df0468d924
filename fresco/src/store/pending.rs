//! In-flight request bookkeeping.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use fresco_core::{FetchError, FetchResult};
use tokio::sync::watch;

/// Why a fetch was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchKind {
    /// First load: the entry has no data yet.
    Load,
    /// Background refresh of data that is already being served.
    Revalidate,
}

impl FetchKind {
    /// Label used in spans and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchKind::Load => "load",
            FetchKind::Revalidate => "revalidate",
        }
    }
}

type Outcome<T> = Option<FetchResult<Arc<T>>>;

/// Handle of the single outstanding producer call for a key.
///
/// The result is broadcast once to every [`Waiter`] created from it.
pub(crate) struct PendingRequest<T> {
    pub(crate) id: u64,
    pub(crate) kind: FetchKind,
    pub(crate) started_at: Instant,
    /// Set when the entry was invalidated after this request started, so its
    /// result must not be considered up to date.
    pub(crate) superseded: bool,
    result: watch::Sender<Outcome<T>>,
}

impl<T> PendingRequest<T> {
    pub(crate) fn new(id: u64, kind: FetchKind, started_at: Instant) -> Self {
        let (result, _) = watch::channel(None);
        PendingRequest {
            id,
            kind,
            started_at,
            superseded: false,
            result,
        }
    }

    pub(crate) fn waiter(&self) -> Waiter<T> {
        Waiter {
            receiver: self.result.subscribe(),
        }
    }

    /// Number of callers currently awaiting the result.
    pub(crate) fn waiter_count(&self) -> usize {
        self.result.receiver_count()
    }

    pub(crate) fn resolve(self, outcome: FetchResult<Arc<T>>) {
        self.result.send_replace(Some(outcome));
    }
}

impl<T> fmt::Debug for PendingRequest<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("superseded", &self.superseded)
            .field("waiters", &self.waiter_count())
            .finish()
    }
}

/// Receives the outcome of an in-flight request.
pub struct Waiter<T> {
    receiver: watch::Receiver<Outcome<T>>,
}

impl<T> Waiter<T> {
    /// Waits until the request this waiter joined completes.
    pub async fn wait(mut self) -> FetchResult<Arc<T>> {
        self.receiver
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|outcome| (*outcome).clone())
            .unwrap_or_else(|| Err(FetchError::network("fetch ended without a result")))
    }
}

impl<T> fmt::Debug for Waiter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Waiter")
    }
}
