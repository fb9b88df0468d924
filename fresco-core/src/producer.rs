use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::FetchError;

/// Outcome of one producer call.
pub type FetchResult<T> = Result<T, FetchError>;

/// Caller-supplied function performing the actual remote call for a key.
/// This trait is transport-agnostic; any closure returning a future of
/// `Result<T, FetchError>` is a producer.
///
/// # Examples
///
/// ```rust
/// use fresco_core::{FetchError, Producer};
///
/// let producer = || async { Ok::<_, FetchError>(vec!["Data Science".to_string()]) };
/// let _future = producer.produce();
/// ```
pub trait Producer<T>: Send + Sync + 'static {
    /// The future that resolves to the fetched value
    type Future: Future<Output = FetchResult<T>> + Send + 'static;

    /// Start one remote call
    fn produce(&self) -> Self::Future;

    /// Erase the producer type so it can be stored next to a cache entry
    fn into_shared(self) -> SharedProducer<T>
    where
        Self: Sized,
        T: 'static,
    {
        SharedProducer::new(self)
    }
}

impl<T, F, Fut> Producer<T> for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FetchResult<T>> + Send + 'static,
{
    type Future = Fut;

    fn produce(&self) -> Self::Future {
        self()
    }
}

type ErasedProducer<T> = dyn Fn() -> BoxFuture<'static, FetchResult<T>> + Send + Sync;

/// Type-erased, cheaply clonable producer.
pub struct SharedProducer<T> {
    inner: Arc<ErasedProducer<T>>,
}

impl<T> SharedProducer<T> {
    /// Wraps any producer.
    pub fn new<P>(producer: P) -> Self
    where
        P: Producer<T>,
        T: 'static,
    {
        SharedProducer {
            inner: Arc::new(move || -> BoxFuture<'static, FetchResult<T>> {
                Box::pin(producer.produce())
            }),
        }
    }

    /// Starts one remote call.
    pub fn call(&self) -> BoxFuture<'static, FetchResult<T>> {
        (self.inner)()
    }
}

impl<T> Producer<T> for SharedProducer<T>
where
    T: 'static,
{
    type Future = BoxFuture<'static, FetchResult<T>>;

    fn produce(&self) -> Self::Future {
        self.call()
    }

    fn into_shared(self) -> SharedProducer<T> {
        self
    }
}

impl<T> Clone for SharedProducer<T> {
    fn clone(&self) -> Self {
        SharedProducer {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for SharedProducer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedProducer")
    }
}
