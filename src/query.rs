//! Query function contract.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::envelope::Envelope;

/// An asynchronous data-fetch operation the controller can drive.
///
/// Arguments are passed as a single value: use a tuple for several
/// positional arguments and `()` for none.
///
/// # Failure reporting
///
/// A backend-level failure must be reported once, as a populated
/// [`Envelope::error`]. Returning `Err` from [`call`](QueryFn::call) is a
/// *fault*: the call could not produce an envelope at all. The controller
/// publishes both through the same `error` field.
///
/// Side effects (a write operation, for instance) belong to the query
/// function; the controller never assumes an invocation is idempotent.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use query_lifecycle::{Envelope, QueryFn};
///
/// struct Double;
///
/// #[async_trait]
/// impl QueryFn<u32> for Double {
///     type Output = u32;
///
///     async fn call(&self, n: u32) -> anyhow::Result<Envelope<u32>> {
///         Ok(Envelope::ok(n * 2))
///     }
/// }
/// ```
///
/// Plain async closures work as well:
///
/// ```ignore
/// let query = |n: u32| async move { Ok::<_, anyhow::Error>(Envelope::ok(n * 2)) };
/// ```
#[async_trait]
pub trait QueryFn<A: Send + 'static>: Send + Sync + 'static {
    /// The value carried by a successful envelope.
    type Output: Send + Sync + 'static;

    /// Run the operation once.
    async fn call(&self, args: A) -> anyhow::Result<Envelope<Self::Output>>;
}

#[async_trait]
impl<A, V, F, Fut> QueryFn<A> for F
where
    A: Send + 'static,
    V: Send + Sync + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Envelope<V>>> + Send + 'static,
{
    type Output = V;

    async fn call(&self, args: A) -> anyhow::Result<Envelope<V>> {
        (self)(args).await
    }
}

/// A query function shared by reference.
///
/// Two `SharedQueryFn`s are the same query function exactly when they point
/// at the same allocation (see [`same_query_fn`]).
pub type SharedQueryFn<A, V> = Arc<dyn QueryFn<A, Output = V>>;

/// Wrap a query function for sharing.
pub fn shared<A, Q>(query_fn: Q) -> SharedQueryFn<A, Q::Output>
where
    A: Send + 'static,
    Q: QueryFn<A>,
{
    Arc::new(query_fn)
}

/// Identity comparison of two shared query functions.
pub fn same_query_fn<A: Send + 'static, V>(a: &SharedQueryFn<A, V>, b: &SharedQueryFn<A, V>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
