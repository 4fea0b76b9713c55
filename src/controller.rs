//! Fetch lifecycle controller and its builder.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinError;

use crate::error::{ControllerError, QueryError};
use crate::query::{same_query_fn, QueryFn, SharedQueryFn};
use crate::state::{FetchState, FetchStatus};
use crate::tracer::{DiscardReason, InvocationId, InvocationResult, NoopTracer, Tracer, Trigger};

/// How completions of overlapping invocations are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OverlapPolicy {
    /// Only the most recently issued invocation may publish. Older
    /// completions are discarded and `loading` stays `true` until the
    /// latest invocation settles.
    #[default]
    LatestWins,
    /// Every completion publishes; whichever settles last wins, even if it
    /// was issued first.
    LastWriteWins,
}

/// Drives one query function and publishes `{data, loading, error}`.
///
/// The controller schedules an invocation as soon as it is created, again
/// whenever the query function or its arguments change identity, and on
/// every [`refetch`](Self::refetch). Failures never escape as errors: they
/// are published in [`FetchState::error`].
///
/// This is cheap to clone - every clone drives the same state.
///
/// # Example
///
/// ```ignore
/// let controller = QueryController::new(FetchCategories::new(client), ())?;
///
/// let state = controller.settled().await;
/// if let Some(error) = &state.error {
///     render_error_banner(error);
/// }
/// if let Some(categories) = &state.data {
///     render_list(categories);
/// }
///
/// controller.refetch();
/// ```
pub struct QueryController<A, V> {
    inner: Arc<Inner<A, V>>,
}

impl<A, V> Clone for QueryController<A, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<A, V> {
    name: String,
    policy: OverlapPolicy,
    tracer: Arc<dyn Tracer>,
    runtime: Handle,
    query_fn: RwLock<SharedQueryFn<A, V>>,
    args: RwLock<A>,
    /// Id of the most recently issued invocation; 0 before the first.
    latest: AtomicU64,
    state: watch::Sender<FetchState<V>>,
}

impl<A, V> QueryController<A, V>
where
    A: Clone + PartialEq + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Create a controller with default options and schedule its first
    /// invocation.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<Q>(query_fn: Q, args: A) -> Result<Self, ControllerError>
    where
        Q: QueryFn<A, Output = V>,
    {
        ControllerBuilder::new().build(query_fn, args)
    }

    /// Snapshot of the published state.
    pub fn state(&self) -> FetchState<V> {
        self.inner.state.borrow().clone()
    }

    /// Value of the last successful invocation.
    pub fn data(&self) -> Option<Arc<V>> {
        self.inner.state.borrow().data.clone()
    }

    /// `true` while an invocation is in flight.
    pub fn loading(&self) -> bool {
        self.inner.state.borrow().loading
    }

    /// Error of the last settled invocation.
    pub fn error(&self) -> Option<QueryError> {
        self.inner.state.borrow().error.clone()
    }

    /// Status implied by the published state.
    pub fn status(&self) -> FetchStatus {
        self.inner.state.borrow().status()
    }

    /// The name used in logs and tracer events.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The currently held arguments.
    pub fn args(&self) -> A {
        self.inner.args.read().clone()
    }

    /// The currently held query function.
    pub fn query_fn(&self) -> SharedQueryFn<A, V> {
        self.inner.query_fn.read().clone()
    }

    /// Subscribe to state changes.
    ///
    /// The receiver sees the current state immediately and is notified on
    /// every published change.
    pub fn subscribe(&self) -> watch::Receiver<FetchState<V>> {
        self.inner.state.subscribe()
    }

    /// Wait until no invocation is in flight and return that state.
    pub async fn settled(&self) -> FetchState<V> {
        let mut rx = self.inner.state.subscribe();
        // The sender lives in `inner`, which `self` keeps alive.
        let state = match rx.wait_for(|state| state.is_settled()).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        };
        state
    }

    /// Re-run the query function with the currently held arguments.
    ///
    /// Callable at any time, including while an earlier invocation is
    /// still in flight; see [`OverlapPolicy`] for how the two resolve.
    pub fn refetch(&self) -> InvocationId {
        Inner::invoke(&self.inner, Trigger::Refetch)
    }

    /// Replace the arguments. Re-invokes once if they differ from the
    /// current ones, and returns the id of that invocation.
    pub fn set_args(&self, args: A) -> Option<InvocationId> {
        if !self.inner.swap_args(args) {
            return None;
        }
        Some(Inner::invoke(&self.inner, Trigger::ArgsChanged))
    }

    /// Replace the query function. Re-invokes once if it is a different
    /// function (by identity), and returns the id of that invocation.
    pub fn set_query_fn(&self, query_fn: SharedQueryFn<A, V>) -> Option<InvocationId> {
        if !self.inner.swap_query_fn(query_fn) {
            return None;
        }
        Some(Inner::invoke(&self.inner, Trigger::QueryFnChanged))
    }

    /// Replace both dependencies at once. Re-invokes at most once.
    ///
    /// Both are swapped under one guard, so a concurrent invocation sees
    /// either the old pair or the new pair.
    pub fn set_deps(&self, query_fn: SharedQueryFn<A, V>, args: A) -> Option<InvocationId> {
        let (fn_changed, args_changed) = self.inner.swap_deps(query_fn, args);
        match (fn_changed, args_changed) {
            (true, _) => Some(Inner::invoke(&self.inner, Trigger::QueryFnChanged)),
            (false, true) => Some(Inner::invoke(&self.inner, Trigger::ArgsChanged)),
            (false, false) => None,
        }
    }
}

impl<A, V> Inner<A, V>
where
    A: Clone + PartialEq + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn swap_args(&self, args: A) -> bool {
        let mut current = self.args.write();
        if *current == args {
            return false;
        }
        *current = args;
        true
    }

    fn swap_query_fn(&self, query_fn: SharedQueryFn<A, V>) -> bool {
        let mut current = self.query_fn.write();
        if same_query_fn(&current, &query_fn) {
            return false;
        }
        *current = query_fn;
        true
    }

    /// Lock order is `query_fn` then `args`, as in `current_deps`.
    fn swap_deps(&self, query_fn: SharedQueryFn<A, V>, args: A) -> (bool, bool) {
        let mut current_fn = self.query_fn.write();
        let mut current_args = self.args.write();
        let fn_changed = !same_query_fn(&current_fn, &query_fn);
        if fn_changed {
            *current_fn = query_fn;
        }
        let args_changed = *current_args != args;
        if args_changed {
            *current_args = args;
        }
        (fn_changed, args_changed)
    }

    fn current_deps(&self) -> (SharedQueryFn<A, V>, A) {
        let query_fn = self.query_fn.read();
        let args = self.args.read();
        (query_fn.clone(), args.clone())
    }

    /// Issue one invocation cycle.
    ///
    /// `loading` is raised before anything is spawned, so an observer that
    /// waits for settlement right after this returns never sees a stale
    /// "settled" state.
    fn invoke(this: &Arc<Self>, trigger: Trigger) -> InvocationId {
        let id = InvocationId(this.latest.fetch_add(1, Ordering::SeqCst) + 1);
        this.state.send_if_modified(|state| {
            let changed = !state.loading;
            state.loading = true;
            changed
        });

        let (query_fn, args) = this.current_deps();
        this.tracer.on_invocation_start(&this.name, id, trigger);
        tracing::debug!(controller = %this.name, invocation = id.0, ?trigger, "invoking query function");

        let call = this.runtime.spawn(async move { query_fn.call(args).await });
        let weak = Arc::downgrade(this);
        let name = this.name.clone();
        let tracer = this.tracer.clone();
        this.runtime.spawn(async move {
            let outcome = match call.await {
                Ok(Ok(envelope)) => envelope.into_result().map_err(QueryError::envelope),
                Ok(Err(fault)) => Err(QueryError::fault(fault)),
                Err(join_error) => Err(panicked(&name, join_error)),
            };
            settle(weak, &name, tracer.as_ref(), id, outcome);
        });

        id
    }

    /// Publish a completed invocation, unless the overlap policy says it is
    /// stale.
    fn publish(&self, id: InvocationId, outcome: Result<Option<V>, QueryError>) {
        let result = match &outcome {
            Ok(_) => InvocationResult::Success,
            Err(QueryError::Envelope(e)) => InvocationResult::EnvelopeError {
                message: e.to_string(),
            },
            Err(other) => InvocationResult::Fault {
                message: other.to_string(),
            },
        };

        let mut superseded_by = None;
        self.state.send_if_modified(|state| {
            if self.policy == OverlapPolicy::LatestWins {
                let latest = InvocationId(self.latest.load(Ordering::SeqCst));
                if latest != id {
                    superseded_by = Some(latest);
                    return false;
                }
            }
            state.loading = false;
            match outcome {
                Ok(value) => {
                    state.data = value.map(Arc::new);
                    state.error = None;
                }
                Err(error) => state.error = Some(error),
            }
            true
        });

        match superseded_by {
            Some(latest) => {
                tracing::debug!(
                    controller = %self.name,
                    invocation = id.0,
                    latest = latest.0,
                    "discarding superseded completion"
                );
                self.tracer
                    .on_invocation_discarded(&self.name, id, DiscardReason::Superseded { latest });
            }
            None => {
                tracing::debug!(controller = %self.name, invocation = id.0, ?result, "invocation settled");
                self.tracer.on_invocation_end(&self.name, id, result);
            }
        }
    }
}

fn settle<A, V>(
    weak: Weak<Inner<A, V>>,
    name: &str,
    tracer: &dyn Tracer,
    id: InvocationId,
    outcome: Result<Option<V>, QueryError>,
) where
    A: Clone + PartialEq + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    match weak.upgrade() {
        Some(inner) => inner.publish(id, outcome),
        None => {
            tracing::debug!(controller = %name, invocation = id.0, "controller released before completion");
            tracer.on_invocation_discarded(name, id, DiscardReason::Released);
        }
    }
}

fn panicked(name: &str, join_error: JoinError) -> QueryError {
    let message = if join_error.is_panic() {
        panic_message(join_error.into_panic())
    } else {
        join_error.to_string()
    };
    tracing::warn!(controller = %name, %message, "query function panicked");
    QueryError::Panicked { message }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => message.to_string(),
            Err(_) => "non-string panic payload".to_string(),
        },
    }
}

/// Builder for [`QueryController`] with custom options.
///
/// # Example
///
/// ```ignore
/// let controller = ControllerBuilder::new()
///     .name("goals")
///     .overlap_policy(OverlapPolicy::LastWriteWins)
///     .tracer(LogTracer)
///     .build(FetchGoals::new(client), GoalPage::first(20))?;
/// ```
pub struct ControllerBuilder {
    name: Option<String>,
    policy: OverlapPolicy,
    tracer: Arc<dyn Tracer>,
    runtime: Option<Handle>,
}

impl Default for ControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerBuilder {
    /// Create a builder with default options.
    pub fn new() -> Self {
        Self {
            name: None,
            policy: OverlapPolicy::default(),
            tracer: Arc::new(NoopTracer),
            runtime: None,
        }
    }

    /// Name used in logs and tracer events. Defaults to the output type name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// How overlapping invocations resolve. Defaults to
    /// [`OverlapPolicy::LatestWins`].
    pub fn overlap_policy(mut self, policy: OverlapPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Observe invocations with `tracer`.
    pub fn tracer(self, tracer: impl Tracer) -> Self {
        self.shared_tracer(Arc::new(tracer))
    }

    /// Observe invocations with an already shared tracer.
    pub fn shared_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = tracer;
        self
    }

    /// Spawn invocations on `runtime` instead of the ambient one.
    ///
    /// This lets a controller be created outside of an async context.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Build the controller and schedule its first invocation.
    pub fn build<A, Q>(self, query_fn: Q, args: A) -> Result<QueryController<A, Q::Output>, ControllerError>
    where
        A: Clone + PartialEq + Send + Sync + 'static,
        Q: QueryFn<A>,
    {
        self.build_shared(Arc::new(query_fn), args)
    }

    /// Like [`build`](Self::build), for a query function that is already
    /// shared. Its identity is what [`QueryController::set_query_fn`]
    /// compares against.
    pub fn build_shared<A, V>(
        self,
        query_fn: SharedQueryFn<A, V>,
        args: A,
    ) -> Result<QueryController<A, V>, ControllerError>
    where
        A: Clone + PartialEq + Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| ControllerError::NoRuntime)?,
        };
        let name = self
            .name
            .unwrap_or_else(|| std::any::type_name::<V>().to_string());
        let (state, _) = watch::channel(FetchState::initial());

        let inner = Arc::new(Inner {
            name,
            policy: self.policy,
            tracer: self.tracer,
            runtime,
            query_fn: RwLock::new(query_fn),
            args: RwLock::new(args),
            latest: AtomicU64::new(0),
            state,
        });
        Inner::invoke(&inner, Trigger::Initial);

        Ok(QueryController { inner })
    }
}
