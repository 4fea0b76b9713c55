//! Tracer trait for observing controller invocations.
//!
//! This module defines the [`Tracer`] trait and related types. The default
//! [`NoopTracer`] discards everything; [`LogTracer`] forwards events to the
//! `tracing` crate.
//!
//! # Example
//!
//! ```ignore
//! use query_lifecycle::{ControllerBuilder, Tracer, InvocationId, Trigger};
//!
//! struct PrintTracer;
//!
//! impl Tracer for PrintTracer {
//!     fn on_invocation_start(&self, controller: &str, id: InvocationId, trigger: Trigger) {
//!         println!("{controller}: invocation {} started ({trigger:?})", id.0);
//!     }
//! }
//!
//! let controller = ControllerBuilder::new()
//!     .tracer(PrintTracer)
//!     .build(query_fn, ())?;
//! ```

use serde::{Deserialize, Serialize};

/// Identifier of one invocation of a controller's query function.
///
/// Ids increase monotonically per controller, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InvocationId(pub u64);

/// What caused an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Trigger {
    /// The controller was just created.
    Initial,
    /// `refetch()` was called.
    Refetch,
    /// The arguments changed.
    ArgsChanged,
    /// The query function changed.
    QueryFnChanged,
}

/// How an invocation settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationResult {
    /// The envelope carried no error.
    Success,
    /// The envelope carried an error.
    EnvelopeError { message: String },
    /// The call returned `Err` or panicked.
    Fault { message: String },
}

/// Why a completed invocation was not published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// A newer invocation had been issued.
    Superseded {
        /// The newest invocation at the time of completion.
        latest: InvocationId,
    },
    /// Every controller handle had been dropped.
    Released,
}

/// Tracer trait for observing controller invocations.
///
/// All methods have default empty implementations, so you only need to
/// override the events you're interested in.
///
/// The tracer may be called from whichever runtime thread settles an
/// invocation, hence the `Send + Sync` bound.
pub trait Tracer: Send + Sync + 'static {
    /// Called when an invocation is issued, before the query function runs.
    #[inline]
    fn on_invocation_start(&self, _controller: &str, _id: InvocationId, _trigger: Trigger) {}

    /// Called when an invocation's result is published.
    #[inline]
    fn on_invocation_end(&self, _controller: &str, _id: InvocationId, _result: InvocationResult) {}

    /// Called when an invocation completes but its result is dropped.
    #[inline]
    fn on_invocation_discarded(&self, _controller: &str, _id: InvocationId, _reason: DiscardReason) {
    }
}

/// Tracer that discards all events.
///
/// This is the default tracer for [`QueryController`](crate::QueryController).
pub struct NoopTracer;

impl Tracer for NoopTracer {}

/// Tracer that forwards every event to `tracing` at debug level.
pub struct LogTracer;

impl Tracer for LogTracer {
    fn on_invocation_start(&self, controller: &str, id: InvocationId, trigger: Trigger) {
        tracing::debug!(controller, invocation = id.0, ?trigger, "invocation started");
    }

    fn on_invocation_end(&self, controller: &str, id: InvocationId, result: InvocationResult) {
        match result {
            InvocationResult::Success => {
                tracing::debug!(controller, invocation = id.0, "invocation succeeded");
            }
            InvocationResult::EnvelopeError { message } => {
                tracing::debug!(controller, invocation = id.0, %message, "invocation failed");
            }
            InvocationResult::Fault { message } => {
                tracing::debug!(controller, invocation = id.0, %message, "invocation faulted");
            }
        }
    }

    fn on_invocation_discarded(&self, controller: &str, id: InvocationId, reason: DiscardReason) {
        tracing::debug!(controller, invocation = id.0, ?reason, "invocation discarded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingTracer {
        start_count: AtomicUsize,
        end_count: AtomicUsize,
    }

    impl CountingTracer {
        fn new() -> Self {
            Self {
                start_count: AtomicUsize::new(0),
                end_count: AtomicUsize::new(0),
            }
        }
    }

    impl Tracer for CountingTracer {
        fn on_invocation_start(&self, _controller: &str, _id: InvocationId, _trigger: Trigger) {
            self.start_count.fetch_add(1, Ordering::Relaxed);
        }

        fn on_invocation_end(&self, _controller: &str, _id: InvocationId, _result: InvocationResult) {
            self.end_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_counting_tracer() {
        let tracer = CountingTracer::new();

        tracer.on_invocation_start("goals", InvocationId(1), Trigger::Initial);
        tracer.on_invocation_start("goals", InvocationId(2), Trigger::Refetch);
        tracer.on_invocation_end("goals", InvocationId(1), InvocationResult::Success);
        tracer.on_invocation_discarded(
            "goals",
            InvocationId(1),
            DiscardReason::Superseded {
                latest: InvocationId(2),
            },
        );

        assert_eq!(tracer.start_count.load(Ordering::Relaxed), 2);
        assert_eq!(tracer.end_count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_invocation_ids_are_ordered() {
        assert!(InvocationId(1) < InvocationId(2));
    }

    #[test]
    fn test_tracer_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoopTracer>();
        assert_send_sync::<LogTracer>();
        assert_send_sync::<Arc<CountingTracer>>();
    }
}
