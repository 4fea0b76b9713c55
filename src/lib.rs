//! Query-Lifecycle: drive one asynchronous query function and publish its
//! `{data, loading, error}` state.
//!
//! # Key Features
//!
//! - **One calling convention**: any [`QueryFn`] resolves to an [`Envelope`]
//!   holding a value or an error
//! - **Lifecycle controller**: [`QueryController`] runs the query on
//!   creation, on dependency change and on [`refetch`](QueryController::refetch)
//! - **Failures as data**: envelope errors, faults and panics all land in
//!   [`FetchState::error`], and never clear previously fetched data
//! - **Ordered completions**: every invocation gets an [`InvocationId`];
//!   by default only the latest one may publish
//!
//! # Example
//!
//! ```ignore
//! use query_lifecycle::{Envelope, QueryController};
//!
//! let controller = QueryController::new(
//!     |id: u32| async move { Ok::<_, anyhow::Error>(Envelope::ok(format!("item {id}"))) },
//!     1,
//! )?;
//!
//! let state = controller.settled().await;
//! assert_eq!(state.data.as_deref().map(String::as_str), Some("item 1"));
//!
//! controller.set_args(2); // re-invokes once with the new argument
//! ```
//!
//! The [`backend`] module fixes the boundary to the remote backend service
//! and [`api`] holds the app's query functions built on it.

#![warn(missing_docs)]

pub mod api;
pub mod backend;
mod controller;
mod envelope;
mod error;
mod query;
mod state;
pub mod tracer;

pub use controller::{ControllerBuilder, OverlapPolicy, QueryController};
pub use envelope::Envelope;
pub use error::{ControllerError, ErrorKind, QueryError};
pub use query::{same_query_fn, shared, QueryFn, SharedQueryFn};
pub use state::{FetchState, FetchStatus};
pub use tracer::{
    DiscardReason, InvocationId, InvocationResult, LogTracer, NoopTracer, Tracer, Trigger,
};
