//! Fetch lifecycle state published by a controller.

use std::fmt;
use std::sync::Arc;

use crate::error::QueryError;

/// Status implied by a [`FetchState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchStatus {
    /// An invocation is in flight.
    Loading,
    /// The last settled invocation succeeded.
    Success,
    /// The last settled invocation failed.
    Failed,
}

/// Snapshot of what a controller currently publishes.
///
/// `data` is the value of the last successful invocation. A failure sets
/// `error` but leaves `data` alone, so a caller can keep rendering stale
/// data next to an error.
pub struct FetchState<V> {
    /// Value of the last successful invocation.
    pub data: Option<Arc<V>>,
    /// `true` while an invocation is in flight.
    pub loading: bool,
    /// Error of the last settled invocation, cleared by a success.
    pub error: Option<QueryError>,
}

impl<V> FetchState<V> {
    /// The state every controller starts in.
    pub fn initial() -> Self {
        Self {
            data: None,
            loading: true,
            error: None,
        }
    }

    /// Derive the three-valued status.
    pub fn status(&self) -> FetchStatus {
        if self.loading {
            FetchStatus::Loading
        } else if self.error.is_some() {
            FetchStatus::Failed
        } else {
            FetchStatus::Success
        }
    }

    /// Check if the state has settled.
    pub fn is_settled(&self) -> bool {
        !self.loading
    }
}

impl<V> Default for FetchState<V> {
    fn default() -> Self {
        Self::initial()
    }
}

impl<V> Clone for FetchState<V> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            loading: self.loading,
            error: self.error.clone(),
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for FetchState<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchState")
            .field("data", &self.data)
            .field("loading", &self.loading)
            .field("error", &self.error)
            .finish()
    }
}
