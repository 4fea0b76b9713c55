//! Error types for query invocation and controller construction.

use std::sync::Arc;

/// The error published by a [`QueryController`](crate::QueryController).
///
/// Both failure kinds of an invocation end up here: a query function that
/// completed with a populated envelope error, and a query function whose
/// call itself faulted. Observers that only render state can treat every
/// variant the same way; [`QueryError::kind`] is there for those who care.
///
/// The inner errors are kept behind `Arc` so the published state stays
/// cheap to clone.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QueryError {
    /// The query function completed and reported a failure in its envelope.
    #[error("{0}")]
    Envelope(Arc<anyhow::Error>),

    /// The query function call returned `Err` instead of an envelope.
    #[error("query function faulted: {0}")]
    Fault(Arc<anyhow::Error>),

    /// The query function panicked while being polled.
    #[error("query function panicked: {message}")]
    Panicked {
        /// Panic payload, when it was a string.
        message: String,
    },
}

/// Coarse classification of a [`QueryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`QueryError::Envelope`].
    Envelope,
    /// See [`QueryError::Fault`] and [`QueryError::Panicked`].
    Fault,
}

impl QueryError {
    /// Wrap an error reported through an envelope.
    pub fn envelope(err: impl Into<anyhow::Error>) -> Self {
        QueryError::Envelope(Arc::new(err.into()))
    }

    /// Wrap an error returned by a faulting call.
    pub fn fault(err: impl Into<anyhow::Error>) -> Self {
        QueryError::Fault(Arc::new(err.into()))
    }

    /// Which failure path produced this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::Envelope(_) => ErrorKind::Envelope,
            QueryError::Fault(_) | QueryError::Panicked { .. } => ErrorKind::Fault,
        }
    }

    /// Returns the wrapped `anyhow::Error`, if there is one.
    pub fn source_error(&self) -> Option<&Arc<anyhow::Error>> {
        match self {
            QueryError::Envelope(e) | QueryError::Fault(e) => Some(e),
            QueryError::Panicked { .. } => None,
        }
    }

    /// Attempts to downcast the wrapped error to a specific type.
    pub fn downcast_ref<E: std::error::Error + Send + Sync + 'static>(&self) -> Option<&E> {
        self.source_error().and_then(|e| e.downcast_ref::<E>())
    }

    /// Returns `true` if the wrapped error is of type `E`.
    pub fn is<E: std::error::Error + Send + Sync + 'static>(&self) -> bool {
        self.downcast_ref::<E>().is_some()
    }
}

/// Errors raised while constructing a controller.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// No tokio runtime was given and none is running on this thread.
    #[error("no tokio runtime available to schedule query invocations")]
    NoRuntime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Rejected(u16);

    impl std::fmt::Display for Rejected {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "rejected with {}", self.0)
        }
    }

    impl std::error::Error for Rejected {}

    #[test]
    fn test_envelope_error_display_is_transparent() {
        let err = QueryError::envelope(anyhow::anyhow!("row level security"));
        assert_eq!(err.to_string(), "row level security");
        assert_eq!(err.kind(), ErrorKind::Envelope);
    }

    #[test]
    fn test_fault_and_panic_share_kind() {
        let fault = QueryError::fault(anyhow::anyhow!("connection reset"));
        let panicked = QueryError::Panicked {
            message: "boom".to_string(),
        };
        assert_eq!(fault.kind(), ErrorKind::Fault);
        assert_eq!(panicked.kind(), ErrorKind::Fault);
        assert!(fault.to_string().contains("connection reset"));
        assert!(panicked.source_error().is_none());
    }

    #[test]
    fn test_downcast() {
        let err = QueryError::envelope(Rejected(403));
        assert!(err.is::<Rejected>());
        assert_eq!(err.downcast_ref::<Rejected>(), Some(&Rejected(403)));
        assert!(!err.is::<std::io::Error>());
    }
}
