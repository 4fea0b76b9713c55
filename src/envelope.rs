//! Result envelope returned by every query function invocation.

use std::fmt;

/// The `{ value, error }` pair produced by one query function invocation.
///
/// An envelope with a present `error` is a failed invocation, whatever
/// `value` holds. An envelope with neither field set is a successful
/// invocation that produced no value.
///
/// # Example
///
/// ```
/// use query_lifecycle::Envelope;
///
/// let ok: Envelope<u32> = Envelope::ok(7);
/// assert_eq!(ok.into_result().unwrap(), Some(7));
///
/// let failed: Envelope<u32> = Envelope::err(anyhow::anyhow!("rejected"));
/// assert!(failed.into_result().is_err());
/// ```
pub struct Envelope<V> {
    /// The produced value, if any.
    pub value: Option<V>,
    /// The reported failure, if any.
    pub error: Option<anyhow::Error>,
}

impl<V> Envelope<V> {
    /// A successful envelope carrying `value`.
    pub fn ok(value: V) -> Self {
        Self {
            value: Some(value),
            error: None,
        }
    }

    /// A failed envelope carrying `error`.
    pub fn err(error: impl Into<anyhow::Error>) -> Self {
        Self {
            value: None,
            error: Some(error.into()),
        }
    }

    /// A successful envelope with no value.
    pub fn empty() -> Self {
        Self {
            value: None,
            error: None,
        }
    }

    /// Check if this envelope reports a failure.
    pub fn is_err(&self) -> bool {
        self.error.is_some()
    }

    /// Unwrap the envelope. A present error wins over a present value.
    pub fn into_result(self) -> Result<Option<V>, anyhow::Error> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.value),
        }
    }

    /// Map the carried value, leaving the error untouched.
    pub fn map<U>(self, f: impl FnOnce(V) -> U) -> Envelope<U> {
        Envelope {
            value: self.value.map(f),
            error: self.error,
        }
    }
}

impl<V> Default for Envelope<V> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<V, E: Into<anyhow::Error>> From<Result<V, E>> for Envelope<V> {
    fn from(result: Result<V, E>) -> Self {
        match result {
            Ok(value) => Envelope::ok(value),
            Err(error) => Envelope::err(error),
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for Envelope<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.value, &self.error) {
            (_, Some(e)) => write!(f, "Envelope::Err({})", e),
            (Some(v), None) => write!(f, "Envelope::Ok({:?})", v),
            (None, None) => write!(f, "Envelope::Empty"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_wins_over_value() {
        let envelope = Envelope {
            value: Some(1),
            error: Some(anyhow::anyhow!("denied")),
        };
        assert!(envelope.is_err());
        let err = envelope.into_result().unwrap_err();
        assert_eq!(err.to_string(), "denied");
    }

    #[test]
    fn test_empty_is_success_without_value() {
        let envelope = Envelope::<String>::empty();
        assert!(!envelope.is_err());
        assert_eq!(envelope.into_result().unwrap(), None);
    }

    #[test]
    fn test_from_result() {
        let parsed: Envelope<i32> = "12".parse::<i32>().into();
        assert_eq!(parsed.into_result().unwrap(), Some(12));

        let failed: Envelope<i32> = "x".parse::<i32>().into();
        assert!(failed.into_result().unwrap_err().to_string().contains("invalid digit"));
    }

    #[test]
    fn test_map_keeps_error() {
        let envelope: Envelope<i32> = Envelope::err(anyhow::anyhow!("nope"));
        let mapped = envelope.map(|v| v * 2);
        assert!(mapped.is_err());
        assert_eq!(format!("{:?}", mapped), "Envelope::Err(nope)");
    }
}
