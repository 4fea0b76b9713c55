//! Boundary to the remote backend service.
//!
//! The backend itself (auth, row storage, file storage) is an external
//! collaborator. This module only fixes the shape the rest of the crate
//! talks to:
//!
//! - [`Backend`] - the operations query functions may issue
//! - [`Response`] - the backend's native `{ data, error }` reply
//! - [`Client`] - a cheap handle installed once per process and injected
//!   into query functions

#[cfg(feature = "memory-backend")]
pub mod memory;

use std::fmt;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;

/// Errors reported by the backend or by the client handle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The backend rejected the request.
    #[error("backend rejected request ({code}): {message}")]
    Rejected {
        /// Backend-specific error code.
        code: String,
        /// Human-readable message.
        message: String,
    },

    /// The requested table, bucket or object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A response could not be decoded into the expected type.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// [`Client::install`] was called twice.
    #[error("backend client is already initialized")]
    AlreadyInitialized,

    /// [`Client::global`] was called before [`Client::install`].
    #[error("backend client is not initialized")]
    NotInitialized,
}

impl BackendError {
    /// Shorthand for [`BackendError::Rejected`].
    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        BackendError::Rejected {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// The backend's native reply: data, an error, or (rarely) neither.
#[derive(Debug, Clone, PartialEq)]
pub struct Response<T> {
    /// Payload of a successful request.
    pub data: Option<T>,
    /// Failure reported by the backend.
    pub error: Option<BackendError>,
}

impl<T> Response<T> {
    /// A successful reply.
    pub fn data(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    /// A failed reply.
    pub fn error(error: BackendError) -> Self {
        Self {
            data: None,
            error: Some(error),
        }
    }

    /// Map the reply into an envelope without decoding.
    pub fn into_raw_envelope(self) -> Envelope<T> {
        Envelope {
            value: self.data,
            error: self.error.map(anyhow::Error::from),
        }
    }
}

impl Response<serde_json::Value> {
    /// Decode JSON data into `V` and map the reply into an envelope.
    ///
    /// A decode failure becomes the envelope's error, so the query function
    /// never needs a second failure channel for it.
    pub fn into_envelope<V: DeserializeOwned>(self) -> Envelope<V> {
        if let Some(error) = self.error {
            return Envelope::err(error);
        }
        match self.data {
            None => Envelope::empty(),
            Some(json) => match serde_json::from_value(json) {
                Ok(value) => Envelope::ok(value),
                Err(e) => Envelope::err(BackendError::Decode(e.to_string())),
            },
        }
    }
}

/// Sort order for a [`Select`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Column to sort by.
    pub column: String,
    /// Ascending when `true`.
    pub ascending: bool,
}

/// A row query against one table.
///
/// # Example
///
/// ```
/// use query_lifecycle::backend::Select;
///
/// let select = Select::from("goals")
///     .eq("category_id", 3)
///     .order("created_at", false)
///     .range(0, 19);
/// assert_eq!(select.range, Some((0, 19)));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Select {
    /// Table name.
    pub table: String,
    /// Comma separated column list, `*` for all.
    pub columns: String,
    /// Equality filters, all of which must match.
    pub filters: Vec<(String, serde_json::Value)>,
    /// Optional sort order.
    pub order: Option<Order>,
    /// Optional inclusive row range `(from, to)`.
    pub range: Option<(u64, u64)>,
}

impl Select {
    /// Select all columns of `table`.
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: "*".to_string(),
            filters: Vec::new(),
            order: None,
            range: None,
        }
    }

    /// Restrict the returned columns.
    pub fn columns(mut self, columns: impl Into<String>) -> Self {
        self.columns = columns.into();
        self
    }

    /// Keep rows whose `column` equals `value`.
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }

    /// Sort by `column`.
    pub fn order(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.into(),
            ascending,
        });
        self
    }

    /// Return rows `from..=to` of the sorted result.
    pub fn range(mut self, from: u64, to: u64) -> Self {
        self.range = Some((from, to));
        self
    }
}

/// Operations the backend service offers to query functions.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Read rows. `data` is a JSON array of row objects.
    async fn select(&self, select: Select) -> Response<serde_json::Value>;

    /// Download an object from file storage.
    async fn download(&self, bucket: &str, path: &str) -> Response<Vec<u8>>;

    /// Upload an object to file storage, replacing an existing one when
    /// `upsert` is set. `data` is the stored path.
    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>, upsert: bool)
        -> Response<String>;
}

#[async_trait]
impl<B: Backend> Backend for Arc<B> {
    async fn select(&self, select: Select) -> Response<serde_json::Value> {
        self.as_ref().select(select).await
    }

    async fn download(&self, bucket: &str, path: &str) -> Response<Vec<u8>> {
        self.as_ref().download(bucket, path).await
    }

    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>, upsert: bool)
        -> Response<String> {
        self.as_ref().upload(bucket, path, bytes, upsert).await
    }
}

static GLOBAL_CLIENT: OnceLock<Client> = OnceLock::new();

/// Handle to the backend shared by every query function.
///
/// This is cheap to clone - the backend is behind `Arc`. Install one at
/// startup with [`Client::install`], then hand clones to the query
/// functions that need it.
#[derive(Clone)]
pub struct Client {
    backend: Arc<dyn Backend>,
}

impl Client {
    /// Wrap a backend implementation.
    pub fn new(backend: impl Backend) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Install `client` as the process-wide handle.
    ///
    /// There is no re-initialization: a second call fails with
    /// [`BackendError::AlreadyInitialized`].
    pub fn install(client: Client) -> Result<(), BackendError> {
        GLOBAL_CLIENT
            .set(client)
            .map_err(|_| BackendError::AlreadyInitialized)?;
        tracing::info!("backend client installed");
        Ok(())
    }

    /// The process-wide handle.
    pub fn global() -> Result<Client, BackendError> {
        GLOBAL_CLIENT.get().cloned().ok_or(BackendError::NotInitialized)
    }

    /// The underlying backend.
    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// See [`Backend::select`].
    pub async fn select(&self, select: Select) -> Response<serde_json::Value> {
        tracing::trace!(table = %select.table, "select");
        self.backend.select(select).await
    }

    /// See [`Backend::download`].
    pub async fn download(&self, bucket: &str, path: &str) -> Response<Vec<u8>> {
        tracing::trace!(bucket, path, "download");
        self.backend.download(bucket, path).await
    }

    /// See [`Backend::upload`].
    pub async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        upsert: bool,
    ) -> Response<String> {
        tracing::trace!(bucket, path, size = bytes.len(), upsert, "upload");
        self.backend.upload(bucket, path, bytes, upsert).await
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}
