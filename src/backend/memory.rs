//! In-memory backend for tests and local demos.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::{Backend, BackendError, Response, Select};

/// A [`Backend`] that keeps tables and buckets in memory.
///
/// Failures can be scripted per table or bucket with [`fail_next`]; the
/// next request against that name gets the error instead of data.
///
/// [`fail_next`]: MemoryBackend::fail_next
#[derive(Default)]
pub struct MemoryBackend {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    buckets: Mutex<HashMap<String, HashMap<String, Vec<u8>>>>,
    failures: Mutex<HashMap<String, Vec<BackendError>>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append rows to `table`, creating it if needed.
    pub fn insert_rows(&self, table: &str, rows: impl IntoIterator<Item = Value>) {
        self.tables
            .lock()
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    /// Store an object in `bucket`, creating the bucket if needed.
    pub fn put_object(&self, bucket: &str, path: &str, bytes: Vec<u8>) {
        self.buckets
            .lock()
            .entry(bucket.to_string())
            .or_default()
            .insert(path.to_string(), bytes);
    }

    /// Read an object back, bypassing the [`Backend`] interface.
    pub fn object(&self, bucket: &str, path: &str) -> Option<Vec<u8>> {
        self.buckets.lock().get(bucket)?.get(path).cloned()
    }

    /// Make the next request against `name` (a table or bucket) fail.
    ///
    /// Several calls queue several failures, consumed in order.
    pub fn fail_next(&self, name: &str, error: BackendError) {
        self.failures
            .lock()
            .entry(name.to_string())
            .or_default()
            .push(error);
    }

    fn take_failure(&self, name: &str) -> Option<BackendError> {
        let mut failures = self.failures.lock();
        let queue = failures.get_mut(name)?;
        if queue.is_empty() {
            return None;
        }
        Some(queue.remove(0))
    }
}

/// Sort rank of a JSON type. Nulls sort last.
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Bool(_) => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Array(_) => 3,
        Value::Object(_) => 4,
        Value::Null => 5,
    }
}

/// Total order over JSON values: by type rank, then by value within a type.
/// Arrays and objects compare equal to others of their own type.
fn compare_json(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64().unwrap_or_default();
            let b = b.as_f64().unwrap_or_default();
            a.total_cmp(&b)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn project(row: &Value, columns: &str) -> Value {
    if columns.trim() == "*" {
        return row.clone();
    }
    let Value::Object(fields) = row else {
        return row.clone();
    };
    let projected = columns
        .split(',')
        .map(str::trim)
        .filter_map(|column| fields.get(column).map(|v| (column.to_string(), v.clone())))
        .collect();
    Value::Object(projected)
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn select(&self, select: Select) -> Response<Value> {
        if let Some(error) = self.take_failure(&select.table) {
            return Response::error(error);
        }
        let tables = self.tables.lock();
        let Some(rows) = tables.get(&select.table) else {
            return Response::error(BackendError::NotFound(select.table));
        };

        let mut matched: Vec<&Value> = rows
            .iter()
            .filter(|row| {
                select
                    .filters
                    .iter()
                    .all(|(column, value)| row.get(column) == Some(value))
            })
            .collect();

        if let Some(order) = &select.order {
            let null = Value::Null;
            matched.sort_by(|a, b| {
                let a = a.get(&order.column).unwrap_or(&null);
                let b = b.get(&order.column).unwrap_or(&null);
                let ordering = compare_json(a, b);
                if order.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }

        let rows: Vec<Value> = match select.range {
            Some((from, to)) => {
                let take = to.saturating_sub(from).saturating_add(1);
                matched
                    .into_iter()
                    .skip(from as usize)
                    .take(take as usize)
                    .map(|row| project(row, &select.columns))
                    .collect()
            }
            None => matched
                .into_iter()
                .map(|row| project(row, &select.columns))
                .collect(),
        };

        Response::data(Value::Array(rows))
    }

    async fn download(&self, bucket: &str, path: &str) -> Response<Vec<u8>> {
        if let Some(error) = self.take_failure(bucket) {
            return Response::error(error);
        }
        match self.object(bucket, path) {
            Some(bytes) => Response::data(bytes),
            None => Response::error(BackendError::NotFound(format!("{bucket}/{path}"))),
        }
    }

    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>, upsert: bool) -> Response<String> {
        if let Some(error) = self.take_failure(bucket) {
            return Response::error(error);
        }
        let mut buckets = self.buckets.lock();
        let objects = buckets.entry(bucket.to_string()).or_default();
        if !upsert && objects.contains_key(path) {
            return Response::error(BackendError::rejected("409", "the resource already exists"));
        }
        objects.insert(path.to_string(), bytes);
        Response::data(path.to_string())
    }
}
