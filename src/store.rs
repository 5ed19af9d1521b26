//! Transactional document store.
//!
//! The chat core only relies on four capabilities of its backing store:
//! point reads, point writes/deletes, serializable multi-document
//! transactions (read, verify, then write; abort on conflict) and change
//! feeds that re-deliver a live result set after committed writes. This
//! module defines that contract as the [`Store`] and [`Transaction`] traits;
//! [`MemoryStore`] and [`PgStore`] implement it.

mod clock;
mod error;
mod feed;
mod memory;
mod postgres;
mod query;

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

pub use clock::ServerClock;
pub use error::{StoreError, StoreResult};
pub use feed::{watch, ChangeHub, Subscription};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use query::{Direction, Filter, FilterOp, OrderBy, Query};

/// Path of a collection, e.g. `chats` or `chats/{chatId}/messages`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Address a document inside this collection.
    pub fn doc(&self, id: &str) -> DocPath {
        DocPath(format!("{}/{}", self.0, id))
    }

    /// Address a document with a freshly generated id.
    pub fn new_doc(&self) -> DocPath {
        self.doc(&uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Full path of a single document, e.g. `chats/{chatId}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath(String);

impl DocPath {
    pub fn parse(path: &str) -> StoreResult<Self> {
        let segments: Vec<&str> = path.split('/').collect();
        if segments.len() % 2 != 0 || segments.iter().any(|s| s.is_empty()) {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        Ok(Self(path.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn id(&self) -> &str {
        self.0.rsplit_once('/').map(|(_, id)| id).unwrap_or(&self.0)
    }

    pub fn collection(&self) -> CollectionPath {
        let parent = self.0.rsplit_once('/').map(|(c, _)| c).unwrap_or("");
        CollectionPath(parent.to_string())
    }

    /// Address a subcollection nested under this document.
    pub fn child(&self, collection: &str) -> CollectionPath {
        CollectionPath(format!("{}/{}", self.0, collection))
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored document: its path plus a JSON object body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: DocPath,
    pub data: Value,
}

impl Document {
    pub fn id(&self) -> &str {
        self.path.id()
    }

    /// Field lookup by top-level name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    /// Deserialize the body into a typed model. The document id is exposed
    /// to the model as an `id` field.
    pub fn decode<T: DeserializeOwned>(&self) -> StoreResult<T> {
        let mut data = self.data.clone();
        if let Value::Object(map) = &mut data {
            map.insert("id".to_string(), Value::String(self.id().to_string()));
        }
        Ok(serde_json::from_value(data)?)
    }
}

/// Serialize a typed model into a document body. An `id` field, if the
/// model carries one, is dropped since the id lives in the path.
pub fn encode<T: Serialize>(value: &T) -> StoreResult<Value> {
    let mut data = serde_json::to_value(value)?;
    if let Value::Object(map) = &mut data {
        map.remove("id");
    }
    Ok(data)
}

/// A buffered write, applied atomically at commit.
#[derive(Debug, Clone)]
pub(crate) enum Write {
    Set(DocPath, Value),
    Update(DocPath, Value),
    Delete(DocPath),
}

impl Write {
    pub(crate) fn path(&self) -> &DocPath {
        match self {
            Write::Set(p, _) | Write::Update(p, _) | Write::Delete(p) => p,
        }
    }
}

/// Merge top-level fields of `fields` into `target`.
pub(crate) fn merge_fields(target: &mut Value, fields: &Value) {
    if let (Value::Object(target), Value::Object(fields)) = (target, fields) {
        for (k, v) in fields {
            target.insert(k.clone(), v.clone());
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Point read outside any transaction.
    async fn get(&self, path: &DocPath) -> StoreResult<Option<Document>>;

    /// Run a query outside any transaction. Results may be stale by the time
    /// the caller acts on them.
    async fn query(&self, query: &Query) -> StoreResult<Vec<Document>>;

    /// Create or overwrite a document.
    async fn set(&self, path: &DocPath, data: Value) -> StoreResult<()>;

    /// Merge top-level fields into an existing document.
    async fn update(&self, path: &DocPath, fields: Value) -> StoreResult<()>;

    /// Delete a document; deleting a missing document is not an error.
    async fn delete(&self, path: &DocPath) -> StoreResult<()>;

    /// Open a serializable transaction.
    async fn begin(&self) -> StoreResult<Box<dyn Transaction>>;

    /// Receiver of collection paths touched by committed writes.
    fn changes(&self) -> broadcast::Receiver<CollectionPath>;

    /// Store-assigned timestamp, strictly increasing across calls.
    fn server_timestamp(&self) -> DateTime<Utc>;
}

#[async_trait]
pub trait Transaction: Send {
    /// Snapshot read. Every document read here is re-validated at commit.
    async fn get(&mut self, path: &DocPath) -> StoreResult<Option<Document>>;

    fn set(&mut self, path: DocPath, data: Value);

    fn update(&mut self, path: DocPath, fields: Value);

    fn delete(&mut self, path: DocPath);

    /// Apply buffered writes atomically, or fail with
    /// [`StoreError::Conflict`] and apply nothing.
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// Re-run `attempt` while it fails with [`StoreError::Conflict`], up to
/// `max_attempts` times. Each attempt must open its own transaction and
/// re-read everything it depends on.
pub async fn with_retries<T, F, Fut>(max_attempts: u32, mut attempt: F) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let max_attempts = max_attempts.max(1);
    for n in 1..=max_attempts {
        match attempt().await {
            Err(StoreError::Conflict) => {
                tracing::debug!(attempt = n, max_attempts, "Transaction conflict, retrying");
            }
            other => return other,
        }
    }
    tracing::warn!(max_attempts, "Transaction retries exhausted");
    Err(StoreError::RetriesExhausted {
        attempts: max_attempts,
    })
}
