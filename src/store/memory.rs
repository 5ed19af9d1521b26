//! In-process document store with optimistic concurrency control.
//!
//! Every stored document carries a version taken from a global commit
//! counter. A transaction records the version (or absence) of every document
//! it reads; at commit, under the store lock, those versions are compared to
//! the current ones and the whole transaction is rejected with
//! [`StoreError::Conflict`] if any differ. Since validation and application
//! happen under the same lock, committed transactions are serializable.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};

use super::{
    merge_fields, ChangeHub, CollectionPath, DocPath, Document, Query, ServerClock, Store,
    StoreError, StoreResult, Transaction, Write,
};

#[derive(Debug, Clone)]
struct Stored {
    data: Value,
    version: u64,
}

#[derive(Debug, Default)]
struct State {
    docs: BTreeMap<DocPath, Stored>,
    next_version: u64,
}

impl State {
    fn version_of(&self, path: &DocPath) -> Option<u64> {
        self.docs.get(path).map(|s| s.version)
    }

    /// Apply `writes` all-or-nothing. Returns the touched collections.
    fn apply(&mut self, writes: &[Write]) -> StoreResult<BTreeSet<CollectionPath>> {
        let mut staged: HashMap<DocPath, Option<Value>> = HashMap::new();
        for write in writes {
            let path = write.path().clone();
            match write {
                Write::Set(_, data) => {
                    staged.insert(path, Some(data.clone()));
                }
                Write::Update(_, fields) => {
                    let current = match staged.get(&path) {
                        Some(value) => value.clone(),
                        None => self.docs.get(&path).map(|s| s.data.clone()),
                    };
                    let Some(mut data) = current else {
                        return Err(StoreError::NotFound(path.to_string()));
                    };
                    merge_fields(&mut data, fields);
                    staged.insert(path, Some(data));
                }
                Write::Delete(_) => {
                    staged.insert(path, None);
                }
            }
        }

        let mut touched = BTreeSet::new();
        for (path, value) in staged {
            touched.insert(path.collection());
            match value {
                Some(data) => {
                    self.next_version += 1;
                    let version = self.next_version;
                    self.docs.insert(path, Stored { data, version });
                }
                None => {
                    self.docs.remove(&path);
                }
            }
        }
        Ok(touched)
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<State>,
    hub: ChangeHub,
    clock: ServerClock,
}

impl Inner {
    async fn commit(&self, reads: &HashMap<DocPath, Option<u64>>, writes: &[Write]) -> StoreResult<()> {
        let touched = {
            let mut state = self.state.lock().await;
            for (path, seen) in reads {
                if state.version_of(path) != *seen {
                    return Err(StoreError::Conflict);
                }
            }
            state.apply(writes)?
        };
        for collection in touched {
            self.hub.publish(collection);
        }
        Ok(())
    }
}

/// Cheaply cloneable handle; clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents currently stored.
    pub async fn len(&self) -> usize {
        self.inner.state.lock().await.docs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, path: &DocPath) -> StoreResult<Option<Document>> {
        let state = self.inner.state.lock().await;
        Ok(state.docs.get(path).map(|s| Document {
            path: path.clone(),
            data: s.data.clone(),
        }))
    }

    async fn query(&self, query: &Query) -> StoreResult<Vec<Document>> {
        let candidates: Vec<Document> = {
            let state = self.inner.state.lock().await;
            state
                .docs
                .iter()
                .filter(|(path, _)| path.collection() == query.collection)
                .map(|(path, s)| Document {
                    path: path.clone(),
                    data: s.data.clone(),
                })
                .collect()
        };
        Ok(query.apply(candidates))
    }

    async fn set(&self, path: &DocPath, data: Value) -> StoreResult<()> {
        self.inner
            .commit(&HashMap::new(), &[Write::Set(path.clone(), data)])
            .await
    }

    async fn update(&self, path: &DocPath, fields: Value) -> StoreResult<()> {
        self.inner
            .commit(&HashMap::new(), &[Write::Update(path.clone(), fields)])
            .await
    }

    async fn delete(&self, path: &DocPath) -> StoreResult<()> {
        self.inner
            .commit(&HashMap::new(), &[Write::Delete(path.clone())])
            .await
    }

    async fn begin(&self) -> StoreResult<Box<dyn Transaction>> {
        Ok(Box::new(MemoryTransaction {
            inner: self.inner.clone(),
            snapshot: HashMap::new(),
            writes: Vec::new(),
        }))
    }

    fn changes(&self) -> broadcast::Receiver<CollectionPath> {
        self.inner.hub.receiver()
    }

    fn server_timestamp(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }
}

struct MemoryTransaction {
    inner: Arc<Inner>,
    snapshot: HashMap<DocPath, Option<Stored>>,
    writes: Vec<Write>,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn get(&mut self, path: &DocPath) -> StoreResult<Option<Document>> {
        if !self.snapshot.contains_key(path) {
            let stored = self.inner.state.lock().await.docs.get(path).cloned();
            self.snapshot.insert(path.clone(), stored);
        }
        Ok(self.snapshot.get(path).cloned().flatten().map(|s| Document {
            path: path.clone(),
            data: s.data,
        }))
    }

    fn set(&mut self, path: DocPath, data: Value) {
        self.writes.push(Write::Set(path, data));
    }

    fn update(&mut self, path: DocPath, fields: Value) {
        self.writes.push(Write::Update(path, fields));
    }

    fn delete(&mut self, path: DocPath) {
        self.writes.push(Write::Delete(path));
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let reads: HashMap<DocPath, Option<u64>> = self
            .snapshot
            .iter()
            .map(|(path, stored)| (path.clone(), stored.as_ref().map(|s| s.version)))
            .collect();
        self.inner.commit(&reads, &self.writes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn queue() -> CollectionPath {
        CollectionPath::new("chat-queue")
    }

    #[tokio::test]
    async fn update_merges_fields_and_requires_existing_doc() {
        let store = MemoryStore::new();
        let path = queue().doc("a");

        let missing = store.update(&path, json!({ "n": 1 })).await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));

        store.set(&path, json!({ "userId": "a", "n": 0 })).await.unwrap();
        store.update(&path, json!({ "n": 1 })).await.unwrap();

        let doc = store.get(&path).await.unwrap().unwrap();
        assert_eq!(doc.data, json!({ "userId": "a", "n": 1 }));
    }

    #[tokio::test]
    async fn concurrent_claim_of_same_document_conflicts() {
        let store = MemoryStore::new();
        let path = queue().doc("a");
        store.set(&path, json!({ "userId": "a" })).await.unwrap();

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        assert!(first.get(&path).await.unwrap().is_some());
        assert!(second.get(&path).await.unwrap().is_some());
        first.delete(path.clone());
        second.delete(path.clone());

        first.commit().await.unwrap();
        assert!(matches!(second.commit().await, Err(StoreError::Conflict)));
    }

    #[tokio::test]
    async fn absent_read_conflicts_with_concurrent_create() {
        let store = MemoryStore::new();
        let path = queue().doc("a");

        let mut tx = store.begin().await.unwrap();
        assert!(tx.get(&path).await.unwrap().is_none());
        tx.set(path.clone(), json!({ "userId": "a" }));

        store.set(&path, json!({ "userId": "other" })).await.unwrap();
        assert!(matches!(tx.commit().await, Err(StoreError::Conflict)));
    }

    #[tokio::test]
    async fn failed_commit_applies_nothing() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.set(queue().doc("a"), json!({}));
        tx.update(queue().doc("missing"), json!({ "n": 1 }));

        assert!(tx.commit().await.is_err());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn snapshot_reads_are_repeatable() {
        let store = MemoryStore::new();
        let path = queue().doc("a");
        store.set(&path, json!({ "n": 1 })).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let before = tx.get(&path).await.unwrap().unwrap();
        store.set(&path, json!({ "n": 2 })).await.unwrap();
        let after = tx.get(&path).await.unwrap().unwrap();

        assert_eq!(before.data, after.data);
    }

    #[tokio::test]
    async fn commit_publishes_touched_collections() {
        let store = MemoryStore::new();
        let mut changes = store.changes();
        store.set(&queue().doc("a"), json!({})).await.unwrap();
        assert_eq!(changes.recv().await.unwrap(), queue());
    }
}
