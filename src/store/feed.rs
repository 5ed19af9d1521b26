//! Change feeds.
//!
//! A subscription recomputes its full result set whenever a committed write
//! touches one of the collections it watches, and pushes the whole set (not
//! a diff) to the subscriber. Consumers must therefore treat every delivery
//! as a replacement of the previous one.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::{CollectionPath, Store, StoreResult};

const HUB_CAPACITY: usize = 1024;

/// Fan-out of "collection changed" notifications to live subscriptions.
#[derive(Debug, Clone)]
pub struct ChangeHub {
    tx: broadcast::Sender<CollectionPath>,
}

impl ChangeHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(HUB_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, collection: CollectionPath) {
        // No receivers is the normal idle state.
        let _ = self.tx.send(collection);
    }

    pub fn receiver(&self) -> broadcast::Receiver<CollectionPath> {
        self.tx.subscribe()
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancellable handle on a live result set. Dropping it stops the feed.
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<StoreResult<T>>,
    task: JoinHandle<()>,
}

impl<T> Subscription<T> {
    /// Wait for the next snapshot. `None` once the feed is closed.
    pub async fn next(&mut self) -> Option<StoreResult<T>> {
        self.rx.recv().await
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Watch `collections` and deliver `load(store)` once immediately and again
/// after every change to one of them.
pub fn watch<T, F, Fut>(
    store: Arc<dyn Store>,
    collections: Vec<CollectionPath>,
    load: F,
) -> Subscription<T>
where
    T: Send + 'static,
    F: Fn(Arc<dyn Store>) -> Fut + Send + 'static,
    Fut: Future<Output = StoreResult<T>> + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    // Listen before the initial load so no commit can slip between them.
    let mut changes = store.changes();

    let task = tokio::spawn(async move {
        if tx.send(load(store.clone()).await).is_err() {
            return;
        }
        loop {
            match changes.recv().await {
                Ok(collection) if collections.contains(&collection) => {}
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Change feed lagged, reloading");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
            if tx.send(load(store.clone()).await).is_err() {
                break;
            }
        }
    });

    Subscription { rx, task }
}
