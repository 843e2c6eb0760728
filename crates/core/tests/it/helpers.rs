//! Shared test fixtures: a `DocStore` double that actually stores
//! documents and can push updates into whichever `Model`s have
//! registered interest, so multi-root convergence scenarios (spec.md
//! §8 scenario f) can be exercised without a real OT backend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use racer::docstore::{DocLifecycle, DocStore, DocStoreError, Op, OpKind};
use racer::path::{PathBuf, Segment};
use racer::tree::Tree;
use racer::value::Value;
use racer::Model;
use tokio::sync::Mutex;

/// A `DocStore` double that keeps its own authoritative copy of every
/// document (as a [`Tree`], reusing the library's own splice/set/
/// increment semantics rather than reimplementing JSON0 application) and
/// replays each submitted op into every `Model` registered as a
/// subscriber for that document.
#[derive(Default)]
pub struct SharedBackend {
    docs: Mutex<Tree>,
    subscribers: Mutex<HashMap<(String, String), Vec<Model>>>,
}

impl SharedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers `model` to receive every future op applied to
    /// `collection`/`id`. Call this alongside (not instead of) the
    /// model's own `handle.subscribe()` — the handle call drives refcount
    /// bookkeeping and the initial fetch; this call wires the out-of-band
    /// push channel `DocStore::subscribe`'s contract describes.
    pub async fn register_subscriber(&self, collection: &str, id: &str, model: Model) {
        self.subscribers
            .lock()
            .await
            .entry((collection.to_string(), id.to_string()))
            .or_default()
            .push(model);
    }

    fn op_path(collection: &str, id: &str, op: &Op) -> PathBuf {
        let mut path = PathBuf::root().push(collection).push(id);
        for component in &op.p {
            path = path.push(Segment::from(component));
        }
        path
    }

    /// Replays the current full document to every registered subscriber,
    /// including the model that originated the write — harmless since
    /// `apply_remote` is idempotent for an unchanged value, and it keeps
    /// this double from needing to track per-model write provenance.
    async fn broadcast(&self, collection: &str, id: &str) {
        let path = PathBuf::root().push(collection).push(id);
        let doc = self.docs.lock().await.lookup(&path).ok().flatten().cloned();
        let Some(doc) = doc else { return };
        let subscribers = self.subscribers.lock().await;
        let Some(models) = subscribers.get(&(collection.to_string(), id.to_string())) else { return };
        for model in models {
            model.apply_remote(&path, doc.clone()).await;
        }
    }
}

#[async_trait]
impl DocStore for SharedBackend {
    async fn fetch(&self, collection: &str, id: &str) -> Result<Option<Value>, DocStoreError> {
        let path = PathBuf::root().push(collection).push(id);
        Ok(self.docs.lock().await.lookup(&path).ok().flatten().cloned())
    }

    async fn subscribe(&self, _collection: &str, _id: &str) -> Result<(), DocStoreError> {
        Ok(())
    }

    async fn unsubscribe(&self, _collection: &str, _id: &str) -> Result<(), DocStoreError> {
        Ok(())
    }

    async fn submit_op(&self, collection: &str, id: &str, op: Op) -> Result<(), DocStoreError> {
        let path = Self::op_path(collection, id, &op);
        let mut docs = self.docs.lock().await;
        match &op.kind {
            OpKind::ObjectReplace { oi, .. } => {
                docs.set_at(&path, oi.clone()).map_err(|e| DocStoreError::Rejected(e.to_string()))?;
            }
            OpKind::ObjectDelete { .. } => {
                docs.del_at(&path).map_err(|e| DocStoreError::Rejected(e.to_string()))?;
            }
            OpKind::ListInsert { li } => {
                let index = path.last().and_then(Segment::as_index).unwrap_or(0);
                let parent = path.parent().unwrap_or_else(PathBuf::root);
                docs.splice_at(&parent, index, 0, vec![li.clone()]).map_err(|e| DocStoreError::Rejected(e.to_string()))?;
            }
            OpKind::ListDelete { .. } => {
                let index = path.last().and_then(Segment::as_index).unwrap_or(0);
                let parent = path.parent().unwrap_or_else(PathBuf::root);
                docs.splice_at(&parent, index, 1, Vec::new()).map_err(|e| DocStoreError::Rejected(e.to_string()))?;
            }
            OpKind::ListReplace { li, .. } => {
                let index = path.last().and_then(Segment::as_index).unwrap_or(0);
                let parent = path.parent().unwrap_or_else(PathBuf::root);
                docs.splice_at(&parent, index, 1, vec![li.clone()]).map_err(|e| DocStoreError::Rejected(e.to_string()))?;
            }
            OpKind::NumberAdd { na } => {
                docs.increment_at(&path, *na).map_err(|e| DocStoreError::Rejected(e.to_string()))?;
            }
            OpKind::ListMove { .. } => {}
        }
        drop(docs);
        self.broadcast(collection, id).await;
        Ok(())
    }

    async fn submit_lifecycle(&self, collection: &str, id: &str, change: DocLifecycle) -> Result<(), DocStoreError> {
        let path = PathBuf::root().push(collection).push(id);
        let mut docs = self.docs.lock().await;
        match change {
            DocLifecycle::Create(value) => {
                docs.set_at(&path, value).map_err(|e| DocStoreError::Rejected(e.to_string()))?;
            }
            DocLifecycle::Delete => {
                docs.del_at(&path).map_err(|e| DocStoreError::Rejected(e.to_string()))?;
            }
        }
        drop(docs);
        self.broadcast(collection, id).await;
        Ok(())
    }
}
