//! `Model`: the top-level entry point that owns the tree, the event bus,
//! the load coordinator, and the connection to an external [`DocStore`],
//! and hands out [`Handle`]s scoped into them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::context::{ContextId, ItemKey};
use crate::docstore::DocStore;
use crate::event_bus::EventBus;
use crate::handle::Handle;
use crate::load::{LoadCoordinator, Loader, PendingGate};
use crate::mutator::Mutator;
use crate::path::PathBuf;
use crate::query::QuerySnapshot;
use crate::snapshot::{Bundle, SnapshotCodec, SnapshotError};
use crate::tree::Tree;

const DEFAULT_UNLOAD_DELAY: Duration = Duration::from_secs(5);

/// Builds a [`Model`], mirroring the teacher's builder-style instance
/// construction but shrunk to this crate's actual dependencies: a tree, a
/// `DocStore`, and an unload debounce.
pub struct ModelBuilder {
    docstore: Arc<dyn DocStore>,
    unload_delay: Duration,
}

impl ModelBuilder {
    pub fn new(docstore: Arc<dyn DocStore>) -> Self {
        Self { docstore, unload_delay: DEFAULT_UNLOAD_DELAY }
    }

    /// How long an item with no remaining references waits before it is
    /// actually torn down. Defaults to five seconds.
    pub fn unload_delay(mut self, delay: Duration) -> Self {
        self.unload_delay = delay;
        self
    }

    pub fn build(self) -> Model {
        let events = Arc::new(EventBus::new());
        let pending = Arc::new(PendingGate::new());
        let mutator = Arc::new(Mutator::new(Tree::new(), events.clone(), self.docstore.clone(), pending.clone()));
        let loader: Arc<dyn Loader> = Arc::new(ModelLoader { mutator: mutator.clone(), docstore: self.docstore.clone() });
        let loads = Arc::new(LoadCoordinator::new(loader, self.unload_delay, pending));
        Model { mutator, loads, events }
    }
}

/// The root of a Racer data model: one tree, one event bus, one load
/// coordinator, shared by every [`Handle`] this model hands out.
#[derive(Clone)]
pub struct Model {
    mutator: Arc<Mutator>,
    loads: Arc<LoadCoordinator>,
    events: Arc<EventBus>,
}

impl Model {
    pub fn builder(docstore: Arc<dyn DocStore>) -> ModelBuilder {
        ModelBuilder::new(docstore)
    }

    /// A handle scoped to the tree root, under a fresh anonymous context.
    pub fn root(&self) -> Handle {
        Handle::new(self.mutator.clone(), self.loads.clone(), PathBuf::root(), ContextId::anonymous())
    }

    /// A handle scoped to the tree root, under a named context so its
    /// loads can be released together via [`Handle::unload`].
    pub fn root_in(&self, context: impl Into<String>) -> Handle {
        Handle::new(self.mutator.clone(), self.loads.clone(), PathBuf::root(), ContextId::new(context))
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub async fn when_nothing_pending(&self) {
        self.loads.when_nothing_pending().await;
    }

    /// Applies a value pushed by the backend out of band — the
    /// counterpart to `DocStore::subscribe`'s "the backend is expected to
    /// deliver [ops] out of band" contract (`spec.md` §6). Whatever glue
    /// code owns the subscription channel calls this as ops arrive, in
    /// the order the backend assigned them; Racer does not reorder or
    /// buffer them itself (`spec.md` §5).
    pub async fn apply_remote(&self, path: &PathBuf, value: crate::value::Value) {
        self.mutator.apply_remote(path, value).await;
    }

    /// Tears down a document's local state after the backend reports it
    /// gone (e.g. deleted by another client), without forwarding anything
    /// back to the backend.
    pub async fn clear_remote(&self, path: &PathBuf) {
        self.mutator.clear_remote(path).await;
    }

    /// Captures the full resident tree, every context's fetch/subscribe
    /// refcounts, and active queries into a portable bundle string
    /// (`spec.md` §4.8).
    pub async fn bundle(&self, queries: Vec<QuerySnapshot>) -> Result<String, SnapshotError> {
        let contexts = self.loads.snapshot().await;
        self.mutator.with_tree(|tree| SnapshotCodec::bundle(tree, contexts, queries)).await
    }

    /// Restores a previously captured bundle wholesale, replacing whatever
    /// this model currently holds and re-initiating loads so that every
    /// restored context's refcounts become resident again (`spec.md`
    /// §4.8).
    pub async fn unbundle(&self, data: &str) -> Result<Bundle, SnapshotError> {
        let bundle = SnapshotCodec::unbundle(data)?;
        self.mutator.replace_tree(bundle.tree.clone()).await;
        self.loads.restore(&bundle.contexts).await;
        Ok(bundle)
    }
}

/// Bridges the load coordinator's abstract load/unload calls to this
/// model's actual tree and backend.
struct ModelLoader {
    mutator: Arc<Mutator>,
    docstore: Arc<dyn DocStore>,
}

#[async_trait]
impl Loader for ModelLoader {
    async fn load(&self, item: &ItemKey) -> Result<(), String> {
        let ItemKey::Doc { collection, id } = item else {
            // Query loading is driven by whatever pushes query diffs in;
            // there's nothing for the coordinator itself to fetch.
            return Ok(());
        };

        self.docstore.subscribe(collection, id).await.map_err(|e| e.to_string())?;
        match self.docstore.fetch(collection, id).await {
            Ok(Some(value)) => {
                let path = PathBuf::root().push(collection.as_str()).push(id.as_str());
                self.mutator.apply_remote(&path, value).await;
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(err) => {
                warn!(%collection, %id, %err, "fetch failed");
                Err(err.to_string())
            }
        }
    }

    async fn unload(&self, item: &ItemKey) {
        let ItemKey::Doc { collection, id } = item else { return };
        if let Err(err) = self.docstore.unsubscribe(collection, id).await {
            warn!(%collection, %id, %err, "unsubscribe failed");
        }
        let path = PathBuf::root().push(collection.as_str()).push(id.as_str());
        self.mutator.clear_remote(&path).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docstore::{DocLifecycle, DocStoreError, Op};
    use crate::value::Value;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct StaticDocStore {
        docs: StdMutex<HashMap<(String, String), Value>>,
    }

    #[async_trait]
    impl DocStore for StaticDocStore {
        async fn fetch(&self, collection: &str, id: &str) -> Result<Option<Value>, DocStoreError> {
            Ok(self.docs.lock().unwrap().get(&(collection.to_string(), id.to_string())).cloned())
        }
        async fn subscribe(&self, _collection: &str, _id: &str) -> Result<(), DocStoreError> {
            Ok(())
        }
        async fn unsubscribe(&self, _collection: &str, _id: &str) -> Result<(), DocStoreError> {
            Ok(())
        }
        async fn submit_op(&self, _collection: &str, _id: &str, _op: Op) -> Result<(), DocStoreError> {
            Ok(())
        }
        async fn submit_lifecycle(&self, _collection: &str, _id: &str, _change: DocLifecycle) -> Result<(), DocStoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn fetch_populates_tree_from_backend() {
        let store = Arc::new(StaticDocStore::default());
        store.docs.lock().unwrap().insert(("users".into(), "1".into()), Value::from("ada"));
        let model = Model::builder(store).unload_delay(Duration::from_millis(0)).build();

        let handle = model.root().at("users").at("1");
        handle.fetch().await.unwrap();
        model.when_nothing_pending().await;

        assert_eq!(handle.get().await, Some(Value::from("ada")));
    }

    #[tokio::test]
    async fn bundle_round_trips_through_model() {
        let store = Arc::new(StaticDocStore::default());
        let model = Model::builder(store).build();
        model.root().at("users").at("1").set("ada").await.unwrap();

        let data = model.bundle(Vec::new()).await.unwrap();
        let fresh_store = Arc::new(StaticDocStore::default());
        let fresh_model = Model::builder(fresh_store).build();
        fresh_model.unbundle(&data).await.unwrap();

        assert_eq!(fresh_model.root().at("users").at("1").get().await, Some(Value::from("ada")));
    }
}
