//! A local, no-op `DocStore` stand-in for the demo CLI.
//!
//! The real OT backend (doc storage, op submission, pub/sub) is out of
//! scope for this crate (see `racer::docstore::DocStore`); the CLI only
//! needs something that accepts writes and never has anything to fetch,
//! since every invocation's state round-trips through the bundle file on
//! disk instead of a live backend connection.

use async_trait::async_trait;
use racer::docstore::{DocLifecycle, DocStore, DocStoreError, Op};
use racer::Value;
use tracing::debug;

#[derive(Default)]
pub struct LocalDocStore;

#[async_trait]
impl DocStore for LocalDocStore {
    async fn fetch(&self, _collection: &str, _id: &str) -> Result<Option<Value>, DocStoreError> {
        Ok(None)
    }

    async fn subscribe(&self, _collection: &str, _id: &str) -> Result<(), DocStoreError> {
        Ok(())
    }

    async fn unsubscribe(&self, _collection: &str, _id: &str) -> Result<(), DocStoreError> {
        Ok(())
    }

    async fn submit_op(&self, collection: &str, id: &str, op: Op) -> Result<(), DocStoreError> {
        debug!(%collection, %id, ?op, "op submitted to local store");
        Ok(())
    }

    async fn submit_lifecycle(&self, collection: &str, id: &str, change: DocLifecycle) -> Result<(), DocStoreError> {
        debug!(%collection, %id, ?change, "lifecycle change submitted to local store");
        Ok(())
    }
}
