//! Racer: a synchronized, path-addressed, in-memory document tree for
//! real-time OT clients.
//!
//! A [`Model`] owns the tree, the event bus, and the load coordinator; it
//! hands out [`Handle`]s, cheap, cloneable, path-scoped lenses over that
//! shared state. Every mutation issued through a handle runs the same
//! pipeline: canonicalize the path, read the old value, apply the new one
//! to the tree, forward it to the external [`DocStore`] as a JSON0 op, and
//! emit an event to anything listening on a prefix of the path. Racer
//! never resolves concurrent writes itself — that's the `DocStore`'s job.
//!
//! ```
//! use std::sync::Arc;
//! use racer::docstore::{DocLifecycle, DocStore, DocStoreError, Op};
//! use racer::value::Value;
//! use racer::Model;
//!
//! struct NullDocStore;
//!
//! #[async_trait::async_trait]
//! impl DocStore for NullDocStore {
//!     async fn fetch(&self, _c: &str, _id: &str) -> Result<Option<Value>, DocStoreError> { Ok(None) }
//!     async fn subscribe(&self, _c: &str, _id: &str) -> Result<(), DocStoreError> { Ok(()) }
//!     async fn unsubscribe(&self, _c: &str, _id: &str) -> Result<(), DocStoreError> { Ok(()) }
//!     async fn submit_op(&self, _c: &str, _id: &str, _op: Op) -> Result<(), DocStoreError> { Ok(()) }
//!     async fn submit_lifecycle(&self, _c: &str, _id: &str, _change: DocLifecycle) -> Result<(), DocStoreError> { Ok(()) }
//! }
//!
//! # async fn run() {
//! let model = Model::builder(Arc::new(NullDocStore)).build();
//! let users = model.root().at("users");
//! users.at("1").set("ada").await.unwrap();
//! assert_eq!(users.at("1").get().await, Some(Value::from("ada")));
//! # }
//! ```

pub mod context;
pub mod docstore;
pub mod error;
pub mod event_bus;
pub mod handle;
pub mod load;
pub mod model;
pub mod mutator;
pub mod path;
pub mod query;
pub mod snapshot;
pub mod tree;
pub mod value;

pub use error::{Error, Result};
pub use handle::{Handle, HandleFlags};
pub use model::{Model, ModelBuilder};
pub use path::{canonical, may_impact, PathBuf, Segment, SubPath};
pub use value::Value;
