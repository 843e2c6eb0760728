//! The external OT document backend interface.
//!
//! `DocStore` is the seam between Racer's in-memory tree and whatever
//! actually owns document convergence (a ShareDB-style server, a local
//! embedded OT engine, or a test double). Racer never resolves concurrent
//! writes itself; it forwards every mutation downstream as a JSON0-shaped
//! [`Op`] and trusts the backend to reconcile it, then applies whatever the
//! backend eventually confirms.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::path::PathBuf;
use crate::value::Value;

/// A JSON0-compatible operation, addressed by an absolute path into a
/// single document (the path's first two segments select the collection
/// and document id; the op's own `p` field addresses within the document
/// past that, mirroring ShareDB's json0 component paths).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Op {
    /// Path within the document (excludes the collection/id prefix).
    pub p: Vec<PathComponent>,
    #[serde(flatten)]
    pub kind: OpKind,
    /// Hint to the backend not to compose this op with an adjacent one
    /// (`spec.md` §4.3's `preventCompose`). Defaults to `false` so a
    /// backend that doesn't care can ignore the field entirely.
    #[serde(default, rename = "c", skip_serializing_if = "is_false")]
    pub prevent_compose: bool,
}

fn is_false(b: &bool) -> bool {
    !b
}

/// A single path component as encoded on the wire: JSON0 uses bare numbers
/// for array indices and strings for object keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathComponent {
    Key(String),
    Index(u64),
}

impl From<&crate::path::Segment> for PathComponent {
    fn from(value: &crate::path::Segment) -> Self {
        match value {
            crate::path::Segment::Str(s) => PathComponent::Key(s.clone()),
            crate::path::Segment::Int(n) => PathComponent::Index(*n),
        }
    }
}

impl From<&PathComponent> for crate::path::Segment {
    fn from(value: &PathComponent) -> Self {
        match value {
            PathComponent::Key(s) => crate::path::Segment::Str(s.clone()),
            PathComponent::Index(n) => crate::path::Segment::Int(*n),
        }
    }
}

/// The JSON0 operation shapes Racer emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OpKind {
    /// Object/scalar insert-or-replace: `{oi, od?}`.
    #[serde(rename = "object-replace")]
    ObjectReplace { oi: Value, od: Option<Value> },
    /// Object delete: `{od}`.
    #[serde(rename = "object-delete")]
    ObjectDelete { od: Value },
    /// List insert: `{li}`.
    #[serde(rename = "list-insert")]
    ListInsert { li: Value },
    /// List delete: `{ld}`.
    #[serde(rename = "list-delete")]
    ListDelete { ld: Value },
    /// List replace: `{li, ld}`.
    #[serde(rename = "list-replace")]
    ListReplace { li: Value, ld: Value },
    /// Numeric add: `{na}`.
    #[serde(rename = "number-add")]
    NumberAdd { na: f64 },
    /// Subtype list move: `{lm}`.
    #[serde(rename = "list-move")]
    ListMove { lm: u64 },
}

/// A whole-document create or delete, forwarded outside the per-path `Op`
/// stream because it changes whether the document exists at all.
#[derive(Debug, Clone, PartialEq)]
pub enum DocLifecycle {
    Create(Value),
    Delete,
}

/// The external OT backend Racer's [`crate::mutator::Mutator`] forwards
/// every write to.
///
/// Implementations are expected to be cheap to clone/share (an `Arc`
/// wrapping a connection, typically) since a [`crate::model::Model`] holds
/// one for its whole lifetime. Errors here are logged and surfaced to the
/// caller but never roll back the local tree: OT reconciliation is the
/// backend's job, not the in-memory model's.
#[async_trait]
pub trait DocStore: Send + Sync {
    /// Fetches the current full snapshot of a document, if it exists.
    async fn fetch(&self, collection: &str, id: &str) -> Result<Option<Value>, DocStoreError>;

    /// Subscribes to future ops for a document; the backend is expected to
    /// deliver them out of band (e.g. over a push channel wired up
    /// elsewhere) rather than through this call's return value.
    async fn subscribe(&self, collection: &str, id: &str) -> Result<(), DocStoreError>;

    /// Cancels a previous subscription.
    async fn unsubscribe(&self, collection: &str, id: &str) -> Result<(), DocStoreError>;

    /// Forwards a single JSON0 op for an existing document.
    async fn submit_op(&self, collection: &str, id: &str, op: Op) -> Result<(), DocStoreError>;

    /// Forwards a whole-document create or delete.
    async fn submit_lifecycle(&self, collection: &str, id: &str, change: DocLifecycle) -> Result<(), DocStoreError>;
}

/// Errors a [`DocStore`] implementation may report back to Racer.
#[derive(Debug, thiserror::Error)]
pub enum DocStoreError {
    #[error("backend rejected the operation: {0}")]
    Rejected(String),

    #[error("backend is unreachable: {0}")]
    Unreachable(String),
}
