//! The write pipeline shared by every mutating `Handle` method.
//!
//! Every mutation goes through the same seven steps: canonicalize the
//! target path (done by the caller before reaching here), read the value
//! currently there, compute the new value under the requested write mode,
//! apply it to the local tree, forward the change to the external
//! [`DocStore`] as a JSON0 op, emit a tree event, and resolve the
//! mutation's `Result` (the async-fn return is this crate's equivalent of
//! the callback-style completion notice other OT clients use). The local
//! apply never rolls back if the backend forward fails — by design, since
//! reconciling divergent writes is the backend's job, not this model's.
//!
//! Every docstore round trip (`forward_op`/`forward_lifecycle`) is bracketed
//! by [`PendingGate::begin`]/[`PendingGate::end`] on the same gate the
//! [`crate::load::LoadCoordinator`] uses for its own load/unload activity,
//! so [`crate::load::LoadCoordinator::when_nothing_pending`] also blocks
//! until every outstanding mutation has settled (`spec.md` §4.6).

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::docstore::{DocLifecycle, DocStore, DocStoreError, Op, OpKind, PathComponent};
use crate::event_bus::{Event, EventBus, EventKind};
use crate::load::PendingGate;
use crate::path::PathBuf;
use crate::tree::{Tree, TreeError};
use crate::value::Value;

/// Errors raised by a mutating operation.
#[derive(Debug, Error)]
pub enum MutatorError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("document id '{found}' does not match the id implied by path '{path}'")]
    IdMismatch { path: String, found: String },

    #[error("cannot add() a value that is not an object")]
    AddRequiresObject,
}

/// Per-call options threaded through from a `Handle`'s flags.
#[derive(Debug, Clone, Default)]
pub struct MutateOptions {
    /// Suppress this mutation's event for every listener whose own
    /// `event_context` doesn't match `event_context` below.
    pub silent: bool,
    /// Tag the emitted event so handlers that originated this write can
    /// recognize and ignore their own echo.
    pub pass: bool,
    /// Hint to the backend not to compose this op with an adjacent one.
    pub prevent_compose: bool,
    /// Labels the emitted event for `silent`'s listener-matching rule
    /// (`spec.md` §3, §4.3, §4.5).
    pub event_context: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetMode {
    Always,
    OnlyIfDifferent,
    OnlyIfNull,
}

// `setDiff` (strict inequality) and `setDiffDeep` (structural inequality)
// are distinct write modes in spec.md §4.3 because the source's documents
// can alias: two positions holding the same object *reference* compare
// strictly-equal without a deep walk. This tree owns every value outright
// (see the no-aliasing invariant in spec.md §3), so there is no reference
// identity weaker than structural equality to detect — `PartialEq` on
// `Value` already is the deep comparison. Both modes therefore run the
// same check; `set_diff_deep` stays a distinct entry point so callers who
// came from the spec's API keep a 1:1 mapping, and so a future `Value`
// representation that reintroduces sharing (e.g. an `Rc` leaf) has
// somewhere to plug in a cheaper strict check without touching callers.

/// Drives the read-compute-apply-forward-notify pipeline against a shared
/// [`Tree`], [`EventBus`], and [`DocStore`].
pub struct Mutator {
    tree: Mutex<Tree>,
    events: Arc<EventBus>,
    docstore: Arc<dyn DocStore>,
    pending: Arc<PendingGate>,
}

impl Mutator {
    pub fn new(tree: Tree, events: Arc<EventBus>, docstore: Arc<dyn DocStore>, pending: Arc<PendingGate>) -> Self {
        Self { tree: Mutex::new(tree), events, docstore, pending }
    }

    /// Borrows the tree for a read-only operation (`get`/`get_copy`/...).
    pub async fn with_tree<R>(&self, f: impl FnOnce(&Tree) -> R) -> R {
        let tree = self.tree.lock().await;
        f(&tree)
    }

    /// Direct, unsynchronized access used when restoring a [`crate::snapshot::Bundle`]
    /// or wiring up a freshly loaded document.
    pub async fn replace_tree(&self, tree: Tree) {
        *self.tree.lock().await = tree;
    }

    fn doc_path_components(path: &PathBuf) -> Result<(String, String, Vec<PathComponent>), MutatorError> {
        let segs = path.segments();
        if segs.len() < 2 {
            return Err(TreeError::PathTooShort { path: path.to_string() }.into());
        }
        let collection = segs[0].as_map_key();
        let id = segs[1].as_map_key();
        let op_path = segs[2..].iter().map(PathComponent::from).collect();
        Ok((collection, id, op_path))
    }

    async fn forward_op(&self, path: &PathBuf, kind: OpKind, prevent_compose: bool) {
        let Ok((collection, id, op_path)) = Self::doc_path_components(path) else { return };
        let op = Op { p: op_path, kind, prevent_compose };
        self.pending.begin();
        let result = self.docstore.submit_op(&collection, &id, op).await;
        self.pending.end();
        if let Err(err) = result {
            warn!(%path, %err, "docstore rejected op; local tree left as applied");
        }
    }

    fn emit(&self, kind: EventKind, path: PathBuf, value: Option<Value>, previous: Option<Value>, opts: MutateOptions) {
        self.events.emit(Event {
            kind,
            path,
            value,
            previous,
            passed: opts.pass,
            silent: opts.silent,
            event_context: opts.event_context,
            remote: false,
        });
    }

    #[instrument(skip(self, value, opts), fields(%path))]
    async fn set_internal(&self, path: &PathBuf, value: Value, mode: SetMode, opts: MutateOptions) -> Result<Option<Value>, MutatorError> {
        let (_, _, op_path) = Self::doc_path_components(path)?;
        if op_path.is_empty() {
            if let Value::Map(map) = &value {
                if let Some(Value::Text(found)) = map.get("id") {
                    let expected = path.segments()[1].as_map_key();
                    if found != &expected {
                        return Err(MutatorError::IdMismatch { path: path.to_string(), found: found.clone() });
                    }
                }
            }
        }

        let mut tree = self.tree.lock().await;
        let old = tree.lookup(path)?.cloned();

        match mode {
            SetMode::OnlyIfDifferent if old.as_ref() == Some(&value) => return Ok(old),
            SetMode::OnlyIfNull if !matches!(old, None | Some(Value::Null)) => return Ok(old),
            _ => {}
        }

        tree.set_at(path, value.clone())?;
        drop(tree);

        self.forward_op(path, OpKind::ObjectReplace { oi: value.clone(), od: old.clone() }, opts.prevent_compose).await;
        self.emit(EventKind::Set, path.clone(), Some(value), old.clone(), opts);
        Ok(old)
    }

    pub async fn set(&self, path: &PathBuf, value: Value, opts: MutateOptions) -> Result<Option<Value>, MutatorError> {
        self.set_internal(path, value, SetMode::Always, opts).await
    }

    /// Writes `value` only if it differs from what is currently there.
    pub async fn set_diff(&self, path: &PathBuf, value: Value, opts: MutateOptions) -> Result<Option<Value>, MutatorError> {
        self.set_internal(path, value, SetMode::OnlyIfDifferent, opts).await
    }

    /// Writes `value` only if it differs structurally from what is
    /// currently there. See the `SetMode` note above for why this runs
    /// the same check as [`Mutator::set_diff`] against this owned tree.
    pub async fn set_diff_deep(&self, path: &PathBuf, value: Value, opts: MutateOptions) -> Result<Option<Value>, MutatorError> {
        self.set_internal(path, value, SetMode::OnlyIfDifferent, opts).await
    }

    /// Writes `value` only if the current value is null or absent.
    pub async fn set_null(&self, path: &PathBuf, value: Value, opts: MutateOptions) -> Result<Option<Value>, MutatorError> {
        self.set_internal(path, value, SetMode::OnlyIfNull, opts).await
    }

    #[instrument(skip(self, opts), fields(%path))]
    pub async fn del(&self, path: &PathBuf, opts: MutateOptions) -> Result<Option<Value>, MutatorError> {
        let mut tree = self.tree.lock().await;
        let removed = tree.del_at(path)?;
        drop(tree);

        if let Some(old) = &removed {
            let (_, _, op_path) = Self::doc_path_components(path)?;
            if op_path.is_empty() {
                self.forward_lifecycle(path, DocLifecycle::Delete).await;
            } else {
                self.forward_op(path, OpKind::ObjectDelete { od: old.clone() }, opts.prevent_compose).await;
            }
            self.emit(EventKind::Del, path.clone(), None, removed.clone(), opts);
        }
        Ok(removed)
    }

    async fn forward_lifecycle(&self, path: &PathBuf, change: DocLifecycle) {
        let Ok((collection, id, _)) = Self::doc_path_components(path) else { return };
        self.pending.begin();
        let result = self.docstore.submit_lifecycle(&collection, &id, change).await;
        self.pending.end();
        if let Err(err) = result {
            warn!(%path, %err, "docstore rejected lifecycle change; local tree left as applied");
        }
    }

    #[instrument(skip(self, opts), fields(%path))]
    pub async fn increment(&self, path: &PathBuf, by: f64, opts: MutateOptions) -> Result<f64, MutatorError> {
        let mut tree = self.tree.lock().await;
        let new_value = tree.increment_at(path, by)?;
        drop(tree);

        self.forward_op(path, OpKind::NumberAdd { na: by }, opts.prevent_compose).await;
        self.emit(EventKind::Increment, path.clone(), Some(Value::from(new_value)), None, opts);
        Ok(new_value)
    }

    #[instrument(skip(self, value, opts), fields(%path))]
    pub async fn push(&self, path: &PathBuf, value: Value, opts: MutateOptions) -> Result<usize, MutatorError> {
        let mut tree = self.tree.lock().await;
        let len = tree.lookup(path)?.and_then(Value::as_array).map(|a| a.len()).unwrap_or(0);
        tree.splice_at(path, len, 0, vec![value.clone()])?;
        drop(tree);

        let index_path = path.clone().push(len as u64);
        self.forward_op(&index_path, OpKind::ListInsert { li: value.clone() }, opts.prevent_compose).await;
        self.emit(EventKind::Insert, path.clone(), Some(value), None, opts);
        Ok(len + 1)
    }

    /// Inserts one or many items starting at `index`, shifting whatever
    /// followed to the right. Returns the array's new length (`spec.md`
    /// §4.2's `insert(i, x|xs)`, §4.4's "`push`/`insert` return the new
    /// array length").
    #[instrument(skip(self, items, opts), fields(%path, count = items.len()))]
    pub async fn insert(&self, path: &PathBuf, index: usize, items: Vec<Value>, opts: MutateOptions) -> Result<usize, MutatorError> {
        let mut tree = self.tree.lock().await;
        let before = tree.lookup(path)?.and_then(Value::as_array).map(|a| a.len()).unwrap_or(0);
        tree.splice_at(path, index, 0, items.clone())?;
        drop(tree);

        for (offset, item) in items.iter().enumerate() {
            let index_path = path.clone().push((index + offset) as u64);
            self.forward_op(&index_path, OpKind::ListInsert { li: item.clone() }, opts.prevent_compose).await;
        }
        let new_len = before + items.len();
        self.emit(EventKind::Insert, path.clone(), Some(Value::Array(items)), None, opts);
        Ok(new_len)
    }

    #[instrument(skip(self, opts), fields(%path))]
    pub async fn remove(&self, path: &PathBuf, index: usize, count: usize, opts: MutateOptions) -> Result<Vec<Value>, MutatorError> {
        let mut tree = self.tree.lock().await;
        let removed = tree.splice_at(path, index, count, Vec::new())?;
        drop(tree);

        for value in &removed {
            let index_path = path.clone().push(index as u64);
            self.forward_op(&index_path, OpKind::ListDelete { ld: value.clone() }, opts.prevent_compose).await;
        }
        self.emit(EventKind::Remove, path.clone(), Some(Value::Array(removed.clone())), None, opts);
        Ok(removed)
    }

    /// Applies a value that arrived from the backend (a fetch response, a
    /// remote op) directly to the tree, skipping the forward-to-backend
    /// step — forwarding data that just came *from* the backend back to
    /// it would be a wasted round trip at best and a feedback loop at
    /// worst. The emitted event is marked `remote`.
    pub async fn apply_remote(&self, path: &PathBuf, value: Value) {
        let mut tree = self.tree.lock().await;
        let old = tree.lookup(path).ok().flatten().cloned();
        if tree.set_at(path, value.clone()).is_err() {
            return;
        }
        drop(tree);
        self.events.emit(Event {
            kind: EventKind::Set,
            path: path.clone(),
            value: Some(value),
            previous: old,
            passed: false,
            silent: false,
            event_context: None,
            remote: true,
        });
    }

    /// Removes a document the backend reported gone (e.g. on unload),
    /// without forwarding anything back.
    pub async fn clear_remote(&self, path: &PathBuf) {
        let mut tree = self.tree.lock().await;
        let Ok(Some(removed)) = tree.del_at(path) else { return };
        drop(tree);
        self.events.emit(Event {
            kind: EventKind::Del,
            path: path.clone(),
            value: None,
            previous: Some(removed),
            passed: false,
            silent: false,
            event_context: None,
            remote: true,
        });
    }

    /// Creates a new document in `collection`, generating a v4 UUID id if
    /// `doc` does not already carry one. Returns the id used.
    #[instrument(skip(self, doc, opts), fields(%collection))]
    pub async fn add(&self, collection: &str, mut doc: Value, opts: MutateOptions) -> Result<String, MutatorError> {
        let Value::Map(map) = &mut doc else {
            return Err(MutatorError::AddRequiresObject);
        };
        let id = match map.get("id") {
            Some(Value::Text(existing)) => existing.clone(),
            _ => {
                let generated = Uuid::new_v4().to_string();
                map.insert("id".to_string(), Value::Text(generated.clone()));
                generated
            }
        };

        let path = PathBuf::root().push(collection).push(id.as_str());
        let mut tree = self.tree.lock().await;
        tree.set_at(&path, doc.clone())?;
        drop(tree);

        self.forward_lifecycle(&path, DocLifecycle::Create(doc.clone())).await;
        self.emit(EventKind::Create, path, Some(doc), None, opts);
        Ok(id)
    }
}
