//! Scoped handles: the public, composition-based lens applications reach
//! for to read and write the tree.
//!
//! A `Handle` pairs an absolute [`PathBuf`] with a shared [`Mutator`], a
//! [`LoadCoordinator`], and a small set of flags (`silent`/`pass`/
//! `prevent_compose`/context). It is cheap to clone — cloning shares the
//! same underlying engine — and every navigation method (`at`, `scope`,
//! `parent`) returns a new `Handle` rather than mutating the receiver, the
//! same "lens over shared state" shape as the teacher's `ValueEditor`
//! generalized from a borrow to an owned, cloneable value.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use uuid::Uuid;

use crate::context::{ContextId, ItemKey};
use crate::load::{LoadCoordinator, LoadError, LoadKind};
use crate::mutator::{MutateOptions, Mutator, MutatorError};
use crate::path::{PathBuf, SubPath};
use crate::query::{QueryHandle, QuerySpec};
use crate::value::Value;

/// Per-handle write flags, threaded into every mutation issued through
/// this handle until overridden.
#[derive(Debug, Clone, Default)]
pub struct HandleFlags {
    pub silent: bool,
    pub pass: bool,
    pub prevent_compose: bool,
    /// Tags every event this handle emits, so a `silent` sibling's
    /// listeners registered under the same tag still hear it
    /// (`spec.md` §3, §4.3, §4.5).
    pub event_context: Option<String>,
}

impl From<HandleFlags> for MutateOptions {
    fn from(flags: HandleFlags) -> Self {
        MutateOptions {
            silent: flags.silent,
            pass: flags.pass,
            prevent_compose: flags.prevent_compose,
            event_context: flags.event_context,
        }
    }
}

/// A scoped view over the tree at one absolute path.
#[derive(Clone)]
pub struct Handle {
    mutator: Arc<Mutator>,
    loads: Arc<LoadCoordinator>,
    path: PathBuf,
    context: ContextId,
    flags: HandleFlags,
}

impl Handle {
    pub(crate) fn new(mutator: Arc<Mutator>, loads: Arc<LoadCoordinator>, path: PathBuf, context: ContextId) -> Self {
        Self { mutator, loads, path, context, flags: HandleFlags::default() }
    }

    /// This handle's absolute path.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// The last path segment, stringified — the conventional "id" of
    /// whatever this handle addresses.
    pub fn leaf_segment(&self) -> Option<String> {
        self.path.last().map(|seg| seg.to_string())
    }

    /// A freshly generated v4 UUID as a lowercase hyphenated hex string.
    /// Stateless — every call mints a new identifier; callers use it to
    /// name a new document before writing it (e.g. via [`Handle::add`]).
    pub fn id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    pub fn context_id(&self) -> &ContextId {
        &self.context
    }

    // --- Navigation -----------------------------------------------------

    /// Returns a handle scoped to `sub`, relative to this handle's path.
    pub fn at(&self, sub: impl Into<SubPath>) -> Handle {
        Handle { path: self.path.clone().push(sub), ..self.clone() }
    }

    /// Returns a handle scoped to an absolute path, ignoring this
    /// handle's own path entirely.
    pub fn scope(&self, absolute: impl Into<SubPath>) -> Handle {
        Handle { path: PathBuf::root().push(absolute), ..self.clone() }
    }

    /// Returns a handle `levels` segments up from this one, or a root
    /// handle if `levels` exceeds this path's depth.
    pub fn parent(&self, levels: usize) -> Handle {
        let mut path = self.path.clone();
        for _ in 0..levels {
            match path.parent() {
                Some(p) => path = p,
                None => break,
            }
        }
        Handle { path, ..self.clone() }
    }

    /// The final segment of this handle's path as a [`Value`], or `Null`
    /// at the root.
    pub fn leaf(&self) -> Value {
        self.path.last().map(|seg| seg.to_string().into()).unwrap_or(Value::Null)
    }

    /// Returns a handle bound to a different loading context; subsequent
    /// `fetch`/`subscribe` calls refcount against the new context.
    pub fn context(&self, id: impl Into<String>) -> Handle {
        Handle { context: ContextId::new(id), ..self.clone() }
    }

    pub fn with_flags(&self, flags: HandleFlags) -> Handle {
        Handle { flags, ..self.clone() }
    }

    pub fn silent(&self) -> Handle {
        self.with_flags(HandleFlags { silent: true, ..self.flags.clone() })
    }

    pub fn pass(&self) -> Handle {
        self.with_flags(HandleFlags { pass: true, ..self.flags.clone() })
    }

    pub fn prevent_compose(&self) -> Handle {
        self.with_flags(HandleFlags { prevent_compose: true, ..self.flags.clone() })
    }

    /// Tags this handle's emitted events for `silent`'s listener-matching
    /// rule (`spec.md` §4.5): a `silent()` handle's writes still reach
    /// listeners registered with the same `event_context`.
    pub fn event_context(&self, id: impl Into<String>) -> Handle {
        self.with_flags(HandleFlags { event_context: Some(id.into()), ..self.flags.clone() })
    }

    fn opts(&self) -> MutateOptions {
        self.flags.clone().into()
    }

    // --- Reads ------------------------------------------------------------

    /// Reads the value at this handle's path, if present.
    pub async fn get(&self) -> Option<Value> {
        self.mutator.with_tree(|tree| tree.lookup(&self.path).ok().flatten().cloned()).await
    }

    pub async fn get_at(&self, sub: impl Into<SubPath>) -> Option<Value> {
        self.at(sub).get().await
    }

    /// A clone of the value at this handle's path. See [`crate::tree::Tree::get_copy`].
    pub async fn get_copy(&self) -> Option<Value> {
        self.mutator.with_tree(|tree| tree.get_copy(&self.path).ok().flatten()).await
    }

    /// A fully independent clone of the value at this handle's path.
    pub async fn get_deep_copy(&self) -> Option<Value> {
        self.mutator.with_tree(|tree| tree.get_deep_copy(&self.path).ok().flatten()).await
    }

    // --- Writes -------------------------------------------------------

    pub async fn set(&self, value: impl Into<Value>) -> Result<Option<Value>, MutatorError> {
        self.mutator.set(&self.path, value.into(), self.opts()).await
    }

    pub async fn set_at(&self, sub: impl Into<SubPath>, value: impl Into<Value>) -> Result<Option<Value>, MutatorError> {
        self.at(sub).set(value).await
    }

    pub async fn set_diff(&self, value: impl Into<Value>) -> Result<Option<Value>, MutatorError> {
        self.mutator.set_diff(&self.path, value.into(), self.opts()).await
    }

    /// Writes only if `value` differs structurally from the current
    /// value, recursing into nested arrays/maps rather than `set_diff`'s
    /// top-level comparison. See [`crate::mutator::Mutator::set_diff_deep`]
    /// for why both compare identically against this tree's owned values.
    pub async fn set_diff_deep(&self, value: impl Into<Value>) -> Result<Option<Value>, MutatorError> {
        self.mutator.set_diff_deep(&self.path, value.into(), self.opts()).await
    }

    pub async fn set_null(&self, value: impl Into<Value>) -> Result<Option<Value>, MutatorError> {
        self.mutator.set_null(&self.path, value.into(), self.opts()).await
    }

    pub async fn del(&self) -> Result<Option<Value>, MutatorError> {
        self.mutator.del(&self.path, self.opts()).await
    }

    pub async fn del_at(&self, sub: impl Into<SubPath>) -> Result<Option<Value>, MutatorError> {
        self.at(sub).del().await
    }

    pub async fn increment(&self, by: f64) -> Result<f64, MutatorError> {
        self.mutator.increment(&self.path, by, self.opts()).await
    }

    pub async fn push(&self, value: impl Into<Value>) -> Result<usize, MutatorError> {
        self.mutator.push(&self.path, value.into(), self.opts()).await
    }

    /// Inserts `items` starting at `index`, shifting whatever followed to
    /// the right. Returns the array's new length.
    pub async fn insert(&self, index: usize, items: Vec<Value>) -> Result<usize, MutatorError> {
        self.mutator.insert(&self.path, index, items, self.opts()).await
    }

    pub async fn remove(&self, index: usize, count: usize) -> Result<Vec<Value>, MutatorError> {
        self.mutator.remove(&self.path, index, count, self.opts()).await
    }

    /// Creates a new document in the collection this handle addresses.
    /// Returns a handle scoped to the new document.
    pub async fn add(&self, doc: impl Into<Value>) -> Result<Handle, MutatorError> {
        let collection = self.leaf_segment().unwrap_or_default();
        let id = self.mutator.add(&collection, doc.into(), self.opts()).await?;
        Ok(self.scope(PathBuf::root().push(collection.as_str()).push(id.as_str())))
    }

    // --- Load coordination --------------------------------------------

    fn doc_item(&self) -> Option<ItemKey> {
        let segs = self.path.segments();
        if segs.len() < 2 {
            return None;
        }
        Some(ItemKey::doc(segs[0].as_map_key(), segs[1].as_map_key()))
    }

    /// References this handle's document for the lifetime of the load
    /// (a transient fetch: pair with [`Handle::unfetch`]).
    pub async fn fetch(&self) -> Result<(), LoadError> {
        let Some(item) = self.doc_item() else { return Ok(()) };
        self.loads.acquire(&self.context, &item, LoadKind::Fetch).await
    }

    /// References this handle's document and keeps it live-updated until
    /// [`Handle::unsubscribe`] releases it. Counted separately from
    /// [`Handle::fetch`]'s refcount (summed for residency, `spec.md`
    /// §4.6), so a subscribe outlives any concurrent fetch on the same
    /// document.
    pub async fn subscribe(&self) -> Result<(), LoadError> {
        let Some(item) = self.doc_item() else { return Ok(()) };
        self.loads.acquire(&self.context, &item, LoadKind::Subscribe).await
    }

    pub fn unfetch(&self) {
        if let Some(item) = self.doc_item() {
            self.loads.release(&self.context, &item, LoadKind::Fetch);
        }
    }

    pub fn unsubscribe(&self) {
        if let Some(item) = self.doc_item() {
            self.loads.release(&self.context, &item, LoadKind::Subscribe);
        }
    }

    /// Releases every reference this handle's context holds, across every
    /// item it has loaded.
    pub fn unload(&self) {
        self.loads.unload_context(&self.context);
    }

    pub fn unload_all(&self) {
        self.unload();
    }

    pub async fn when_nothing_pending(&self) {
        self.loads.when_nothing_pending().await;
    }

    // --- Queries --------------------------------------------------------

    /// Builds a [`QueryHandle`] against the collection this handle
    /// addresses and references it for loading under this handle's
    /// context.
    pub async fn query(&self, expression: JsonValue, options: JsonValue) -> Result<QueryHandle, LoadError> {
        let collection = self.leaf_segment().unwrap_or_default();
        let spec = QuerySpec::new(collection, expression, options);
        let item = spec.item_key().map_err(|e| LoadError::Backend { item: ItemKey::query("", 0), message: e.to_string() })?;
        self.loads.acquire(&self.context, &item, LoadKind::Fetch).await?;
        Ok(QueryHandle::new(spec, self.mutator.clone()))
    }
}
