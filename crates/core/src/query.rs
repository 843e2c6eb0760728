//! Client-side query handles.
//!
//! A `QueryHandle` names a live result set: a collection plus a query
//! expression and options, addressed by a hash stable for the lifetime of
//! one process (see [`crate::context::ItemKey::Query`]). The hash is never
//! persisted as identity across processes — a [`crate::snapshot::Bundle`]
//! stores the `(collection, expression, options)` triple itself and
//! recomputes the hash on restore — so `DefaultHasher`'s lack of a
//! cross-version stability guarantee is not a correctness concern here.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::context::ItemKey;
use crate::mutator::Mutator;
use crate::path::PathBuf;
use crate::value::Value;

/// Errors raised while constructing or hashing a query.
#[derive(Debug, Error, PartialEq)]
pub enum QueryError {
    #[error("query options are not serializable: {0}")]
    Unserializable(String),
}

/// A query's identity: the collection it runs against, the query
/// expression, and any options (sort, limit, skip). Two `QuerySpec`s that
/// serialize identically hash identically, regardless of `HashMap` key
/// order in `options` (options are sorted by key before hashing).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub collection: String,
    pub expression: JsonValue,
    pub options: JsonValue,
}

impl QuerySpec {
    pub fn new(collection: impl Into<String>, expression: JsonValue, options: JsonValue) -> Self {
        Self { collection: collection.into(), expression, options }
    }

    /// A hash stable for this process's lifetime, used as the query's
    /// `ItemKey` for load-coordinator refcounting.
    pub fn stable_hash(&self) -> Result<u64, QueryError> {
        let canonical = canonicalize(&self.expression);
        let canonical_options = canonicalize(&self.options);
        let mut hasher = DefaultHasher::new();
        self.collection.hash(&mut hasher);
        canonical.to_string().hash(&mut hasher);
        canonical_options.to_string().hash(&mut hasher);
        Ok(hasher.finish())
    }

    pub fn item_key(&self) -> Result<ItemKey, QueryError> {
        Ok(ItemKey::query(self.collection.clone(), self.stable_hash()?))
    }
}

/// Sorts object keys recursively so that structurally-equal JSON values
/// with differently-ordered keys hash identically.
fn canonicalize(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let mut entries: Vec<(&String, &JsonValue)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = serde_json::Map::new();
            for (k, v) in entries {
                out.insert(k.clone(), canonicalize(v));
            }
            JsonValue::Object(out)
        }
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// A live, named result set: the ids currently matching a [`QuerySpec`],
/// kept up to date by whatever mechanism the backend uses to push query
/// diffs (out of scope here; `QueryHandle` only tracks membership once
/// told about it).
pub struct QueryHandle {
    spec: QuerySpec,
    ids: Vec<String>,
    extra: Option<JsonValue>,
    mutator: Arc<Mutator>,
}

impl fmt::Debug for QueryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryHandle").field("spec", &self.spec).field("ids", &self.ids).field("extra", &self.extra).finish()
    }
}

impl Clone for QueryHandle {
    fn clone(&self) -> Self {
        Self { spec: self.spec.clone(), ids: self.ids.clone(), extra: self.extra.clone(), mutator: self.mutator.clone() }
    }
}

impl QueryHandle {
    pub fn new(spec: QuerySpec, mutator: Arc<Mutator>) -> Self {
        Self { spec, ids: Vec::new(), extra: None, mutator }
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    /// The document ids currently in this query's result set, in server
    /// order.
    pub fn get_ids(&self) -> &[String] {
        &self.ids
    }

    /// Materializes the query's full documents in backend-defined order
    /// (`spec.md` §4.7): whatever order `get_ids` currently holds, read
    /// live out of the tree. Ids with no resident document (not yet
    /// loaded, or since deleted) are skipped rather than producing a
    /// `Null` placeholder.
    pub async fn get(&self) -> Vec<Value> {
        let mut docs = Vec::with_capacity(self.ids.len());
        for id in &self.ids {
            let path = PathBuf::root().push(self.spec.collection.as_str()).push(id.as_str());
            if let Some(doc) = self.mutator.with_tree(|tree| tree.lookup(&path).ok().flatten().cloned()).await {
                docs.push(doc);
            }
        }
        docs
    }

    /// Extra metadata a query provider may attach (result counts, facets).
    pub fn get_extra(&self) -> Option<&JsonValue> {
        self.extra.as_ref()
    }

    /// Replaces the full result set, e.g. after an initial fetch or a
    /// server-pushed re-sort.
    pub fn set_ids(&mut self, ids: Vec<String>) {
        self.ids = ids;
    }

    pub fn set_extra(&mut self, extra: Option<JsonValue>) {
        self.extra = extra;
    }

    /// Inserts `id` at `index` if not already present.
    pub fn insert_id(&mut self, index: usize, id: String) {
        if self.ids.contains(&id) {
            return;
        }
        let index = index.min(self.ids.len());
        self.ids.insert(index, id);
    }

    /// Removes `id` from the result set, if present.
    pub fn remove_id(&mut self, id: &str) {
        self.ids.retain(|existing| existing != id);
    }
}
