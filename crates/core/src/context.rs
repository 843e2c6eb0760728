//! Identity types shared by the load coordinator, query handles, and
//! scoped handles: which named scope a load belongs to, and which item
//! (document or query) is being addressed.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::path::PathBuf;

/// A named loading scope. Handles created under the same context share
/// reference counts for the items they load; unloading a context (see
/// [`crate::load::LoadCoordinator::unload_context`]) releases every
/// reference it holds in one step, the way closing a page unloads
/// everything that page subscribed to without touching a sibling page's
/// subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(String);

impl ContextId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// A fresh, process-unique context id for handles that never call
    /// `.context(name)` explicitly.
    pub fn anonymous() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("_anon{n}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The identity of a loadable item: a single document, or a query's
/// stable result set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKey {
    Doc { collection: String, id: String },
    Query { collection: String, hash: u64 },
}

impl ItemKey {
    pub fn doc(collection: impl Into<String>, id: impl Into<String>) -> Self {
        ItemKey::Doc { collection: collection.into(), id: id.into() }
    }

    pub fn query(collection: impl Into<String>, hash: u64) -> Self {
        ItemKey::Query { collection: collection.into(), hash }
    }

    /// The tree path a document item's data lives at. Queries have no
    /// single tree path; their membership lives in the `QueryHandle`.
    pub fn doc_path(&self) -> Option<PathBuf> {
        match self {
            ItemKey::Doc { collection, id } => Some(PathBuf::root().push(collection.as_str()).push(id.as_str())),
            ItemKey::Query { .. } => None,
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKey::Doc { collection, id } => write!(f, "{collection}.{id}"),
            ItemKey::Query { collection, hash } => write!(f, "{collection}?{hash:x}"),
        }
    }
}
