//! Whole-model snapshotting: bundle the entire resident tree plus active
//! query memberships into one serializable blob, and restore it later.
//!
//! Unlike a per-document OT snapshot, a [`Bundle`] captures everything a
//! [`crate::model::Model`] currently holds in memory — useful for
//! server-side render handoff (serialize on the server, `unbundle` in the
//! browser) the same way the teacher's persistence layer round-trips a
//! whole store through `serde_json`.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::load::ContextSnapshot;
use crate::query::QuerySpec;
use crate::tree::Tree;

/// Errors raised while restoring a bundle.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("bundle is corrupt: {reason}")]
    CorruptBundle { reason: String },

    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The current membership of one query, captured for a bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySnapshot {
    pub spec: QuerySpec,
    pub ids: Vec<String>,
}

/// A complete, self-contained capture of a model's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    /// Bundle format version; bumped if the shape below changes
    /// incompatibly.
    pub version: u32,
    pub tree: Tree,
    pub queries: Vec<QuerySnapshot>,
    /// Fetch/subscribe refcounts per context, so `unbundle` can re-initiate
    /// loads to match what was resident when the bundle was captured
    /// (`spec.md` §4.8).
    pub contexts: Vec<ContextSnapshot>,
    /// Reserved for derived-view state (refs/refLists/fns/filters,
    /// `spec.md` §6) this engine does not compute itself; always empty.
    #[serde(default)]
    pub refs: JsonValue,
    #[serde(default, rename = "refLists")]
    pub ref_lists: JsonValue,
    #[serde(default)]
    pub fns: JsonValue,
    #[serde(default)]
    pub filters: JsonValue,
}

const BUNDLE_VERSION: u32 = 2;

/// Serializes and deserializes [`Bundle`]s.
pub struct SnapshotCodec;

impl SnapshotCodec {
    /// Captures `tree`, `contexts`, and `queries` into a single JSON bundle
    /// string.
    pub fn bundle(tree: &Tree, contexts: Vec<ContextSnapshot>, queries: Vec<QuerySnapshot>) -> Result<String, SnapshotError> {
        let bundle = Bundle {
            version: BUNDLE_VERSION,
            tree: tree.clone(),
            queries,
            contexts,
            refs: JsonValue::Object(Default::default()),
            ref_lists: JsonValue::Object(Default::default()),
            fns: JsonValue::Object(Default::default()),
            filters: JsonValue::Object(Default::default()),
        };
        Ok(serde_json::to_string(&bundle)?)
    }

    /// Restores a previously captured bundle.
    pub fn unbundle(data: &str) -> Result<Bundle, SnapshotError> {
        let bundle: Bundle = serde_json::from_str(data).map_err(|e| SnapshotError::CorruptBundle { reason: e.to_string() })?;
        if bundle.version != BUNDLE_VERSION {
            return Err(SnapshotError::CorruptBundle {
                reason: format!("unsupported bundle version {} (expected {BUNDLE_VERSION})", bundle.version),
            });
        }
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use crate::value::Value;
    use serde_json::json;

    #[test]
    fn bundle_round_trips_tree_contents() {
        let mut tree = Tree::new();
        tree.set_at(&path!("users", "1", "name"), Value::from("ada")).unwrap();

        let data = SnapshotCodec::bundle(&tree, Vec::new(), Vec::new()).unwrap();
        let restored = SnapshotCodec::unbundle(&data).unwrap();

        assert_eq!(restored.tree.lookup(&path!("users", "1", "name")).unwrap(), Some(&Value::from("ada")));
        assert!(restored.contexts.is_empty());
    }

    #[test]
    fn bundle_round_trips_context_refcounts() {
        use crate::context::ItemKey;
        use crate::load::ItemRefcount;

        let tree = Tree::new();
        let contexts = vec![ContextSnapshot {
            context: "page".to_string(),
            items: vec![ItemRefcount { item: ItemKey::doc("users", "1"), fetches: 0, subscribes: 2 }],
        }];

        let data = SnapshotCodec::bundle(&tree, contexts, Vec::new()).unwrap();
        let restored = SnapshotCodec::unbundle(&data).unwrap();

        assert_eq!(restored.contexts.len(), 1);
        assert_eq!(restored.contexts[0].items[0].subscribes, 2);
    }

    #[test]
    fn unbundle_rejects_garbage() {
        let err = SnapshotCodec::unbundle("not json").unwrap_err();
        assert!(matches!(err, SnapshotError::CorruptBundle { .. }));
    }

    #[test]
    fn unbundle_rejects_future_version() {
        let data = json!({"version": 999, "tree": {"collections": {}}, "queries": [], "contexts": []}).to_string();
        let err = SnapshotCodec::unbundle(&data).unwrap_err();
        assert!(matches!(err, SnapshotError::CorruptBundle { .. }));
    }
}
