//! The in-memory document tree: `collection -> id -> Value`.
//!
//! `Tree` owns the authoritative, synchronous copy of every document a
//! [`crate::model::Model`] has loaded. All reads and writes go through
//! absolute [`PathBuf`]s whose first two segments address a collection and
//! a document id; everything past that addresses into the document's own
//! `Value` tree. There is no CRDT merge here: a write simply replaces
//! whatever was at a path, the same way a ShareDB/OT client's local
//! snapshot does between acknowledged ops.

use std::collections::HashMap;
use std::mem;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::path::{PathBuf, Segment};
use crate::value::Value;

/// Errors raised while reading or writing the tree.
#[derive(Debug, Error, PartialEq)]
pub enum TreeError {
    #[error("path '{path}' is too short to address a document (need at least collection.id)")]
    PathTooShort { path: String },

    #[error("path '{path}' addresses a {found} as if it were an object")]
    PathTypeMismatch { path: String, found: &'static str },

    #[error("path '{path}' addresses an array with a non-integer segment")]
    NotAnArrayIndex { path: String },

    #[error("path '{path}' index {index} is out of bounds for an array of length {len}")]
    IndexOutOfBounds { path: String, index: usize, len: usize },

    #[error("path '{path}' does not address a number")]
    NotANumber { path: String },

    #[error("document id '{found}' does not match the id implied by the target path '{expected}'")]
    IdMismatch { expected: String, found: String },
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Text(_) => "string",
            Value::Date(_) => "date",
            Value::Array(_) => "array",
            Value::Map(_) => "object",
        }
    }
}

/// The full in-memory document store.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Tree {
    collections: HashMap<String, HashMap<String, Value>>,
}

fn split(path: &PathBuf) -> Result<(&Segment, &Segment, &[Segment]), TreeError> {
    let segs = path.segments();
    if segs.len() < 2 {
        return Err(TreeError::PathTooShort { path: path.to_string() });
    }
    Ok((&segs[0], &segs[1], &segs[2..]))
}

/// Walks `root` along `segs`, creating intermediate `Map` nodes (and
/// extending arrays by exactly one slot when a segment addresses one past
/// the end) as it goes. Returns an error if a non-terminal segment
/// addresses into a leaf value or an out-of-range array index.
fn navigate_create<'a>(root: &'a mut Value, segs: &[Segment], path: &PathBuf) -> Result<&'a mut Value, TreeError> {
    if segs.is_empty() {
        return Ok(root);
    }
    if root.is_null() {
        *root = Value::Map(HashMap::new());
    }
    match root {
        Value::Map(map) => {
            let key = segs[0].as_map_key();
            let child = map.entry(key).or_insert(Value::Null);
            navigate_create(child, &segs[1..], path)
        }
        Value::Array(arr) => {
            let idx = segs[0]
                .as_index()
                .ok_or_else(|| TreeError::NotAnArrayIndex { path: path.to_string() })?;
            if idx == arr.len() {
                arr.push(Value::Null);
            } else if idx > arr.len() {
                return Err(TreeError::IndexOutOfBounds {
                    path: path.to_string(),
                    index: idx,
                    len: arr.len(),
                });
            }
            navigate_create(&mut arr[idx], &segs[1..], path)
        }
        other => Err(TreeError::PathTypeMismatch {
            path: path.to_string(),
            found: other.type_name(),
        }),
    }
}

/// Walks `root` along `segs` without creating anything; returns `None` as
/// soon as a segment addresses a missing key or out-of-range index.
fn navigate_existing<'a>(root: &'a mut Value, segs: &[Segment]) -> Option<&'a mut Value> {
    if segs.is_empty() {
        return Some(root);
    }
    match root {
        Value::Map(map) => map.get_mut(&segs[0].as_map_key()).and_then(|child| navigate_existing(child, &segs[1..])),
        Value::Array(arr) => segs[0]
            .as_index()
            .and_then(|idx| arr.get_mut(idx))
            .and_then(|child| navigate_existing(child, &segs[1..])),
        _ => None,
    }
}

fn lookup_within<'a>(root: &'a Value, segs: &[Segment]) -> Option<&'a Value> {
    if segs.is_empty() {
        return Some(root);
    }
    match root {
        Value::Map(map) => map.get(&segs[0].as_map_key()).and_then(|child| lookup_within(child, &segs[1..])),
        Value::Array(arr) => segs[0]
            .as_index()
            .and_then(|idx| arr.get(idx))
            .and_then(|child| lookup_within(child, &segs[1..])),
        _ => None,
    }
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the document at `collection`/`id` exists.
    pub fn has_doc(&self, collection: &str, id: &str) -> bool {
        self.collections.get(collection).is_some_and(|c| c.contains_key(id))
    }

    /// Every document id currently resident in `collection`.
    pub fn doc_ids(&self, collection: &str) -> Vec<String> {
        self.collections.get(collection).map(|c| c.keys().cloned().collect()).unwrap_or_default()
    }

    /// Reads the value at `path` without copying, or `None` if any segment
    /// along the way is missing.
    pub fn lookup(&self, path: &PathBuf) -> Result<Option<&Value>, TreeError> {
        let (collection, id, rest) = split(path)?;
        let doc = self.collections.get(&collection.as_map_key()).and_then(|c| c.get(&id.as_map_key()));
        Ok(doc.and_then(|d| lookup_within(d, rest)))
    }

    /// Clones the value at `path`. See the crate-level design notes on why
    /// this coincides with [`Tree::get_deep_copy`] for this owned, Rc-free
    /// tree representation: both return a value the caller may mutate
    /// freely without it aliasing the tree's own copy.
    pub fn get_copy(&self, path: &PathBuf) -> Result<Option<Value>, TreeError> {
        Ok(self.lookup(path)?.cloned())
    }

    /// Deep, fully independent clone of the value at `path`.
    pub fn get_deep_copy(&self, path: &PathBuf) -> Result<Option<Value>, TreeError> {
        self.get_copy(path)
    }

    /// Sets `path` to `value`, creating intermediate objects as needed.
    /// Returns the value that was previously there, if any.
    pub fn set_at(&mut self, path: &PathBuf, value: Value) -> Result<Option<Value>, TreeError> {
        let (collection, id, rest) = split(path)?;
        let doc = self
            .collections
            .entry(collection.as_map_key())
            .or_default()
            .entry(id.as_map_key())
            .or_insert(Value::Map(HashMap::new()));
        let slot = navigate_create(doc, rest, path)?;
        Ok(Some(mem::replace(slot, value)))
    }

    /// Removes whatever is at `path`. Returns the removed value, or `None`
    /// if nothing was there.
    pub fn del_at(&mut self, path: &PathBuf) -> Result<Option<Value>, TreeError> {
        let (collection, id, rest) = split(path)?;
        let Some(doc) = self.collections.get_mut(&collection.as_map_key()).and_then(|c| c.get_mut(&id.as_map_key())) else {
            return Ok(None);
        };
        if rest.is_empty() {
            return Ok(self
                .collections
                .get_mut(&collection.as_map_key())
                .and_then(|c| c.remove(&id.as_map_key())));
        }
        let (parent_segs, last) = rest.split_at(rest.len() - 1);
        let Some(parent) = navigate_existing(doc, parent_segs) else {
            return Ok(None);
        };
        match parent {
            Value::Map(map) => Ok(map.remove(&last[0].as_map_key())),
            Value::Array(arr) => match last[0].as_index() {
                Some(idx) if idx < arr.len() => Ok(Some(arr.remove(idx))),
                _ => Ok(None),
            },
            _ => Ok(None),
        }
    }

    /// Splices `insert` into the array at `path`, removing `remove_count`
    /// elements starting at `index` first. Creates the array if `path` is
    /// currently absent or null. Returns the removed elements.
    pub fn splice_at(
        &mut self,
        path: &PathBuf,
        index: usize,
        remove_count: usize,
        insert: Vec<Value>,
    ) -> Result<Vec<Value>, TreeError> {
        let (collection, id, rest) = split(path)?;
        let doc = self
            .collections
            .entry(collection.as_map_key())
            .or_default()
            .entry(id.as_map_key())
            .or_insert(Value::Map(HashMap::new()));
        let slot = navigate_create(doc, rest, path)?;
        if slot.is_null() {
            *slot = Value::Array(Vec::new());
        }
        let Value::Array(arr) = slot else {
            return Err(TreeError::PathTypeMismatch {
                path: path.to_string(),
                found: slot.type_name(),
            });
        };
        let end = (index + remove_count).min(arr.len());
        let start = index.min(arr.len()).min(end);
        let removed: Vec<Value> = arr.splice(start..end, insert).collect();
        Ok(removed)
    }

    /// Adds `by` to the number at `path` (treating an absent or null value
    /// as zero) and returns the new value.
    pub fn increment_at(&mut self, path: &PathBuf, by: f64) -> Result<f64, TreeError> {
        let (collection, id, rest) = split(path)?;
        let doc = self
            .collections
            .entry(collection.as_map_key())
            .or_default()
            .entry(id.as_map_key())
            .or_insert(Value::Map(HashMap::new()));
        let slot = navigate_create(doc, rest, path)?;
        let current = match slot {
            Value::Null => 0.0,
            Value::Number(n) => n.as_f64().ok_or_else(|| TreeError::NotANumber { path: path.to_string() })?,
            _ => return Err(TreeError::NotANumber { path: path.to_string() }),
        };
        let updated = current + by;
        *slot = Value::from(updated);
        Ok(updated)
    }
}
