//! Path algebra: normalizing subpath arguments into canonical segment
//! sequences, and the prefix relations used by event dispatch.
//!
//! A [`PathBuf`] is the canonical, absolute address of a tree position: an
//! ordered sequence of [`Segment`]s. Segments may be addressed with dots in
//! a string ("a.b.2") or built up one component at a time; both forms
//! normalize to the same segment array, and integer-looking string
//! components are coerced to numeric segments (array-index coercion).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single component of a [`PathBuf`]: either a string key (object/
/// collection/document-id component) or a non-negative integer (array
/// index).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Segment {
    /// A string key.
    Str(String),
    /// A non-negative array index.
    Int(u64),
}

impl Segment {
    /// Returns the string form of this segment, as used to index into a
    /// `Value::Map` (both string and integer segments address map keys by
    /// their decimal string form).
    pub fn as_map_key(&self) -> String {
        match self {
            Segment::Str(s) => s.clone(),
            Segment::Int(n) => n.to_string(),
        }
    }

    /// Returns the array index this segment addresses, if it is numeric.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Segment::Int(n) => Some(*n as usize),
            Segment::Str(_) => None,
        }
    }

    /// Returns true if this is a string component that contains a dot,
    /// which is disallowed for collection and document-id components.
    pub fn contains_dot(&self) -> bool {
        matches!(self, Segment::Str(s) if s.contains('.'))
    }

    /// Parses a raw string component, coercing integer-looking strings
    /// (matching `^[0-9]+$`) to [`Segment::Int`].
    fn from_component(s: &str) -> Segment {
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = s.parse::<u64>() {
                return Segment::Int(n);
            }
        }
        Segment::Str(s.to_string())
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Str(s) => write!(f, "{s}"),
            Segment::Int(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for Segment {
    fn from(value: &str) -> Self {
        Segment::from_component(value)
    }
}

impl From<String> for Segment {
    fn from(value: String) -> Self {
        Segment::from_component(&value)
    }
}

impl From<u64> for Segment {
    fn from(value: u64) -> Self {
        Segment::Int(value)
    }
}

impl From<usize> for Segment {
    fn from(value: usize) -> Self {
        Segment::Int(value as u64)
    }
}

impl From<u32> for Segment {
    fn from(value: u32) -> Self {
        Segment::Int(value as u64)
    }
}

impl TryFrom<i64> for Segment {
    type Error = PathError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value < 0 {
            return Err(PathError::NegativeIndex { value });
        }
        Ok(Segment::Int(value as u64))
    }
}

/// Errors raised while canonicalizing a subpath argument.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    /// A component destined for `Segment::Str` position (collection or
    /// document id) contained a dot.
    #[error("invalid path component '{component}': collection and document ids may not contain '.'")]
    DottedId { component: String },

    /// An array index segment was given as a negative number.
    #[error("invalid path segment: {value} is not a valid non-negative index")]
    NegativeIndex { value: i64 },
}

/// An owned, canonical, absolute path into a [`crate::tree::Tree`].
///
/// `PathBuf` is always a flat sequence of [`Segment`]s; there is no
/// relative-path resolution (no `..`, no leading dots) once a path has been
/// canonicalized. The empty path denotes the tree root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathBuf {
    segments: Vec<Segment>,
}

impl PathBuf {
    /// The empty (root) path.
    pub fn root() -> Self {
        Self { segments: Vec::new() }
    }

    /// Builds a path directly from already-canonical segments.
    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// Returns the path's segments.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns true if this path has no components (the root).
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns the number of components.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns a new path with `sub` appended, normalizing and coercing it
    /// the same way [`canonical`] would.
    pub fn push(mut self, sub: impl Into<SubPath>) -> Self {
        self.segments.extend(sub.into().into_segments());
        self
    }

    /// Returns the parent path, or `None` if this is the root.
    pub fn parent(&self) -> Option<PathBuf> {
        if self.segments.is_empty() {
            return None;
        }
        let mut segments = self.segments.clone();
        segments.pop();
        Some(PathBuf { segments })
    }

    /// Returns the final segment, or `None` if this is the root.
    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    /// Returns true iff `self` is an element-wise prefix of `other` (or
    /// equal to it).
    pub fn is_prefix_of(&self, other: &PathBuf) -> bool {
        self.segments.len() <= other.segments.len()
            && self
                .segments
                .iter()
                .zip(other.segments.iter())
                .all(|(a, b)| a == b)
    }
}

impl fmt::Display for PathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "(root)");
        }
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

impl FromStr for PathBuf {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments = s
            .split('.')
            .filter(|c| !c.is_empty())
            .map(Segment::from_component)
            .collect();
        Ok(PathBuf { segments })
    }
}

/// Any input accepted in "subpath" position: `at(subpath)`, `getAt(subpath)`,
/// and friends. This is the canonicalization input described in
/// `spec.md` §4.1: empty/absent, a dotted string, a bare number, a segment
/// array, or another handle's absolute path.
#[derive(Debug, Clone)]
pub enum SubPath {
    /// A dotted string, normalized and array-index-coerced.
    Str(String),
    /// Already-canonical segments (including the single-number case).
    Segments(Vec<Segment>),
}

impl SubPath {
    /// The empty subpath ("this handle's own path").
    pub fn here() -> Self {
        SubPath::Segments(Vec::new())
    }

    fn into_segments(self) -> Vec<Segment> {
        match self {
            SubPath::Str(s) => s
                .split('.')
                .filter(|c| !c.is_empty())
                .map(Segment::from_component)
                .collect(),
            SubPath::Segments(segs) => segs,
        }
    }
}

impl From<&str> for SubPath {
    fn from(value: &str) -> Self {
        SubPath::Str(value.to_string())
    }
}

impl From<String> for SubPath {
    fn from(value: String) -> Self {
        SubPath::Str(value)
    }
}

impl From<u64> for SubPath {
    fn from(value: u64) -> Self {
        SubPath::Segments(vec![Segment::Int(value)])
    }
}

impl From<usize> for SubPath {
    fn from(value: usize) -> Self {
        SubPath::Segments(vec![Segment::Int(value as u64)])
    }
}

impl From<Segment> for SubPath {
    fn from(value: Segment) -> Self {
        SubPath::Segments(vec![value])
    }
}

impl From<Vec<Segment>> for SubPath {
    fn from(value: Vec<Segment>) -> Self {
        SubPath::Segments(value)
    }
}

impl From<&[Segment]> for SubPath {
    fn from(value: &[Segment]) -> Self {
        SubPath::Segments(value.to_vec())
    }
}

impl From<PathBuf> for SubPath {
    fn from(value: PathBuf) -> Self {
        SubPath::Segments(value.segments)
    }
}

impl From<&PathBuf> for SubPath {
    fn from(value: &PathBuf) -> Self {
        SubPath::Segments(value.segments.clone())
    }
}

impl<T> From<Option<T>> for SubPath
where
    T: Into<SubPath>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => SubPath::here(),
        }
    }
}

/// Joins `base` with `sub`, producing a canonical absolute path.
///
/// Pure and total: joining never fails for well-typed Rust inputs (the
/// type system already rules out the malformed shapes `spec.md` calls out
/// as `InvalidPath`; see `PathError` for the residual failure modes, which
/// arise only from explicit signed-integer or dotted-id constructors).
pub fn canonical(base: &PathBuf, sub: impl Into<SubPath>) -> PathBuf {
    let mut segments = base.segments.clone();
    segments.extend(sub.into().into_segments());
    PathBuf { segments }
}

/// Returns true iff `a` and `b` are in a prefix relation: `a` is a prefix of
/// `b`, or `b` is a prefix of `a` (equality counts as both).
pub fn may_impact(listener: &PathBuf, event: &PathBuf) -> bool {
    listener.is_prefix_of(event) || event.is_prefix_of(listener)
}

/// Constructs a [`PathBuf`] from a mix of string/integer literals and
/// existing paths, normalizing as it goes.
///
/// ```
/// use racer::path;
/// let p = path!("users", 3, "name");
/// assert_eq!(p.to_string(), "users.3.name");
/// ```
#[macro_export]
macro_rules! path {
    () => {
        $crate::path::PathBuf::root()
    };
    ($first:expr $(, $rest:expr)* $(,)?) => {{
        let mut p = $crate::path::PathBuf::root();
        p = p.push($first);
        $(p = p.push($rest);)*
        p
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_integer_looking_strings() {
        let p = PathBuf::from_str("a.3.b").unwrap();
        assert_eq!(
            p.segments(),
            &[
                Segment::Str("a".into()),
                Segment::Int(3),
                Segment::Str("b".into())
            ]
        );
    }

    #[test]
    fn canonicalization_is_idempotent() {
        let base = PathBuf::root();
        let once = canonical(&base, "a.b.3");
        let twice = canonical(&PathBuf::root(), &once);
        assert_eq!(once, twice);
    }

    #[test]
    fn normalizes_dots_like_the_teacher_path_type() {
        assert_eq!(PathBuf::from_str("").unwrap(), PathBuf::root());
        assert_eq!(
            PathBuf::from_str(".user").unwrap(),
            PathBuf::from_str("user").unwrap()
        );
        assert_eq!(
            PathBuf::from_str("user..profile").unwrap(),
            PathBuf::from_str("user.profile").unwrap()
        );
    }

    #[test]
    fn prefix_relation_is_symmetric_for_may_impact() {
        let a = PathBuf::from_str("a.b").unwrap();
        let b = PathBuf::from_str("a.b.c").unwrap();
        let c = PathBuf::from_str("a.x").unwrap();
        assert!(may_impact(&a, &b));
        assert!(may_impact(&b, &a));
        assert!(!may_impact(&a, &c));
    }

    #[test]
    fn path_macro_mixes_literal_kinds() {
        let p = path!("users", 3, "name");
        assert_eq!(p.to_string(), "users.3.name");
    }

    #[test]
    fn negative_index_rejected() {
        assert_eq!(
            Segment::try_from(-1i64),
            Err(PathError::NegativeIndex { value: -1 })
        );
    }
}
