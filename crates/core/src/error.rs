//! Crate-level error aggregation.

use thiserror::Error;

use crate::docstore::DocStoreError;
use crate::load::LoadError;
use crate::mutator::MutatorError;
use crate::query::QueryError;
use crate::snapshot::SnapshotError;
use crate::tree::TreeError;

/// The result type used throughout this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Aggregates every module's error type behind one crate boundary.
///
/// Kept `#[non_exhaustive]` so adding a module-specific error variant
/// later is not a breaking change for callers that match on it.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Mutator(#[from] MutatorError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    DocStore(#[from] DocStoreError),
}

impl Error {
    /// The module this error originated in, for logging/metrics tags.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Tree(_) => "tree",
            Error::Mutator(_) => "mutator",
            Error::Load(_) => "load",
            Error::Query(_) => "query",
            Error::Snapshot(_) => "snapshot",
            Error::DocStore(_) => "docstore",
        }
    }
}
