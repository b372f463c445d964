//! Read-only accessors the engine consumes.
//!
//! The vocabulary graph and the source batches are owned by external stores.
//! All graph queries are bulk: they take and return identifier sets.

use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

use crate::models::{Concept, ConceptId, SourceConcept};

/// Precondition failures reaching a consumed store.
#[derive(Error, Debug)]
pub enum AccessError {
    #[error("Unknown source batch: {0}")]
    UnknownBatch(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<crate::db::DbError> for AccessError {
    fn from(e: crate::db::DbError) -> Self {
        AccessError::Unavailable(e.to_string())
    }
}

pub type AccessResult<T> = Result<T, AccessError>;

/// Query contract of the vocabulary graph.
pub trait VocabularyGraph {
    /// Fetch concept attributes. Unknown identifiers are absent from the map.
    fn concepts(&self, ids: &BTreeSet<ConceptId>) -> AccessResult<HashMap<ConceptId, Concept>>;

    /// Maps-to / mapped-from edges touching `ids`, as `(id, neighbor)` pairs.
    ///
    /// Both relationship directions are returned, so the relation behaves as
    /// undirected.
    fn mapped_neighbors(&self, ids: &BTreeSet<ConceptId>)
        -> AccessResult<BTreeSet<(ConceptId, ConceptId)>>;

    /// `(ancestor, descendant)` pairs from the precomputed closure.
    fn descendants(&self, ids: &BTreeSet<ConceptId>)
        -> AccessResult<BTreeSet<(ConceptId, ConceptId)>>;
}

/// Query contract of the source batch store.
pub trait SourceBatchAccess {
    /// Rows of `batch_id` currently eligible for mapping, optionally
    /// restricted to one category.
    fn source_batch(&self, batch_id: &str, category: Option<&str>)
        -> AccessResult<Vec<SourceConcept>>;
}
