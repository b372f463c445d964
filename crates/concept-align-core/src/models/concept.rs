//! Vocabulary concept models.

use serde::{Deserialize, Serialize};

/// Identifier of a concept in the vocabulary graph.
pub type ConceptId = i64;

/// Domain whose concepts are only interchangeable at one granularity.
pub const DRUG_DOMAIN: &str = "Drug";

/// The only drug concept class eligible as a mapping candidate.
pub const CLINICAL_DRUG_CLASS: &str = "Clinical Drug";

/// Marker stored in `standard_concept` for reference concepts.
const STANDARD_MARKER: &str = "S";

/// A single entry in the vocabulary graph. Owned by the vocabulary store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Concept {
    /// Globally unique concept identifier
    pub concept_id: ConceptId,
    /// Display name
    pub concept_name: String,
    /// Vocabulary / namespace (e.g., "LOINC")
    pub vocabulary_id: String,
    /// Domain (e.g., "Drug", "Measurement")
    pub domain_id: String,
    /// Concept class (e.g., "Clinical Drug")
    pub concept_class_id: String,
    /// Standard flag; "S" marks a standard concept
    pub standard_concept: Option<String>,
    /// Invalidity marker (e.g., "D" deprecated, "U" upgraded)
    pub invalid_reason: Option<String>,
}

impl Concept {
    /// Create a valid, standard concept.
    pub fn new(
        concept_id: ConceptId,
        concept_name: impl Into<String>,
        vocabulary_id: impl Into<String>,
        domain_id: impl Into<String>,
        concept_class_id: impl Into<String>,
    ) -> Self {
        Self {
            concept_id,
            concept_name: concept_name.into(),
            vocabulary_id: vocabulary_id.into(),
            domain_id: domain_id.into(),
            concept_class_id: concept_class_id.into(),
            standard_concept: Some(STANDARD_MARKER.to_string()),
            invalid_reason: None,
        }
    }

    /// Whether this is a reference ("standard") concept.
    pub fn is_standard(&self) -> bool {
        self.standard_concept.as_deref() == Some(STANDARD_MARKER)
    }

    /// Whether this concept carries no invalidity marker.
    pub fn is_valid(&self) -> bool {
        self.invalid_reason
            .as_deref()
            .map_or(true, |reason| reason.trim().is_empty())
    }

    /// Drug concepts only count at Clinical Drug granularity.
    pub fn has_mappable_granularity(&self) -> bool {
        self.domain_id != DRUG_DOMAIN || self.concept_class_id == CLINICAL_DRUG_CLASS
    }
}

/// Relationship kinds the engine consumes from the vocabulary graph.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RelationshipKind {
    MapsTo,
    MappedFrom,
}

impl RelationshipKind {
    /// Identifier as stored in `concept_relationship.relationship_id`.
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::MapsTo => "Maps to",
            RelationshipKind::MappedFrom => "Mapped from",
        }
    }
}
