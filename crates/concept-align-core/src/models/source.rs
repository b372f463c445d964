//! Source concept and alignment models.

use serde::{Deserialize, Serialize};

/// A named batch of source concepts being mapped together.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alignment {
    /// Batch identifier
    pub alignment_id: String,
    /// Human-readable name
    pub name: String,
    /// Free-text description
    pub description: String,
    /// Registration timestamp
    pub created_at: String,
}

impl Alignment {
    /// Create a new alignment stamped with the current time.
    pub fn new(alignment_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            alignment_id: alignment_id.into(),
            name: name.into(),
            description: String::new(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// A local clinical concept awaiting mapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceConcept {
    /// Stable row identity within the batch
    pub row_id: i64,
    /// Source vocabulary (e.g., "LOCAL")
    pub vocabulary: String,
    /// Source code, unique within the batch
    pub code: String,
    /// Source description
    pub name: String,
    /// Category used to filter the batch (e.g., "lab", "drug")
    pub category: Option<String>,
}

impl SourceConcept {
    /// Create a source concept without a category.
    pub fn new(
        row_id: i64,
        vocabulary: impl Into<String>,
        code: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            row_id,
            vocabulary: vocabulary.into(),
            code: code.into(),
            name: name.into(),
            category: None,
        }
    }

    /// Builder-style category assignment.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}
