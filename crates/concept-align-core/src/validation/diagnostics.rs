//! Typed validation diagnostics.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ConceptId;

/// A blocking defect in a submission. `row` is the zero-based index of the
/// offending record.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ValidationError {
    #[error("row {row}: source code {code:?} is not in the active batch")]
    UnknownSourceCode { row: usize, code: String },

    #[error("row {row}: source code {code:?} already submitted at row {first_row}")]
    DuplicateSourceCode {
        row: usize,
        code: String,
        first_row: usize,
    },

    #[error("row {row}: target concept {target_id} for {code:?} does not exist")]
    UnknownTargetConcept {
        row: usize,
        code: String,
        target_id: ConceptId,
    },

    #[error("row {row}: target concept {target_id} for {code:?} is not a standard concept")]
    NonStandardTarget {
        row: usize,
        code: String,
        target_id: ConceptId,
    },

    #[error("row {row}: target concept {target_id} for {code:?} is invalid ({reason})")]
    InvalidTarget {
        row: usize,
        code: String,
        target_id: ConceptId,
        reason: String,
    },

    #[error("row {row}: confidence score {score} for {code:?} is outside [0, 1]")]
    ScoreOutOfRange { row: usize, code: String, score: f64 },

    #[error("row {row}: {code:?} is mapped to {target_id} without a confidence score")]
    MappedWithoutScore {
        row: usize,
        code: String,
        target_id: ConceptId,
    },

    #[error("row {row}: {code:?} is unmapped but carries confidence score {score}")]
    UnmappedWithScore { row: usize, code: String, score: f64 },
}

impl ValidationError {
    /// Stable identifier of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::UnknownSourceCode { .. } => "UnknownSourceCode",
            ValidationError::DuplicateSourceCode { .. } => "DuplicateSourceCode",
            ValidationError::UnknownTargetConcept { .. } => "UnknownTargetConcept",
            ValidationError::NonStandardTarget { .. } => "NonStandardTarget",
            ValidationError::InvalidTarget { .. } => "InvalidTarget",
            ValidationError::ScoreOutOfRange { .. } => "ScoreOutOfRange",
            ValidationError::MappedWithoutScore { .. } => "MappedWithoutScore",
            ValidationError::UnmappedWithScore { .. } => "UnmappedWithScore",
        }
    }

    /// Zero-based index of the offending record.
    pub fn row(&self) -> usize {
        match self {
            ValidationError::UnknownSourceCode { row, .. }
            | ValidationError::DuplicateSourceCode { row, .. }
            | ValidationError::UnknownTargetConcept { row, .. }
            | ValidationError::NonStandardTarget { row, .. }
            | ValidationError::InvalidTarget { row, .. }
            | ValidationError::ScoreOutOfRange { row, .. }
            | ValidationError::MappedWithoutScore { row, .. }
            | ValidationError::UnmappedWithScore { row, .. } => *row,
        }
    }
}

/// A non-blocking finding that must still be surfaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ValidationWarning {
    LowConfidenceNoRationale {
        row: usize,
        code: String,
        score: f64,
        threshold: f64,
    },
    UnmappedNoRationale { row: usize, code: String },
}

impl ValidationWarning {
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationWarning::LowConfidenceNoRationale { .. } => "LowConfidenceNoRationale",
            ValidationWarning::UnmappedNoRationale { .. } => "UnmappedNoRationale",
        }
    }

    pub fn row(&self) -> usize {
        match self {
            ValidationWarning::LowConfidenceNoRationale { row, .. }
            | ValidationWarning::UnmappedNoRationale { row, .. } => *row,
        }
    }
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationWarning::LowConfidenceNoRationale {
                row,
                code,
                score,
                threshold,
            } => write!(
                f,
                "row {}: {:?} has confidence {} below {} and no comment",
                row, code, score, threshold
            ),
            ValidationWarning::UnmappedNoRationale { row, code } => {
                write!(f, "row {}: {:?} is left unmapped without a comment", row, code)
            }
        }
    }
}

/// Full diagnostic set of one validation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    /// No blocking errors. Warnings never block.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Human-readable listing, errors first.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for error in &self.errors {
            out.push_str(&format!("ERROR   [{}] {}\n", error.kind(), error));
        }
        for warning in &self.warnings {
            out.push_str(&format!("WARNING [{}] {}\n", warning.kind(), warning));
        }
        out
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
