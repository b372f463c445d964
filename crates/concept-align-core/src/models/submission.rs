//! Submission models: a proposed mapping batch as authored by a human or a tool.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::concept::ConceptId;

/// One proposed mapping row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProposedMapping {
    /// Source code from the active batch
    pub code: String,
    /// Target concept; `None` means explicitly left unmapped
    #[serde(default)]
    pub target_id: Option<ConceptId>,
    /// Confidence in `[0, 1]`
    #[serde(default)]
    pub score: Option<f64>,
    /// Free-text rationale
    #[serde(default)]
    pub comment: Option<String>,
}

impl ProposedMapping {
    /// A mapped row with a score and no comment.
    pub fn mapped(code: impl Into<String>, target_id: ConceptId, score: f64) -> Self {
        Self {
            code: code.into(),
            target_id: Some(target_id),
            score: Some(score),
            comment: None,
        }
    }

    /// An explicitly unmapped row.
    pub fn unmapped(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            target_id: None,
            score: None,
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Trimmed rationale, `None` when absent or blank.
    pub fn rationale(&self) -> Option<&str> {
        self.comment
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    pub fn is_mapped(&self) -> bool {
        self.target_id.is_some()
    }
}

/// A proposed mapping batch plus its metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Submission {
    /// Alignment the rows belong to
    pub batch_id: String,
    /// Restrict the active batch to one category
    #[serde(default)]
    pub category_filter: Option<String>,
    /// Proposed rows, in submission order
    pub records: Vec<ProposedMapping>,
}

impl Submission {
    pub fn new(batch_id: impl Into<String>, records: Vec<ProposedMapping>) -> Self {
        Self {
            batch_id: batch_id.into(),
            category_filter: None,
            records,
        }
    }

    /// Parse a submission from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Read a submission file from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SubmissionLoadError> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&content)?)
    }

    /// Write the submission as pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn mapped_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_mapped()).count()
    }

    pub fn unmapped_count(&self) -> usize {
        self.records.len() - self.mapped_count()
    }
}

/// Failure reading a submission file.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionLoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed submission: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_nulls_and_missing_fields() {
        let json = r#"{
            "batch_id": "labs-2024",
            "records": [
                {"code": "HR-01", "target_id": 123, "score": 1.0, "comment": ""},
                {"code": "NA-02", "target_id": null, "score": null, "comment": "no standard equivalent"},
                {"code": "K-03"}
            ]
        }"#;

        let submission = Submission::from_json(json).unwrap();
        assert_eq!(submission.batch_id, "labs-2024");
        assert!(submission.category_filter.is_none());
        assert_eq!(submission.records.len(), 3);
        assert_eq!(submission.records[0].target_id, Some(123));
        assert_eq!(submission.records[1].rationale(), Some("no standard equivalent"));
        assert_eq!(submission.records[2], ProposedMapping::unmapped("K-03"));
        assert_eq!(submission.mapped_count(), 1);
        assert_eq!(submission.unmapped_count(), 2);
    }

    #[test]
    fn test_blank_comment_is_no_rationale() {
        let row = ProposedMapping::mapped("A", 1, 0.5).with_comment("   ");
        assert_eq!(row.rationale(), None);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Submission::load("/nonexistent/submission.json").unwrap_err();
        assert!(matches!(err, SubmissionLoadError::Io(_)));
    }
}
