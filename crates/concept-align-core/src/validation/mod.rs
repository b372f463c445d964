//! Submission validation.
//!
//! Every check runs on every record; a single pass returns the complete set
//! of errors and warnings. Validation reads the vocabulary store and never
//! writes anywhere.

mod diagnostics;

pub use diagnostics::*;

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, info};

use crate::access::{AccessResult, SourceBatchAccess, VocabularyGraph};
use crate::config::ValidationConfig;
use crate::models::{ConceptId, ProposedMapping, SourceConcept, Submission};

/// Validator for proposed mapping batches.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Resolve the active batch for `submission`, then validate it.
    ///
    /// A missing batch or unreachable store is returned as an error before
    /// any record is checked.
    pub fn validate_submission<S, G>(
        &self,
        submission: &Submission,
        sources: &S,
        graph: &G,
    ) -> AccessResult<ValidationReport>
    where
        S: SourceBatchAccess + ?Sized,
        G: VocabularyGraph + ?Sized,
    {
        let batch = sources.source_batch(
            &submission.batch_id,
            submission.category_filter.as_deref(),
        )?;
        self.validate(&submission.records, &batch, graph)
    }

    /// Validate `records` against the active `batch`.
    pub fn validate<G: VocabularyGraph + ?Sized>(
        &self,
        records: &[ProposedMapping],
        batch: &[SourceConcept],
        graph: &G,
    ) -> AccessResult<ValidationReport> {
        let known_codes: HashSet<&str> = batch.iter().map(|s| s.code.as_str()).collect();

        let target_ids: BTreeSet<ConceptId> = records.iter().filter_map(|r| r.target_id).collect();
        let targets = if target_ids.is_empty() {
            HashMap::new()
        } else {
            graph.concepts(&target_ids)?
        };

        let mut report = ValidationReport::default();
        let mut first_seen: HashMap<&str, usize> = HashMap::new();

        for (row, record) in records.iter().enumerate() {
            let code = record.code.as_str();

            if let Some(&first_row) = first_seen.get(code) {
                report.errors.push(ValidationError::DuplicateSourceCode {
                    row,
                    code: code.to_string(),
                    first_row,
                });
            } else {
                first_seen.insert(code, row);
            }

            if !known_codes.contains(code) {
                report.errors.push(ValidationError::UnknownSourceCode {
                    row,
                    code: code.to_string(),
                });
            }

            if let Some(target_id) = record.target_id {
                match targets.get(&target_id) {
                    None => report.errors.push(ValidationError::UnknownTargetConcept {
                        row,
                        code: code.to_string(),
                        target_id,
                    }),
                    Some(concept) => {
                        if !concept.is_standard() {
                            report.errors.push(ValidationError::NonStandardTarget {
                                row,
                                code: code.to_string(),
                                target_id,
                            });
                        }
                        if !concept.is_valid() {
                            report.errors.push(ValidationError::InvalidTarget {
                                row,
                                code: code.to_string(),
                                target_id,
                                reason: concept.invalid_reason.clone().unwrap_or_default(),
                            });
                        }
                    }
                }
            }

            if let Some(score) = record.score {
                // NaN falls outside the range as well
                if !(0.0..=1.0).contains(&score) {
                    report.errors.push(ValidationError::ScoreOutOfRange {
                        row,
                        code: code.to_string(),
                        score,
                    });
                }
            }

            match (record.target_id, record.score) {
                (Some(target_id), None) => report.errors.push(ValidationError::MappedWithoutScore {
                    row,
                    code: code.to_string(),
                    target_id,
                }),
                (None, Some(score)) => report.errors.push(ValidationError::UnmappedWithScore {
                    row,
                    code: code.to_string(),
                    score,
                }),
                _ => {}
            }

            let has_rationale = record.rationale().is_some();

            if let Some(score) = record.score {
                if score < self.config.low_confidence_threshold && !has_rationale {
                    report.warnings.push(ValidationWarning::LowConfidenceNoRationale {
                        row,
                        code: code.to_string(),
                        score,
                        threshold: self.config.low_confidence_threshold,
                    });
                }
            }

            if record.target_id.is_none() && !has_rationale {
                report.warnings.push(ValidationWarning::UnmappedNoRationale {
                    row,
                    code: code.to_string(),
                });
            }
        }

        for error in &report.errors {
            debug!(kind = error.kind(), row = error.row(), "validation error");
        }
        info!(
            records = records.len(),
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "validation complete"
        );
        Ok(report)
    }
}
