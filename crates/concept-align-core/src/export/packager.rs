//! Validation-gated, atomic package export.
//!
//! ```text
//! Drafting ──▶ Validating ──┬──▶ Failed      (scratch kept, input kept, no archive)
//!                           │
//!                           └──▶ Committing ──▶ Committed
//!                                (temp file → rename, then scratch + input removed)
//! ```
//!
//! The archive at its final path is the only durable signal of success. A
//! leftover scratch directory never is.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::package::*;
use crate::access::{AccessError, SourceBatchAccess, VocabularyGraph};
use crate::config::ExportConfig;
use crate::models::{ConceptId, SourceConcept, Submission, SubmissionLoadError};
use crate::validation::{ValidationError, ValidationWarning, Validator};

/// Export errors. Validation findings are never reported here; they are
/// part of [`ExportOutcome::Failure`].
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Precondition failed: {0}")]
    Precondition(#[from] AccessError),

    #[error("Cannot read submission: {0}")]
    Submission(#[from] SubmissionLoadError),

    #[error("Package already exists: {}", .0.display())]
    PackageExists(PathBuf),

    #[error("Package error: {0}")]
    Package(#[from] PackageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tempfile::PersistError> for ExportError {
    fn from(e: tempfile::PersistError) -> Self {
        ExportError::Io(e.error)
    }
}

pub type ExportResult<T> = Result<T, ExportError>;

/// Hex digits of the request digest kept in a scratch directory name.
const SCRATCH_DIGEST_LEN: usize = 12;

/// Export state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportState {
    Drafting,
    Validating,
    Failed,
    Committing,
    Committed,
}

impl fmt::Display for ExportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportState::Drafting => "drafting",
            ExportState::Validating => "validating",
            ExportState::Failed => "failed",
            ExportState::Committing => "committing",
            ExportState::Committed => "committed",
        };
        f.write_str(name)
    }
}

/// A submission to package.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub submission: Submission,
    /// Raw submission file; deleted on commit, untouched on failure
    pub raw_input: Option<PathBuf>,
    pub metadata: PackageMetadata,
}

impl ExportRequest {
    pub fn new(submission: Submission, metadata: PackageMetadata) -> Self {
        Self {
            submission,
            raw_input: None,
            metadata,
        }
    }

    /// Load the submission from its raw input file.
    pub fn from_file<P: AsRef<Path>>(path: P, metadata: PackageMetadata) -> ExportResult<Self> {
        let path = path.as_ref();
        Ok(Self {
            submission: Submission::load(path)?,
            raw_input: Some(path.to_path_buf()),
            metadata,
        })
    }
}

/// Result reported to the caller. Never infer success from the file system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExportOutcome {
    Success {
        package_path: PathBuf,
        mapped: usize,
        unmapped: usize,
        warnings: Vec<ValidationWarning>,
    },
    Failure {
        errors: Vec<ValidationError>,
        warnings: Vec<ValidationWarning>,
        scratch_dir: PathBuf,
    },
}

impl ExportOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExportOutcome::Success { .. })
    }

    /// Process exit status for wrappers: 0 on commit, 1 on validation failure.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    pub fn warnings(&self) -> &[ValidationWarning] {
        match self {
            ExportOutcome::Success { warnings, .. } | ExportOutcome::Failure { warnings, .. } => {
                warnings
            }
        }
    }
}

/// Drives one submission through the export state machine.
pub struct ExportPackager<'a, S: ?Sized, G: ?Sized> {
    sources: &'a S,
    graph: &'a G,
    validator: Validator,
    config: ExportConfig,
}

impl<'a, S, G> ExportPackager<'a, S, G>
where
    S: SourceBatchAccess + ?Sized,
    G: VocabularyGraph + ?Sized,
{
    pub fn new(sources: &'a S, graph: &'a G, validator: Validator, config: ExportConfig) -> Self {
        Self {
            sources,
            graph,
            validator,
            config,
        }
    }

    /// Scratch workspace used for a request.
    ///
    /// The readable prefix is lossy, so a digest of the raw batch id and
    /// package name keeps distinct requests in distinct directories.
    pub fn scratch_dir(&self, request: &ExportRequest) -> PathBuf {
        let batch_id = &request.submission.batch_id;
        let name = &request.metadata.name;
        let digest = sha256_hex(format!("{}\0{}", batch_id, name).as_bytes());
        self.config.scratch_root.join(format!(
            "{}-{}-{}",
            file_safe(batch_id),
            file_safe(name),
            &digest[..SCRATCH_DIGEST_LEN]
        ))
    }

    /// Final archive location for a request.
    pub fn package_path(&self, request: &ExportRequest) -> PathBuf {
        self.config.output_dir.join(format!(
            "{}-v{}.{}",
            file_safe(&request.metadata.name),
            file_safe(&request.metadata.version),
            PACKAGE_EXTENSION
        ))
    }

    /// Run the export.
    ///
    /// `Err` means a precondition or I/O failure; validation findings come
    /// back as [`ExportOutcome::Failure`].
    pub fn export(&self, request: &ExportRequest) -> ExportResult<ExportOutcome> {
        let submission = &request.submission;
        let batch = self
            .sources
            .source_batch(&submission.batch_id, submission.category_filter.as_deref())?;

        let package_path = self.package_path(request);
        if package_path.exists() {
            return Err(ExportError::PackageExists(package_path));
        }

        enter(ExportState::Drafting, &submission.batch_id);
        let scratch_dir = self.draft(request, &batch)?;

        enter(ExportState::Validating, &submission.batch_id);
        let report = self.validator.validate(&submission.records, &batch, self.graph)?;

        if !report.is_valid() {
            enter(ExportState::Failed, &submission.batch_id);
            warn!(
                batch = %submission.batch_id,
                errors = report.errors.len(),
                warnings = report.warnings.len(),
                scratch = %scratch_dir.display(),
                "export blocked by validation errors"
            );
            return Ok(ExportOutcome::Failure {
                errors: report.errors,
                warnings: report.warnings,
                scratch_dir,
            });
        }

        enter(ExportState::Committing, &submission.batch_id);
        self.commit(&scratch_dir, &package_path)?;

        // Committed from here on; leftovers are logged, never reported as failure
        remove_leftovers(&scratch_dir, request.raw_input.as_deref());

        enter(ExportState::Committed, &submission.batch_id);
        info!(
            batch = %submission.batch_id,
            package = %package_path.display(),
            warnings = report.warnings.len(),
            "package committed"
        );
        Ok(ExportOutcome::Success {
            package_path,
            mapped: submission.mapped_count(),
            unmapped: submission.unmapped_count(),
            warnings: report.warnings,
        })
    }

    /// Materialize every artifact into a fresh scratch workspace.
    fn draft(&self, request: &ExportRequest, batch: &[SourceConcept]) -> ExportResult<PathBuf> {
        let scratch_dir = self.scratch_dir(request);
        if scratch_dir.exists() {
            // Never build on a previous run's leftovers
            std::fs::remove_dir_all(&scratch_dir)?;
        }
        std::fs::create_dir_all(&scratch_dir)?;

        let records = &request.submission.records;
        let by_code: HashMap<&str, &SourceConcept> =
            batch.iter().map(|s| (s.code.as_str(), s)).collect();
        let target_ids: BTreeSet<ConceptId> = records.iter().filter_map(|r| r.target_id).collect();
        let targets = if target_ids.is_empty() {
            HashMap::new()
        } else {
            self.graph.concepts(&target_ids)?
        };

        let source_rows: Vec<SourceConceptRow> = batch
            .iter()
            .map(|s| SourceConceptRow {
                row_id: s.row_id,
                source_vocabulary: s.vocabulary.clone(),
                source_code: s.code.clone(),
                source_name: s.name.clone(),
                category: s.category.clone(),
            })
            .collect();

        let mapping_rows: Vec<MappingRow> = records
            .iter()
            .filter_map(|record| {
                let target_id = record.target_id?;
                let source = by_code.get(record.code.as_str());
                let target = targets.get(&target_id);
                Some(MappingRow {
                    source_code: record.code.clone(),
                    source_vocabulary: source.map(|s| s.vocabulary.clone()).unwrap_or_default(),
                    source_name: source.map(|s| s.name.clone()).unwrap_or_default(),
                    target_concept_id: target_id,
                    target_concept_name: target.map(|c| c.concept_name.clone()).unwrap_or_default(),
                    target_vocabulary: target.map(|c| c.vocabulary_id.clone()).unwrap_or_default(),
                    confidence_score: record.score,
                    rationale: record.rationale().map(str::to_string),
                })
            })
            .collect();

        let comment_rows: Vec<CommentRow> = records
            .iter()
            .filter_map(|record| {
                record.rationale().map(|comment| CommentRow {
                    source_code: record.code.clone(),
                    comment: comment.to_string(),
                })
            })
            .collect();

        let manifest = Manifest {
            format_version: self.config.format_version.clone(),
            package_id: uuid::Uuid::new_v4().to_string(),
            exported_at: chrono::Utc::now().to_rfc3339(),
            author: self.config.author.clone(),
            name: request.metadata.name.clone(),
            description: request.metadata.description.clone(),
            version: request.metadata.version.clone(),
            batch_id: request.submission.batch_id.clone(),
            total_source_concepts: source_rows.len(),
            total_mappings: mapping_rows.len(),
        };

        std::fs::write(
            scratch_dir.join(MANIFEST_FILE),
            serde_json::to_string_pretty(&manifest)?,
        )?;
        write_table(&scratch_dir.join(SOURCE_CONCEPTS_FILE), &SOURCE_CONCEPTS_HEADER, &source_rows)?;
        write_table(&scratch_dir.join(MAPPINGS_FILE), &MAPPINGS_HEADER, &mapping_rows)?;
        write_table::<EvaluationRow>(&scratch_dir.join(EVALUATIONS_FILE), &EVALUATIONS_HEADER, &[])?;
        write_table(&scratch_dir.join(COMMENTS_FILE), &COMMENTS_HEADER, &comment_rows)?;

        debug!(
            scratch = %scratch_dir.display(),
            sources = source_rows.len(),
            mappings = mapping_rows.len(),
            comments = comment_rows.len(),
            "drafted package workspace"
        );
        Ok(scratch_dir)
    }

    /// Seal the workspace into a temp file next to the final path, then
    /// rename it into place.
    fn commit(&self, scratch_dir: &Path, package_path: &Path) -> ExportResult<()> {
        let archive = PackageArchive::seal(scratch_dir)?;
        std::fs::create_dir_all(&self.config.output_dir)?;

        let mut tmp = NamedTempFile::new_in(&self.config.output_dir)?;
        tmp.write_all(archive.to_json()?.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist_noclobber(package_path)?;
        Ok(())
    }
}

fn remove_leftovers(scratch_dir: &Path, raw_input: Option<&Path>) {
    if let Err(e) = std::fs::remove_dir_all(scratch_dir) {
        warn!(
            scratch = %scratch_dir.display(),
            error = %e,
            "could not remove scratch workspace after commit"
        );
    }
    if let Some(raw_input) = raw_input.filter(|p| p.exists()) {
        if let Err(e) = std::fs::remove_file(raw_input) {
            warn!(
                input = %raw_input.display(),
                error = %e,
                "could not remove submission input after commit"
            );
        }
    }
}

fn enter(state: ExportState, batch_id: &str) {
    debug!(batch = batch_id, %state, "export state");
}

/// Restrict a name to characters safe in a file name.
fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_safe() {
        assert_eq!(file_safe("labs 2024/Q1"), "labs_2024_Q1");
        assert_eq!(file_safe("v1.2-rc_3"), "v1.2-rc_3");
    }

    #[test]
    fn test_exit_codes() {
        let success = ExportOutcome::Success {
            package_path: PathBuf::from("p.mapkg"),
            mapped: 1,
            unmapped: 0,
            warnings: vec![],
        };
        let failure = ExportOutcome::Failure {
            errors: vec![],
            warnings: vec![ValidationWarning::UnmappedNoRationale {
                row: 0,
                code: "A".into(),
            }],
            scratch_dir: PathBuf::from("scratch"),
        };
        assert_eq!(success.exit_code(), 0);
        assert_eq!(failure.exit_code(), 1);
        assert_eq!(failure.warnings().len(), 1);
    }

    #[test]
    fn test_outcome_json_shape() {
        let outcome = ExportOutcome::Success {
            package_path: PathBuf::from("out/labs-v1.mapkg"),
            mapped: 2,
            unmapped: 1,
            warnings: vec![],
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains(r#""status":"success""#));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ExportState::Committing.to_string(), "committing");
    }
}
