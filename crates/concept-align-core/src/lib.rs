//! Concept-Align Core Library
//!
//! Maps local clinical source concepts onto standard vocabulary concepts and
//! turns reviewed mapping batches into distributable packages.
//!
//! # Architecture
//!
//! ```text
//!   Curated mappings                     Proposed batch (submission)
//!          │                                        │
//!          ▼                                        ▼
//! ┌─────────────────────┐              ┌──────────────────────────┐
//! │  Enrichment Engine  │              │  Drafting (scratch dir)  │
//! │  graph expansion    │              └────────────┬─────────────┘
//! │  over maps-to +     │                           ▼
//! │  ancestor closure   │              ┌──────────────────────────┐
//! └─────────┬───────────┘              │  Validation Engine       │
//!           │                          │  errors / warnings       │
//!           ▼                          └──────┬─────────────┬─────┘
//!   Curated ∪ generated                 errors│             │none
//!   candidates                                ▼             ▼
//!   (recommended flags                   Failed:       Committing:
//!    restored)                           scratch kept  temp → rename
//!                                        no archive    scratch removed
//! ```
//!
//! # Core Principle
//!
//! **Ambiguity is surfaced, never resolved.** Generated candidates never
//! override a curated mapping, and any validation error blocks a package.
//!
//! # Modules
//!
//! - [`access`]: Read-only vocabulary graph and source batch contracts
//! - [`db`]: SQLite store (vocabulary snapshot, alignments, mappings)
//! - [`models`]: Domain types (Concept, Mapping, Submission, etc.)
//! - [`enrichment`]: Candidate mapping enrichment
//! - [`validation`]: Submission validation
//! - [`export`]: Atomic package export
//! - [`config`]: TOML engine configuration

pub mod access;
pub mod config;
pub mod db;
pub mod enrichment;
pub mod export;
pub mod models;
pub mod validation;

// Re-export commonly used types
pub use access::{AccessError, SourceBatchAccess, VocabularyGraph};
pub use config::EngineConfig;
pub use db::Database;
pub use enrichment::{Enricher, EnrichmentReport, VocabularyFamily, VocabularyPolicy};
pub use export::{ExportOutcome, ExportPackager, ExportRequest, PackageArchive, PackageMetadata};
pub use models::{
    Alignment, Concept, ConceptId, Mapping, MappingKey, MappingOrigin, MappingSet,
    ProposedMapping, SourceConcept, Submission,
};
pub use validation::{ValidationError, ValidationReport, ValidationWarning, Validator};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum ConceptAlignError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Export error: {0}")]
    ExportError(String),
}

impl From<db::DbError> for ConceptAlignError {
    fn from(e: db::DbError) -> Self {
        ConceptAlignError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for ConceptAlignError {
    fn from(e: serde_json::Error) -> Self {
        ConceptAlignError::SerializationError(e.to_string())
    }
}

impl From<AccessError> for ConceptAlignError {
    fn from(e: AccessError) -> Self {
        ConceptAlignError::PreconditionFailed(e.to_string())
    }
}

impl From<config::ConfigError> for ConceptAlignError {
    fn from(e: config::ConfigError) -> Self {
        ConceptAlignError::InvalidInput(e.to_string())
    }
}

impl From<enrichment::EnrichmentError> for ConceptAlignError {
    fn from(e: enrichment::EnrichmentError) -> Self {
        match e {
            enrichment::EnrichmentError::Access(access) => access.into(),
            enrichment::EnrichmentError::Database(db) => db.into(),
        }
    }
}

impl From<export::ExportError> for ConceptAlignError {
    fn from(e: export::ExportError) -> Self {
        match e {
            export::ExportError::Precondition(access) => access.into(),
            other => ConceptAlignError::ExportError(other.to_string()),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for ConceptAlignError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        ConceptAlignError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a database at the given path.
///
/// `config_toml` overrides the default engine configuration.
#[uniffi::export]
pub fn open_database(
    path: String,
    config_toml: Option<String>,
) -> Result<Arc<ConceptAlignCore>, ConceptAlignError> {
    let db = Database::open(&path)?;
    let config = match config_toml {
        Some(toml) => EngineConfig::from_toml_str(&toml)?,
        None => EngineConfig::default(),
    };
    Ok(Arc::new(ConceptAlignCore {
        db: Arc::new(Mutex::new(db)),
        config,
    }))
}

/// Create an in-memory database (for testing).
#[uniffi::export]
pub fn open_database_in_memory() -> Result<Arc<ConceptAlignCore>, ConceptAlignError> {
    let db = Database::open_in_memory()?;
    Ok(Arc::new(ConceptAlignCore {
        db: Arc::new(Mutex::new(db)),
        config: EngineConfig::default(),
    }))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe engine wrapper for FFI.
#[derive(uniffi::Object)]
pub struct ConceptAlignCore {
    db: Arc<Mutex<Database>>,
    config: EngineConfig,
}

#[uniffi::export]
impl ConceptAlignCore {
    // =========================================================================
    // Alignment Operations
    // =========================================================================

    /// Register an alignment with its source concepts.
    pub fn register_alignment(
        &self,
        alignment: FfiAlignment,
        sources: Vec<FfiSourceConcept>,
    ) -> Result<(), ConceptAlignError> {
        let mut db = self.db.lock()?;
        let sources: Vec<SourceConcept> = sources.into_iter().map(|s| s.into()).collect();
        db.register_alignment(&alignment.into(), &sources)?;
        Ok(())
    }

    /// List the source concepts of an alignment.
    pub fn list_source_concepts(
        &self,
        alignment_id: String,
        category: Option<String>,
    ) -> Result<Vec<FfiSourceConcept>, ConceptAlignError> {
        let db = self.db.lock()?;
        let sources = db.source_batch(&alignment_id, category.as_deref())?;
        Ok(sources.into_iter().map(|s| s.into()).collect())
    }

    // =========================================================================
    // Mapping Operations
    // =========================================================================

    /// Import curated mappings (all-or-nothing).
    pub fn import_curated_mappings(
        &self,
        alignment_id: String,
        keys: Vec<FfiMappingKey>,
    ) -> Result<u32, ConceptAlignError> {
        let mut db = self.db.lock()?;
        let mappings: Vec<Mapping> = keys
            .into_iter()
            .map(|k| Mapping::curated(k.into()))
            .collect();
        let written = db.import_mappings(&alignment_id, &mappings)?;
        Ok(written as u32)
    }

    /// List every mapping of an alignment.
    pub fn list_mappings(&self, alignment_id: String) -> Result<Vec<FfiMapping>, ConceptAlignError> {
        let db = self.db.lock()?;
        let set = db.load_mappings(&alignment_id)?;
        Ok(set.into_iter().map(|m| m.into()).collect())
    }

    /// Expand the curated mappings of an alignment with generated candidates.
    pub fn enrich_alignment(
        &self,
        alignment_id: String,
    ) -> Result<FfiEnrichmentReport, ConceptAlignError> {
        let mut db = self.db.lock()?;
        let enricher = Enricher::new(VocabularyPolicy::from_config(&self.config.enrichment));
        let report = enricher.enrich_alignment(&mut db, &alignment_id)?;
        Ok(report.into())
    }

    // =========================================================================
    // Submission Operations
    // =========================================================================

    /// Validate a JSON submission without side effects.
    pub fn validate_submission_json(
        &self,
        json: String,
    ) -> Result<FfiValidationReport, ConceptAlignError> {
        let submission = Submission::from_json(&json)?;
        let db = self.db.lock()?;
        let validator = Validator::new(self.config.validation.clone());
        let report = validator.validate_submission(&submission, &*db, &*db)?;
        Ok(report.into())
    }

    /// Validate and package a submission file.
    pub fn export_submission_file(
        &self,
        path: String,
        metadata: FfiPackageMetadata,
    ) -> Result<FfiExportOutcome, ConceptAlignError> {
        let request = ExportRequest::from_file(&path, metadata.into())?;
        let db = self.db.lock()?;
        let packager = ExportPackager::new(
            &*db,
            &*db,
            Validator::new(self.config.validation.clone()),
            self.config.export.clone(),
        );
        let outcome = packager.export(&request)?;
        Ok(outcome.into())
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe alignment.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAlignment {
    pub alignment_id: String,
    pub name: String,
    pub description: String,
}

impl From<FfiAlignment> for Alignment {
    fn from(a: FfiAlignment) -> Self {
        let mut alignment = Alignment::new(a.alignment_id, a.name);
        alignment.description = a.description;
        alignment
    }
}

/// FFI-safe source concept.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSourceConcept {
    pub row_id: i64,
    pub vocabulary: String,
    pub code: String,
    pub name: String,
    pub category: Option<String>,
}

impl From<FfiSourceConcept> for SourceConcept {
    fn from(s: FfiSourceConcept) -> Self {
        SourceConcept {
            row_id: s.row_id,
            vocabulary: s.vocabulary,
            code: s.code,
            name: s.name,
            category: s.category,
        }
    }
}

impl From<SourceConcept> for FfiSourceConcept {
    fn from(s: SourceConcept) -> Self {
        Self {
            row_id: s.row_id,
            vocabulary: s.vocabulary,
            code: s.code,
            name: s.name,
            category: s.category,
        }
    }
}

/// FFI-safe mapping, as stored.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMapping {
    pub source_group_id: String,
    pub target_concept_id: i64,
    pub unit_concept_id: Option<i64>,
    pub recommended: bool,
    pub origin: String,
}

/// FFI-safe mapping key, the input for curated imports.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMappingKey {
    pub source_group_id: String,
    pub target_concept_id: i64,
    pub unit_concept_id: Option<i64>,
}

impl From<FfiMappingKey> for MappingKey {
    fn from(k: FfiMappingKey) -> Self {
        MappingKey::new(k.source_group_id, k.target_concept_id, k.unit_concept_id)
    }
}

impl From<Mapping> for FfiMapping {
    fn from(m: Mapping) -> Self {
        Self {
            source_group_id: m.key.source_group_id,
            target_concept_id: m.key.target_concept_id,
            unit_concept_id: m.key.unit_concept_id,
            recommended: m.recommended,
            origin: m.origin.as_str().to_string(),
        }
    }
}

/// FFI-safe enrichment summary.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiEnrichmentReport {
    pub curated_processed: u32,
    pub skipped_vocabulary: u32,
    pub missing_target: u32,
    pub generated: u32,
    pub restored: u32,
}

impl From<EnrichmentReport> for FfiEnrichmentReport {
    fn from(r: EnrichmentReport) -> Self {
        Self {
            curated_processed: r.curated_processed as u32,
            skipped_vocabulary: r.skipped_vocabulary as u32,
            missing_target: r.missing_target as u32,
            generated: r.generated as u32,
            restored: r.restored as u32,
        }
    }
}

/// FFI-safe diagnostic (error or warning).
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDiagnostic {
    pub kind: String,
    pub row: u32,
    pub message: String,
}

impl From<ValidationError> for FfiDiagnostic {
    fn from(e: ValidationError) -> Self {
        Self {
            kind: e.kind().to_string(),
            row: e.row() as u32,
            message: e.to_string(),
        }
    }
}

impl From<ValidationWarning> for FfiDiagnostic {
    fn from(w: ValidationWarning) -> Self {
        Self {
            kind: w.kind().to_string(),
            row: w.row() as u32,
            message: w.to_string(),
        }
    }
}

/// FFI-safe validation report.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiValidationReport {
    pub is_valid: bool,
    pub errors: Vec<FfiDiagnostic>,
    pub warnings: Vec<FfiDiagnostic>,
}

impl From<ValidationReport> for FfiValidationReport {
    fn from(r: ValidationReport) -> Self {
        Self {
            is_valid: r.is_valid(),
            errors: r.errors.into_iter().map(|e| e.into()).collect(),
            warnings: r.warnings.into_iter().map(|w| w.into()).collect(),
        }
    }
}

/// FFI-safe package metadata.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPackageMetadata {
    pub name: String,
    pub description: String,
    pub version: String,
}

impl From<FfiPackageMetadata> for PackageMetadata {
    fn from(m: FfiPackageMetadata) -> Self {
        PackageMetadata::new(m.name, m.version).with_description(m.description)
    }
}

/// FFI-safe export outcome.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiExportOutcome {
    pub success: bool,
    pub exit_code: i32,
    pub package_path: Option<String>,
    pub mapped: u32,
    pub unmapped: u32,
    pub errors: Vec<FfiDiagnostic>,
    pub warnings: Vec<FfiDiagnostic>,
    pub scratch_dir: Option<String>,
}

impl From<ExportOutcome> for FfiExportOutcome {
    fn from(outcome: ExportOutcome) -> Self {
        let exit_code = outcome.exit_code();
        match outcome {
            ExportOutcome::Success {
                package_path,
                mapped,
                unmapped,
                warnings,
            } => Self {
                success: true,
                exit_code,
                package_path: Some(package_path.display().to_string()),
                mapped: mapped as u32,
                unmapped: unmapped as u32,
                errors: Vec::new(),
                warnings: warnings.into_iter().map(|w| w.into()).collect(),
                scratch_dir: None,
            },
            ExportOutcome::Failure {
                errors,
                warnings,
                scratch_dir,
            } => Self {
                success: false,
                exit_code,
                package_path: None,
                mapped: 0,
                unmapped: 0,
                errors: errors.into_iter().map(|e| e.into()).collect(),
                warnings: warnings.into_iter().map(|w| w.into()).collect(),
                scratch_dir: Some(scratch_dir.display().to_string()),
            },
        }
    }
}
