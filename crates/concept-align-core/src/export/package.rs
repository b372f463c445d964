//! Mapping package layout: manifest, tabular artifacts and the sealed archive.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::models::ConceptId;

/// Archive envelope identifier.
pub const ARCHIVE_FORMAT: &str = "concept-align-package";

/// File extension of sealed packages.
pub const PACKAGE_EXTENSION: &str = "mapkg";

pub const MANIFEST_FILE: &str = "manifest.json";
pub const SOURCE_CONCEPTS_FILE: &str = "source_concepts.csv";
pub const MAPPINGS_FILE: &str = "mappings.csv";
pub const EVALUATIONS_FILE: &str = "evaluations.csv";
pub const COMMENTS_FILE: &str = "comments.csv";

/// Tabular artifacts, in archive order.
pub const TABLE_FILES: [&str; 4] = [
    SOURCE_CONCEPTS_FILE,
    MAPPINGS_FILE,
    EVALUATIONS_FILE,
    COMMENTS_FILE,
];

pub const SOURCE_CONCEPTS_HEADER: [&str; 5] =
    ["row_id", "source_vocabulary", "source_code", "source_name", "category"];
pub const MAPPINGS_HEADER: [&str; 8] = [
    "source_code",
    "source_vocabulary",
    "source_name",
    "target_concept_id",
    "target_concept_name",
    "target_vocabulary",
    "confidence_score",
    "rationale",
];
pub const EVALUATIONS_HEADER: [&str; 5] =
    ["source_code", "target_concept_id", "evaluator", "verdict", "evaluated_at"];
pub const COMMENTS_HEADER: [&str; 2] = ["source_code", "comment"];

/// Package errors.
#[derive(Error, Debug)]
pub enum PackageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing package entry: {0}")]
    MissingEntry(String),

    #[error("Unsupported archive format: {0}")]
    Format(String),
}

pub type PackageResult<T> = Result<T, PackageError>;

/// Caller-supplied package identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackageMetadata {
    /// Package name, also used for the archive file name
    pub name: String,
    /// Free-text description
    pub description: String,
    /// Package version
    pub version: String,
}

impl PackageMetadata {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            version: version.into(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Package manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    /// Package format version
    pub format_version: String,
    /// Unique package identifier
    pub package_id: String,
    /// Export timestamp
    pub exported_at: String,
    /// Authoring identity
    pub author: String,
    pub name: String,
    pub description: String,
    pub version: String,
    /// Alignment the package was exported from
    pub batch_id: String,
    pub total_source_concepts: usize,
    pub total_mappings: usize,
}

/// Row of `source_concepts.csv`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceConceptRow {
    pub row_id: i64,
    pub source_vocabulary: String,
    pub source_code: String,
    pub source_name: String,
    pub category: Option<String>,
}

/// Row of `mappings.csv`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MappingRow {
    pub source_code: String,
    pub source_vocabulary: String,
    pub source_name: String,
    pub target_concept_id: ConceptId,
    pub target_concept_name: String,
    pub target_vocabulary: String,
    pub confidence_score: Option<f64>,
    pub rationale: Option<String>,
}

/// Row of `evaluations.csv`; filled by the downstream review workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationRow {
    pub source_code: String,
    pub target_concept_id: ConceptId,
    pub evaluator: String,
    pub verdict: String,
    pub evaluated_at: String,
}

/// Row of `comments.csv`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommentRow {
    pub source_code: String,
    pub comment: String,
}

/// Write a CSV table with an explicit header, so empty tables keep one.
pub fn write_table<T: Serialize>(path: &Path, header: &[&str], rows: &[T]) -> PackageResult<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(header)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Lowercase hex SHA-256.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// One file inside a sealed package.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchiveEntry {
    pub path: String,
    pub sha256: String,
    pub content: String,
}

impl ArchiveEntry {
    pub fn new(path: impl Into<String>, content: String) -> Self {
        Self {
            path: path.into(),
            sha256: sha256_hex(content.as_bytes()),
            content,
        }
    }

    pub fn is_intact(&self) -> bool {
        sha256_hex(self.content.as_bytes()) == self.sha256
    }
}

/// A sealed, self-contained mapping package.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackageArchive {
    pub archive_format: String,
    pub manifest: Manifest,
    pub entries: Vec<ArchiveEntry>,
}

impl PackageArchive {
    /// Seal the manifest and tables found in a drafted workspace.
    pub fn seal(workspace: &Path) -> PackageResult<Self> {
        let manifest_json = read_entry(workspace, MANIFEST_FILE)?;
        let manifest: Manifest = serde_json::from_str(&manifest_json)?;

        let mut entries = vec![ArchiveEntry::new(MANIFEST_FILE, manifest_json)];
        for file in TABLE_FILES {
            entries.push(ArchiveEntry::new(file, read_entry(workspace, file)?));
        }

        Ok(Self {
            archive_format: ARCHIVE_FORMAT.to_string(),
            manifest,
            entries,
        })
    }

    /// Read a sealed package from disk.
    pub fn open<P: AsRef<Path>>(path: P) -> PackageResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let archive: PackageArchive = serde_json::from_str(&content)?;
        if archive.archive_format != ARCHIVE_FORMAT {
            return Err(PackageError::Format(archive.archive_format));
        }
        Ok(archive)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn entry(&self, path: &str) -> Option<&ArchiveEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    /// Paths of missing or corrupted entries; empty when the package is intact.
    pub fn verify(&self) -> Vec<String> {
        let mut problems: Vec<String> = self
            .entries
            .iter()
            .filter(|e| !e.is_intact())
            .map(|e| e.path.clone())
            .collect();

        for required in std::iter::once(MANIFEST_FILE).chain(TABLE_FILES) {
            if self.entry(required).is_none() {
                problems.push(required.to_string());
            }
        }
        problems
    }

    /// Deserialize the rows of one table.
    pub fn read_table<T: DeserializeOwned>(&self, path: &str) -> PackageResult<Vec<T>> {
        let entry = self
            .entry(path)
            .ok_or_else(|| PackageError::MissingEntry(path.to_string()))?;
        let mut reader = csv::Reader::from_reader(entry.content.as_bytes());
        let mut rows = Vec::new();
        for row in reader.deserialize() {
            rows.push(row?);
        }
        Ok(rows)
    }
}

fn read_entry(workspace: &Path, file: &str) -> PackageResult<String> {
    let path = workspace.join(file);
    if !path.exists() {
        return Err(PackageError::MissingEntry(file.to_string()));
    }
    Ok(std::fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> Manifest {
        Manifest {
            format_version: "1.0".into(),
            package_id: "pkg-1".into(),
            exported_at: "2024-01-01T00:00:00Z".into(),
            author: "tester".into(),
            name: "labs".into(),
            description: String::new(),
            version: "1".into(),
            batch_id: "batch-1".into(),
            total_source_concepts: 1,
            total_mappings: 1,
        }
    }

    fn draft_workspace(dir: &Path) {
        std::fs::write(
            dir.join(MANIFEST_FILE),
            serde_json::to_string_pretty(&manifest()).unwrap(),
        )
        .unwrap();
        write_table(
            &dir.join(SOURCE_CONCEPTS_FILE),
            &SOURCE_CONCEPTS_HEADER,
            &[SourceConceptRow {
                row_id: 1,
                source_vocabulary: "LOCAL".into(),
                source_code: "HR-01".into(),
                source_name: "Heart rate, bpm".into(),
                category: None,
            }],
        )
        .unwrap();
        write_table(
            &dir.join(MAPPINGS_FILE),
            &MAPPINGS_HEADER,
            &[MappingRow {
                source_code: "HR-01".into(),
                source_vocabulary: "LOCAL".into(),
                source_name: "Heart rate, bpm".into(),
                target_concept_id: 123,
                target_concept_name: "Heart rate".into(),
                target_vocabulary: "LOINC".into(),
                confidence_score: Some(1.0),
                rationale: None,
            }],
        )
        .unwrap();
        write_table::<EvaluationRow>(&dir.join(EVALUATIONS_FILE), &EVALUATIONS_HEADER, &[]).unwrap();
        write_table::<CommentRow>(&dir.join(COMMENTS_FILE), &COMMENTS_HEADER, &[]).unwrap();
    }

    #[test]
    fn test_empty_table_keeps_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(EVALUATIONS_FILE);
        write_table::<EvaluationRow>(&path, &EVALUATIONS_HEADER, &[]).unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content, "source_code,target_concept_id,evaluator,verdict,evaluated_at\n");
    }

    #[test]
    fn test_seal_and_read_tables() {
        let dir = tempfile::tempdir().unwrap();
        draft_workspace(dir.path());

        let archive = PackageArchive::seal(dir.path()).unwrap();
        assert_eq!(archive.entries.len(), 5);
        assert_eq!(archive.manifest, manifest());
        assert!(archive.verify().is_empty());

        let rows: Vec<MappingRow> = archive.read_table(MAPPINGS_FILE).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].confidence_score, Some(1.0));
        assert_eq!(rows[0].source_name, "Heart rate, bpm");
        assert_eq!(rows[0].rationale, None);

        let evaluations: Vec<EvaluationRow> = archive.read_table(EVALUATIONS_FILE).unwrap();
        assert!(evaluations.is_empty());
    }

    #[test]
    fn test_seal_requires_every_artifact() {
        let dir = tempfile::tempdir().unwrap();
        draft_workspace(dir.path());
        std::fs::remove_file(dir.path().join(COMMENTS_FILE)).unwrap();

        let err = PackageArchive::seal(dir.path()).unwrap_err();
        assert!(matches!(err, PackageError::MissingEntry(f) if f == COMMENTS_FILE));
    }

    #[test]
    fn test_verify_detects_tampering() {
        let dir = tempfile::tempdir().unwrap();
        draft_workspace(dir.path());
        let mut archive = PackageArchive::seal(dir.path()).unwrap();

        archive.entries[2].content.push_str("HR-02,LOCAL,x,1,y,LOINC,0.1,\n");
        archive.entries.retain(|e| e.path != COMMENTS_FILE);

        let problems = archive.verify();
        assert_eq!(problems, vec![MAPPINGS_FILE.to_string(), COMMENTS_FILE.to_string()]);
    }

    #[test]
    fn test_open_rejects_foreign_format() {
        let dir = tempfile::tempdir().unwrap();
        draft_workspace(dir.path());
        let mut archive = PackageArchive::seal(dir.path()).unwrap();
        archive.archive_format = "zip".into();

        let path = dir.path().join("foreign.mapkg");
        std::fs::write(&path, archive.to_json().unwrap()).unwrap();
        assert!(matches!(PackageArchive::open(&path), Err(PackageError::Format(_))));
    }
}
