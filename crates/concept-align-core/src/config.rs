//! Engine configuration.
//!
//! Loaded from TOML; every section and field falls back to its default.
//!
//! ```toml
//! [enrichment]
//! allowed_vocabularies = ["RxNorm", "RxNorm Extension", "LOINC", "SNOMED", "ICD10"]
//!
//! [validation]
//! low_confidence_threshold = 0.8
//!
//! [export]
//! scratch_root = "work/scratch"
//! output_dir = "work/packages"
//! author = "mapping-team"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Vocabulary allow-list used when none is configured. Order drives the
/// cross-vocabulary step sequencing.
pub const DEFAULT_ALLOWED_VOCABULARIES: [&str; 5] =
    ["RxNorm", "RxNorm Extension", "LOINC", "SNOMED", "ICD10"];

/// Scores below this need a rationale.
pub const DEFAULT_LOW_CONFIDENCE_THRESHOLD: f64 = 0.8;

/// Package format written into every manifest.
pub const DEFAULT_FORMAT_VERSION: &str = "1.0";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub enrichment: EnrichmentConfig,
    pub validation: ValidationConfig,
    pub export: ExportConfig,
}

/// Candidate enrichment settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Ordered vocabulary allow-list
    pub allowed_vocabularies: Vec<String>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            allowed_vocabularies: DEFAULT_ALLOWED_VOCABULARIES
                .iter()
                .map(|v| v.to_string())
                .collect(),
        }
    }
}

/// Submission validation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidationConfig {
    /// Confidence below which an empty comment raises a warning
    pub low_confidence_threshold: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            low_confidence_threshold: DEFAULT_LOW_CONFIDENCE_THRESHOLD,
        }
    }
}

/// Package export settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExportConfig {
    /// Parent directory of per-batch scratch workspaces
    pub scratch_root: PathBuf,
    /// Final location of committed packages
    pub output_dir: PathBuf,
    /// Authoring identity recorded in the manifest
    pub author: String,
    /// Manifest format version
    pub format_version: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            scratch_root: PathBuf::from("scratch"),
            output_dir: PathBuf::from("packages"),
            author: "unknown".to_string(),
            format_version: DEFAULT_FORMAT_VERSION.to_string(),
        }
    }
}

impl EngineConfig {
    /// Parse and check a TOML document.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and check a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.enrichment.allowed_vocabularies.is_empty() {
            return Err(ConfigError::Invalid(
                "enrichment.allowed_vocabularies must not be empty".into(),
            ));
        }
        let threshold = self.validation.low_confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Invalid(format!(
                "validation.low_confidence_threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        if self.export.format_version.trim().is_empty() {
            return Err(ConfigError::Invalid("export.format_version must not be empty".into()));
        }
        Ok(())
    }
}
