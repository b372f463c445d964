//! Vocabulary policy: which vocabularies are expanded, and how.

use crate::config::EnrichmentConfig;
use crate::models::Concept;

pub const RXNORM: &str = "RxNorm";
pub const RXNORM_EXTENSION: &str = "RxNorm Extension";

/// How a target vocabulary is expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VocabularyFamily {
    /// Same-vocabulary step only; never a landing vocabulary for other steps
    RxNormFamily,
    /// Same-vocabulary step followed by cross-vocabulary expansion
    CrossVocabEligible,
}

fn is_rxnorm_family(vocabulary_id: &str) -> bool {
    vocabulary_id == RXNORM || vocabulary_id == RXNORM_EXTENSION
}

/// Ordered vocabulary allow-list.
#[derive(Debug, Clone, PartialEq)]
pub struct VocabularyPolicy {
    allowed: Vec<String>,
}

impl VocabularyPolicy {
    pub fn new(allowed: Vec<String>) -> Self {
        Self { allowed }
    }

    pub fn from_config(config: &EnrichmentConfig) -> Self {
        Self::new(config.allowed_vocabularies.clone())
    }

    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }

    /// `None` when the vocabulary is outside the allow-list.
    pub fn classify(&self, vocabulary_id: &str) -> Option<VocabularyFamily> {
        if !self.allowed.iter().any(|v| v == vocabulary_id) {
            return None;
        }
        if is_rxnorm_family(vocabulary_id) {
            Some(VocabularyFamily::RxNormFamily)
        } else {
            Some(VocabularyFamily::CrossVocabEligible)
        }
    }

    /// Landing vocabularies for the cross-vocabulary step from `source`,
    /// in allow-list order.
    pub fn cross_vocab_targets(&self, source: &str) -> Vec<String> {
        self.allowed
            .iter()
            .filter(|v| v.as_str() != source && !is_rxnorm_family(v))
            .cloned()
            .collect()
    }
}

impl Default for VocabularyPolicy {
    fn default() -> Self {
        Self::from_config(&EnrichmentConfig::default())
    }
}

/// Candidate filter shared by every expansion step.
pub fn is_eligible(concept: &Concept, vocabularies: &[String]) -> bool {
    vocabularies.iter().any(|v| *v == concept.vocabulary_id)
        && concept.is_valid()
        && concept.has_mappable_granularity()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        let policy = VocabularyPolicy::default();
        assert_eq!(policy.classify("RxNorm"), Some(VocabularyFamily::RxNormFamily));
        assert_eq!(policy.classify("RxNorm Extension"), Some(VocabularyFamily::RxNormFamily));
        assert_eq!(policy.classify("LOINC"), Some(VocabularyFamily::CrossVocabEligible));
        assert_eq!(policy.classify("ICD10"), Some(VocabularyFamily::CrossVocabEligible));
        assert_eq!(policy.classify("CPT4"), None);
    }

    #[test]
    fn test_rxnorm_outside_allow_list_is_skipped() {
        let policy = VocabularyPolicy::new(vec!["LOINC".into(), "SNOMED".into()]);
        assert_eq!(policy.classify("RxNorm"), None);
    }

    #[test]
    fn test_cross_vocab_targets() {
        let policy = VocabularyPolicy::default();
        assert_eq!(policy.cross_vocab_targets("LOINC"), vec!["SNOMED", "ICD10"]);
        assert_eq!(policy.cross_vocab_targets("SNOMED"), vec!["LOINC", "ICD10"]);
        assert!(policy
            .cross_vocab_targets("ICD10")
            .iter()
            .all(|v| !is_rxnorm_family(v)));
    }

    #[test]
    fn test_is_eligible() {
        let vocabs = vec!["RxNorm".to_string()];

        let clinical = Concept::new(1, "aspirin 81 MG Oral Tablet", "RxNorm", "Drug", "Clinical Drug");
        assert!(is_eligible(&clinical, &vocabs));

        let branded = Concept::new(2, "Bayer 81 MG Oral Tablet", "RxNorm", "Drug", "Branded Drug");
        assert!(!is_eligible(&branded, &vocabs));

        let mut deprecated = clinical.clone();
        deprecated.invalid_reason = Some("D".into());
        assert!(!is_eligible(&deprecated, &vocabs));

        let other_vocab = Concept::new(3, "Aspirin", "SNOMED", "Drug", "Clinical Drug");
        assert!(!is_eligible(&other_vocab, &vocabs));
    }
}
