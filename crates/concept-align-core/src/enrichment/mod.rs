//! Candidate mapping enrichment.
//!
//! Expands curated mappings into generated candidates by walking the
//! vocabulary graph:
//!
//! ```text
//! curated (source, target ∈ V)
//!        │
//!        ├─ V outside allow-list ─────────────▶ skip
//!        │
//!        ▼
//!   S1 = eligible(maps-to ∪ descendants of target) ∩ V
//!        │
//!        ├─ V ∈ RxNorm family ────────────────▶ S1
//!        │
//!        ▼
//!   S2 = eligible(maps-to of {target} ∪ S1) ∩ (allowed − V − RxNorm family)
//!   S3 = eligible(descendants of S2)          ∩ (allowed − V − RxNorm family)
//!        │
//!        ▼
//!   S1 ∪ S2 ∪ S3
//! ```
//!
//! Curated `recommended` flags are never degraded: new rows are only added for
//! absent composite keys, and a final pass sets `recommended` on exactly the
//! keys that were curated before expansion.

mod policy;

pub use policy::*;

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::access::{AccessError, AccessResult, VocabularyGraph};
use crate::db::{Database, DbError};
use crate::models::{Concept, ConceptId, Mapping, MappingKey, MappingSet};

/// Enrichment errors.
#[derive(Error, Debug)]
pub enum EnrichmentError {
    #[error("Vocabulary access failed: {0}")]
    Access(#[from] AccessError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

pub type EnrichmentResult<T> = Result<T, EnrichmentError>;

/// Summary of one enrichment pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentReport {
    /// Curated mappings that were expanded
    pub curated_processed: usize,
    /// Curated mappings whose target vocabulary is not allowed
    pub skipped_vocabulary: usize,
    /// Curated mappings whose target concept is missing from the vocabulary
    pub missing_target: usize,
    /// Candidate concepts found across all expansions
    pub candidates_considered: usize,
    /// New mapping rows added
    pub generated: usize,
    /// Rows whose `recommended` flag had to be restored
    pub restored: usize,
}

/// Graph-expansion engine.
pub struct Enricher {
    policy: VocabularyPolicy,
}

impl Enricher {
    pub fn new(policy: VocabularyPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &VocabularyPolicy {
        &self.policy
    }

    /// Grow `mappings` with candidates for every curated entry.
    pub fn enrich<G: VocabularyGraph + ?Sized>(
        &self,
        graph: &G,
        mappings: &mut MappingSet,
    ) -> AccessResult<EnrichmentReport> {
        let curated = mappings.curated();
        let curated_keys: BTreeSet<MappingKey> = curated.iter().map(|m| m.key.clone()).collect();

        let target_ids: BTreeSet<ConceptId> =
            curated.iter().map(|m| m.key.target_concept_id).collect();
        let targets = graph.concepts(&target_ids)?;

        let mut report = EnrichmentReport::default();
        let mut cache: HashMap<ConceptId, BTreeSet<ConceptId>> = HashMap::new();

        for mapping in &curated {
            let Some(target) = targets.get(&mapping.key.target_concept_id) else {
                warn!(
                    source = %mapping.key.source_group_id,
                    target = mapping.key.target_concept_id,
                    "curated target not in vocabulary; skipping"
                );
                report.missing_target += 1;
                continue;
            };

            let Some(family) = self.policy.classify(&target.vocabulary_id) else {
                debug!(
                    source = %mapping.key.source_group_id,
                    vocabulary = %target.vocabulary_id,
                    "vocabulary not allowed; skipping"
                );
                report.skipped_vocabulary += 1;
                continue;
            };

            let candidates = match cache.get(&target.concept_id) {
                Some(found) => found.clone(),
                None => {
                    let found = self.candidates_for(graph, target, family)?;
                    cache.insert(target.concept_id, found.clone());
                    found
                }
            };

            report.curated_processed += 1;
            report.candidates_considered += candidates.len();

            let mut added = 0;
            for concept_id in candidates {
                if mappings.insert_if_absent(Mapping::generated(mapping.key.with_target(concept_id))) {
                    added += 1;
                }
            }
            report.generated += added;

            debug!(
                source = %mapping.key.source_group_id,
                target = target.concept_id,
                ?family,
                added,
                "expanded curated mapping"
            );
        }

        // Unconditional, even when nothing was generated
        report.restored = mappings.restore_recommended(&curated_keys).len();

        info!(
            processed = report.curated_processed,
            skipped = report.skipped_vocabulary,
            generated = report.generated,
            restored = report.restored,
            "enrichment pass complete"
        );
        Ok(report)
    }

    /// Enrich a stored alignment and write the result back in one unit of work.
    pub fn enrich_alignment(
        &self,
        db: &mut Database,
        alignment_id: &str,
    ) -> EnrichmentResult<EnrichmentReport> {
        let original = db.load_mappings(alignment_id)?;
        let mut enriched = original.clone();
        let report = self.enrich(&*db, &mut enriched)?;

        let mut uow = db.unit_of_work(alignment_id)?;
        for mapping in enriched.iter() {
            match original.get(&mapping.key) {
                None => {
                    uow.insert_mapping(mapping)?;
                }
                Some(before) if before.recommended != mapping.recommended => {
                    uow.set_recommended(&mapping.key, mapping.recommended)?;
                }
                Some(_) => {}
            }
        }
        let written = uow.commit()?;

        info!(alignment = alignment_id, written, "enrichment persisted");
        Ok(report)
    }

    fn candidates_for<G: VocabularyGraph + ?Sized>(
        &self,
        graph: &G,
        target: &Concept,
        family: VocabularyFamily,
    ) -> AccessResult<BTreeSet<ConceptId>> {
        let seed = BTreeSet::from([target.concept_id]);

        // Same-vocabulary step
        let same_vocab = [target.vocabulary_id.clone()];
        let mut lateral = neighbors_of(graph, &seed)?;
        lateral.extend(descendants_of(graph, &seed)?);
        let s1 = eligible_among(graph, &lateral, &same_vocab)?;

        if family == VocabularyFamily::RxNormFamily {
            return Ok(s1);
        }

        let landing = self.policy.cross_vocab_targets(&target.vocabulary_id);
        if landing.is_empty() {
            return Ok(s1);
        }

        let mut from = s1.clone();
        from.insert(target.concept_id);
        let s2 = eligible_among(graph, &neighbors_of(graph, &from)?, &landing)?;
        let s3 = eligible_among(graph, &descendants_of(graph, &s2)?, &landing)?;

        let mut candidates = s1;
        candidates.extend(s2);
        candidates.extend(s3);
        Ok(candidates)
    }
}

impl Default for Enricher {
    fn default() -> Self {
        Self::new(VocabularyPolicy::default())
    }
}

fn neighbors_of<G: VocabularyGraph + ?Sized>(
    graph: &G,
    ids: &BTreeSet<ConceptId>,
) -> AccessResult<BTreeSet<ConceptId>> {
    if ids.is_empty() {
        return Ok(BTreeSet::new());
    }
    Ok(graph.mapped_neighbors(ids)?.into_iter().map(|(_, to)| to).collect())
}

fn descendants_of<G: VocabularyGraph + ?Sized>(
    graph: &G,
    ids: &BTreeSet<ConceptId>,
) -> AccessResult<BTreeSet<ConceptId>> {
    if ids.is_empty() {
        return Ok(BTreeSet::new());
    }
    Ok(graph.descendants(ids)?.into_iter().map(|(_, d)| d).collect())
}

fn eligible_among<G: VocabularyGraph + ?Sized>(
    graph: &G,
    ids: &BTreeSet<ConceptId>,
    vocabularies: &[String],
) -> AccessResult<BTreeSet<ConceptId>> {
    if ids.is_empty() {
        return Ok(BTreeSet::new());
    }
    Ok(graph
        .concepts(ids)?
        .into_values()
        .filter(|c| is_eligible(c, vocabularies))
        .map(|c| c.concept_id)
        .collect())
}
