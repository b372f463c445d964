//! Enrichment integration tests.
//!
//! Deterministic scenarios over a small vocabulary graph plus property tests
//! over randomly generated graphs.

use std::collections::BTreeSet;

use concept_align_core::db::Database;
use concept_align_core::enrichment::{Enricher, VocabularyPolicy};
use concept_align_core::models::{
    Concept, ConceptId, Mapping, MappingKey, MappingOrigin, MappingSet, RelationshipKind,
};
use proptest::prelude::*;

fn concept(id: ConceptId, vocab: &str, domain: &str, class: &str) -> Concept {
    Concept::new(id, format!("concept {}", id), vocab, domain, class)
}

fn curated(source: &str, target: ConceptId) -> Mapping {
    Mapping::curated(MappingKey::new(source, target, None))
}

fn targets_of(set: &MappingSet, source: &str) -> BTreeSet<ConceptId> {
    set.iter()
        .filter(|m| m.key.source_group_id == source)
        .map(|m| m.key.target_concept_id)
        .collect()
}

/// Drug and lab fixtures.
///
/// RxNorm 1 (Clinical Drug)
///   ├─maps─ SNOMED 2 (Drug, Clinical Drug)
///   ├─maps─ RxNorm 3 (Clinical Drug)
///   ├─closure─ RxNorm Extension 4 (Clinical Drug)
///   └─closure─ RxNorm 5 (Ingredient)
///
/// LOINC 10 (Measurement)
///   ├─maps─ SNOMED 20 (Measurement) ─closure─ SNOMED 21, SNOMED 22 (invalid)
///   ├─maps─ SNOMED 23 (Drug, Branded Drug)
///   ├─maps─ RxNorm 1
///   └─closure─ LOINC 11 ─maps─ ICD10 30
fn setup_vocabulary() -> Database {
    let db = Database::open_in_memory().unwrap();

    let mut invalid = concept(22, "SNOMED", "Measurement", "Procedure");
    invalid.invalid_reason = Some("D".into());

    for c in [
        concept(1, "RxNorm", "Drug", "Clinical Drug"),
        concept(2, "SNOMED", "Drug", "Clinical Drug"),
        concept(3, "RxNorm", "Drug", "Clinical Drug"),
        concept(4, "RxNorm Extension", "Drug", "Clinical Drug"),
        concept(5, "RxNorm", "Drug", "Ingredient"),
        concept(10, "LOINC", "Measurement", "Lab Test"),
        concept(11, "LOINC", "Measurement", "Lab Test"),
        concept(20, "SNOMED", "Measurement", "Procedure"),
        concept(21, "SNOMED", "Measurement", "Procedure"),
        invalid,
        concept(23, "SNOMED", "Drug", "Branded Drug"),
        concept(30, "ICD10", "Condition", "ICD10 code"),
    ] {
        db.upsert_concept(&c).unwrap();
    }

    db.insert_relationship(1, 2, RelationshipKind::MapsTo).unwrap();
    db.insert_relationship(3, 1, RelationshipKind::MappedFrom).unwrap();
    db.insert_ancestor(1, 4).unwrap();
    db.insert_ancestor(1, 5).unwrap();

    db.insert_relationship(10, 20, RelationshipKind::MapsTo).unwrap();
    db.insert_relationship(23, 10, RelationshipKind::MapsTo).unwrap();
    db.insert_relationship(10, 1, RelationshipKind::MapsTo).unwrap();
    db.insert_ancestor(20, 21).unwrap();
    db.insert_ancestor(20, 22).unwrap();
    db.insert_ancestor(10, 11).unwrap();
    db.insert_relationship(11, 30, RelationshipKind::MapsTo).unwrap();

    db
}

#[test]
fn test_rxnorm_target_stops_at_same_vocabulary() {
    let db = setup_vocabulary();
    let mut set: MappingSet = vec![curated("ASA", 1)].into_iter().collect();

    Enricher::default().enrich(&db, &mut set).unwrap();

    // Only the RxNorm clinical drug neighbor; no SNOMED, no extension, no ingredient
    assert_eq!(targets_of(&set, "ASA"), BTreeSet::from([1, 3]));
}

#[test]
fn test_lab_target_expands_across_vocabularies() {
    let db = setup_vocabulary();
    let mut set: MappingSet = vec![curated("GLU", 10)].into_iter().collect();

    let report = Enricher::default().enrich(&db, &mut set).unwrap();

    // S1 = {11}, S2 = {20, 30}, S3 = {21}; 22 invalid, 23 branded, 1 RxNorm
    assert_eq!(targets_of(&set, "GLU"), BTreeSet::from([10, 11, 20, 21, 30]));
    assert_eq!(report.generated, 4);
}

#[test]
fn test_allow_list_order_and_membership() {
    let db = setup_vocabulary();
    let policy = VocabularyPolicy::new(vec!["LOINC".into(), "SNOMED".into()]);
    let mut set: MappingSet = vec![curated("GLU", 10), curated("ASA", 1)].into_iter().collect();

    let report = Enricher::new(policy).enrich(&db, &mut set).unwrap();

    // ICD10 is not a landing vocabulary; RxNorm target is skipped outright
    assert_eq!(targets_of(&set, "GLU"), BTreeSet::from([10, 11, 20, 21]));
    assert_eq!(targets_of(&set, "ASA"), BTreeSet::from([1]));
    assert_eq!(report.skipped_vocabulary, 1);
}

#[test]
fn test_shared_targets_across_sources() {
    let db = setup_vocabulary();
    let mut set: MappingSet = vec![curated("GLU-A", 10), curated("GLU-B", 10)]
        .into_iter()
        .collect();

    Enricher::default().enrich(&db, &mut set).unwrap();

    assert_eq!(targets_of(&set, "GLU-A"), targets_of(&set, "GLU-B"));
    assert_eq!(set.len(), 10);
}

#[test]
fn test_drug_domain_filter() {
    let db = setup_vocabulary();
    let mut set: MappingSet = vec![curated("ASA", 1), curated("GLU", 10)].into_iter().collect();

    Enricher::default().enrich(&db, &mut set).unwrap();

    let ids: BTreeSet<ConceptId> = set.iter().map(|m| m.key.target_concept_id).collect();
    let concepts = db.get_concepts(&ids).unwrap();
    for mapping in set.iter().filter(|m| m.origin == MappingOrigin::Generated) {
        let c = &concepts[&mapping.key.target_concept_id];
        assert!(
            c.domain_id != "Drug" || c.concept_class_id == "Clinical Drug",
            "drug candidate {} has class {}",
            c.concept_id,
            c.concept_class_id
        );
    }
}

#[test]
fn test_flags_restored_when_nothing_generated() {
    let db = setup_vocabulary();
    let mut demoted = Mapping::curated(MappingKey::new("X", 21, None));
    demoted.recommended = false;
    let mut promoted = Mapping::generated(MappingKey::new("X", 30, None));
    promoted.recommended = true;
    // SNOMED 21 is a leaf: no neighbors, no descendants
    let mut set: MappingSet = vec![demoted, promoted].into_iter().collect();

    let report = Enricher::default().enrich(&db, &mut set).unwrap();

    assert_eq!(report.generated, 0);
    assert_eq!(report.restored, 2);
    assert!(set.get(&MappingKey::new("X", 21, None)).unwrap().recommended);
    assert!(!set.get(&MappingKey::new("X", 30, None)).unwrap().recommended);
}

// =========================================================================
// Property tests
// =========================================================================

const VOCABS: [&str; 6] = ["RxNorm", "RxNorm Extension", "LOINC", "SNOMED", "ICD10", "CPT4"];

#[derive(Debug, Clone)]
struct RandomGraph {
    /// (vocabulary index, is drug, is clinical drug, is invalid)
    concepts: Vec<(usize, bool, bool, bool)>,
    edges: Vec<(usize, usize)>,
    ancestors: Vec<(usize, usize)>,
    /// (source index, target concept index)
    curated: Vec<(usize, usize)>,
}

fn random_graph() -> impl Strategy<Value = RandomGraph> {
    (4usize..16)
        .prop_flat_map(|n| {
            (
                prop::collection::vec(
                    (0..VOCABS.len(), any::<bool>(), any::<bool>(), prop::bool::weighted(0.2)),
                    n,
                ),
                prop::collection::vec((0..n, 0..n), 0..40),
                prop::collection::vec((0..n, 0..n), 0..30),
                prop::collection::vec((0usize..4, 0..n), 1..8),
            )
        })
        .prop_map(|(concepts, edges, ancestors, curated)| RandomGraph {
            concepts,
            edges,
            ancestors,
            curated,
        })
}

fn build(graph: &RandomGraph) -> (Database, MappingSet) {
    let db = Database::open_in_memory().unwrap();
    for (i, (vocab, drug, clinical, invalid)) in graph.concepts.iter().enumerate() {
        let mut c = concept(
            i as ConceptId + 1,
            VOCABS[*vocab],
            if *drug { "Drug" } else { "Measurement" },
            if *clinical { "Clinical Drug" } else { "Ingredient" },
        );
        if *invalid {
            c.invalid_reason = Some("D".into());
        }
        db.upsert_concept(&c).unwrap();
    }
    for (a, b) in &graph.edges {
        db.insert_relationship(*a as ConceptId + 1, *b as ConceptId + 1, RelationshipKind::MapsTo)
            .unwrap();
    }
    for (a, d) in &graph.ancestors {
        db.insert_ancestor(*a as ConceptId + 1, *d as ConceptId + 1).unwrap();
    }

    let set = graph
        .curated
        .iter()
        .map(|(s, t)| curated(&format!("SRC-{}", s), *t as ConceptId + 1))
        .collect();
    (db, set)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_enrichment_is_idempotent(graph in random_graph()) {
        let (db, input) = build(&graph);
        let enricher = Enricher::default();

        let mut first = input.clone();
        enricher.enrich(&db, &mut first).unwrap();

        let mut second = input.clone();
        enricher.enrich(&db, &mut second).unwrap();
        prop_assert_eq!(&first, &second);

        // Feeding the output back in adds nothing
        let mut again = first.clone();
        let report = enricher.enrich(&db, &mut again).unwrap();
        prop_assert_eq!(report.generated, 0);
        prop_assert_eq!(&again, &first);
    }

    #[test]
    fn prop_recommended_only_on_curated_keys(
        graph in random_graph(),
        demoted in prop::collection::vec(any::<bool>(), 8),
        promoted_target in 1i64..16,
    ) {
        let (db, built) = build(&graph);
        let curated_keys: BTreeSet<MappingKey> = built.iter().map(|m| m.key.clone()).collect();

        // Start from drifted flags: some curated rows demoted, one generated row promoted
        let mut set: MappingSet = built
            .into_iter()
            .zip(demoted.iter().cycle())
            .map(|(mut m, demote)| {
                m.recommended = !demote;
                m
            })
            .collect();
        let mut promoted = Mapping::generated(MappingKey::new("PROMOTED", promoted_target, None));
        promoted.recommended = true;
        set.insert_if_absent(promoted);

        Enricher::default().enrich(&db, &mut set).unwrap();

        for mapping in set.iter() {
            prop_assert_eq!(mapping.recommended, curated_keys.contains(&mapping.key));
        }
        for key in &curated_keys {
            prop_assert!(set.contains(key));
        }
    }

    #[test]
    fn prop_candidates_pass_filters(graph in random_graph()) {
        let (db, mut set) = build(&graph);
        Enricher::default().enrich(&db, &mut set).unwrap();

        let ids: BTreeSet<ConceptId> = set.iter().map(|m| m.key.target_concept_id).collect();
        let concepts = db.get_concepts(&ids).unwrap();

        for mapping in set.iter().filter(|m| m.origin == MappingOrigin::Generated) {
            let c = &concepts[&mapping.key.target_concept_id];
            prop_assert!(c.is_valid());
            prop_assert!(c.domain_id != "Drug" || c.concept_class_id == "Clinical Drug");
            prop_assert!(c.vocabulary_id != "CPT4");
        }
    }

    #[test]
    fn prop_rxnorm_targets_stay_in_vocabulary(graph in random_graph()) {
        let (db, mut set) = build(&graph);
        let input = set.clone();
        Enricher::default().enrich(&db, &mut set).unwrap();

        let ids: BTreeSet<ConceptId> = set.iter().map(|m| m.key.target_concept_id).collect();
        let concepts = db.get_concepts(&ids).unwrap();

        // Sources whose every curated target is RxNorm-family only get
        // candidates from those same vocabularies
        for source in input.iter().map(|m| m.key.source_group_id.clone()).collect::<BTreeSet<_>>() {
            let curated_vocabs: BTreeSet<&str> = input
                .iter()
                .filter(|m| m.key.source_group_id == source)
                .map(|m| concepts[&m.key.target_concept_id].vocabulary_id.as_str())
                .collect();
            if curated_vocabs.iter().all(|v| *v == "RxNorm" || *v == "RxNorm Extension") {
                for mapping in set.iter().filter(|m| m.key.source_group_id == source) {
                    let vocab = concepts[&mapping.key.target_concept_id].vocabulary_id.as_str();
                    prop_assert!(curated_vocabs.contains(vocab));
                }
            }
        }
    }
}
