//! Vocabulary snapshot operations and the [`VocabularyGraph`] implementation.

use std::collections::{BTreeSet, HashMap};

use rusqlite::{params, params_from_iter};

use super::{placeholders, Database, DbResult};
use crate::access::{AccessResult, VocabularyGraph};
use crate::models::{Concept, ConceptId, RelationshipKind};

/// Keeps every `IN (...)` list below SQLite's bound-parameter limit.
const MAX_PARAMS_PER_QUERY: usize = 500;

impl Database {
    /// Insert or replace a concept in the vocabulary snapshot.
    pub fn upsert_concept(&self, concept: &Concept) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO concept (
                concept_id, concept_name, vocabulary_id, domain_id,
                concept_class_id, standard_concept, invalid_reason
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(concept_id) DO UPDATE SET
                concept_name = excluded.concept_name,
                vocabulary_id = excluded.vocabulary_id,
                domain_id = excluded.domain_id,
                concept_class_id = excluded.concept_class_id,
                standard_concept = excluded.standard_concept,
                invalid_reason = excluded.invalid_reason
            "#,
            params![
                concept.concept_id,
                concept.concept_name,
                concept.vocabulary_id,
                concept.domain_id,
                concept.concept_class_id,
                concept.standard_concept,
                concept.invalid_reason,
            ],
        )?;
        Ok(())
    }

    /// Record a directed relationship edge.
    pub fn insert_relationship(
        &self,
        concept_id_1: ConceptId,
        concept_id_2: ConceptId,
        kind: RelationshipKind,
    ) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT OR IGNORE INTO concept_relationship (concept_id_1, concept_id_2, relationship_id)
            VALUES (?1, ?2, ?3)
            "#,
            params![concept_id_1, concept_id_2, kind.as_str()],
        )?;
        Ok(())
    }

    /// Record an ancestor/descendant pair of the closure.
    pub fn insert_ancestor(&self, ancestor: ConceptId, descendant: ConceptId) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT OR IGNORE INTO concept_ancestor (ancestor_concept_id, descendant_concept_id)
            VALUES (?1, ?2)
            "#,
            params![ancestor, descendant],
        )?;
        Ok(())
    }

    /// Fetch concepts by identifier; unknown identifiers are skipped.
    pub fn get_concepts(&self, ids: &BTreeSet<ConceptId>) -> DbResult<HashMap<ConceptId, Concept>> {
        let ids: Vec<ConceptId> = ids.iter().copied().collect();
        let mut found = HashMap::with_capacity(ids.len());

        for chunk in ids.chunks(MAX_PARAMS_PER_QUERY) {
            let sql = format!(
                r#"
                SELECT concept_id, concept_name, vocabulary_id, domain_id,
                       concept_class_id, standard_concept, invalid_reason
                FROM concept
                WHERE concept_id IN ({})
                "#,
                placeholders(chunk.len())
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                Ok(Concept {
                    concept_id: row.get(0)?,
                    concept_name: row.get(1)?,
                    vocabulary_id: row.get(2)?,
                    domain_id: row.get(3)?,
                    concept_class_id: row.get(4)?,
                    standard_concept: row.get(5)?,
                    invalid_reason: row.get(6)?,
                })
            })?;

            for row in rows {
                let concept = row?;
                found.insert(concept.concept_id, concept);
            }
        }

        Ok(found)
    }

    /// Maps-to / mapped-from neighbors in both edge directions.
    pub fn get_mapped_neighbors(
        &self,
        ids: &BTreeSet<ConceptId>,
    ) -> DbResult<BTreeSet<(ConceptId, ConceptId)>> {
        let ids: Vec<ConceptId> = ids.iter().copied().collect();
        let kinds = format!(
            "'{}', '{}'",
            RelationshipKind::MapsTo.as_str(),
            RelationshipKind::MappedFrom.as_str()
        );
        let mut pairs = BTreeSet::new();

        for chunk in ids.chunks(MAX_PARAMS_PER_QUERY) {
            let list = placeholders(chunk.len());
            let sql = format!(
                r#"
                SELECT concept_id_1, concept_id_2 FROM concept_relationship
                WHERE relationship_id IN ({kinds}) AND concept_id_1 IN ({list})
                UNION
                SELECT concept_id_2, concept_id_1 FROM concept_relationship
                WHERE relationship_id IN ({kinds}) AND concept_id_2 IN ({list})
                "#
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter().chain(chunk.iter())), |row| {
                Ok((row.get::<_, ConceptId>(0)?, row.get::<_, ConceptId>(1)?))
            })?;

            for row in rows {
                pairs.insert(row?);
            }
        }

        Ok(pairs)
    }

    /// Descendant pairs of the given ancestors from the closure table.
    pub fn get_descendants(
        &self,
        ids: &BTreeSet<ConceptId>,
    ) -> DbResult<BTreeSet<(ConceptId, ConceptId)>> {
        let ids: Vec<ConceptId> = ids.iter().copied().collect();
        let mut pairs = BTreeSet::new();

        for chunk in ids.chunks(MAX_PARAMS_PER_QUERY) {
            let sql = format!(
                r#"
                SELECT ancestor_concept_id, descendant_concept_id
                FROM concept_ancestor
                WHERE ancestor_concept_id IN ({})
                "#,
                placeholders(chunk.len())
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                Ok((row.get::<_, ConceptId>(0)?, row.get::<_, ConceptId>(1)?))
            })?;

            for row in rows {
                pairs.insert(row?);
            }
        }

        Ok(pairs)
    }
}

impl VocabularyGraph for Database {
    fn concepts(&self, ids: &BTreeSet<ConceptId>) -> AccessResult<HashMap<ConceptId, Concept>> {
        Ok(self.get_concepts(ids)?)
    }

    fn mapped_neighbors(
        &self,
        ids: &BTreeSet<ConceptId>,
    ) -> AccessResult<BTreeSet<(ConceptId, ConceptId)>> {
        Ok(self.get_mapped_neighbors(ids)?)
    }

    fn descendants(
        &self,
        ids: &BTreeSet<ConceptId>,
    ) -> AccessResult<BTreeSet<(ConceptId, ConceptId)>> {
        Ok(self.get_descendants(ids)?)
    }
}
