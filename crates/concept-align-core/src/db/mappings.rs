//! Mapping store operations.
//!
//! Every multi-row write goes through a [`MappingUnitOfWork`], so a batch is
//! either fully applied or leaves the store as it was.

use rusqlite::{params, Transaction};

use super::{constraint_or, Database, DbError, DbResult};
use crate::models::{ConceptId, Mapping, MappingKey, MappingOrigin, MappingSet};

/// Stored value for "no unit".
const NO_UNIT: ConceptId = 0;

fn unit_to_column(unit: Option<ConceptId>) -> ConceptId {
    unit.unwrap_or(NO_UNIT)
}

fn unit_from_column(unit: ConceptId) -> Option<ConceptId> {
    (unit != NO_UNIT).then_some(unit)
}

/// Explicit transaction over the mappings of one alignment.
///
/// Dropping without [`commit`](Self::commit) rolls every write back.
pub struct MappingUnitOfWork<'a> {
    tx: Transaction<'a>,
    alignment_id: String,
    written: usize,
}

impl<'a> MappingUnitOfWork<'a> {
    /// Insert a mapping; a key already in the store is a constraint error.
    pub fn insert_mapping(&mut self, mapping: &Mapping) -> DbResult<()> {
        self.tx
            .execute(
                r#"
                INSERT INTO mappings (
                    alignment_id, source_group_id, target_concept_id,
                    unit_concept_id, recommended, origin
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    self.alignment_id,
                    mapping.key.source_group_id,
                    mapping.key.target_concept_id,
                    unit_to_column(mapping.key.unit_concept_id),
                    mapping.recommended,
                    mapping.origin.as_str(),
                ],
            )
            .map_err(|e| constraint_or(e, || format!("duplicate mapping {:?}", mapping.key)))?;
        self.written += 1;
        Ok(())
    }

    /// Insert a mapping unless its key exists. Returns `true` if written.
    pub fn insert_if_absent(&mut self, mapping: &Mapping) -> DbResult<bool> {
        let rows_affected = self.tx.execute(
            r#"
            INSERT INTO mappings (
                alignment_id, source_group_id, target_concept_id,
                unit_concept_id, recommended, origin
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT DO NOTHING
            "#,
            params![
                self.alignment_id,
                mapping.key.source_group_id,
                mapping.key.target_concept_id,
                unit_to_column(mapping.key.unit_concept_id),
                mapping.recommended,
                mapping.origin.as_str(),
            ],
        )?;
        self.written += rows_affected;
        Ok(rows_affected > 0)
    }

    /// Overwrite the `recommended` flag of an existing mapping.
    pub fn set_recommended(&mut self, key: &MappingKey, recommended: bool) -> DbResult<bool> {
        let rows_affected = self.tx.execute(
            r#"
            UPDATE mappings SET recommended = ?5, updated_at = datetime('now')
            WHERE alignment_id = ?1 AND source_group_id = ?2
            AND target_concept_id = ?3 AND unit_concept_id = ?4
            "#,
            params![
                self.alignment_id,
                key.source_group_id,
                key.target_concept_id,
                unit_to_column(key.unit_concept_id),
                recommended,
            ],
        )?;
        self.written += rows_affected;
        Ok(rows_affected > 0)
    }

    /// Rows written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Make every write durable. Returns the number of rows written.
    pub fn commit(self) -> DbResult<usize> {
        self.tx.commit()?;
        Ok(self.written)
    }

    /// Discard every write.
    pub fn rollback(self) -> DbResult<()> {
        self.tx.rollback()?;
        Ok(())
    }
}

impl Database {
    /// Begin a unit of work over an existing alignment's mappings.
    pub fn unit_of_work(&mut self, alignment_id: &str) -> DbResult<MappingUnitOfWork<'_>> {
        if self.get_alignment(alignment_id)?.is_none() {
            return Err(DbError::NotFound(format!("alignment {}", alignment_id)));
        }
        Ok(MappingUnitOfWork {
            tx: self.conn.transaction()?,
            alignment_id: alignment_id.to_string(),
            written: 0,
        })
    }

    /// All-or-nothing bulk import.
    ///
    /// A key that already exists (in the store or earlier in `mappings`)
    /// aborts the whole import.
    pub fn import_mappings(&mut self, alignment_id: &str, mappings: &[Mapping]) -> DbResult<usize> {
        let mut uow = self.unit_of_work(alignment_id)?;
        for mapping in mappings {
            // Early return drops `uow`, rolling back
            uow.insert_mapping(mapping)?;
        }
        uow.commit()
    }

    /// Load the mapping set of an alignment.
    pub fn load_mappings(&self, alignment_id: &str) -> DbResult<MappingSet> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT source_group_id, target_concept_id, unit_concept_id, recommended, origin
            FROM mappings
            WHERE alignment_id = ?
            "#,
        )?;

        let rows = stmt.query_map([alignment_id], |row| {
            Ok(MappingRow {
                source_group_id: row.get(0)?,
                target_concept_id: row.get(1)?,
                unit_concept_id: row.get(2)?,
                recommended: row.get(3)?,
                origin: row.get(4)?,
            })
        })?;

        let mut set = MappingSet::new();
        for row in rows {
            set.insert_if_absent(row?.try_into()?);
        }
        Ok(set)
    }

    /// Delete one mapping.
    pub fn delete_mapping(&self, alignment_id: &str, key: &MappingKey) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            DELETE FROM mappings
            WHERE alignment_id = ?1 AND source_group_id = ?2
            AND target_concept_id = ?3 AND unit_concept_id = ?4
            "#,
            params![
                alignment_id,
                key.source_group_id,
                key.target_concept_id,
                unit_to_column(key.unit_concept_id),
            ],
        )?;
        Ok(rows_affected > 0)
    }
}

/// Intermediate row struct for database mapping.
struct MappingRow {
    source_group_id: String,
    target_concept_id: ConceptId,
    unit_concept_id: ConceptId,
    recommended: bool,
    origin: String,
}

impl TryFrom<MappingRow> for Mapping {
    type Error = DbError;

    fn try_from(row: MappingRow) -> Result<Self, Self::Error> {
        let origin = MappingOrigin::parse(&row.origin)
            .ok_or_else(|| DbError::Constraint(format!("unknown mapping origin: {}", row.origin)))?;
        Ok(Mapping {
            key: MappingKey {
                source_group_id: row.source_group_id,
                target_concept_id: row.target_concept_id,
                unit_concept_id: unit_from_column(row.unit_concept_id),
            },
            recommended: row.recommended,
            origin,
        })
    }
}
