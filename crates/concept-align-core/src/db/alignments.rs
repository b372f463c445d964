//! Alignment (source batch) database operations.

use rusqlite::{params, OptionalExtension};

use super::{constraint_or, Database, DbResult};
use crate::access::{AccessError, AccessResult, SourceBatchAccess};
use crate::models::{Alignment, SourceConcept};

impl Database {
    /// Register an alignment and its source concepts in one transaction.
    ///
    /// Fails without writing anything if the alignment already exists or a
    /// source code repeats within the batch.
    pub fn register_alignment(
        &mut self,
        alignment: &Alignment,
        sources: &[SourceConcept],
    ) -> DbResult<()> {
        let tx = self.conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO alignments (alignment_id, name, description, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                alignment.alignment_id,
                alignment.name,
                alignment.description,
                alignment.created_at,
            ],
        )
        .map_err(|e| constraint_or(e, || format!("alignment {} already exists", alignment.alignment_id)))?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO source_concepts (alignment_id, row_id, vocabulary, code, name, category)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )?;
            for source in sources {
                stmt.execute(params![
                    alignment.alignment_id,
                    source.row_id,
                    source.vocabulary,
                    source.code,
                    source.name,
                    source.category,
                ])
                .map_err(|e| {
                    constraint_or(e, || {
                        format!("duplicate source row {} / code {}", source.row_id, source.code)
                    })
                })?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Get an alignment by ID.
    pub fn get_alignment(&self, alignment_id: &str) -> DbResult<Option<Alignment>> {
        Ok(self
            .conn
            .query_row(
                r#"
                SELECT alignment_id, name, description, created_at
                FROM alignments
                WHERE alignment_id = ?
                "#,
                [alignment_id],
                |row| {
                    Ok(Alignment {
                        alignment_id: row.get(0)?,
                        name: row.get(1)?,
                        description: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()?)
    }

    /// List source concepts of an alignment, ordered by row ID.
    pub fn list_source_concepts(
        &self,
        alignment_id: &str,
        category: Option<&str>,
    ) -> DbResult<Vec<SourceConcept>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT row_id, vocabulary, code, name, category
            FROM source_concepts
            WHERE alignment_id = ?1
            AND (?2 IS NULL OR category = ?2)
            ORDER BY row_id
            "#,
        )?;

        let rows = stmt.query_map(params![alignment_id, category], |row| {
            Ok(SourceConcept {
                row_id: row.get(0)?,
                vocabulary: row.get(1)?,
                code: row.get(2)?,
                name: row.get(3)?,
                category: row.get(4)?,
            })
        })?;

        let mut sources = Vec::new();
        for row in rows {
            sources.push(row?);
        }
        Ok(sources)
    }

    /// Delete an alignment with its source concepts and mappings.
    pub fn delete_alignment(&self, alignment_id: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM alignments WHERE alignment_id = ?", [alignment_id])?;
        Ok(rows_affected > 0)
    }
}

impl SourceBatchAccess for Database {
    fn source_batch(
        &self,
        batch_id: &str,
        category: Option<&str>,
    ) -> AccessResult<Vec<SourceConcept>> {
        if self.get_alignment(batch_id)?.is_none() {
            return Err(AccessError::UnknownBatch(batch_id.to_string()));
        }
        Ok(self.list_source_concepts(batch_id, category)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbError;

    fn setup_db() -> Database {
        let mut db = Database::open_in_memory().unwrap();
        let alignment = Alignment::new("labs-2024", "Lab tests 2024");
        let sources = vec![
            SourceConcept::new(1, "LOCAL", "HR-01", "Heart rate").with_category("vitals"),
            SourceConcept::new(2, "LOCAL", "GLU-02", "Glucose, serum").with_category("lab"),
            SourceConcept::new(3, "LOCAL", "NA-03", "Sodium").with_category("lab"),
        ];
        db.register_alignment(&alignment, &sources).unwrap();
        db
    }

    #[test]
    fn test_register_and_list() {
        let db = setup_db();

        let alignment = db.get_alignment("labs-2024").unwrap().unwrap();
        assert_eq!(alignment.name, "Lab tests 2024");

        let all = db.list_source_concepts("labs-2024", None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].code, "HR-01");

        let labs = db.list_source_concepts("labs-2024", Some("lab")).unwrap();
        let codes: Vec<_> = labs.iter().map(|s| s.code.as_str()).collect();
        assert_eq!(codes, vec!["GLU-02", "NA-03"]);
    }

    #[test]
    fn test_register_is_atomic() {
        let mut db = setup_db();

        let alignment = Alignment::new("drugs", "Drugs");
        let sources = vec![
            SourceConcept::new(1, "LOCAL", "D-1", "Aspirin"),
            SourceConcept::new(2, "LOCAL", "D-1", "Aspirin again"),
        ];
        let err = db.register_alignment(&alignment, &sources).unwrap_err();
        assert!(matches!(err, DbError::Constraint(_)));

        // Nothing from the failed batch was kept
        assert!(db.get_alignment("drugs").unwrap().is_none());
        assert!(db.list_source_concepts("drugs", None).unwrap().is_empty());
    }

    #[test]
    fn test_register_duplicate_alignment() {
        let mut db = setup_db();
        let err = db
            .register_alignment(&Alignment::new("labs-2024", "Again"), &[])
            .unwrap_err();
        assert!(matches!(err, DbError::Constraint(_)));
    }

    #[test]
    fn test_source_batch_unknown() {
        let db = setup_db();
        let err = db.source_batch("missing", None).unwrap_err();
        assert!(matches!(err, AccessError::UnknownBatch(id) if id == "missing"));
    }

    #[test]
    fn test_delete_alignment_cascades() {
        let db = setup_db();
        assert!(db.delete_alignment("labs-2024").unwrap());
        assert!(db.list_source_concepts("labs-2024", None).unwrap().is_empty());
        assert!(!db.delete_alignment("labs-2024").unwrap());
    }
}
