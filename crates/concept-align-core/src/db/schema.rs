//! SQLite schema definition.

/// Complete database schema for concept-align.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Vocabulary Snapshot (read-only for the engine)
-- ============================================================================

CREATE TABLE IF NOT EXISTS concept (
    concept_id INTEGER PRIMARY KEY,
    concept_name TEXT NOT NULL,
    vocabulary_id TEXT NOT NULL,
    domain_id TEXT NOT NULL,
    concept_class_id TEXT NOT NULL,
    standard_concept TEXT,                       -- 'S' for standard concepts
    invalid_reason TEXT                          -- NULL while valid
);

CREATE INDEX IF NOT EXISTS idx_concept_vocabulary ON concept(vocabulary_id);

CREATE TABLE IF NOT EXISTS concept_relationship (
    concept_id_1 INTEGER NOT NULL,
    concept_id_2 INTEGER NOT NULL,
    relationship_id TEXT NOT NULL,               -- 'Maps to', 'Mapped from', ...
    PRIMARY KEY (concept_id_1, concept_id_2, relationship_id)
);

CREATE INDEX IF NOT EXISTS idx_relationship_reverse ON concept_relationship(concept_id_2, relationship_id);

-- Precomputed transitive closure of the hierarchy
CREATE TABLE IF NOT EXISTS concept_ancestor (
    ancestor_concept_id INTEGER NOT NULL,
    descendant_concept_id INTEGER NOT NULL,
    PRIMARY KEY (ancestor_concept_id, descendant_concept_id)
);

-- ============================================================================
-- Alignments (Source Batches)
-- ============================================================================

CREATE TABLE IF NOT EXISTS alignments (
    alignment_id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS source_concepts (
    alignment_id TEXT NOT NULL REFERENCES alignments(alignment_id) ON DELETE CASCADE,
    row_id INTEGER NOT NULL,
    vocabulary TEXT NOT NULL,
    code TEXT NOT NULL,
    name TEXT NOT NULL,
    category TEXT,
    PRIMARY KEY (alignment_id, row_id),
    UNIQUE (alignment_id, code)
);

CREATE INDEX IF NOT EXISTS idx_source_category ON source_concepts(alignment_id, category);

-- ============================================================================
-- Mappings
-- ============================================================================

-- unit_concept_id uses 0 for "no unit" so the composite key stays unique
CREATE TABLE IF NOT EXISTS mappings (
    alignment_id TEXT NOT NULL REFERENCES alignments(alignment_id) ON DELETE CASCADE,
    source_group_id TEXT NOT NULL,
    target_concept_id INTEGER NOT NULL,
    unit_concept_id INTEGER NOT NULL DEFAULT 0,
    recommended INTEGER NOT NULL DEFAULT 0,
    origin TEXT NOT NULL CHECK (origin IN ('curated', 'generated')),
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (alignment_id, source_group_id, target_concept_id, unit_concept_id)
);

CREATE INDEX IF NOT EXISTS idx_mappings_target ON mappings(target_concept_id);
"#;
