//! Mapping models and the in-memory mapping set.

use std::collections::{btree_map, BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::concept::ConceptId;

/// Composite key identifying a mapping within one mapping set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MappingKey {
    /// Source group (source code) being mapped
    pub source_group_id: String,
    /// Target concept in the vocabulary graph
    pub target_concept_id: ConceptId,
    /// Optional unit concept qualifying the mapping
    pub unit_concept_id: Option<ConceptId>,
}

impl MappingKey {
    pub fn new(
        source_group_id: impl Into<String>,
        target_concept_id: ConceptId,
        unit_concept_id: Option<ConceptId>,
    ) -> Self {
        Self {
            source_group_id: source_group_id.into(),
            target_concept_id,
            unit_concept_id,
        }
    }

    /// Same source group and unit, different target.
    pub fn with_target(&self, target_concept_id: ConceptId) -> Self {
        Self {
            source_group_id: self.source_group_id.clone(),
            target_concept_id,
            unit_concept_id: self.unit_concept_id,
        }
    }
}

/// How a mapping came to exist.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MappingOrigin {
    /// Approved by a human
    Curated,
    /// Produced by graph expansion
    Generated,
}

impl MappingOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingOrigin::Curated => "curated",
            MappingOrigin::Generated => "generated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "curated" => Some(MappingOrigin::Curated),
            "generated" => Some(MappingOrigin::Generated),
            _ => None,
        }
    }
}

/// A source-to-target association.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Mapping {
    pub key: MappingKey,
    /// Set only by explicit human curation
    pub recommended: bool,
    pub origin: MappingOrigin,
}

impl Mapping {
    /// A human-approved mapping (`recommended = true`).
    pub fn curated(key: MappingKey) -> Self {
        Self {
            key,
            recommended: true,
            origin: MappingOrigin::Curated,
        }
    }

    /// A graph-expansion candidate (`recommended = false`).
    pub fn generated(key: MappingKey) -> Self {
        Self {
            key,
            recommended: false,
            origin: MappingOrigin::Generated,
        }
    }
}

/// Mappings keyed by their composite key.
///
/// Iteration order is the key order, so anything derived from a set is
/// independent of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingSet {
    entries: BTreeMap<MappingKey, Mapping>,
}

impl MappingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &MappingKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &MappingKey) -> Option<&Mapping> {
        self.entries.get(key)
    }

    /// Insert unless the composite key is already present.
    ///
    /// Returns `true` if the mapping was added. An existing entry is never
    /// touched, so a curated mapping keeps its status.
    pub fn insert_if_absent(&mut self, mapping: Mapping) -> bool {
        match self.entries.entry(mapping.key.clone()) {
            btree_map::Entry::Occupied(_) => false,
            btree_map::Entry::Vacant(slot) => {
                slot.insert(mapping);
                true
            }
        }
    }

    /// Remove a mapping by key.
    pub fn remove(&mut self, key: &MappingKey) -> Option<Mapping> {
        self.entries.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mapping> {
        self.entries.values()
    }

    /// Curated mappings, in key order.
    pub fn curated(&self) -> Vec<Mapping> {
        self.entries
            .values()
            .filter(|m| m.origin == MappingOrigin::Curated)
            .cloned()
            .collect()
    }

    /// Keys currently flagged `recommended`.
    pub fn recommended_keys(&self) -> BTreeSet<MappingKey> {
        self.entries
            .values()
            .filter(|m| m.recommended)
            .map(|m| m.key.clone())
            .collect()
    }

    /// Set `recommended` to exactly membership in `keys`.
    ///
    /// Returns the keys whose flag changed.
    pub fn restore_recommended(&mut self, keys: &BTreeSet<MappingKey>) -> Vec<MappingKey> {
        let mut changed = Vec::new();
        for (key, mapping) in self.entries.iter_mut() {
            let should_recommend = keys.contains(key);
            if mapping.recommended != should_recommend {
                mapping.recommended = should_recommend;
                changed.push(key.clone());
            }
        }
        changed
    }
}

impl FromIterator<Mapping> for MappingSet {
    /// First occurrence of a composite key wins.
    fn from_iter<I: IntoIterator<Item = Mapping>>(iter: I) -> Self {
        let mut set = MappingSet::new();
        for mapping in iter {
            set.insert_if_absent(mapping);
        }
        set
    }
}

impl IntoIterator for MappingSet {
    type Item = Mapping;
    type IntoIter = btree_map::IntoValues<MappingKey, Mapping>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}
