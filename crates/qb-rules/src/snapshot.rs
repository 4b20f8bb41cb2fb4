use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::normalize::normalize;

/// A user-defined relevance token with three independent integer weights.
/// Stored normalized; zero weight in a field means "do not score there".
#[derive(Debug, Clone)]
pub struct KeywordRule {
    pub id: Uuid,
    pub normalized_text: String,
    pub title_weight: i64,
    pub description_weight: i64,
    pub products_weight: i64,
}

impl KeywordRule {
    pub fn new(id: Uuid, text: &str, title_weight: i64, description_weight: i64, products_weight: i64) -> Self {
        Self {
            id,
            normalized_text: normalize(text),
            title_weight,
            description_weight,
            products_weight,
        }
    }
}

/// Exactly one row per organism at most.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrganismRuleKind {
    Priority(i64),
    Unwanted,
}

/// A coherent, immutable view published atomically by [`crate::cache::RulesCache`].
/// Readers never observe a half-refreshed state.
#[derive(Debug, Clone, Default)]
pub struct RulesCacheSnapshot {
    pub keywords: Vec<KeywordRule>,
    pub organism_priority: HashMap<Uuid, i64>,
    pub organism_unwanted: HashSet<Uuid>,
    pub organism_name_to_id: HashMap<String, Uuid>,
}

impl RulesCacheSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Resolves a raw (non-normalized) organism name to an id.
    ///
    /// Exact match on the normalized name wins first; otherwise falls back to
    /// "first map key that is a substring of the input" — deterministic
    /// iteration order is not guaranteed by this map, matching the upstream
    /// behavior of "first match wins, whatever that means for this map".
    pub fn resolve_organism(&self, raw_name: &str) -> Option<Uuid> {
        let normalized = normalize(raw_name);
        if let Some(id) = self.organism_name_to_id.get(&normalized) {
            return Some(*id);
        }
        self.organism_name_to_id
            .iter()
            .find(|(known_name, _)| normalized.contains(known_name.as_str()))
            .map(|(_, id)| *id)
    }
}
