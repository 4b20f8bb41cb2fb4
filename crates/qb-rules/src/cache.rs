use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use uuid::Uuid;

use crate::normalize::normalize;
use crate::snapshot::{KeywordRule, OrganismRuleKind, RulesCacheSnapshot};

/// Supplies the raw rows a refresh needs. Implemented by the repository
/// crate; kept as a trait here so the cache never depends on the database
/// layer directly.
#[async_trait]
pub trait RulesSource: Send + Sync {
    async fn load_keywords(&self) -> anyhow::Result<Vec<KeywordRule>>;
    async fn load_organism_rules(&self) -> anyhow::Result<Vec<(Uuid, OrganismRuleKind)>>;
    async fn load_organism_names(&self) -> anyhow::Result<Vec<(Uuid, String)>>;
}

/// Holds the current [`RulesCacheSnapshot`] behind a lock-free pointer swap.
/// Refresh builds a brand new snapshot off to the side and publishes it
/// atomically; readers never see a partially-updated cache.
pub struct RulesCache {
    snapshot: ArcSwap<RulesCacheSnapshot>,
}

impl Default for RulesCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RulesCache {
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(RulesCacheSnapshot::empty()),
        }
    }

    /// Returns the currently published snapshot. Cheap: an atomic load of an
    /// `Arc` clone, no locking.
    pub fn load(&self) -> Arc<RulesCacheSnapshot> {
        self.snapshot.load_full()
    }

    /// Reads keywords, organism rules, and organism names from `source`,
    /// builds a new snapshot, and publishes it. Requested at startup, before
    /// every score recompute, and whenever rules change.
    pub async fn refresh(&self, source: &dyn RulesSource) -> anyhow::Result<()> {
        let keywords = source.load_keywords().await?;
        let organism_rules = source.load_organism_rules().await?;
        let organism_names = source.load_organism_names().await?;

        let mut organism_priority = std::collections::HashMap::new();
        let mut organism_unwanted = std::collections::HashSet::new();
        for (id, kind) in organism_rules {
            match kind {
                OrganismRuleKind::Priority(points) => {
                    organism_priority.insert(id, points);
                }
                OrganismRuleKind::Unwanted => {
                    organism_unwanted.insert(id);
                }
            }
        }

        let organism_name_to_id = organism_names
            .into_iter()
            .map(|(id, name)| (normalize(&name), id))
            .collect();

        let new_snapshot = RulesCacheSnapshot {
            keywords,
            organism_priority,
            organism_unwanted,
            organism_name_to_id,
        };

        self.snapshot.store(Arc::new(new_snapshot));
        tracing::info!("rules cache refreshed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeSource {
        keywords: Vec<KeywordRule>,
        organism_rules: Vec<(Uuid, OrganismRuleKind)>,
        organism_names: Vec<(Uuid, String)>,
        refresh_count: Mutex<u32>,
    }

    #[async_trait]
    impl RulesSource for FakeSource {
        async fn load_keywords(&self) -> anyhow::Result<Vec<KeywordRule>> {
            *self.refresh_count.lock().unwrap() += 1;
            Ok(self.keywords.clone())
        }
        async fn load_organism_rules(&self) -> anyhow::Result<Vec<(Uuid, OrganismRuleKind)>> {
            Ok(self.organism_rules.clone())
        }
        async fn load_organism_names(&self) -> anyhow::Result<Vec<(Uuid, String)>> {
            Ok(self.organism_names.clone())
        }
    }

    #[tokio::test]
    async fn refresh_publishes_coherent_snapshot() {
        let id = Uuid::new_v4();
        let source = FakeSource {
            keywords: vec![KeywordRule::new(Uuid::new_v4(), "informatica", 10, 0, 0)],
            organism_rules: vec![(id, OrganismRuleKind::Unwanted)],
            organism_names: vec![(id, "Municipalidad de Ejemplo".to_string())],
            refresh_count: Mutex::new(0),
        };

        let cache = RulesCache::new();
        assert!(cache.load().keywords.is_empty());

        cache.refresh(&source).await.unwrap();

        let snapshot = cache.load();
        assert_eq!(snapshot.keywords.len(), 1);
        assert!(snapshot.organism_unwanted.contains(&id));
        assert_eq!(snapshot.resolve_organism("Municipalidad de Ejemplo"), Some(id));
    }
}
