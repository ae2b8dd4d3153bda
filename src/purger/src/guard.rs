//! Referential checks run before anything is mutated. Guards only read.

use std::collections::BTreeSet;

use common::model::Granule;

use crate::error::StoreError;
use crate::outcome::Conflict;
use crate::repository::{DualStore, Located, RuleReferences};

impl RuleReferences {
    /// Distinct rule names across both catalogs, sorted.
    pub fn names(&self) -> Vec<String> {
        self.relational
            .iter()
            .chain(&self.legacy)
            .map(|rule| rule.name.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct IntegrityGuard {
    store: DualStore,
}

impl IntegrityGuard {
    pub fn new(store: DualStore) -> Self {
        Self { store }
    }

    /// Refuse when any rule in either catalog references `provider`.
    pub async fn check_provider(&self, provider: &str) -> Result<Option<Conflict>, StoreError> {
        let references = self.store.rules_referencing(provider).await?;
        let rules = references.names();
        if rules.is_empty() {
            return Ok(None);
        }

        tracing::info!(
            provider,
            relational = references.relational.len(),
            legacy = references.legacy.len(),
            rules = %rules.join(","),
            "Provider is still referenced by rules"
        );
        Ok(Some(Conflict::ProviderHasRules {
            provider: provider.to_string(),
            rules,
        }))
    }

    /// Refuse when the relational record is published. Legacy-only granules
    /// carry no authoritative publication flag and pass.
    pub fn check_granule(&self, granule: &Located<Granule>) -> Option<Conflict> {
        let relational = granule.relational.as_ref()?;
        if !relational.published {
            return None;
        }

        tracing::info!(granule_id = %relational.granule_id, "Granule is published");
        Some(Conflict::GranulePublished {
            granule_id: relational.granule_id.clone(),
        })
    }
}
