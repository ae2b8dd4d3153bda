//! Uniform access to one logical record across both catalogs.

use common::catalog::{Catalog, GranuleDeletion};
use common::legacy::{LegacyCatalog, LegacyStoreError};
use common::model::{Entity, Granule, Provider, ReconciliationReport, Rule};

use crate::error::StoreError;
use crate::outcome::StoreOutcome;

/// A record as seen by each catalog
#[derive(Debug, Clone, PartialEq)]
pub struct Located<T> {
    pub relational: Option<T>,
    pub legacy: Option<T>,
}

impl<T> Located<T> {
    pub fn is_absent(&self) -> bool {
        self.relational.is_none() && self.legacy.is_none()
    }

    /// Either copy, the relational one when both exist.
    pub fn any(&self) -> Option<&T> {
        self.relational.as_ref().or(self.legacy.as_ref())
    }
}

/// Rules referencing one provider, per catalog
#[derive(Debug, Clone, Default)]
pub struct RuleReferences {
    pub relational: Vec<Rule>,
    pub legacy: Vec<Rule>,
}

/// The relational catalog and the legacy mirror, composed.
///
/// Writes go to the relational catalog first. Relational deletes are
/// transactional; legacy deletes are single idempotent calls issued only
/// after the relational commit.
#[derive(Debug, Clone)]
pub struct DualStore {
    catalog: Catalog,
    legacy: LegacyCatalog,
}

impl DualStore {
    pub fn new(catalog: Catalog, legacy: LegacyCatalog) -> Self {
        Self { catalog, legacy }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn legacy(&self) -> &LegacyCatalog {
        &self.legacy
    }

    // ---- reads ----

    pub async fn find_granule(&self, granule_id: &str) -> Result<Located<Granule>, StoreError> {
        let (relational, legacy) = tokio::try_join!(
            async { Ok::<_, StoreError>(self.catalog.get_granule(granule_id).await?) },
            async { Ok::<_, StoreError>(self.legacy.get::<Granule>(granule_id).await?) },
        )?;
        Ok(Located { relational, legacy })
    }

    pub async fn find_provider(&self, name: &str) -> Result<Located<Provider>, StoreError> {
        let (relational, legacy) = tokio::try_join!(
            async { Ok::<_, StoreError>(self.catalog.get_provider(name).await?) },
            async { Ok::<_, StoreError>(self.legacy.get::<Provider>(name).await?) },
        )?;
        Ok(Located { relational, legacy })
    }

    pub async fn find_reconciliation_report(
        &self,
        name: &str,
    ) -> Result<Located<ReconciliationReport>, StoreError> {
        let (relational, legacy) = tokio::try_join!(
            async { Ok::<_, StoreError>(self.catalog.get_reconciliation_report(name).await?) },
            async { Ok::<_, StoreError>(self.legacy.get::<ReconciliationReport>(name).await?) },
        )?;
        Ok(Located { relational, legacy })
    }

    /// Both catalogs are queried concurrently; either failing fails the lookup.
    pub async fn rules_referencing(&self, provider: &str) -> Result<RuleReferences, StoreError> {
        let (relational, legacy) = tokio::try_join!(
            async { Ok::<_, StoreError>(self.catalog.rules_by_provider(provider).await?) },
            async { Ok::<_, StoreError>(self.legacy.rules_by_provider(provider).await?) },
        )?;
        Ok(RuleReferences { relational, legacy })
    }

    // ---- writes ----

    pub async fn put_granule(&self, granule: &Granule) -> Result<(), StoreError> {
        self.catalog.put_granule(granule).await?;
        self.legacy.put(granule).await?;
        Ok(())
    }

    pub async fn put_provider(&self, provider: &Provider) -> Result<(), StoreError> {
        self.catalog.put_provider(provider).await?;
        self.legacy.put(provider).await?;
        Ok(())
    }

    pub async fn put_rule(&self, rule: &Rule) -> Result<(), StoreError> {
        self.catalog.put_rule(rule).await?;
        self.legacy.put(rule).await?;
        Ok(())
    }

    pub async fn put_reconciliation_report(
        &self,
        report: &ReconciliationReport,
    ) -> Result<(), StoreError> {
        self.catalog.put_reconciliation_report(report).await?;
        self.legacy.put(report).await?;
        Ok(())
    }

    // ---- deletes ----

    /// Remove a granule and its file rows, refusing inside the transaction
    /// when the granule is published.
    pub async fn delete_granule(&self, granule_id: &str) -> Result<GranuleDeletion, StoreError> {
        Ok(self.catalog.delete_granule(granule_id).await?)
    }

    pub async fn delete_provider(&self, name: &str) -> Result<StoreOutcome, StoreError> {
        let removed = self.catalog.delete_provider(name).await?;
        Ok(StoreOutcome::from_removed(removed))
    }

    /// Returns the removed report so its object location survives the delete.
    pub async fn delete_reconciliation_report(
        &self,
        name: &str,
    ) -> Result<Option<ReconciliationReport>, StoreError> {
        Ok(self.catalog.delete_reconciliation_report(name).await?)
    }

    /// Delete the legacy copy of a record.
    pub async fn delete_legacy<T: Entity>(&self, id: &str) -> Result<StoreOutcome, LegacyStoreError> {
        let removed = self.legacy.delete::<T>(id).await?;
        Ok(StoreOutcome::from_removed(removed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::testing::{fake_granule, fake_provider, fake_rule};

    async fn store() -> DualStore {
        DualStore::new(
            Catalog::new_in_memory().await.unwrap(),
            LegacyCatalog::in_memory(),
        )
    }

    #[tokio::test]
    async fn test_put_writes_both_catalogs() {
        let store = store().await;
        let granule = fake_granule("gran-1", &["s3://b/k1"]);
        store.put_granule(&granule).await.unwrap();

        let located = store.find_granule("gran-1").await.unwrap();
        assert_eq!(located.relational.as_ref(), Some(&granule));
        assert_eq!(located.legacy.as_ref(), Some(&granule));
        assert_eq!(located.any(), Some(&granule));
    }

    #[tokio::test]
    async fn test_find_absent_record() {
        let store = store().await;
        let located = store.find_provider("missing").await.unwrap();
        assert!(located.is_absent());
        assert!(located.any().is_none());
    }

    #[tokio::test]
    async fn test_legacy_only_record_is_found() {
        let store = store().await;
        store.legacy().put(&fake_provider("prov-legacy")).await.unwrap();

        let located = store.find_provider("prov-legacy").await.unwrap();
        assert!(located.relational.is_none());
        assert_eq!(located.any().map(|p| p.name.as_str()), Some("prov-legacy"));
    }

    #[tokio::test]
    async fn test_rules_referencing_reads_both_catalogs() {
        let store = store().await;
        store
            .catalog()
            .put_rule(&fake_rule("rule-A", Some("prov-1")))
            .await
            .unwrap();
        store
            .legacy()
            .put(&fake_rule("rule-B", Some("prov-1")))
            .await
            .unwrap();

        let refs = store.rules_referencing("prov-1").await.unwrap();
        assert_eq!(refs.relational.len(), 1);
        assert_eq!(refs.legacy.len(), 1);
    }

    #[tokio::test]
    async fn test_deletes_report_absence() {
        let store = store().await;
        store.put_provider(&fake_provider("prov-1")).await.unwrap();

        assert_eq!(store.delete_provider("prov-1").await.unwrap(), StoreOutcome::Removed);
        assert_eq!(
            store.delete_legacy::<Provider>("prov-1").await.unwrap(),
            StoreOutcome::Removed
        );
        assert_eq!(store.delete_provider("prov-1").await.unwrap(), StoreOutcome::Absent);
        assert_eq!(
            store.delete_legacy::<Provider>("prov-1").await.unwrap(),
            StoreOutcome::Absent
        );
    }
}
