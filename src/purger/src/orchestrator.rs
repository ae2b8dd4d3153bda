//! Sequences guard checks, the catalog delete and artifact cleanup.
//!
//! Every delete walks `GuardCheck -> CatalogDelete -> ArtifactCleanup` and
//! ends `Deleted`, `Refused` or `Failed`. The relational commit is the
//! durability boundary: before it a failure leaves every store untouched,
//! after it the remaining steps run to completion and only report.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Context;
use common::catalog::{Catalog, GranuleDeletion};
use common::config::{Configuration, LegacyBackend};
use common::legacy::{InMemoryLegacyStore, LegacyCatalog, LegacyStore, SqlLegacyStore};
use common::model::{
    Entity, Granule, GranuleFile, ObjectLocation, Provider, ReconciliationReport,
};
use common::retry::RetryPolicy;
use common::storage::{ArtifactStore, BucketStores};

use crate::cleanup::{ArtifactCleaner, CleanupConfig, CleanupReport};
use crate::error::{DeletionError, StoreError};
use crate::guard::IntegrityGuard;
use crate::outcome::{Conflict, DeleteOutcome, DeleteTarget, DeletionSummary, Phase, StoreOutcome};
use crate::repository::DualStore;

/// Early exit from a delete flow
enum Halt {
    Refused(Conflict),
    Failed(DeletionError),
}

impl From<Conflict> for Halt {
    fn from(conflict: Conflict) -> Self {
        Halt::Refused(conflict)
    }
}

impl From<DeletionError> for Halt {
    fn from(e: DeletionError) -> Self {
        Halt::Failed(e)
    }
}

impl From<StoreError> for Halt {
    fn from(e: StoreError) -> Self {
        Halt::Failed(e.into())
    }
}

impl From<Result<DeletionSummary, Halt>> for DeleteOutcome {
    fn from(result: Result<DeletionSummary, Halt>) -> Self {
        match result {
            Ok(summary) => DeleteOutcome::Deleted(summary),
            Err(Halt::Refused(conflict)) => DeleteOutcome::Refused(conflict),
            Err(Halt::Failed(e)) => DeleteOutcome::Failed(e),
        }
    }
}

/// What the catalog phase handed over to cleanup
struct Committed {
    relational: StoreOutcome,
    artifacts: Vec<ObjectLocation>,
    unresolved: Vec<(String, String)>,
}

/// Deletes granules, providers and reconciliation reports from every store.
#[derive(Debug, Clone)]
pub struct Purger {
    store: DualStore,
    guard: IntegrityGuard,
    cleaner: ArtifactCleaner,
}

impl Purger {
    pub fn new(store: DualStore, cleaner: ArtifactCleaner) -> Self {
        Self {
            guard: IntegrityGuard::new(store.clone()),
            store,
            cleaner,
        }
    }

    /// Connect every store named by the configuration.
    pub async fn from_config(config: &Configuration) -> anyhow::Result<Self> {
        config.validate()?;

        let catalog = Catalog::new(&config.database.dsn)
            .await
            .context("Failed to open relational catalog")?
            .with_transaction_timeout(config.database.transaction_timeout);

        let legacy_store: Arc<dyn LegacyStore> = match config.legacy.backend {
            LegacyBackend::Memory => {
                tracing::warn!(
                    "Legacy catalog is process-local memory; rules held by other processes are invisible to the provider guard"
                );
                Arc::new(InMemoryLegacyStore::default())
            }
            LegacyBackend::Sql => {
                let dsn = config
                    .legacy
                    .dsn
                    .as_deref()
                    .context("legacy.dsn is required for the sql backend")?;
                Arc::new(
                    SqlLegacyStore::new(dsn)
                        .await
                        .context("Failed to open legacy document store")?,
                )
            }
        };
        let legacy = LegacyCatalog::new(
            legacy_store,
            config.legacy.call_timeout,
            RetryPolicy::from(config.deletion.retry.clone()),
        );

        let buckets = BucketStores::from_config(&config.storage)?;
        let cleaner = ArtifactCleaner::new(CleanupConfig::from(&config.deletion), Arc::new(buckets));

        Ok(Self::new(DualStore::new(catalog, legacy), cleaner))
    }

    pub fn store(&self) -> &DualStore {
        &self.store
    }

    pub fn artifacts(&self) -> &Arc<dyn ArtifactStore> {
        self.cleaner.store()
    }

    #[tracing::instrument(skip(self, target), fields(entity = %target))]
    pub async fn delete(&self, target: &DeleteTarget) -> DeleteOutcome {
        let outcome: DeleteOutcome = match target {
            DeleteTarget::Granule(id) => self.purge_granule(id).await,
            DeleteTarget::Provider(name) => self.purge_provider(name).await,
            DeleteTarget::ReconciliationReport(name) => self.purge_report(name).await,
        }
        .into();

        match &outcome {
            DeleteOutcome::Deleted(summary) => tracing::info!(
                mutated = summary.mutated(),
                warnings = summary.warnings().len(),
                "Delete finished"
            ),
            DeleteOutcome::Refused(conflict) => tracing::info!(%conflict, "Delete refused"),
            DeleteOutcome::Failed(e) => {
                tracing::error!(error = %e, retryable = e.is_retryable(), "Delete failed")
            }
        }
        outcome
    }

    pub async fn delete_granule(&self, granule_id: &str) -> DeleteOutcome {
        self.delete(&DeleteTarget::Granule(granule_id.to_string()))
            .await
    }

    pub async fn delete_provider(&self, name: &str) -> DeleteOutcome {
        self.delete(&DeleteTarget::Provider(name.to_string())).await
    }

    pub async fn delete_reconciliation_report(&self, name: &str) -> DeleteOutcome {
        self.delete(&DeleteTarget::ReconciliationReport(name.to_string()))
            .await
    }

    async fn purge_granule(&self, granule_id: &str) -> Result<DeletionSummary, Halt> {
        tracing::debug!(phase = %Phase::GuardCheck);
        let located = self.store.find_granule(granule_id).await?;
        if let Some(conflict) = self.guard.check_granule(&located) {
            return Err(conflict.into());
        }

        tracing::debug!(phase = %Phase::CatalogDelete);
        let (relational, mut artifacts) = match self.store.delete_granule(granule_id).await? {
            GranuleDeletion::Deleted(files) => (
                StoreOutcome::Removed,
                files.iter().map(GranuleFile::location).collect::<Vec<_>>(),
            ),
            GranuleDeletion::Absent => (StoreOutcome::Absent, Vec::new()),
            GranuleDeletion::Published => {
                tracing::warn!("Granule was published after the guard check");
                return Err(Conflict::GranulePublished {
                    granule_id: granule_id.to_string(),
                }
                .into());
            }
        };
        // Files of a legacy-only granule are only known to the legacy record
        if let Some(legacy) = &located.legacy {
            artifacts.extend(legacy.file_locations());
        }

        let committed = Committed {
            relational,
            artifacts,
            unresolved: Vec::new(),
        };
        self.finish::<Granule>(DeleteTarget::Granule(granule_id.to_string()), committed)
            .await
    }

    async fn purge_provider(&self, name: &str) -> Result<DeletionSummary, Halt> {
        tracing::debug!(phase = %Phase::GuardCheck);
        if let Some(conflict) = self.guard.check_provider(name).await? {
            return Err(conflict.into());
        }

        tracing::debug!(phase = %Phase::CatalogDelete);
        let relational = self.store.delete_provider(name).await?;

        let committed = Committed {
            relational,
            artifacts: Vec::new(),
            unresolved: Vec::new(),
        };
        self.finish::<Provider>(DeleteTarget::Provider(name.to_string()), committed)
            .await
    }

    async fn purge_report(&self, name: &str) -> Result<DeletionSummary, Halt> {
        // Reports have no referential guard
        tracing::debug!(phase = %Phase::CatalogDelete);
        let legacy = self
            .store
            .legacy()
            .get::<ReconciliationReport>(name)
            .await
            .map_err(StoreError::from)?;
        let removed = self.store.delete_reconciliation_report(name).await?;
        let relational = StoreOutcome::from_removed(removed.is_some());

        let mut artifacts = Vec::new();
        let mut unresolved = BTreeSet::new();
        for report in removed.iter().chain(legacy.iter()) {
            let (Some(raw), Some(parsed)) = (report.location.as_deref(), report.object_location())
            else {
                continue;
            };
            match parsed {
                Ok(location) => artifacts.push(location),
                Err(e) => {
                    unresolved.insert((raw.to_string(), e.to_string()));
                }
            }
        }

        let committed = Committed {
            relational,
            artifacts,
            unresolved: unresolved.into_iter().collect(),
        };
        self.finish::<ReconciliationReport>(
            DeleteTarget::ReconciliationReport(name.to_string()),
            committed,
        )
        .await
    }

    /// Legacy delete, then artifact cleanup.
    async fn finish<T: Entity>(
        &self,
        target: DeleteTarget,
        committed: Committed,
    ) -> Result<DeletionSummary, Halt> {
        let legacy = match self.store.delete_legacy::<T>(target.id()).await {
            Ok(outcome) => Ok(outcome),
            Err(e) if committed.relational == StoreOutcome::Removed => {
                tracing::error!(error = %e, "Legacy delete failed after relational commit");
                Err(e)
            }
            // Nothing committed yet, leave every store as it is
            Err(e) => return Err(DeletionError::from(e).into()),
        };

        tracing::debug!(phase = %Phase::ArtifactCleanup, objects = committed.artifacts.len());
        let mut cleanup: CleanupReport = self.cleaner.remove_all(committed.artifacts).await;
        for (raw, error) in committed.unresolved {
            tracing::warn!(location = %raw, %error, "Stored artifact location is not resolvable");
            cleanup.record_unresolved(raw, error);
        }

        match legacy {
            Ok(legacy) => Ok(DeletionSummary {
                target,
                relational: committed.relational,
                legacy,
                cleanup,
            }),
            Err(source) => Err(DeletionError::LegacyMirrorStale {
                target,
                source,
                cleanup,
            }
            .into()),
        }
    }
}
