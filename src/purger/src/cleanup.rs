//! Best-effort removal of the artifacts owned by a deleted record.
//!
//! Runs strictly after the catalog delete committed. Every location is
//! deleted independently with bounded fan-out; one failing object never
//! stops the others, and failures come back as warnings.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use common::config::DeletionConfig;
use common::model::ObjectLocation;
use common::retry::RetryPolicy;
use common::storage::{ArtifactError, ArtifactStore};
use futures::{StreamExt, stream};

/// Cleanup tuning
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    /// Maximum concurrent object deletions
    pub fan_out: usize,
    /// Timeout of a single object store call
    pub call_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self::from(&DeletionConfig::default())
    }
}

impl From<&DeletionConfig> for CleanupConfig {
    fn from(config: &DeletionConfig) -> Self {
        Self {
            fan_out: config.fan_out,
            call_timeout: config.object_call_timeout,
            retry: config.retry.clone().into(),
        }
    }
}

/// One artifact left behind
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CleanupFailure {
    /// `s3://bucket/key`, or the raw stored value when it did not parse
    pub location: String,
    pub error: String,
}

/// Result of a cleanup run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Distinct locations attempted
    pub attempted: usize,
    /// Locations confirmed absent afterwards, including already-missing ones
    pub deleted_count: usize,
    pub failures: Vec<CleanupFailure>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Record a stored location that could not be resolved to an object.
    pub fn record_unresolved(&mut self, raw: impl Into<String>, error: impl ToString) {
        self.failures.push(CleanupFailure {
            location: raw.into(),
            error: error.to_string(),
        });
    }
}

/// Deletes object store artifacts with bounded concurrency.
#[derive(Clone)]
pub struct ArtifactCleaner {
    config: CleanupConfig,
    store: Arc<dyn ArtifactStore>,
}

impl ArtifactCleaner {
    pub fn new(config: CleanupConfig, store: Arc<dyn ArtifactStore>) -> Self {
        Self { config, store }
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Delete every location once. Missing objects count as deleted.
    pub async fn remove_all(
        &self,
        locations: impl IntoIterator<Item = ObjectLocation>,
    ) -> CleanupReport {
        let unique: BTreeSet<ObjectLocation> = locations.into_iter().collect();
        if unique.is_empty() {
            tracing::debug!("No artifacts to clean up");
            return CleanupReport::default();
        }

        let attempted = unique.len();
        let fan_out = self.config.fan_out.max(1);
        tracing::info!(objects = attempted, fan_out, "Starting artifact cleanup");

        let results: Vec<(ObjectLocation, Result<(), ArtifactError>)> = stream::iter(unique)
            .map(|location| async move {
                let result = self.delete_one(&location).await;
                (location, result)
            })
            .buffer_unordered(fan_out)
            .collect()
            .await;

        let mut report = CleanupReport {
            attempted,
            ..CleanupReport::default()
        };
        for (location, result) in results {
            match result {
                Ok(()) => {
                    tracing::debug!(location = %location, "Deleted artifact");
                    report.deleted_count += 1;
                }
                Err(e) => {
                    tracing::error!(location = %location, error = %e, "Failed to delete artifact");
                    report.failures.push(CleanupFailure {
                        location: location.to_s3_uri(),
                        error: e.to_string(),
                    });
                }
            }
        }
        report.failures.sort();

        tracing::info!(
            deleted = report.deleted_count,
            failed = report.failures.len(),
            "Artifact cleanup complete"
        );
        report
    }

    async fn delete_one(&self, location: &ObjectLocation) -> Result<(), ArtifactError> {
        let call_timeout = self.config.call_timeout;
        self.config
            .retry
            .run("object delete", ArtifactError::is_transient, move || async move {
                match tokio::time::timeout(call_timeout, self.store.delete(location)).await {
                    Ok(result) => result,
                    Err(_) => Err(ArtifactError::Timeout(call_timeout)),
                }
            })
            .await
    }
}

impl std::fmt::Debug for ArtifactCleaner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactCleaner")
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::storage::{BucketStores, MockArtifactStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Store whose deletes take a while and record how many overlap
    #[derive(Default)]
    struct SlowStore {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        deleted: AtomicUsize,
    }

    #[async_trait]
    impl ArtifactStore for SlowStore {
        async fn delete(&self, _location: &ObjectLocation) -> Result<(), ArtifactError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.deleted.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn exists(&self, _location: &ObjectLocation) -> Result<bool, ArtifactError> {
            Ok(false)
        }

        async fn put(
            &self,
            _location: &ObjectLocation,
            _payload: Vec<u8>,
        ) -> Result<(), ArtifactError> {
            Ok(())
        }
    }

    fn config(fan_out: usize) -> CleanupConfig {
        CleanupConfig {
            fan_out,
            call_timeout: Duration::from_secs(1),
            retry: RetryPolicy::none(),
        }
    }

    #[tokio::test]
    async fn test_empty_input() {
        let cleaner = ArtifactCleaner::new(config(4), Arc::new(BucketStores::in_memory(["b"])));
        let report = cleaner.remove_all(Vec::new()).await;

        assert_eq!(report, CleanupReport::default());
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_duplicates_are_deleted_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut store = MockArtifactStore::new();
        store.expect_delete().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let cleaner = ArtifactCleaner::new(config(4), Arc::new(store));
        let location = ObjectLocation::new("b", "k1");
        let report = cleaner
            .remove_all(vec![location.clone(), location.clone(), location])
            .await;

        assert_eq!(report.attempted, 1);
        assert_eq!(report.deleted_count, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_stop_the_rest() {
        let mut store = MockArtifactStore::new();
        store.expect_delete().returning(|location| {
            if location.key == "k2" {
                Err(ArtifactError::UnknownBucket("b".to_string()))
            } else {
                Ok(())
            }
        });

        let cleaner = ArtifactCleaner::new(config(1), Arc::new(store));
        let report = cleaner
            .remove_all(["k1", "k2", "k3"].map(|k| ObjectLocation::new("b", k)))
            .await;

        assert_eq!(report.attempted, 3);
        assert_eq!(report.deleted_count, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].location, "s3://b/k2");
        assert!(report.failures[0].error.contains("No object store configured"));
    }

    #[tokio::test]
    async fn test_concurrent_deletes_stay_within_fan_out() {
        let store = Arc::new(SlowStore::default());
        let cleaner = ArtifactCleaner::new(config(3), store.clone());

        let locations: Vec<_> = (0..20)
            .map(|i| ObjectLocation::new("b", format!("gran-{i}/k")))
            .collect();
        let report = cleaner.remove_all(locations).await;

        assert_eq!(report.deleted_count, 20);
        assert_eq!(store.deleted.load(Ordering::SeqCst), 20);
        assert_eq!(store.peak.load(Ordering::SeqCst), 3);
        assert_eq!(store.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_timeouts_are_retried_then_reported() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut store = MockArtifactStore::new();
        store.expect_delete().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(ArtifactError::Timeout(Duration::from_millis(5)))
        });

        let cleaner = ArtifactCleaner::new(
            CleanupConfig {
                retry: RetryPolicy {
                    max_attempts: 3,
                    initial_delay: Duration::from_millis(1),
                    max_delay: Duration::from_millis(1),
                    backoff_multiplier: 1.0,
                },
                ..config(2)
            },
            Arc::new(store),
        );
        let report = cleaner.remove_all([ObjectLocation::new("b", "k1")]).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.deleted_count, 0);
        assert_eq!(report.failures.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_objects_count_as_deleted() {
        let stores = Arc::new(BucketStores::in_memory(["b"]));
        stores
            .put(&ObjectLocation::new("b", "k1"), b"x".to_vec())
            .await
            .unwrap();

        let cleaner = ArtifactCleaner::new(config(4), stores.clone());
        let report = cleaner
            .remove_all([ObjectLocation::new("b", "k1"), ObjectLocation::new("b", "k2")])
            .await;

        assert_eq!(report.deleted_count, 2);
        assert!(report.is_clean());
        assert!(!stores.exists(&ObjectLocation::new("b", "k1")).await.unwrap());
    }

    #[test]
    fn test_config_from_deletion_settings() {
        let config = CleanupConfig::default();
        assert_eq!(config.fan_out, 16);
        assert_eq!(config.call_timeout, Duration::from_secs(30));
        assert_eq!(config.retry.max_attempts, 3);
    }
}
