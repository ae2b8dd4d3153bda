//! Legacy schema-less catalog.
//!
//! Records are stored as JSON documents keyed by `(kind, id)`. Calls are not
//! transactional; [`LegacyCatalog`] adds typed access, per-call timeouts and
//! retries on top of a raw [`LegacyStore`] back-end.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::model::{Entity, EntityKind, Rule};
use crate::retry::RetryPolicy;

pub mod memory;
pub mod sql;

pub use memory::InMemoryLegacyStore;
pub use sql::SqlLegacyStore;

/// Error types that can occur during legacy store operations
#[derive(Debug, thiserror::Error)]
pub enum LegacyStoreError {
    #[error("Legacy store unavailable: {0}")]
    Unavailable(String),

    #[error("Legacy store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed {kind} document '{key}': {source}")]
    Malformed {
        kind: EntityKind,
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Legacy database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl LegacyStoreError {
    /// Connection-level failures that a retry may clear.
    pub fn is_transient(&self) -> bool {
        match self {
            LegacyStoreError::Unavailable(_) | LegacyStoreError::Timeout(_) => true,
            LegacyStoreError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            LegacyStoreError::Malformed { .. } | LegacyStoreError::Serialization(_) => false,
        }
    }
}

/// Result type for legacy store operations
pub type LegacyResult<T> = Result<T, LegacyStoreError>;

/// Raw document access implemented by every legacy back-end
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait LegacyStore: Send + Sync + 'static {
    /// Fetch one document
    async fn get(&self, kind: EntityKind, key: &str) -> LegacyResult<Option<Value>>;

    /// Insert or replace one document
    async fn put(&self, kind: EntityKind, key: &str, document: Value) -> LegacyResult<()>;

    /// Remove one document, returning whether it existed
    async fn delete(&self, kind: EntityKind, key: &str) -> LegacyResult<bool>;

    /// Full scan of `kind` keeping documents whose string `field` equals `value`
    async fn scan(&self, kind: EntityKind, field: &str, value: &str) -> LegacyResult<Vec<Value>>;
}

/// Typed, timeout-bounded access to the legacy catalog.
#[derive(Clone)]
pub struct LegacyCatalog {
    store: Arc<dyn LegacyStore>,
    call_timeout: Duration,
    retry: RetryPolicy,
}

impl LegacyCatalog {
    pub fn new(store: Arc<dyn LegacyStore>, call_timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            store,
            call_timeout,
            retry,
        }
    }

    /// In-memory legacy catalog with a single attempt per call.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryLegacyStore::default()),
            Duration::from_secs(5),
            RetryPolicy::none(),
        )
    }

    pub async fn get<T: Entity>(&self, id: &str) -> LegacyResult<Option<T>> {
        let document = self
            .call("legacy get", || self.store.get(T::KIND, id))
            .await?;

        document
            .map(|doc| {
                serde_json::from_value(doc).map_err(|source| LegacyStoreError::Malformed {
                    kind: T::KIND,
                    key: id.to_string(),
                    source,
                })
            })
            .transpose()
    }

    pub async fn exists<T: Entity>(&self, id: &str) -> LegacyResult<bool> {
        let document = self
            .call("legacy exists", || self.store.get(T::KIND, id))
            .await?;
        Ok(document.is_some())
    }

    pub async fn put<T: Entity>(&self, record: &T) -> LegacyResult<()> {
        let document = serde_json::to_value(record)?;
        self.call("legacy put", || {
            self.store.put(T::KIND, record.id(), document.clone())
        })
        .await
    }

    /// Delete one record. Absent records return `Ok(false)`.
    pub async fn delete<T: Entity>(&self, id: &str) -> LegacyResult<bool> {
        self.call("legacy delete", || self.store.delete(T::KIND, id))
            .await
    }

    /// Rules whose `provider` field names `provider`.
    pub async fn rules_by_provider(&self, provider: &str) -> LegacyResult<Vec<Rule>> {
        let documents = self
            .call("legacy rule scan", || {
                self.store.scan(EntityKind::Rule, "provider", provider)
            })
            .await?;

        documents
            .into_iter()
            .map(|doc| {
                let key = doc
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                serde_json::from_value(doc).map_err(|source| LegacyStoreError::Malformed {
                    kind: EntityKind::Rule,
                    key,
                    source,
                })
            })
            .collect()
    }

    async fn call<R, F, Fut>(&self, operation: &str, mut f: F) -> LegacyResult<R>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LegacyResult<R>>,
    {
        let call_timeout = self.call_timeout;
        self.retry
            .run(operation, LegacyStoreError::is_transient, || {
                let fut = f();
                async move {
                    match tokio::time::timeout(call_timeout, fut).await {
                        Ok(result) => result,
                        Err(_) => Err(LegacyStoreError::Timeout(call_timeout)),
                    }
                }
            })
            .await
    }
}

impl std::fmt::Debug for LegacyCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LegacyCatalog")
            .field("call_timeout", &self.call_timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Provider, RuleState, RuleType};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn provider(name: &str) -> Provider {
        Provider {
            name: name.to_string(),
            protocol: "s3".to_string(),
            host: "bucket-host".to_string(),
            port: None,
        }
    }

    fn rule(name: &str, provider: Option<&str>) -> Rule {
        Rule {
            name: name.to_string(),
            provider: provider.map(str::to_string),
            rule_type: RuleType::Onetime,
            workflow: "IngestGranule".to_string(),
            state: RuleState::Enabled,
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            backoff_multiplier: 1.0,
        }
    }

    #[tokio::test]
    async fn test_typed_put_get_delete() {
        let catalog = LegacyCatalog::in_memory();

        catalog.put(&provider("prov-1")).await.unwrap();
        let stored: Option<Provider> = catalog.get("prov-1").await.unwrap();
        assert_eq!(stored, Some(provider("prov-1")));
        assert!(catalog.exists::<Provider>("prov-1").await.unwrap());

        assert!(catalog.delete::<Provider>("prov-1").await.unwrap());
        assert!(!catalog.exists::<Provider>("prov-1").await.unwrap());

        // Deleting again reports absence instead of failing
        assert!(!catalog.delete::<Provider>("prov-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_rules_by_provider_filters_on_provider() {
        let catalog = LegacyCatalog::in_memory();
        catalog.put(&rule("rule-A", Some("prov-1"))).await.unwrap();
        catalog.put(&rule("rule-B", Some("prov-2"))).await.unwrap();
        catalog.put(&rule("rule-C", None)).await.unwrap();

        let rules = catalog.rules_by_provider("prov-1").await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name, "rule-A");
    }

    #[tokio::test]
    async fn test_malformed_document_is_reported() {
        let store = Arc::new(InMemoryLegacyStore::default());
        store
            .put(
                EntityKind::Provider,
                "broken",
                serde_json::json!({ "id": "broken" }),
            )
            .await
            .unwrap();

        let catalog = LegacyCatalog::new(store, Duration::from_secs(1), RetryPolicy::none());
        let err = catalog.get::<Provider>("broken").await.unwrap_err();
        assert!(matches!(err, LegacyStoreError::Malformed { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let mut store = MockLegacyStore::new();
        store.expect_delete().times(2).returning(move |_, _| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(LegacyStoreError::Unavailable("throttled".to_string()))
            } else {
                Ok(true)
            }
        });

        let catalog = LegacyCatalog::new(Arc::new(store), Duration::from_secs(1), fast_retry());
        assert!(catalog.delete::<Provider>("prov-1").await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_failures_are_not_retried() {
        let mut store = MockLegacyStore::new();
        store.expect_get().times(1).returning(|_, _| {
            Err(LegacyStoreError::Serialization(
                serde_json::from_str::<Value>("{").unwrap_err(),
            ))
        });

        let catalog = LegacyCatalog::new(Arc::new(store), Duration::from_secs(1), fast_retry());
        assert!(catalog.get::<Provider>("prov-1").await.is_err());
    }
}
