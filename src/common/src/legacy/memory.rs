use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{LegacyResult, LegacyStore};
use crate::model::EntityKind;

/// In-memory legacy store keyed by kind, then by document key
#[derive(Debug, Clone, Default)]
pub struct InMemoryLegacyStore {
    tables: Arc<RwLock<HashMap<EntityKind, BTreeMap<String, Value>>>>,
}

impl InMemoryLegacyStore {
    /// Number of documents currently held for `kind`
    pub async fn len(&self, kind: EntityKind) -> usize {
        self.tables
            .read()
            .await
            .get(&kind)
            .map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl LegacyStore for InMemoryLegacyStore {
    async fn get(&self, kind: EntityKind, key: &str) -> LegacyResult<Option<Value>> {
        let tables = self.tables.read().await;
        Ok(tables.get(&kind).and_then(|table| table.get(key)).cloned())
    }

    async fn put(&self, kind: EntityKind, key: &str, document: Value) -> LegacyResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .entry(kind)
            .or_default()
            .insert(key.to_string(), document);
        Ok(())
    }

    async fn delete(&self, kind: EntityKind, key: &str) -> LegacyResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .get_mut(&kind)
            .and_then(|table| table.remove(key))
            .is_some())
    }

    async fn scan(&self, kind: EntityKind, field: &str, value: &str) -> LegacyResult<Vec<Value>> {
        let tables = self.tables.read().await;
        let Some(table) = tables.get(&kind) else {
            return Ok(Vec::new());
        };

        Ok(table
            .values()
            .filter(|doc| doc.get(field).and_then(Value::as_str) == Some(value))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_kinds_are_isolated() {
        let store = InMemoryLegacyStore::default();
        store
            .put(EntityKind::Granule, "x", json!({ "granuleId": "x" }))
            .await
            .unwrap();

        assert!(store.get(EntityKind::Provider, "x").await.unwrap().is_none());
        assert!(!store.delete(EntityKind::Provider, "x").await.unwrap());
        assert_eq!(store.len(EntityKind::Granule).await, 1);
    }

    #[tokio::test]
    async fn test_put_replaces_document() {
        let store = InMemoryLegacyStore::default();
        store
            .put(EntityKind::Rule, "r", json!({ "name": "r", "provider": "a" }))
            .await
            .unwrap();
        store
            .put(EntityKind::Rule, "r", json!({ "name": "r", "provider": "b" }))
            .await
            .unwrap();

        assert_eq!(store.len(EntityKind::Rule).await, 1);
        assert!(store.scan(EntityKind::Rule, "provider", "a").await.unwrap().is_empty());
        assert_eq!(store.scan(EntityKind::Rule, "provider", "b").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_scan_of_empty_kind() {
        let store = InMemoryLegacyStore::default();
        let found = store.scan(EntityKind::Rule, "provider", "p").await.unwrap();
        assert!(found.is_empty());
    }
}
