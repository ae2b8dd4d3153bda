use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Row, SqlitePool, query};

use super::{LegacyResult, LegacyStore};
use crate::catalog::connect_sqlite;
use crate::model::EntityKind;

/// Legacy store persisting JSON documents in a single key/value table.
///
/// Each call is an independent statement; nothing here is transactional.
#[derive(Debug, Clone)]
pub enum SqlLegacyStore {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl SqlLegacyStore {
    /// Connect to `dsn` and create the document table if needed.
    pub async fn new(dsn: &str) -> Result<Self, sqlx::Error> {
        log::info!("Connecting to legacy document store with DSN: {dsn}");

        let store = if dsn.starts_with("sqlite:") {
            SqlLegacyStore::Sqlite(connect_sqlite(dsn).await?)
        } else {
            SqlLegacyStore::Postgres(PgPool::connect(dsn).await?)
        };

        store.init().await?;
        Ok(store)
    }

    async fn init(&self) -> Result<(), sqlx::Error> {
        let create = r#"
        CREATE TABLE IF NOT EXISTS legacy_documents (
            kind TEXT NOT NULL,
            key TEXT NOT NULL,
            body TEXT NOT NULL,
            PRIMARY KEY (kind, key)
        )"#;

        match self {
            SqlLegacyStore::Sqlite(pool) => {
                query(create).execute(pool).await?;
            }
            SqlLegacyStore::Postgres(pool) => {
                query(create).execute(pool).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LegacyStore for SqlLegacyStore {
    async fn get(&self, kind: EntityKind, key: &str) -> LegacyResult<Option<Value>> {
        let row = match self {
            SqlLegacyStore::Sqlite(pool) => {
                query("SELECT body FROM legacy_documents WHERE kind = ? AND key = ?")
                    .bind(kind.table_name())
                    .bind(key)
                    .fetch_optional(pool)
                    .await?
                    .map(|row| row.get::<String, _>("body"))
            }
            SqlLegacyStore::Postgres(pool) => {
                query("SELECT body FROM legacy_documents WHERE kind = $1 AND key = $2")
                    .bind(kind.table_name())
                    .bind(key)
                    .fetch_optional(pool)
                    .await?
                    .map(|row| row.get::<String, _>("body"))
            }
        };

        Ok(row.map(|body| serde_json::from_str(&body)).transpose()?)
    }

    async fn put(&self, kind: EntityKind, key: &str, document: Value) -> LegacyResult<()> {
        let body = serde_json::to_string(&document)?;
        match self {
            SqlLegacyStore::Sqlite(pool) => {
                let stmt = r#"
                INSERT INTO legacy_documents (kind, key, body) VALUES (?, ?, ?)
                ON CONFLICT (kind, key) DO UPDATE SET body = excluded.body
                "#;
                query(stmt)
                    .bind(kind.table_name())
                    .bind(key)
                    .bind(&body)
                    .execute(pool)
                    .await?;
            }
            SqlLegacyStore::Postgres(pool) => {
                let stmt = r#"
                INSERT INTO legacy_documents (kind, key, body) VALUES ($1, $2, $3)
                ON CONFLICT (kind, key) DO UPDATE SET body = EXCLUDED.body
                "#;
                query(stmt)
                    .bind(kind.table_name())
                    .bind(key)
                    .bind(&body)
                    .execute(pool)
                    .await?;
            }
        }
        Ok(())
    }

    async fn delete(&self, kind: EntityKind, key: &str) -> LegacyResult<bool> {
        let result = match self {
            SqlLegacyStore::Sqlite(pool) => {
                query("DELETE FROM legacy_documents WHERE kind = ? AND key = ?")
                    .bind(kind.table_name())
                    .bind(key)
                    .execute(pool)
                    .await?
                    .rows_affected()
            }
            SqlLegacyStore::Postgres(pool) => {
                query("DELETE FROM legacy_documents WHERE kind = $1 AND key = $2")
                    .bind(kind.table_name())
                    .bind(key)
                    .execute(pool)
                    .await?
                    .rows_affected()
            }
        };
        Ok(result > 0)
    }

    async fn scan(&self, kind: EntityKind, field: &str, value: &str) -> LegacyResult<Vec<Value>> {
        let bodies: Vec<String> = match self {
            SqlLegacyStore::Sqlite(pool) => {
                query("SELECT body FROM legacy_documents WHERE kind = ? ORDER BY key")
                    .bind(kind.table_name())
                    .fetch_all(pool)
                    .await?
                    .iter()
                    .map(|row| row.get("body"))
                    .collect()
            }
            SqlLegacyStore::Postgres(pool) => {
                query("SELECT body FROM legacy_documents WHERE kind = $1 ORDER BY key")
                    .bind(kind.table_name())
                    .fetch_all(pool)
                    .await?
                    .iter()
                    .map(|row| row.get("body"))
                    .collect()
            }
        };

        // Filtered scan, the key/value store has no secondary indexes
        let mut matches = Vec::new();
        for body in bodies {
            let doc: Value = serde_json::from_str(&body)?;
            if doc.get(field).and_then(Value::as_str) == Some(value) {
                matches.push(doc);
            }
        }
        Ok(matches)
    }
}
