use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteError, SqlitePoolOptions};
use sqlx::{ColumnIndex, Decode, PgPool, Row, SqlitePool, Type, query, query_scalar};

use crate::model::{
    Granule, GranuleFile, GranuleStatus, Provider, ReconciliationReport, ReportStatus, ReportType,
    Rule, RuleState, RuleType,
};

const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// SQLite delete transactions take the write lock up front. A deferred
/// transaction that reads first deadlocks with a concurrent one on the
/// lock upgrade and fails with SQLITE_BUSY instead of waiting.
const SQLITE_WRITE_BEGIN: &str = "BEGIN IMMEDIATE";

/// SQLite BUSY and LOCKED primary result codes
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// PostgreSQL serialization failure, deadlock and lock-not-available
const PG_RETRYABLE_STATES: [&str; 3] = ["40001", "40P01", "55P03"];

/// Errors raised by the relational catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Catalog database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Catalog transaction exceeded {0:?} and was rolled back")]
    TransactionTimeout(Duration),

    #[error("Invalid {column} value '{value}' in catalog row")]
    InvalidValue { column: &'static str, value: String },
}

impl CatalogError {
    /// Failures where retrying the whole operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            CatalogError::TransactionTimeout(_) => true,
            CatalogError::Database(sqlx::Error::Database(db)) => is_lock_contention(db.as_ref()),
            CatalogError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            CatalogError::InvalidValue { .. } => false,
        }
    }
}

/// Lock contention and serialization conflicts clear once the competing
/// transaction finishes.
fn is_lock_contention(error: &dyn sqlx::error::DatabaseError) -> bool {
    let Some(code) = error.code() else {
        return false;
    };
    if error.try_downcast_ref::<SqliteError>().is_some() {
        // SQLite reports extended result codes; the low byte is the primary code
        return code
            .parse::<i32>()
            .is_ok_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED));
    }
    PG_RETRYABLE_STATES.contains(&code.as_ref())
}

/// Result of the transactional granule delete.
#[derive(Debug, Clone, PartialEq)]
pub enum GranuleDeletion {
    /// Granule row and its file rows were removed; the files are returned.
    Deleted(Vec<GranuleFile>),
    /// No granule row exists.
    Absent,
    /// The granule is published; nothing was removed.
    Published,
}

/// Connection pool of the relational catalog.
#[derive(Clone, Debug)]
pub enum CatalogPool {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

/// Catalog provides an interface to the relational catalog (PostgreSQL or SQLite).
#[derive(Clone, Debug)]
pub struct Catalog {
    pool: CatalogPool,
    transaction_timeout: Duration,
}

/// Connect to a SQLite DSN, creating the database file when missing.
///
/// In-memory databases are pinned to one connection that never expires, as
/// every new connection would otherwise open an empty database.
pub(crate) async fn connect_sqlite(dsn: &str) -> Result<SqlitePool, sqlx::Error> {
    if dsn.contains(":memory:") {
        let options = SqliteConnectOptions::from_str(dsn)?;
        return SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await;
    }

    let file = dsn
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();
    if let Some(parent) = std::path::Path::new(file).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
        }
    }

    // Add mode=rwc to create database file if it doesn't exist
    let dsn_with_create = if dsn.contains('?') {
        if dsn.contains("mode=") {
            dsn.to_string()
        } else {
            format!("{dsn}&mode=rwc")
        }
    } else {
        format!("{dsn}?mode=rwc")
    };

    SqlitePool::connect(&dsn_with_create).await.map_err(|e| {
        log::error!("Failed to connect to SQLite database with DSN '{dsn_with_create}': {e}");
        e
    })
}

impl Catalog {
    /// Create a new Catalog client and initialize schema.
    pub async fn new(dsn: &str) -> Result<Self, CatalogError> {
        log::info!("Connecting to catalog database with DSN: {dsn}");

        let pool = if dsn.starts_with("sqlite:") {
            CatalogPool::Sqlite(connect_sqlite(dsn).await?)
        } else {
            let pool = PgPool::connect(dsn).await.map_err(|e| {
                log::error!("Failed to connect to PostgreSQL database with DSN '{dsn}': {e}");
                e
            })?;
            CatalogPool::Postgres(pool)
        };

        let catalog = Catalog {
            pool,
            transaction_timeout: DEFAULT_TRANSACTION_TIMEOUT,
        };

        log::info!("Database connection established successfully");
        catalog.init().await.map_err(|e| {
            log::error!("Failed to initialize catalog schema: {e}");
            e
        })?;
        log::info!("Catalog schema initialized successfully");
        Ok(catalog)
    }

    /// Create a catalog backed by a private in-memory SQLite database.
    pub async fn new_in_memory() -> Result<Self, CatalogError> {
        Self::new("sqlite::memory:").await
    }

    /// Bound the lifetime of every delete transaction.
    pub fn with_transaction_timeout(mut self, timeout: Duration) -> Self {
        self.transaction_timeout = timeout;
        self
    }

    pub fn transaction_timeout(&self) -> Duration {
        self.transaction_timeout
    }

    pub fn pool(&self) -> &CatalogPool {
        &self.pool
    }

    /// Initialize catalog tables if they do not exist.
    async fn init(&self) -> Result<(), sqlx::Error> {
        match &self.pool {
            CatalogPool::Sqlite(pool) => {
                let statements = [
                    r#"
                    CREATE TABLE IF NOT EXISTS granules (
                        granule_id TEXT PRIMARY KEY,
                        collection_id TEXT NOT NULL,
                        status TEXT NOT NULL,
                        published BOOLEAN NOT NULL DEFAULT 0,
                        created_at TEXT NOT NULL
                    )"#,
                    r#"
                    CREATE TABLE IF NOT EXISTS files (
                        bucket TEXT NOT NULL,
                        key TEXT NOT NULL,
                        granule_id TEXT NOT NULL REFERENCES granules(granule_id),
                        file_index INTEGER NOT NULL,
                        file_name TEXT,
                        size INTEGER,
                        PRIMARY KEY (bucket, key)
                    )"#,
                    "CREATE INDEX IF NOT EXISTS files_granule_id_idx ON files (granule_id)",
                    r#"
                    CREATE TABLE IF NOT EXISTS providers (
                        name TEXT PRIMARY KEY,
                        protocol TEXT NOT NULL,
                        host TEXT NOT NULL,
                        port INTEGER
                    )"#,
                    r#"
                    CREATE TABLE IF NOT EXISTS rules (
                        name TEXT PRIMARY KEY,
                        provider_name TEXT,
                        rule_type TEXT NOT NULL,
                        workflow TEXT NOT NULL,
                        state TEXT NOT NULL
                    )"#,
                    "CREATE INDEX IF NOT EXISTS rules_provider_name_idx ON rules (provider_name)",
                    r#"
                    CREATE TABLE IF NOT EXISTS reconciliation_reports (
                        name TEXT PRIMARY KEY,
                        report_type TEXT NOT NULL,
                        status TEXT NOT NULL,
                        location TEXT,
                        created_at TEXT NOT NULL
                    )"#,
                ];
                for stmt in statements {
                    query(stmt).execute(pool).await?;
                }
            }
            CatalogPool::Postgres(pool) => {
                // Rules carry no foreign key to providers: during the migration a
                // rule may reference a provider that only exists in the legacy store.
                let statements = [
                    r#"
                    CREATE TABLE IF NOT EXISTS granules (
                        granule_id TEXT PRIMARY KEY,
                        collection_id TEXT NOT NULL,
                        status TEXT NOT NULL,
                        published BOOLEAN NOT NULL DEFAULT FALSE,
                        created_at TIMESTAMPTZ NOT NULL
                    )"#,
                    r#"
                    CREATE TABLE IF NOT EXISTS files (
                        bucket TEXT NOT NULL,
                        key TEXT NOT NULL,
                        granule_id TEXT NOT NULL REFERENCES granules(granule_id),
                        file_index INT NOT NULL,
                        file_name TEXT,
                        size BIGINT,
                        PRIMARY KEY (bucket, key)
                    )"#,
                    "CREATE INDEX IF NOT EXISTS files_granule_id_idx ON files (granule_id)",
                    r#"
                    CREATE TABLE IF NOT EXISTS providers (
                        name TEXT PRIMARY KEY,
                        protocol TEXT NOT NULL,
                        host TEXT NOT NULL,
                        port INT
                    )"#,
                    r#"
                    CREATE TABLE IF NOT EXISTS rules (
                        name TEXT PRIMARY KEY,
                        provider_name TEXT,
                        rule_type TEXT NOT NULL,
                        workflow TEXT NOT NULL,
                        state TEXT NOT NULL
                    )"#,
                    "CREATE INDEX IF NOT EXISTS rules_provider_name_idx ON rules (provider_name)",
                    r#"
                    CREATE TABLE IF NOT EXISTS reconciliation_reports (
                        name TEXT PRIMARY KEY,
                        report_type TEXT NOT NULL,
                        status TEXT NOT NULL,
                        location TEXT,
                        created_at TIMESTAMPTZ NOT NULL
                    )"#,
                ];
                for stmt in statements {
                    query(stmt).execute(pool).await?;
                }
            }
        }

        Ok(())
    }

    /// Run a transaction body under the configured timeout. Dropping the
    /// body on timeout drops its open transaction, which rolls it back.
    async fn bounded<T>(
        &self,
        operation: &str,
        body: impl Future<Output = Result<T, CatalogError>>,
    ) -> Result<T, CatalogError> {
        match tokio::time::timeout(self.transaction_timeout, body).await {
            Ok(result) => result,
            Err(_) => {
                log::warn!(
                    "Catalog transaction '{operation}' exceeded {:?}, rolling back",
                    self.transaction_timeout
                );
                Err(CatalogError::TransactionTimeout(self.transaction_timeout))
            }
        }
    }

    // ---- granules ----

    /// Insert or replace a granule together with its file rows.
    pub async fn put_granule(&self, granule: &Granule) -> Result<(), CatalogError> {
        match &self.pool {
            CatalogPool::Sqlite(pool) => {
                let mut tx = pool.begin().await?;
                let stmt = r#"
                INSERT INTO granules (granule_id, collection_id, status, published, created_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT (granule_id) DO UPDATE SET
                    collection_id = excluded.collection_id,
                    status = excluded.status,
                    published = excluded.published
                "#;
                query(stmt)
                    .bind(&granule.granule_id)
                    .bind(&granule.collection_id)
                    .bind(granule.status.as_str())
                    .bind(granule.published)
                    .bind(granule.created_at)
                    .execute(&mut *tx)
                    .await?;

                query("DELETE FROM files WHERE granule_id = ?")
                    .bind(&granule.granule_id)
                    .execute(&mut *tx)
                    .await?;

                for (index, file) in granule.files.iter().enumerate() {
                    let stmt = r#"
                    INSERT INTO files (bucket, key, granule_id, file_index, file_name, size)
                    VALUES (?, ?, ?, ?, ?, ?)
                    "#;
                    query(stmt)
                        .bind(&file.bucket)
                        .bind(&file.key)
                        .bind(&granule.granule_id)
                        .bind(index as i32)
                        .bind(&file.file_name)
                        .bind(file.size)
                        .execute(&mut *tx)
                        .await?;
                }
                tx.commit().await?;
            }
            CatalogPool::Postgres(pool) => {
                let mut tx = pool.begin().await?;
                let stmt = r#"
                INSERT INTO granules (granule_id, collection_id, status, published, created_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (granule_id) DO UPDATE SET
                    collection_id = EXCLUDED.collection_id,
                    status = EXCLUDED.status,
                    published = EXCLUDED.published
                "#;
                query(stmt)
                    .bind(&granule.granule_id)
                    .bind(&granule.collection_id)
                    .bind(granule.status.as_str())
                    .bind(granule.published)
                    .bind(granule.created_at)
                    .execute(&mut *tx)
                    .await?;

                query("DELETE FROM files WHERE granule_id = $1")
                    .bind(&granule.granule_id)
                    .execute(&mut *tx)
                    .await?;

                for (index, file) in granule.files.iter().enumerate() {
                    let stmt = r#"
                    INSERT INTO files (bucket, key, granule_id, file_index, file_name, size)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    "#;
                    query(stmt)
                        .bind(&file.bucket)
                        .bind(&file.key)
                        .bind(&granule.granule_id)
                        .bind(index as i32)
                        .bind(&file.file_name)
                        .bind(file.size)
                        .execute(&mut *tx)
                        .await?;
                }
                tx.commit().await?;
            }
        }
        Ok(())
    }

    /// Flip the publication flag of a granule. Returns whether a row changed.
    pub async fn set_granule_published(
        &self,
        granule_id: &str,
        published: bool,
    ) -> Result<bool, CatalogError> {
        let affected = match &self.pool {
            CatalogPool::Sqlite(pool) => query("UPDATE granules SET published = ? WHERE granule_id = ?")
                .bind(published)
                .bind(granule_id)
                .execute(pool)
                .await?
                .rows_affected(),
            CatalogPool::Postgres(pool) => {
                query("UPDATE granules SET published = $1 WHERE granule_id = $2")
                    .bind(published)
                    .bind(granule_id)
                    .execute(pool)
                    .await?
                    .rows_affected()
            }
        };
        Ok(affected > 0)
    }

    /// Fetch a granule and its files in file order.
    pub async fn get_granule(&self, granule_id: &str) -> Result<Option<Granule>, CatalogError> {
        let select_granule = "SELECT granule_id, collection_id, status, published, created_at FROM granules";
        let select_files = "SELECT bucket, key, file_name, size FROM files";

        match &self.pool {
            CatalogPool::Sqlite(pool) => {
                let row = query(&format!("{select_granule} WHERE granule_id = ?"))
                    .bind(granule_id)
                    .fetch_optional(pool)
                    .await?;
                let Some(row) = row else {
                    return Ok(None);
                };
                let files = query(&format!(
                    "{select_files} WHERE granule_id = ? ORDER BY file_index"
                ))
                .bind(granule_id)
                .fetch_all(pool)
                .await?
                .iter()
                .map(decode_file)
                .collect::<Result<Vec<_>, _>>()?;
                Ok(Some(decode_granule(&row, files)?))
            }
            CatalogPool::Postgres(pool) => {
                let row = query(&format!("{select_granule} WHERE granule_id = $1"))
                    .bind(granule_id)
                    .fetch_optional(pool)
                    .await?;
                let Some(row) = row else {
                    return Ok(None);
                };
                let files = query(&format!(
                    "{select_files} WHERE granule_id = $1 ORDER BY file_index"
                ))
                .bind(granule_id)
                .fetch_all(pool)
                .await?
                .iter()
                .map(decode_file)
                .collect::<Result<Vec<_>, _>>()?;
                Ok(Some(decode_granule(&row, files)?))
            }
        }
    }

    pub async fn granule_exists(&self, granule_id: &str) -> Result<bool, CatalogError> {
        let count: i64 = match &self.pool {
            CatalogPool::Sqlite(pool) => {
                query_scalar("SELECT COUNT(*) FROM granules WHERE granule_id = ?")
                    .bind(granule_id)
                    .fetch_one(pool)
                    .await?
            }
            CatalogPool::Postgres(pool) => {
                query_scalar("SELECT COUNT(*) FROM granules WHERE granule_id = $1")
                    .bind(granule_id)
                    .fetch_one(pool)
                    .await?
            }
        };
        Ok(count > 0)
    }

    /// Delete a granule and its file rows in one transaction.
    ///
    /// The publication flag is re-read inside the transaction (under a row
    /// lock on PostgreSQL) so a granule published after the caller's check is
    /// never removed.
    pub async fn delete_granule(&self, granule_id: &str) -> Result<GranuleDeletion, CatalogError> {
        self.bounded("delete granule", async {
            match &self.pool {
                CatalogPool::Sqlite(pool) => {
                    let mut tx = pool.begin_with(SQLITE_WRITE_BEGIN).await?;
                    let published: Option<bool> =
                        query_scalar("SELECT published FROM granules WHERE granule_id = ?")
                            .bind(granule_id)
                            .fetch_optional(&mut *tx)
                            .await?;
                    match published {
                        None => return Ok(GranuleDeletion::Absent),
                        Some(true) => return Ok(GranuleDeletion::Published),
                        Some(false) => {}
                    }

                    let files = query(
                        "SELECT bucket, key, file_name, size FROM files WHERE granule_id = ? ORDER BY file_index",
                    )
                    .bind(granule_id)
                    .fetch_all(&mut *tx)
                    .await?
                    .iter()
                    .map(decode_file)
                    .collect::<Result<Vec<_>, _>>()?;

                    query("DELETE FROM files WHERE granule_id = ?")
                        .bind(granule_id)
                        .execute(&mut *tx)
                        .await?;
                    let removed = query("DELETE FROM granules WHERE granule_id = ?")
                        .bind(granule_id)
                        .execute(&mut *tx)
                        .await?
                        .rows_affected();
                    tx.commit().await?;

                    if removed == 0 {
                        return Ok(GranuleDeletion::Absent);
                    }
                    Ok(GranuleDeletion::Deleted(files))
                }
                CatalogPool::Postgres(pool) => {
                    let mut tx = pool.begin().await?;
                    let published: Option<bool> = query_scalar(
                        "SELECT published FROM granules WHERE granule_id = $1 FOR UPDATE",
                    )
                    .bind(granule_id)
                    .fetch_optional(&mut *tx)
                    .await?;
                    match published {
                        None => return Ok(GranuleDeletion::Absent),
                        Some(true) => return Ok(GranuleDeletion::Published),
                        Some(false) => {}
                    }

                    let files = query(
                        "SELECT bucket, key, file_name, size FROM files WHERE granule_id = $1 ORDER BY file_index",
                    )
                    .bind(granule_id)
                    .fetch_all(&mut *tx)
                    .await?
                    .iter()
                    .map(decode_file)
                    .collect::<Result<Vec<_>, _>>()?;

                    query("DELETE FROM files WHERE granule_id = $1")
                        .bind(granule_id)
                        .execute(&mut *tx)
                        .await?;
                    let removed = query("DELETE FROM granules WHERE granule_id = $1")
                        .bind(granule_id)
                        .execute(&mut *tx)
                        .await?
                        .rows_affected();
                    tx.commit().await?;

                    if removed == 0 {
                        return Ok(GranuleDeletion::Absent);
                    }
                    Ok(GranuleDeletion::Deleted(files))
                }
            }
        })
        .await
    }

    // ---- providers ----

    pub async fn put_provider(&self, provider: &Provider) -> Result<(), CatalogError> {
        match &self.pool {
            CatalogPool::Sqlite(pool) => {
                let stmt = r#"
                INSERT INTO providers (name, protocol, host, port) VALUES (?, ?, ?, ?)
                ON CONFLICT (name) DO UPDATE SET
                    protocol = excluded.protocol, host = excluded.host, port = excluded.port
                "#;
                query(stmt)
                    .bind(&provider.name)
                    .bind(&provider.protocol)
                    .bind(&provider.host)
                    .bind(provider.port)
                    .execute(pool)
                    .await?;
            }
            CatalogPool::Postgres(pool) => {
                let stmt = r#"
                INSERT INTO providers (name, protocol, host, port) VALUES ($1, $2, $3, $4)
                ON CONFLICT (name) DO UPDATE SET
                    protocol = EXCLUDED.protocol, host = EXCLUDED.host, port = EXCLUDED.port
                "#;
                query(stmt)
                    .bind(&provider.name)
                    .bind(&provider.protocol)
                    .bind(&provider.host)
                    .bind(provider.port)
                    .execute(pool)
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn get_provider(&self, name: &str) -> Result<Option<Provider>, CatalogError> {
        let row = match &self.pool {
            CatalogPool::Sqlite(pool) => {
                query("SELECT name, protocol, host, port FROM providers WHERE name = ?")
                    .bind(name)
                    .fetch_optional(pool)
                    .await?
                    .map(|row| decode_provider(&row))
            }
            CatalogPool::Postgres(pool) => {
                query("SELECT name, protocol, host, port FROM providers WHERE name = $1")
                    .bind(name)
                    .fetch_optional(pool)
                    .await?
                    .map(|row| decode_provider(&row))
            }
        };
        row.transpose()
    }

    pub async fn provider_exists(&self, name: &str) -> Result<bool, CatalogError> {
        Ok(self.get_provider(name).await?.is_some())
    }

    /// Delete a provider row in its own transaction. Returns whether it existed.
    pub async fn delete_provider(&self, name: &str) -> Result<bool, CatalogError> {
        self.bounded("delete provider", async {
            let removed = match &self.pool {
                CatalogPool::Sqlite(pool) => {
                    let mut tx = pool.begin_with(SQLITE_WRITE_BEGIN).await?;
                    let removed = query("DELETE FROM providers WHERE name = ?")
                        .bind(name)
                        .execute(&mut *tx)
                        .await?
                        .rows_affected();
                    tx.commit().await?;
                    removed
                }
                CatalogPool::Postgres(pool) => {
                    let mut tx = pool.begin().await?;
                    let removed = query("DELETE FROM providers WHERE name = $1")
                        .bind(name)
                        .execute(&mut *tx)
                        .await?
                        .rows_affected();
                    tx.commit().await?;
                    removed
                }
            };
            Ok(removed > 0)
        })
        .await
    }

    // ---- rules ----

    pub async fn put_rule(&self, rule: &Rule) -> Result<(), CatalogError> {
        match &self.pool {
            CatalogPool::Sqlite(pool) => {
                let stmt = r#"
                INSERT INTO rules (name, provider_name, rule_type, workflow, state)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT (name) DO UPDATE SET
                    provider_name = excluded.provider_name,
                    rule_type = excluded.rule_type,
                    workflow = excluded.workflow,
                    state = excluded.state
                "#;
                query(stmt)
                    .bind(&rule.name)
                    .bind(&rule.provider)
                    .bind(rule.rule_type.as_str())
                    .bind(&rule.workflow)
                    .bind(rule.state.as_str())
                    .execute(pool)
                    .await?;
            }
            CatalogPool::Postgres(pool) => {
                let stmt = r#"
                INSERT INTO rules (name, provider_name, rule_type, workflow, state)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (name) DO UPDATE SET
                    provider_name = EXCLUDED.provider_name,
                    rule_type = EXCLUDED.rule_type,
                    workflow = EXCLUDED.workflow,
                    state = EXCLUDED.state
                "#;
                query(stmt)
                    .bind(&rule.name)
                    .bind(&rule.provider)
                    .bind(rule.rule_type.as_str())
                    .bind(&rule.workflow)
                    .bind(rule.state.as_str())
                    .execute(pool)
                    .await?;
            }
        }
        Ok(())
    }

    /// Rules referencing `provider`, ordered by name.
    pub async fn rules_by_provider(&self, provider: &str) -> Result<Vec<Rule>, CatalogError> {
        let select = "SELECT name, provider_name, rule_type, workflow, state FROM rules";
        match &self.pool {
            CatalogPool::Sqlite(pool) => query(&format!(
                "{select} WHERE provider_name = ? ORDER BY name"
            ))
            .bind(provider)
            .fetch_all(pool)
            .await?
            .iter()
            .map(decode_rule)
            .collect(),
            CatalogPool::Postgres(pool) => query(&format!(
                "{select} WHERE provider_name = $1 ORDER BY name"
            ))
            .bind(provider)
            .fetch_all(pool)
            .await?
            .iter()
            .map(decode_rule)
            .collect(),
        }
    }

    pub async fn delete_rule(&self, name: &str) -> Result<bool, CatalogError> {
        let removed = match &self.pool {
            CatalogPool::Sqlite(pool) => query("DELETE FROM rules WHERE name = ?")
                .bind(name)
                .execute(pool)
                .await?
                .rows_affected(),
            CatalogPool::Postgres(pool) => query("DELETE FROM rules WHERE name = $1")
                .bind(name)
                .execute(pool)
                .await?
                .rows_affected(),
        };
        Ok(removed > 0)
    }

    // ---- reconciliation reports ----

    pub async fn put_reconciliation_report(
        &self,
        report: &ReconciliationReport,
    ) -> Result<(), CatalogError> {
        match &self.pool {
            CatalogPool::Sqlite(pool) => {
                let stmt = r#"
                INSERT INTO reconciliation_reports (name, report_type, status, location, created_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT (name) DO UPDATE SET
                    report_type = excluded.report_type,
                    status = excluded.status,
                    location = excluded.location
                "#;
                query(stmt)
                    .bind(&report.name)
                    .bind(report.report_type.as_str())
                    .bind(report.status.as_str())
                    .bind(&report.location)
                    .bind(report.created_at)
                    .execute(pool)
                    .await?;
            }
            CatalogPool::Postgres(pool) => {
                let stmt = r#"
                INSERT INTO reconciliation_reports (name, report_type, status, location, created_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (name) DO UPDATE SET
                    report_type = EXCLUDED.report_type,
                    status = EXCLUDED.status,
                    location = EXCLUDED.location
                "#;
                query(stmt)
                    .bind(&report.name)
                    .bind(report.report_type.as_str())
                    .bind(report.status.as_str())
                    .bind(&report.location)
                    .bind(report.created_at)
                    .execute(pool)
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn get_reconciliation_report(
        &self,
        name: &str,
    ) -> Result<Option<ReconciliationReport>, CatalogError> {
        let select =
            "SELECT name, report_type, status, location, created_at FROM reconciliation_reports";
        let row = match &self.pool {
            CatalogPool::Sqlite(pool) => query(&format!("{select} WHERE name = ?"))
                .bind(name)
                .fetch_optional(pool)
                .await?
                .map(|row| decode_report(&row)),
            CatalogPool::Postgres(pool) => query(&format!("{select} WHERE name = $1"))
                .bind(name)
                .fetch_optional(pool)
                .await?
                .map(|row| decode_report(&row)),
        };
        row.transpose()
    }

    /// Delete a report row in one transaction, returning the removed record.
    pub async fn delete_reconciliation_report(
        &self,
        name: &str,
    ) -> Result<Option<ReconciliationReport>, CatalogError> {
        let select =
            "SELECT name, report_type, status, location, created_at FROM reconciliation_reports";
        self.bounded("delete reconciliation report", async {
            match &self.pool {
                CatalogPool::Sqlite(pool) => {
                    let mut tx = pool.begin_with(SQLITE_WRITE_BEGIN).await?;
                    let row = query(&format!("{select} WHERE name = ?"))
                        .bind(name)
                        .fetch_optional(&mut *tx)
                        .await?;
                    let Some(row) = row else {
                        return Ok(None);
                    };
                    let report = decode_report(&row)?;
                    query("DELETE FROM reconciliation_reports WHERE name = ?")
                        .bind(name)
                        .execute(&mut *tx)
                        .await?;
                    tx.commit().await?;
                    Ok(Some(report))
                }
                CatalogPool::Postgres(pool) => {
                    let mut tx = pool.begin().await?;
                    let row = query(&format!("{select} WHERE name = $1 FOR UPDATE"))
                        .bind(name)
                        .fetch_optional(&mut *tx)
                        .await?;
                    let Some(row) = row else {
                        return Ok(None);
                    };
                    let report = decode_report(&row)?;
                    let removed = query("DELETE FROM reconciliation_reports WHERE name = $1")
                        .bind(name)
                        .execute(&mut *tx)
                        .await?
                        .rows_affected();
                    tx.commit().await?;
                    Ok((removed > 0).then_some(report))
                }
            }
        })
        .await
    }
}

// Row decoding shared by both back-ends.

fn parse_column<T>(
    column: &'static str,
    value: String,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, CatalogError> {
    parse(&value).ok_or(CatalogError::InvalidValue { column, value })
}

fn decode_granule<R>(row: &R, files: Vec<GranuleFile>) -> Result<Granule, CatalogError>
where
    R: Row,
    for<'a> &'a str: ColumnIndex<R>,
    for<'r> String: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> bool: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> DateTime<Utc>: Decode<'r, R::Database> + Type<R::Database>,
{
    Ok(Granule {
        granule_id: row.try_get("granule_id")?,
        collection_id: row.try_get("collection_id")?,
        status: parse_column("status", row.try_get("status")?, GranuleStatus::parse)?,
        published: row.try_get("published")?,
        files,
        created_at: row.try_get("created_at")?,
    })
}

fn decode_file<R>(row: &R) -> Result<GranuleFile, CatalogError>
where
    R: Row,
    for<'a> &'a str: ColumnIndex<R>,
    for<'r> String: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> i64: Decode<'r, R::Database> + Type<R::Database>,
{
    Ok(GranuleFile {
        bucket: row.try_get("bucket")?,
        key: row.try_get("key")?,
        file_name: row.try_get("file_name")?,
        size: row.try_get("size")?,
    })
}

fn decode_provider<R>(row: &R) -> Result<Provider, CatalogError>
where
    R: Row,
    for<'a> &'a str: ColumnIndex<R>,
    for<'r> String: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> i32: Decode<'r, R::Database> + Type<R::Database>,
{
    Ok(Provider {
        name: row.try_get("name")?,
        protocol: row.try_get("protocol")?,
        host: row.try_get("host")?,
        port: row.try_get("port")?,
    })
}

fn decode_rule<R>(row: &R) -> Result<Rule, CatalogError>
where
    R: Row,
    for<'a> &'a str: ColumnIndex<R>,
    for<'r> String: Decode<'r, R::Database> + Type<R::Database>,
{
    Ok(Rule {
        name: row.try_get("name")?,
        provider: row.try_get("provider_name")?,
        rule_type: parse_column("rule_type", row.try_get("rule_type")?, RuleType::parse)?,
        workflow: row.try_get("workflow")?,
        state: parse_column("state", row.try_get("state")?, RuleState::parse)?,
    })
}

fn decode_report<R>(row: &R) -> Result<ReconciliationReport, CatalogError>
where
    R: Row,
    for<'a> &'a str: ColumnIndex<R>,
    for<'r> String: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> DateTime<Utc>: Decode<'r, R::Database> + Type<R::Database>,
{
    Ok(ReconciliationReport {
        name: row.try_get("name")?,
        report_type: parse_column("report_type", row.try_get("report_type")?, ReportType::parse)?,
        status: parse_column("status", row.try_get("status")?, ReportStatus::parse)?,
        location: row.try_get("location")?,
        created_at: row.try_get("created_at")?,
    })
}
