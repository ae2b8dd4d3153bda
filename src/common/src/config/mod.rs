use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// DSN of the relational catalog (PostgreSQL or SQLite)
    pub dsn: String,
    /// Upper bound on the lifetime of a single delete transaction
    #[serde(with = "humantime_serde")]
    pub transaction_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dsn: String::from("sqlite://.data/granary.db"),
            transaction_timeout: Duration::from_secs(30),
        }
    }
}

impl DatabaseConfig {
    /// Create an in-memory database configuration for tests and local runs
    pub fn in_memory() -> Self {
        Self {
            dsn: String::from("sqlite::memory:"),
            ..Self::default()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LegacyBackend {
    /// Process-local map, lost on restart. Tests only: the rule guard sees
    /// nothing another process wrote.
    Memory,
    /// JSON documents in a SQL table
    #[default]
    Sql,
}

/// Configuration for the legacy key/value catalog
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LegacyConfig {
    pub backend: LegacyBackend,
    /// DSN of the document table, only read by the `sql` backend
    pub dsn: Option<String>,
    /// Timeout applied to every legacy store call
    #[serde(with = "humantime_serde")]
    pub call_timeout: Duration,
}

impl Default for LegacyConfig {
    fn default() -> Self {
        Self {
            backend: LegacyBackend::Sql,
            dsn: Some(String::from("sqlite://.data/granary-legacy.db")),
            call_timeout: Duration::from_secs(10),
        }
    }
}

/// Object storage configuration: one DSN per bucket name.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub buckets: HashMap<String, String>,
}

impl StorageConfig {
    pub fn with_bucket(mut self, bucket: impl Into<String>, dsn: impl Into<String>) -> Self {
        self.buckets.insert(bucket.into(), dsn.into());
        self
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per call, including the first one
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeletionConfig {
    /// Maximum concurrent object deletions for one entity
    pub fan_out: usize,
    /// Timeout applied to every object store call
    #[serde(with = "humantime_serde")]
    pub object_call_timeout: Duration,
    /// Retry policy for legacy store and object store calls
    pub retry: RetryConfig,
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self {
            fan_out: 16,
            object_call_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Configuration {
    /// Relational catalog, the durability authority
    pub database: DatabaseConfig,
    /// Legacy catalog mirrored during the migration window
    pub legacy: LegacyConfig,
    /// Object storage holding granule files and report bodies
    pub storage: StorageConfig,
    /// Deletion and cleanup tuning
    pub deletion: DeletionConfig,
}

impl Configuration {
    /// Load configuration from defaults, `granary.toml` and `GRANARY__` env vars.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::load_from_path("granary.toml")
    }

    /// Load configuration with an explicit TOML file in place of `granary.toml`.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        let config = Figment::from(Serialized::defaults(Configuration::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("GRANARY__").split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }

    /// Reject settings that would stall or disable deletion.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.deletion.fan_out == 0 {
            anyhow::bail!("deletion.fan_out must be positive, got 0");
        }

        if self.deletion.retry.max_attempts == 0 {
            anyhow::bail!("deletion.retry.max_attempts must be positive, got 0");
        }

        if self.deletion.retry.backoff_multiplier < 1.0 {
            anyhow::bail!(
                "deletion.retry.backoff_multiplier must be at least 1.0, got {}",
                self.deletion.retry.backoff_multiplier
            );
        }

        for (name, timeout) in [
            ("database.transaction_timeout", self.database.transaction_timeout),
            ("legacy.call_timeout", self.legacy.call_timeout),
            ("deletion.object_call_timeout", self.deletion.object_call_timeout),
        ] {
            if timeout.is_zero() {
                anyhow::bail!("{name} must be positive");
            }
        }

        if self.legacy.backend == LegacyBackend::Sql && self.legacy.dsn.is_none() {
            anyhow::bail!("legacy.dsn is required when legacy.backend = \"sql\"");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_configuration_is_valid() {
        let config = Configuration::default();

        assert_eq!(config.database.dsn, "sqlite://.data/granary.db");
        assert_eq!(config.database.transaction_timeout, Duration::from_secs(30));
        assert_eq!(config.legacy.backend, LegacyBackend::Sql);
        assert_eq!(
            config.legacy.dsn.as_deref(),
            Some("sqlite://.data/granary-legacy.db")
        );
        assert_eq!(config.deletion.fan_out, 16);
        assert!(config.storage.buckets.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn test_configless_operation() {
        Jail::expect_with(|_jail| {
            let config = Configuration::load().map_err(|e| *e)?;
            assert_eq!(config.database.dsn, "sqlite://.data/granary.db");
            assert_eq!(config.deletion.retry.max_attempts, 3);
            Ok(())
        });
    }

    #[test]
    fn test_toml_file_and_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "granary.toml",
                r#"
                [database]
                dsn = "postgres://catalog@localhost/granary"
                transaction_timeout = "5s"

                [storage.buckets]
                protected = "memory://"
                "#,
            )?;
            jail.set_env("GRANARY__DELETION__FAN_OUT", "4");
            jail.set_env("GRANARY__LEGACY__CALL_TIMEOUT", "250ms");
            jail.set_env("GRANARY__LEGACY__BACKEND", "memory");

            let config = Configuration::load().map_err(|e| *e)?;
            assert_eq!(config.database.dsn, "postgres://catalog@localhost/granary");
            assert_eq!(config.database.transaction_timeout, Duration::from_secs(5));
            assert_eq!(config.deletion.fan_out, 4);
            assert_eq!(config.legacy.call_timeout, Duration::from_millis(250));
            assert_eq!(config.legacy.backend, LegacyBackend::Memory);
            assert_eq!(
                config.storage.buckets.get("protected").map(String::as_str),
                Some("memory://")
            );
            Ok(())
        });
    }

    #[test]
    fn test_nested_storage_config_env_vars() {
        Jail::expect_with(|jail| {
            jail.set_env("GRANARY__STORAGE__BUCKETS__PRIVATE", "file:///tmp/private");

            let config = Configuration::load().map_err(|e| *e)?;
            assert_eq!(
                config.storage.buckets.get("private").map(String::as_str),
                Some("file:///tmp/private")
            );
            Ok(())
        });
    }

    #[test]
    fn test_validate_rejects_zero_fan_out() {
        let mut config = Configuration::default();
        config.deletion.fan_out = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("fan_out"));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Configuration::default();
        config.legacy.call_timeout = Duration::ZERO;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("legacy.call_timeout"));
    }

    #[test]
    fn test_validate_requires_dsn_for_sql_legacy_backend() {
        let mut config = Configuration::default();
        config.legacy.dsn = None;
        assert!(config.validate().is_err());

        config.legacy.dsn = Some("sqlite::memory:".to_string());
        config.validate().unwrap();
    }
}
