//! Test configuration builder for creating test setups quickly.

use std::time::Duration;

use crate::config::{Configuration, DatabaseConfig, LegacyBackend, LegacyConfig, RetryConfig};

/// Builder for creating test configurations.
///
/// # Example
///
/// ```rust,ignore
/// use common::testing::TestConfigBuilder;
///
/// let config = TestConfigBuilder::new()
///     .in_memory()
///     .with_bucket("protected")
///     .with_fan_out(2)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct TestConfigBuilder {
    config: Configuration,
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Configuration::default(),
        }
    }

    /// Configure for fully in-memory operation (fastest for tests).
    ///
    /// This sets:
    /// - Database DSN to `sqlite::memory:`
    /// - Legacy backend to the in-memory map
    /// - Retries to a single attempt with no backoff
    pub fn in_memory(mut self) -> Self {
        self.config.database = DatabaseConfig::in_memory();
        self.config.legacy = LegacyConfig {
            backend: LegacyBackend::Memory,
            dsn: None,
            ..LegacyConfig::default()
        };
        self.config.deletion.retry = RetryConfig {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        };
        self
    }

    /// Register an in-memory object store for `bucket`.
    pub fn with_bucket(self, bucket: &str) -> Self {
        self.with_bucket_dsn(bucket, "memory://")
    }

    pub fn with_bucket_dsn(mut self, bucket: &str, dsn: &str) -> Self {
        self.config.storage = self.config.storage.with_bucket(bucket, dsn);
        self
    }

    /// Set the database DSN.
    pub fn with_database_dsn(mut self, dsn: &str) -> Self {
        self.config.database.dsn = dsn.to_string();
        self
    }

    /// Store legacy documents in a SQL table at `dsn`.
    pub fn with_sql_legacy(mut self, dsn: &str) -> Self {
        self.config.legacy.backend = LegacyBackend::Sql;
        self.config.legacy.dsn = Some(dsn.to_string());
        self
    }

    pub fn with_fan_out(mut self, fan_out: usize) -> Self {
        self.config.deletion.fan_out = fan_out;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.config.deletion.retry.max_attempts = max_attempts;
        self
    }

    pub fn with_object_call_timeout(mut self, timeout: Duration) -> Self {
        self.config.deletion.object_call_timeout = timeout;
        self
    }

    pub fn build(self) -> Configuration {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_config_is_valid() {
        let config = TestConfigBuilder::new()
            .in_memory()
            .with_bucket("b")
            .with_fan_out(4)
            .build();

        assert_eq!(config.database.dsn, "sqlite::memory:");
        assert_eq!(config.legacy.backend, LegacyBackend::Memory);
        assert_eq!(config.storage.buckets.get("b").map(String::as_str), Some("memory://"));
        assert_eq!(config.deletion.fan_out, 4);
        config.validate().unwrap();
    }

    #[test]
    fn test_sql_legacy_requires_dsn() {
        let config = TestConfigBuilder::new()
            .in_memory()
            .with_sql_legacy("sqlite::memory:")
            .build();
        assert_eq!(config.legacy.dsn.as_deref(), Some("sqlite::memory:"));
        config.validate().unwrap();
    }
}
