//! Test utilities for granary.
//!
//! Reusable configuration builders and record fixtures for unit and
//! integration tests.
//!
//! # Feature Flag
//!
//! This module is only available when the `testing` feature is enabled or during tests:
//!
//! ```toml
//! [dev-dependencies]
//! common = { path = "../common", features = ["testing"] }
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use common::testing::{TestConfigBuilder, fake_granule};
//!
//! let config = TestConfigBuilder::new()
//!     .in_memory()
//!     .with_bucket("b")
//!     .build();
//! let granule = fake_granule("gran-1", &["s3://b/k1", "s3://b/k2"]);
//! ```

mod config_builder;
mod fixtures;

pub use config_builder::TestConfigBuilder;
pub use fixtures::{fake_granule, fake_provider, fake_report, fake_rule};
