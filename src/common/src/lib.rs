pub mod catalog;
pub mod cli;
pub mod config;
pub mod legacy;
pub mod model;
pub mod retry;
pub mod storage;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use catalog::Catalog;
pub use legacy::LegacyCatalog;
