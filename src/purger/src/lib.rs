//! Deletion and referential integrity across the relational catalog, the
//! legacy mirror and object storage.

pub mod cleanup;
pub mod error;
pub mod guard;
pub mod orchestrator;
pub mod outcome;
pub mod repository;

pub use cleanup::{ArtifactCleaner, CleanupConfig, CleanupFailure, CleanupReport};
pub use error::{DeletionError, StoreError};
pub use guard::IntegrityGuard;
pub use orchestrator::Purger;
pub use outcome::{Conflict, DeleteOutcome, DeleteTarget, DeletionSummary, Phase, StoreOutcome};
pub use repository::{DualStore, Located, RuleReferences};
