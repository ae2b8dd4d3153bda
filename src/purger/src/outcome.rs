use std::fmt;

use common::model::EntityKind;

use crate::cleanup::{CleanupFailure, CleanupReport};
use crate::error::DeletionError;

/// Entity instance a delete request addresses
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeleteTarget {
    Granule(String),
    Provider(String),
    ReconciliationReport(String),
}

impl DeleteTarget {
    pub fn id(&self) -> &str {
        match self {
            DeleteTarget::Granule(id)
            | DeleteTarget::Provider(id)
            | DeleteTarget::ReconciliationReport(id) => id,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            DeleteTarget::Granule(_) => EntityKind::Granule,
            DeleteTarget::Provider(_) => EntityKind::Provider,
            DeleteTarget::ReconciliationReport(_) => EntityKind::ReconciliationReport,
        }
    }
}

impl fmt::Display for DeleteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            DeleteTarget::Granule(_) => "granule",
            DeleteTarget::Provider(_) => "provider",
            DeleteTarget::ReconciliationReport(_) => "reconciliation report",
        };
        write!(f, "{kind} {}", self.id())
    }
}

/// Orchestrator phases, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    GuardCheck,
    CatalogDelete,
    ArtifactCleanup,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::GuardCheck => "guard_check",
            Phase::CatalogDelete => "catalog_delete",
            Phase::ArtifactCleanup => "artifact_cleanup",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one store did with the record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Removed,
    Absent,
}

impl StoreOutcome {
    pub fn from_removed(removed: bool) -> Self {
        if removed {
            StoreOutcome::Removed
        } else {
            StoreOutcome::Absent
        }
    }
}

/// Domain invariant that blocked a delete
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Conflict {
    #[error("Cannot delete provider with associated rules: {}", rules.join(", "))]
    ProviderHasRules { provider: String, rules: Vec<String> },

    #[error("You cannot delete a granule that is published to CMR. Remove it from CMR first")]
    GranulePublished { granule_id: String },
}

/// Record of a completed delete
#[derive(Debug, Clone, PartialEq)]
pub struct DeletionSummary {
    pub target: DeleteTarget,
    pub relational: StoreOutcome,
    pub legacy: StoreOutcome,
    pub cleanup: CleanupReport,
}

impl DeletionSummary {
    /// Whether either catalog held the record.
    pub fn mutated(&self) -> bool {
        self.relational == StoreOutcome::Removed || self.legacy == StoreOutcome::Removed
    }

    /// Artifacts that could not be removed
    pub fn warnings(&self) -> &[CleanupFailure] {
        &self.cleanup.failures
    }

    pub fn message(&self) -> &'static str {
        match self.target {
            DeleteTarget::ReconciliationReport(_) => "Report deleted",
            DeleteTarget::Granule(_) | DeleteTarget::Provider(_) => "Record deleted",
        }
    }
}

/// Terminal state of a delete request
#[derive(Debug)]
pub enum DeleteOutcome {
    Deleted(DeletionSummary),
    Refused(Conflict),
    Failed(DeletionError),
}

impl DeleteOutcome {
    pub fn is_deleted(&self) -> bool {
        matches!(self, DeleteOutcome::Deleted(_))
    }

    pub fn is_refused(&self) -> bool {
        matches!(self, DeleteOutcome::Refused(_))
    }

    pub fn summary(&self) -> Option<&DeletionSummary> {
        match self {
            DeleteOutcome::Deleted(summary) => Some(summary),
            _ => None,
        }
    }
}
