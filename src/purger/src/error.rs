use common::catalog::CatalogError;
use common::legacy::LegacyStoreError;

use crate::cleanup::CleanupReport;
use crate::outcome::DeleteTarget;

/// Failure of a single catalog call
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("relational catalog: {0}")]
    Catalog(#[from] CatalogError),

    #[error("legacy catalog: {0}")]
    Legacy(#[from] LegacyStoreError),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Catalog(e) => e.is_transient(),
            StoreError::Legacy(e) => e.is_transient(),
        }
    }
}

/// Why a delete ended in the Failed state
#[derive(Debug, thiserror::Error)]
pub enum DeletionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The relational delete committed but the legacy record survived.
    /// Artifact cleanup already ran; `cleanup` records its outcome.
    #[error("stale legacy mirror: {target} was removed from the relational catalog but not from the legacy catalog: {source}")]
    LegacyMirrorStale {
        target: DeleteTarget,
        #[source]
        source: LegacyStoreError,
        cleanup: CleanupReport,
    },
}

impl DeletionError {
    /// Whether the caller may retry the whole delete.
    pub fn is_retryable(&self) -> bool {
        match self {
            DeletionError::Store(e) => e.is_transient(),
            // Every step is idempotent, a retry finishes the legacy delete
            DeletionError::LegacyMirrorStale { .. } => true,
        }
    }

    /// Whether the relational delete was committed before the failure.
    pub fn committed(&self) -> bool {
        matches!(self, DeletionError::LegacyMirrorStale { .. })
    }
}

impl From<CatalogError> for DeletionError {
    fn from(e: CatalogError) -> Self {
        DeletionError::Store(e.into())
    }
}

impl From<LegacyStoreError> for DeletionError {
    fn from(e: LegacyStoreError) -> Self {
        DeletionError::Store(e.into())
    }
}
