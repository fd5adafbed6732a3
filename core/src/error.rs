use std::time::Duration;

use thiserror::Error;

use crate::model::ProfileId;

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Failures surfaced by catalog, ordering and scan operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid ordering: {0}")]
    InvalidOrdering(String),

    #[error("a scan is already running for profile {0}")]
    ScanInProgress(ProfileId),

    #[error("detector unavailable: {0}")]
    DetectorUnavailable(String),

    #[error("detector timed out after {0:?}")]
    Timeout(Duration),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("storage failure: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl CatalogError {
    pub fn not_found(kind: &'static str, id: i64) -> Self {
        CatalogError::NotFound { kind, id }
    }

    /// Stable machine-readable tag, used in API error bodies and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CatalogError::NotFound { .. } => "not_found",
            CatalogError::Conflict(_) => "conflict",
            CatalogError::InvalidOrdering(_) => "invalid_ordering",
            CatalogError::ScanInProgress(_) => "scan_in_progress",
            CatalogError::DetectorUnavailable(_) => "detector_unavailable",
            CatalogError::Timeout(_) => "timeout",
            CatalogError::Validation(_) => "validation",
            CatalogError::Storage(_) => "storage",
        }
    }
}
