use homescan_core::CatalogError;
use rusqlite::{ffi, ErrorCode};
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl StoreError {
    /// A UNIQUE (or primary key) index rejected the row.
    pub(crate) fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        )
    }

    /// Any other constraint: CHECK, NOT NULL or FOREIGN KEY.
    fn is_other_constraint(&self) -> bool {
        !self.is_unique_violation()
            && matches!(
                self,
                StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation
            )
    }
}

impl From<StoreError> for CatalogError {
    fn from(err: StoreError) -> Self {
        if err.is_unique_violation() {
            return CatalogError::Conflict(err.to_string());
        }
        if err.is_other_constraint() {
            return CatalogError::Validation(err.to_string());
        }
        match err {
            StoreError::Catalog(e) => e,
            StoreError::Sqlite(e) => CatalogError::Storage(Box::new(e)),
        }
    }
}
