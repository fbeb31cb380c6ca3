//! Shared error types for the services crate.

use thiserror::Error;

use curriculum_core::model::{CatalogError, LessonId, ModuleError, ModuleId};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `ProgressionService` and `LessonProgressService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressionError {
    #[error("module {0} not found")]
    ModuleNotFound(ModuleId),
    #[error("semester {0} not found")]
    SemesterNotFound(String),
    #[error("lesson {0} not found")]
    LessonNotFound(LessonId),
    #[error("no progress recorded for module {0}")]
    ProgressNotFound(ModuleId),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A concurrent writer won twice in a row.
    #[error("progress store conflict")]
    Conflict,
    #[error("progress store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<StorageError> for ProgressionError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict => Self::Conflict,
            StorageError::InvalidKey(msg) => Self::InvalidInput(msg),
            other => Self::StoreUnavailable(other.to_string()),
        }
    }
}

/// Errors emitted by `CatalogService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogServiceError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Module(#[from] ModuleError),
    #[error("module {0} not found")]
    ModuleNotFound(ModuleId),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping curriculum services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServicesInitError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}
