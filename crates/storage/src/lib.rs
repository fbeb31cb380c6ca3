#![forbid(unsafe_code)]

//! Persistence for the module catalog and per-user progress.

pub mod repository;
pub mod sqlite;

pub use repository::{
    AppliedMutation, CatalogRepository, InMemoryRepository, LessonProgressRepository,
    ProgressRepository, Storage, StorageError,
};
