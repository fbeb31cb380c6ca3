use std::sync::Arc;

use storage::repository::Storage;
use storage::sqlite::SqlitePoolSettings;

use crate::Clock;
use crate::catalog_service::CatalogService;
use crate::error::ServicesInitError;
use crate::lesson_progress_service::LessonProgressService;
use crate::progression::{ProgressionPolicy, ProgressionService};

/// Assembles the curriculum services over one storage backend.
#[derive(Clone)]
pub struct CurriculumServices {
    catalog: Arc<CatalogService>,
    progression: Arc<ProgressionService>,
    lessons: Arc<LessonProgressService>,
}

impl CurriculumServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `ServicesInitError` if the database cannot be opened or migrated.
    pub async fn new_sqlite(
        db_url: &str,
        pool: SqlitePoolSettings,
        clock: Clock,
        policy: ProgressionPolicy,
    ) -> Result<Self, ServicesInitError> {
        let storage = Storage::sqlite_with(db_url, pool).await?;
        Ok(Self::from_storage(&storage, clock, policy))
    }

    /// Build services over process-local storage.
    #[must_use]
    pub fn in_memory(clock: Clock, policy: ProgressionPolicy) -> Self {
        Self::from_storage(&Storage::in_memory(), clock, policy)
    }

    #[must_use]
    pub fn from_storage(storage: &Storage, clock: Clock, policy: ProgressionPolicy) -> Self {
        let catalog = Arc::new(CatalogService::new(clock, Arc::clone(&storage.catalog)));
        let progression = Arc::new(
            ProgressionService::new(clock, Arc::clone(&storage.progress)).with_policy(policy),
        );
        let lessons = Arc::new(LessonProgressService::new(
            clock,
            Arc::clone(&storage.lessons),
            Arc::clone(&progression),
        ));

        Self {
            catalog,
            progression,
            lessons,
        }
    }

    #[must_use]
    pub fn catalog(&self) -> Arc<CatalogService> {
        Arc::clone(&self.catalog)
    }

    #[must_use]
    pub fn progression(&self) -> Arc<ProgressionService> {
        Arc::clone(&self.progression)
    }

    #[must_use]
    pub fn lessons(&self) -> Arc<LessonProgressService> {
        Arc::clone(&self.lessons)
    }
}
