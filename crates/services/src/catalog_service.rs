use std::sync::Arc;

use curriculum_core::model::{
    Catalog, CatalogError, Lesson, LessonId, Module, ModuleId, SemesterLabel,
};
use storage::repository::CatalogRepository;

use crate::Clock;
use crate::error::CatalogServiceError;

/// Reads and maintains the module catalog.
#[derive(Clone)]
pub struct CatalogService {
    clock: Clock,
    catalog: Arc<dyn CatalogRepository>,
}

impl CatalogService {
    #[must_use]
    pub fn new(clock: Clock, catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { clock, catalog }
    }

    /// Load the validated catalog.
    ///
    /// # Errors
    ///
    /// Returns `CatalogServiceError::Storage` if the stored rows cannot be read
    /// or do not form a valid catalog.
    pub async fn load(&self) -> Result<Catalog, CatalogServiceError> {
        Ok(self.catalog.load_catalog().await?)
    }

    /// Declare a semester at `position` in the semester order.
    ///
    /// # Errors
    ///
    /// Returns `CatalogServiceError::Catalog` for a blank label.
    /// Returns `CatalogServiceError::Storage` if another semester holds `position`.
    pub async fn add_semester(
        &self,
        label: &str,
        position: u32,
    ) -> Result<SemesterLabel, CatalogServiceError> {
        let label = SemesterLabel::new(label)?;
        self.catalog.upsert_semester(&label, position).await?;
        Ok(label)
    }

    /// Create a module in an existing semester.
    ///
    /// # Errors
    ///
    /// Returns `CatalogServiceError::Module` for a blank code or title,
    /// `CatalogServiceError::Catalog` for an undeclared semester, or
    /// `CatalogServiceError::Storage` if persistence fails.
    pub async fn add_module(
        &self,
        semester: &SemesterLabel,
        order: u32,
        code: &str,
        title: &str,
        description: Option<String>,
    ) -> Result<Module, CatalogServiceError> {
        let module = Module::new(
            ModuleId::generate(),
            semester.clone(),
            order,
            code,
            title,
            description,
            self.clock.now(),
        )?;

        let current = self.load().await?;
        if !current.contains_semester(semester) {
            return Err(CatalogError::UnknownSemester {
                module: module.id(),
                semester: semester.clone(),
            }
            .into());
        }

        self.catalog.upsert_module(&module).await?;
        Ok(module)
    }

    /// Append a lesson to an existing module.
    ///
    /// # Errors
    ///
    /// Returns `CatalogServiceError::ModuleNotFound` for an unknown module,
    /// `CatalogServiceError::Module` for a blank title, or
    /// `CatalogServiceError::Storage` if persistence fails.
    pub async fn add_lesson(
        &self,
        module_id: ModuleId,
        order: u32,
        title: &str,
    ) -> Result<Lesson, CatalogServiceError> {
        let lesson = Lesson::new(LessonId::generate(), module_id, order, title)?;

        let current = self.load().await?;
        if current.module(module_id).is_none() {
            return Err(CatalogServiceError::ModuleNotFound(module_id));
        }

        self.catalog.upsert_lesson(&lesson).await?;
        Ok(lesson)
    }

    /// Write a whole catalog, semesters first so every reference resolves.
    ///
    /// # Errors
    ///
    /// Returns `CatalogServiceError::Storage` if any write fails.
    pub async fn import(&self, catalog: &Catalog) -> Result<(), CatalogServiceError> {
        for (position, label) in (0_u32..).zip(catalog.semesters()) {
            self.catalog.upsert_semester(label, position).await?;
        }
        for module in catalog.modules() {
            self.catalog.upsert_module(module).await?;
        }
        for lesson in catalog.lessons() {
            self.catalog.upsert_lesson(lesson).await?;
        }
        tracing::info!(
            semesters = catalog.semesters().len(),
            modules = catalog.modules().len(),
            lessons = catalog.lessons().len(),
            "catalog imported"
        );
        Ok(())
    }
}
