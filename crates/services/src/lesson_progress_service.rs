use std::collections::HashSet;
use std::sync::Arc;

use curriculum_core::model::{
    Catalog, Identity, LessonId, LessonProgress, Module, ModuleId, Percentage,
};
use serde::Serialize;
use storage::repository::LessonProgressRepository;

use crate::Clock;
use crate::error::ProgressionError;
use crate::progression::ProgressionService;
use crate::retry;

/// Lesson completion rolled up to its module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleLessonProgress {
    pub module_id: ModuleId,
    pub title: String,
    pub completed_lessons: usize,
    pub total_lessons: usize,
    /// Floored share of completed lessons; 0 for a module without lessons.
    pub percent_complete: Percentage,
    pub is_module_unlocked: bool,
}

/// Tracks lesson completion and drives module percentages from it.
#[derive(Clone)]
pub struct LessonProgressService {
    clock: Clock,
    lessons: Arc<dyn LessonProgressRepository>,
    progression: Arc<ProgressionService>,
}

impl LessonProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        lessons: Arc<dyn LessonProgressRepository>,
        progression: Arc<ProgressionService>,
    ) -> Self {
        Self {
            clock,
            lessons,
            progression,
        }
    }

    /// Mark a lesson done (or undone) and push the resulting share of the
    /// module's lessons into the module percentage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressionError::LessonNotFound` for an unknown lesson, or any
    /// error of [`ProgressionService::update_progress_percentage`].
    #[tracing::instrument(skip_all, fields(user_id = identity.user_id().value(), lesson_id = %lesson_id, completed = completed))]
    pub async fn record_lesson(
        &self,
        identity: &Identity,
        catalog: &Catalog,
        lesson_id: LessonId,
        completed: bool,
    ) -> Result<ModuleLessonProgress, ProgressionError> {
        let lesson = catalog
            .lesson(lesson_id)
            .ok_or(ProgressionError::LessonNotFound(lesson_id))?;
        let module = catalog
            .module(lesson.module_id())
            .ok_or(ProgressionError::ModuleNotFound(lesson.module_id()))?;

        let store = self.lessons.as_ref();
        let user_id = identity.user_id();
        let now = self.clock.now();
        retry::once_on_conflict("set_lesson_completed", move || {
            store.set_lesson_completed(user_id, lesson_id, completed, now)
        })
        .await?;

        let done = self.completed_lessons(identity).await?;
        let (completed_lessons, total_lessons) = lesson_counts(catalog, module, &done);
        let percent_complete = Percentage::from_ratio(completed_lessons, total_lessons);

        let progress = self
            .progression
            .update_progress_percentage(
                identity,
                catalog,
                module.id(),
                i64::from(percent_complete.value()),
            )
            .await?;

        Ok(ModuleLessonProgress {
            module_id: module.id(),
            title: module.title().to_owned(),
            completed_lessons,
            total_lessons,
            percent_complete,
            is_module_unlocked: progress.is_module_unlocked(),
        })
    }

    /// Lesson roll-up of every module, in catalog order.
    ///
    /// # Errors
    ///
    /// Returns `ProgressionError::StoreUnavailable` if progress cannot be read.
    pub async fn module_lesson_progress(
        &self,
        identity: &Identity,
        catalog: &Catalog,
    ) -> Result<Vec<ModuleLessonProgress>, ProgressionError> {
        let done = self.completed_lessons(identity).await?;
        let statuses = self.progression.module_statuses(identity, catalog).await?;

        Ok(catalog
            .modules()
            .iter()
            .zip(statuses)
            .map(|(module, status)| {
                let (completed_lessons, total_lessons) = lesson_counts(catalog, module, &done);
                ModuleLessonProgress {
                    module_id: module.id(),
                    title: module.title().to_owned(),
                    completed_lessons,
                    total_lessons,
                    percent_complete: Percentage::from_ratio(completed_lessons, total_lessons),
                    is_module_unlocked: status.is_unlocked,
                }
            })
            .collect())
    }

    async fn completed_lessons(
        &self,
        identity: &Identity,
    ) -> Result<HashSet<LessonId>, ProgressionError> {
        let records = self.lessons.list_lesson_progress(identity.user_id()).await?;
        Ok(records
            .iter()
            .filter(|lp| lp.completed())
            .map(LessonProgress::lesson_id)
            .collect())
    }
}

fn lesson_counts(
    catalog: &Catalog,
    module: &Module,
    done: &HashSet<LessonId>,
) -> (usize, usize) {
    catalog
        .lessons_of(module.id())
        .fold((0, 0), |(completed, total), lesson| {
            (completed + usize::from(done.contains(&lesson.id())), total + 1)
        })
}
