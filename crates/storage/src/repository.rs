use async_trait::async_trait;
use chrono::{DateTime, Utc};
use curriculum_core::model::{
    Catalog, Lesson, LessonId, LessonProgress, Module, ModuleId, MutationEffect,
    ProgressMutation, SemesterLabel, UserId, UserProgress,
};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    /// A concurrent writer held the row or table; the operation may be retried.
    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// A key the store cannot represent, such as a user id past `i64::MAX`.
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

/// Result of one atomic read-modify-write on a progress record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMutation {
    pub progress: UserProgress,
    pub effect: MutationEffect,
}

/// Source of truth for the module catalog.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Load and validate the whole catalog.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if stored rows do not form a
    /// valid catalog, or other storage errors.
    async fn load_catalog(&self) -> Result<Catalog, StorageError>;

    /// Insert or move a semester to `position` in the declared order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the semester cannot be stored.
    async fn upsert_semester(
        &self,
        label: &SemesterLabel,
        position: u32,
    ) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the module cannot be stored.
    async fn upsert_module(&self, module: &Module) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the lesson cannot be stored.
    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<(), StorageError>;
}

/// Store of `(user, module)` progress records.
///
/// Implementations must apply each write atomically per key: the read of the
/// current record, the transition, and the write-back happen as one unit.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failure. A missing record is `Ok(None)`.
    async fn get_progress(
        &self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> Result<Option<UserProgress>, StorageError>;

    /// All records of one user, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failure.
    async fn list_user_progress(&self, user_id: UserId) -> Result<Vec<UserProgress>, StorageError>;

    /// Records of one user restricted to `module_ids`. Missing records are skipped.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failure.
    async fn list_progress_for_modules(
        &self,
        user_id: UserId,
        module_ids: &[ModuleId],
    ) -> Result<Vec<UserProgress>, StorageError>;

    /// Create-if-missing, apply `mutation`, and persist, atomically.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` when a concurrent writer prevented the
    /// transaction, or other storage errors.
    async fn apply_mutation(
        &self,
        user_id: UserId,
        module_id: ModuleId,
        mutation: ProgressMutation,
        now: DateTime<Utc>,
    ) -> Result<AppliedMutation, StorageError>;

    /// Ensure every module in `module_ids` is unlocked for `user_id`, as one
    /// batch. Missing records are created at 0%; locked ones are unlocked with
    /// their percentage kept; unlocked ones are left untouched.
    ///
    /// Returns the modules whose state actually changed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` when a concurrent writer prevented the
    /// transaction, or other storage errors.
    async fn unlock_modules(
        &self,
        user_id: UserId,
        module_ids: &[ModuleId],
        now: DateTime<Utc>,
    ) -> Result<Vec<ModuleId>, StorageError>;
}

/// Store of `(user, lesson)` completion records.
#[async_trait]
pub trait LessonProgressRepository: Send + Sync {
    /// Create-if-missing and set the completed flag, atomically.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failure.
    async fn set_lesson_completed(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
        completed: bool,
        now: DateTime<Utc>,
    ) -> Result<LessonProgress, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on adapter failure.
    async fn list_lesson_progress(
        &self,
        user_id: UserId,
    ) -> Result<Vec<LessonProgress>, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct MemoryState {
    semesters: Vec<(u32, SemesterLabel)>,
    modules: HashMap<ModuleId, Module>,
    lessons: HashMap<LessonId, Lesson>,
    progress: HashMap<(UserId, ModuleId), UserProgress>,
    lesson_progress: HashMap<(UserId, LessonId), LessonProgress>,
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// A single mutex guards all state, so every trait call is atomic.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl CatalogRepository for InMemoryRepository {
    async fn load_catalog(&self) -> Result<Catalog, StorageError> {
        let guard = self.lock()?;
        let mut semesters = guard.semesters.clone();
        semesters.sort_by_key(|(position, _)| *position);
        Catalog::new(
            semesters.into_iter().map(|(_, label)| label).collect(),
            guard.modules.values().cloned().collect(),
            guard.lessons.values().cloned().collect(),
        )
        .map_err(|e| StorageError::Serialization(e.to_string()))
    }

    async fn upsert_semester(
        &self,
        label: &SemesterLabel,
        position: u32,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if guard
            .semesters
            .iter()
            .any(|(pos, existing)| *pos == position && existing != label)
        {
            return Err(StorageError::Conflict);
        }
        guard.semesters.retain(|(_, existing)| existing != label);
        guard.semesters.push((position, label.clone()));
        Ok(())
    }

    async fn upsert_module(&self, module: &Module) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.modules.insert(module.id(), module.clone());
        Ok(())
    }

    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.lessons.insert(lesson.id(), lesson.clone());
        Ok(())
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn get_progress(
        &self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> Result<Option<UserProgress>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.progress.get(&(user_id, module_id)).cloned())
    }

    async fn list_user_progress(&self, user_id: UserId) -> Result<Vec<UserProgress>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .progress
            .values()
            .filter(|p| p.user_id() == user_id)
            .cloned()
            .collect())
    }

    async fn list_progress_for_modules(
        &self,
        user_id: UserId,
        module_ids: &[ModuleId],
    ) -> Result<Vec<UserProgress>, StorageError> {
        let guard = self.lock()?;
        Ok(module_ids
            .iter()
            .filter_map(|m| guard.progress.get(&(user_id, *m)).cloned())
            .collect())
    }

    async fn apply_mutation(
        &self,
        user_id: UserId,
        module_id: ModuleId,
        mutation: ProgressMutation,
        now: DateTime<Utc>,
    ) -> Result<AppliedMutation, StorageError> {
        let mut guard = self.lock()?;
        let existing = guard.progress.get(&(user_id, module_id)).cloned();
        let (progress, effect) = UserProgress::apply(existing, user_id, module_id, mutation, now);
        guard
            .progress
            .insert((user_id, module_id), progress.clone());
        Ok(AppliedMutation { progress, effect })
    }

    async fn unlock_modules(
        &self,
        user_id: UserId,
        module_ids: &[ModuleId],
        now: DateTime<Utc>,
    ) -> Result<Vec<ModuleId>, StorageError> {
        let mut guard = self.lock()?;
        let mut changed = Vec::new();
        for module_id in module_ids {
            match guard.progress.entry((user_id, *module_id)) {
                Entry::Occupied(mut existing) => {
                    if existing.get_mut().ensure_unlocked() {
                        changed.push(*module_id);
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(UserProgress::cascaded(user_id, *module_id, now));
                    changed.push(*module_id);
                }
            }
        }
        Ok(changed)
    }
}

#[async_trait]
impl LessonProgressRepository for InMemoryRepository {
    async fn set_lesson_completed(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
        completed: bool,
        now: DateTime<Utc>,
    ) -> Result<LessonProgress, StorageError> {
        let mut guard = self.lock()?;
        let record = guard
            .lesson_progress
            .entry((user_id, lesson_id))
            .or_insert_with(|| LessonProgress::new(user_id, lesson_id));
        record.set_completed(completed, now);
        Ok(record.clone())
    }

    async fn list_lesson_progress(
        &self,
        user_id: UserId,
    ) -> Result<Vec<LessonProgress>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .lesson_progress
            .values()
            .filter(|lp| lp.user_id() == user_id)
            .cloned()
            .collect())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub catalog: Arc<dyn CatalogRepository>,
    pub progress: Arc<dyn ProgressRepository>,
    pub lessons: Arc<dyn LessonProgressRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let catalog: Arc<dyn CatalogRepository> = Arc::new(repo.clone());
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo.clone());
        let lessons: Arc<dyn LessonProgressRepository> = Arc::new(repo);
        Self {
            catalog,
            progress,
            lessons,
        }
    }
}
