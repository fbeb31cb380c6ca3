use chrono::{DateTime, Utc};
use curriculum_core::model::{
    Lesson, LessonId, LessonProgress, Module, ModuleId, Percentage, SemesterLabel, UserId,
    UserProgress,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn user_id_to_i64(id: UserId) -> Result<i64, StorageError> {
    i64::try_from(id.value())
        .map_err(|_| StorageError::InvalidKey(format!("user id {id} exceeds {}", i64::MAX)))
}

pub(crate) fn user_id_from_i64(v: i64) -> Result<UserId, StorageError> {
    u64::try_from(v)
        .map(UserId::new)
        .map_err(|_| StorageError::Serialization("user_id sign overflow".into()))
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

fn module_id_from_row(row: &SqliteRow, column: &str) -> Result<ModuleId, StorageError> {
    row.try_get::<String, _>(column)
        .map_err(ser)?
        .parse::<ModuleId>()
        .map_err(ser)
}

fn lesson_id_from_row(row: &SqliteRow, column: &str) -> Result<LessonId, StorageError> {
    row.try_get::<String, _>(column)
        .map_err(ser)?
        .parse::<LessonId>()
        .map_err(ser)
}

pub(crate) fn map_module_row(row: &SqliteRow) -> Result<Module, StorageError> {
    let semester = SemesterLabel::new(row.try_get::<String, _>("semester").map_err(ser)?)
        .map_err(ser)?;
    Module::new(
        module_id_from_row(row, "id")?,
        semester,
        u32_from_i64("position", row.try_get::<i64, _>("position").map_err(ser)?)?,
        row.try_get::<String, _>("code").map_err(ser)?,
        row.try_get::<String, _>("title").map_err(ser)?,
        row.try_get::<Option<String>, _>("description").map_err(ser)?,
        row.try_get("created_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_lesson_row(row: &SqliteRow) -> Result<Lesson, StorageError> {
    Lesson::new(
        lesson_id_from_row(row, "id")?,
        module_id_from_row(row, "module_id")?,
        u32_from_i64("position", row.try_get::<i64, _>("position").map_err(ser)?)?,
        row.try_get::<String, _>("title").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_progress_row(row: &SqliteRow) -> Result<UserProgress, StorageError> {
    let percentage =
        Percentage::new(row.try_get::<i64, _>("progress_percentage").map_err(ser)?).map_err(ser)?;
    let last_accessed: Option<DateTime<Utc>> = row.try_get("last_accessed").map_err(ser)?;
    let completed_at: Option<DateTime<Utc>> = row.try_get("completed_at").map_err(ser)?;

    UserProgress::from_persisted(
        user_id_from_i64(row.try_get::<i64, _>("user_id").map_err(ser)?)?,
        module_id_from_row(row, "module_id")?,
        row.try_get::<bool, _>("is_module_unlocked").map_err(ser)?,
        row.try_get::<bool, _>("is_module_completed").map_err(ser)?,
        percentage,
        last_accessed,
        row.try_get("started_at").map_err(ser)?,
        completed_at,
    )
    .map_err(ser)
}

pub(crate) fn map_lesson_progress_row(row: &SqliteRow) -> Result<LessonProgress, StorageError> {
    Ok(LessonProgress::from_persisted(
        user_id_from_i64(row.try_get::<i64, _>("user_id").map_err(ser)?)?,
        lesson_id_from_row(row, "lesson_id")?,
        row.try_get::<bool, _>("completed").map_err(ser)?,
        row.try_get("completed_at").map_err(ser)?,
    ))
}
