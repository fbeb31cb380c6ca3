use curriculum_core::model::{Catalog, Lesson, Module, SemesterLabel};
use sqlx::Row;

use super::mapping::{map_lesson_row, map_module_row, ser};
use super::{SqliteRepository, map_sqlx};
use crate::repository::{CatalogRepository, StorageError};

#[async_trait::async_trait]
impl CatalogRepository for SqliteRepository {
    async fn load_catalog(&self) -> Result<Catalog, StorageError> {
        let semester_rows = sqlx::query("SELECT label FROM semesters ORDER BY position ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        let mut semesters = Vec::with_capacity(semester_rows.len());
        for row in semester_rows {
            let raw: String = row.try_get("label").map_err(ser)?;
            semesters.push(SemesterLabel::new(raw).map_err(ser)?);
        }

        let module_rows = sqlx::query(
            r"
            SELECT id, semester, position, code, title, description, created_at
            FROM modules
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        let mut modules = Vec::with_capacity(module_rows.len());
        for row in module_rows {
            modules.push(map_module_row(&row)?);
        }

        let lesson_rows = sqlx::query("SELECT id, module_id, position, title FROM lessons")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        let mut lessons = Vec::with_capacity(lesson_rows.len());
        for row in lesson_rows {
            lessons.push(map_lesson_row(&row)?);
        }

        Catalog::new(semesters, modules, lessons).map_err(ser)
    }

    async fn upsert_semester(
        &self,
        label: &SemesterLabel,
        position: u32,
    ) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO semesters (label, position)
            VALUES (?1, ?2)
            ON CONFLICT(label) DO UPDATE SET position = excluded.position
            ",
        )
        .bind(label.as_str())
        .bind(i64::from(position))
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => Ok(()),
            // position is UNIQUE: another semester already sits there
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StorageError::Conflict)
            }
            Err(e) => Err(map_sqlx(e)),
        }
    }

    async fn upsert_module(&self, module: &Module) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO modules (id, semester, position, code, title, description, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                -- keep created_at from the original insert
                semester = excluded.semester,
                position = excluded.position,
                code = excluded.code,
                title = excluded.title,
                description = excluded.description
            ",
        )
        .bind(module.id().to_string())
        .bind(module.semester().as_str())
        .bind(i64::from(module.order()))
        .bind(module.code())
        .bind(module.title())
        .bind(module.description())
        .bind(module.created_at())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(())
    }

    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO lessons (id, module_id, position, title)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                module_id = excluded.module_id,
                position = excluded.position,
                title = excluded.title
            ",
        )
        .bind(lesson.id().to_string())
        .bind(lesson.module_id().to_string())
        .bind(i64::from(lesson.order()))
        .bind(lesson.title())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(())
    }
}
