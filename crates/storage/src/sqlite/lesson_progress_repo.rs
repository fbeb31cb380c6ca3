use chrono::{DateTime, Utc};
use curriculum_core::model::{LessonId, LessonProgress, UserId};

use super::mapping::{map_lesson_progress_row, user_id_to_i64};
use super::{SqliteRepository, map_sqlx};
use crate::repository::{LessonProgressRepository, StorageError};

#[async_trait::async_trait]
impl LessonProgressRepository for SqliteRepository {
    async fn set_lesson_completed(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
        completed: bool,
        now: DateTime<Utc>,
    ) -> Result<LessonProgress, StorageError> {
        let uid = user_id_to_i64(user_id)?;
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        sqlx::query(
            r"
            INSERT INTO user_lesson_progress (user_id, lesson_id, completed, completed_at)
            VALUES (?1, ?2, 0, NULL)
            ON CONFLICT(user_id, lesson_id) DO NOTHING
            ",
        )
        .bind(uid)
        .bind(lesson_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        let row = sqlx::query(
            r"
            SELECT user_id, lesson_id, completed, completed_at
            FROM user_lesson_progress
            WHERE user_id = ?1 AND lesson_id = ?2
            ",
        )
        .bind(uid)
        .bind(lesson_id.to_string())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        let mut record = map_lesson_progress_row(&row)?;
        record.set_completed(completed, now);

        sqlx::query(
            r"
            UPDATE user_lesson_progress SET completed = ?3, completed_at = ?4
            WHERE user_id = ?1 AND lesson_id = ?2
            ",
        )
        .bind(uid)
        .bind(lesson_id.to_string())
        .bind(record.completed())
        .bind(record.completed_at())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;
        Ok(record)
    }

    async fn list_lesson_progress(
        &self,
        user_id: UserId,
    ) -> Result<Vec<LessonProgress>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT user_id, lesson_id, completed, completed_at
            FROM user_lesson_progress
            WHERE user_id = ?1
            ",
        )
        .bind(user_id_to_i64(user_id)?)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_lesson_progress_row(&row)?);
        }
        Ok(out)
    }
}
