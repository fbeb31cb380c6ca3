use chrono::{DateTime, Utc};
use curriculum_core::model::{ModuleId, ProgressMutation, UserId, UserProgress};
use sqlx::{Sqlite, Transaction};

use super::mapping::{map_progress_row, user_id_to_i64};
use super::{SqliteRepository, map_sqlx};
use crate::repository::{AppliedMutation, ProgressRepository, StorageError};

const PROGRESS_COLUMNS: &str = r"
    user_id, module_id, is_module_unlocked, is_module_completed, progress_percentage,
    last_accessed, started_at, completed_at
";

/// Insert `record` unless a row for its key exists. Returns true if inserted.
///
/// Being a write, this also takes the database write lock for the rest of the
/// transaction, so the read that follows cannot race another writer.
async fn insert_if_absent(
    tx: &mut Transaction<'_, Sqlite>,
    record: &UserProgress,
) -> Result<bool, StorageError> {
    let res = sqlx::query(
        r"
        INSERT INTO user_progress (
            user_id, module_id, is_module_unlocked, is_module_completed, progress_percentage,
            last_accessed, started_at, completed_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(user_id, module_id) DO NOTHING
        ",
    )
    .bind(user_id_to_i64(record.user_id())?)
    .bind(record.module_id().to_string())
    .bind(record.is_module_unlocked())
    .bind(record.is_module_completed())
    .bind(i64::from(record.progress_percentage().value()))
    .bind(record.last_accessed())
    .bind(record.started_at())
    .bind(record.completed_at())
    .execute(&mut **tx)
    .await
    .map_err(map_sqlx)?;

    Ok(res.rows_affected() == 1)
}

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn get_progress(
        &self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> Result<Option<UserProgress>, StorageError> {
        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM user_progress WHERE user_id = ?1 AND module_id = ?2"
        );
        let row = sqlx::query(&sql)
            .bind(user_id_to_i64(user_id)?)
            .bind(module_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;

        row.as_ref().map(map_progress_row).transpose()
    }

    async fn list_user_progress(&self, user_id: UserId) -> Result<Vec<UserProgress>, StorageError> {
        let sql = format!("SELECT {PROGRESS_COLUMNS} FROM user_progress WHERE user_id = ?1");
        let rows = sqlx::query(&sql)
            .bind(user_id_to_i64(user_id)?)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_progress_row(&row)?);
        }
        Ok(out)
    }

    async fn list_progress_for_modules(
        &self,
        user_id: UserId,
        module_ids: &[ModuleId],
    ) -> Result<Vec<UserProgress>, StorageError> {
        if module_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM user_progress WHERE user_id = ?1 AND module_id IN ("
        );
        for i in 0..module_ids.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push('?');
            sql.push_str(&(i + 2).to_string());
        }
        sql.push(')');

        let mut q = sqlx::query(&sql).bind(user_id_to_i64(user_id)?);
        for id in module_ids {
            q = q.bind(id.to_string());
        }

        let rows = q.fetch_all(&self.pool).await.map_err(map_sqlx)?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_progress_row(&row)?);
        }
        Ok(out)
    }

    async fn apply_mutation(
        &self,
        user_id: UserId,
        module_id: ModuleId,
        mutation: ProgressMutation,
        now: DateTime<Utc>,
    ) -> Result<AppliedMutation, StorageError> {
        let uid = user_id_to_i64(user_id)?;
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let created =
            insert_if_absent(&mut tx, &UserProgress::first_touch(user_id, module_id, now)).await?;

        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM user_progress WHERE user_id = ?1 AND module_id = ?2"
        );
        let row = sqlx::query(&sql)
            .bind(uid)
            .bind(module_id.to_string())
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        let current = map_progress_row(&row)?;

        let (progress, mut effect) =
            UserProgress::apply(Some(current), user_id, module_id, mutation, now);
        if created {
            effect.created = true;
            effect.unlocked = true;
        }

        sqlx::query(
            r"
            UPDATE user_progress SET
                is_module_unlocked = ?3,
                is_module_completed = ?4,
                progress_percentage = ?5,
                last_accessed = ?6,
                completed_at = ?7
            WHERE user_id = ?1 AND module_id = ?2
            ",
        )
        .bind(uid)
        .bind(module_id.to_string())
        .bind(progress.is_module_unlocked())
        .bind(progress.is_module_completed())
        .bind(i64::from(progress.progress_percentage().value()))
        .bind(progress.last_accessed())
        .bind(progress.completed_at())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;
        Ok(AppliedMutation { progress, effect })
    }

    async fn unlock_modules(
        &self,
        user_id: UserId,
        module_ids: &[ModuleId],
        now: DateTime<Utc>,
    ) -> Result<Vec<ModuleId>, StorageError> {
        if module_ids.is_empty() {
            return Ok(Vec::new());
        }

        let uid = user_id_to_i64(user_id)?;
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        let mut changed = Vec::new();

        for module_id in module_ids {
            let record = UserProgress::cascaded(user_id, *module_id, now);
            if insert_if_absent(&mut tx, &record).await? {
                changed.push(*module_id);
                continue;
            }

            let res = sqlx::query(
                r"
                UPDATE user_progress SET is_module_unlocked = 1
                WHERE user_id = ?1 AND module_id = ?2 AND is_module_unlocked = 0
                ",
            )
            .bind(uid)
            .bind(module_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
            if res.rows_affected() == 1 {
                changed.push(*module_id);
            }
        }

        tx.commit().await.map_err(map_sqlx)?;
        Ok(changed)
    }
}
