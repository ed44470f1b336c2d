//! The real `StateStore` backend: one row per task in Postgres (spec §6).
//! `update` is the single transactional entry point — it locks the row with
//! `SELECT ... FOR UPDATE`, validates the transition, writes the patch, and
//! sets `completed_at` iff the new status is terminal (spec §4.6). Plain
//! `sqlx::query`/`Row::get`, not the `query_as!` compile-time macro, the way
//! `gglib-db`'s repositories do it — no `DATABASE_URL` needed at build time.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::capability::{StateStore, TaskPatch};
use crate::domain::{Task, TaskStatus};

#[derive(Debug, Clone)]
pub struct PostgresStateStore {
    pool: PgPool,
}

impl PostgresStateStore {
    pub fn new(pool: PgPool) -> Self {
        PostgresStateStore { pool }
    }

    /// Creates the `tasks` table if it doesn't exist yet. Called once at
    /// process start by each binary, the way `SqliteSettingsRepository::ensure_table`
    /// does for its own schema.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                task_id UUID PRIMARY KEY,
                s3_source_url TEXT NOT NULL,
                s3_dest_bucket TEXT NOT NULL,
                s3_dest_key TEXT NOT NULL,
                target_language TEXT NOT NULL,
                translate_style TEXT NOT NULL,
                status TEXT NOT NULL,
                progress DOUBLE PRECISION NOT NULL,
                total_files INTEGER NOT NULL,
                processed_files INTEGER NOT NULL,
                error_message TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                completed_at TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("creating tasks table")?;
        sqlx::query("CREATE INDEX IF NOT EXISTS tasks_created_at_idx ON tasks (created_at DESC)")
            .execute(&self.pool)
            .await
            .context("creating tasks created_at index")?;
        Ok(())
    }
}

fn row_to_task(row: &sqlx::postgres::PgRow) -> Result<Task> {
    let status_str: String = row.try_get("status")?;
    let status = match status_str.as_str() {
        "PENDING" => TaskStatus::Pending,
        "PREPARING" => TaskStatus::Preparing,
        "TRANSLATING" => TaskStatus::Translating,
        "FINALIZING" => TaskStatus::Finalizing,
        "COMPLETED" => TaskStatus::Completed,
        "FAILED" => TaskStatus::Failed,
        other => anyhow::bail!("unrecognized task status in row: {other}"),
    };
    Ok(Task {
        task_id: row.try_get("task_id")?,
        s3_source_url: row.try_get("s3_source_url")?,
        s3_dest_bucket: row.try_get("s3_dest_bucket")?,
        s3_dest_key: row.try_get("s3_dest_key")?,
        target_language: row.try_get("target_language")?,
        translate_style: row.try_get("translate_style")?,
        status,
        progress: row.try_get("progress")?,
        total_files: row.try_get("total_files")?,
        processed_files: row.try_get("processed_files")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

fn status_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "PENDING",
        TaskStatus::Preparing => "PREPARING",
        TaskStatus::Translating => "TRANSLATING",
        TaskStatus::Finalizing => "FINALIZING",
        TaskStatus::Completed => "COMPLETED",
        TaskStatus::Failed => "FAILED",
    }
}

#[async_trait]
impl StateStore for PostgresStateStore {
    async fn create(&self, task: Task) -> Result<()> {
        // Idempotent on primary key (spec §4.6) to tolerate submission retries.
        sqlx::query(
            r#"
            INSERT INTO tasks (
                task_id, s3_source_url, s3_dest_bucket, s3_dest_key, target_language,
                translate_style, status, progress, total_files, processed_files,
                error_message, created_at, updated_at, completed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (task_id) DO NOTHING
            "#,
        )
        .bind(task.task_id)
        .bind(&task.s3_source_url)
        .bind(&task.s3_dest_bucket)
        .bind(&task.s3_dest_key)
        .bind(&task.target_language)
        .bind(&task.translate_style)
        .bind(status_str(task.status))
        .bind(task.progress)
        .bind(task.total_files)
        .bind(task.processed_files)
        .bind(&task.error_message)
        .bind(task.created_at)
        .bind(task.updated_at)
        .bind(task.completed_at)
        .execute(&self.pool)
        .await
        .context("inserting task row")?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Task>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE task_id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("fetching task row")?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Task>> {
        let rows = sqlx::query("SELECT * FROM tasks ORDER BY created_at DESC LIMIT $1 OFFSET $2")
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .context("listing task rows")?;
        rows.iter().map(row_to_task).collect()
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM tasks WHERE task_id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("deleting task row")?;
        Ok(())
    }

    async fn update(&self, id: Uuid, to: TaskStatus, patch: TaskPatch) -> Result<Task> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("starting state-store transaction")?;

        let row = sqlx::query("SELECT * FROM tasks WHERE task_id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .context("locking task row")?
            .with_context(|| format!("unknown task: {id}"))?;
        let current = row_to_task(&row)?;
        current.status.validate_transition(to)?;

        let now = Utc::now();
        let progress = patch.progress.unwrap_or(current.progress);
        let total_files = patch.total_files.unwrap_or(current.total_files);
        let processed_files = patch.processed_files.unwrap_or(current.processed_files);
        let error_message = match patch.error_message {
            Some(inner) => inner,
            None => current.error_message.clone(),
        };
        let completed_at = if to.is_terminal() {
            Some(now)
        } else if to == TaskStatus::Pending {
            // Explicit retry transition (FAILED -> PENDING) clears it.
            None
        } else {
            current.completed_at
        };

        sqlx::query(
            r#"
            UPDATE tasks SET
                status = $1, progress = $2, total_files = $3, processed_files = $4,
                error_message = $5, updated_at = $6, completed_at = $7
            WHERE task_id = $8
            "#,
        )
        .bind(status_str(to))
        .bind(progress)
        .bind(total_files)
        .bind(processed_files)
        .bind(&error_message)
        .bind(now)
        .bind(completed_at)
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("updating task row")?;

        tx.commit().await.context("committing state-store transaction")?;

        Ok(Task {
            status: to,
            progress,
            total_files,
            processed_files,
            error_message,
            updated_at: now,
            completed_at,
            ..current
        })
    }
}
