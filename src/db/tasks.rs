//! Export task CRUD operations.

use crate::error::DatabaseError;
use crate::types::{LeafCounts, TaskId, TaskStatus};
use crate::{Error, Result};

use super::{Database, NewTask, Task};

const TASK_COLUMNS: &str = r#"
    id, name, description, output_path, status, progress,
    total_files, completed_files, failed_files,
    created_at, updated_at, started_at, completed_at
"#;

impl Database {
    /// Insert a new export task
    pub async fn insert_task(&self, task: &NewTask) -> Result<TaskId> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO export_tasks (
                name, description, output_path, status, progress,
                total_files, completed_files, failed_files,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, 0.0, 0, 0, 0, ?, ?)
            "#,
        )
        .bind(&task.name)
        .bind(&task.description)
        .bind(&task.output_path)
        .bind(task.status)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert task: {}",
                e
            )))
        })?;

        Ok(TaskId(result.last_insert_rowid()))
    }

    /// Get a task by ID
    pub async fn get_task(&self, id: TaskId) -> Result<Option<Task>> {
        let row = sqlx::query_as::<_, Task>(&format!(
            "SELECT {} FROM export_tasks WHERE id = ?",
            TASK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get task: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// List all tasks, newest first
    pub async fn list_tasks(&self) -> Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, Task>(&format!(
            "SELECT {} FROM export_tasks ORDER BY created_at DESC, id DESC",
            TASK_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list tasks: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// List tasks whose status is one of `statuses`, oldest first
    pub async fn list_tasks_by_status(&self, statuses: &[TaskStatus]) -> Result<Vec<Task>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let mut query_builder = sqlx::QueryBuilder::new(format!(
            "SELECT {} FROM export_tasks WHERE status IN (",
            TASK_COLUMNS
        ));
        let mut separated = query_builder.separated(", ");
        for status in statuses {
            separated.push_bind(status.to_i32());
        }
        separated.push_unseparated(") ORDER BY created_at ASC, id ASC");

        let rows = query_builder
            .build_query_as::<Task>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to list tasks by status: {}",
                    e
                )))
            })?;

        Ok(rows)
    }

    /// Update task status
    pub async fn update_task_status(&self, id: TaskId, status: TaskStatus) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query("UPDATE export_tasks SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.to_i32())
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to update task status: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Update the display name and/or description of a task
    ///
    /// `None` leaves the field unchanged. Returns false if the task doesn't exist.
    pub async fn update_task_details(
        &self,
        id: TaskId,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            UPDATE export_tasks
            SET name = COALESCE(?, name),
                description = COALESCE(?, description),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(name)
        .bind(description)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update task details: {}",
                e
            )))
        })?;

        Ok(result.rows_affected() > 0)
    }

    /// Update task progress and the cached leaf counters
    pub async fn update_task_progress(
        &self,
        id: TaskId,
        progress: f64,
        counts: &LeafCounts,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            UPDATE export_tasks
            SET progress = ?, total_files = ?, completed_files = ?, failed_files = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(progress)
        .bind(counts.total() as i64)
        .bind(counts.completed as i64)
        .bind(counts.failed as i64)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update task progress: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Record that a task was (re)started
    pub async fn set_task_started(&self, id: TaskId) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            "UPDATE export_tasks SET started_at = ?, completed_at = NULL, updated_at = ? WHERE id = ?",
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to set task started: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Record that a task reached a terminal status
    pub async fn set_task_completed(&self, id: TaskId) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query("UPDATE export_tasks SET completed_at = ?, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to set task completed: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Delete a task; its nodes are removed by the foreign key cascade
    ///
    /// Returns false when the task did not exist.
    pub async fn delete_task(&self, id: TaskId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM export_tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete task: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }
}
