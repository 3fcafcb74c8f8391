//! Node tree operations: discovery obligations and leaf download state.
//!
//! A container with `is_expanded = 0` still has to be listed by discovery; a
//! leaf with status pending or downloading still has to be fetched by the
//! scheduler. Nothing here ever clears `is_expanded`.

use crate::error::DatabaseError;
use crate::types::{FileStatus, LeafCounts, NodeId, TaskId};
use crate::{Error, Result};

use super::{Database, NewNode, Node, NodeRow};

const NODE_COLUMNS: &str = r#"
    id, task_id, parent_id, name, virtual_path, kind, is_leaf, is_expanded,
    status, payload, error_message, created_at, updated_at
"#;

fn encode_path(virtual_path: &[String]) -> Result<String> {
    Ok(serde_json::to_string(virtual_path)?)
}

fn decode_rows(rows: Vec<NodeRow>) -> Result<Vec<Node>> {
    rows.into_iter().map(Node::try_from).collect()
}

impl Database {
    /// Insert nodes, skipping any whose (task, virtual path, name) already exists
    ///
    /// Runs in one transaction. Returns the rows actually inserted, in input
    /// order.
    pub async fn insert_nodes(&self, nodes: &[NewNode]) -> Result<Vec<Node>> {
        if nodes.is_empty() {
            return Ok(Vec::new());
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;

        let mut inserted = Vec::with_capacity(nodes.len());
        for node in nodes {
            let status = node.is_leaf.then(|| FileStatus::Pending.to_i32());
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO export_nodes (
                    task_id, parent_id, name, virtual_path, kind, is_leaf, is_expanded,
                    status, payload, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?)
                "#,
            )
            .bind(node.task_id)
            .bind(node.parent_id)
            .bind(&node.name)
            .bind(encode_path(&node.virtual_path)?)
            .bind(node.payload.kind().as_str())
            .bind(node.is_leaf)
            .bind(status)
            .bind(serde_json::to_string(&node.payload)?)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to insert node: {}",
                    e
                )))
            })?;

            if result.rows_affected() > 0 {
                inserted.push(Node {
                    id: NodeId(result.last_insert_rowid()),
                    task_id: node.task_id,
                    parent_id: node.parent_id,
                    name: node.name.clone(),
                    virtual_path: node.virtual_path.clone(),
                    kind: node.payload.kind(),
                    is_leaf: node.is_leaf,
                    is_expanded: false,
                    status: node.is_leaf.then_some(FileStatus::Pending),
                    payload: node.payload.clone(),
                    error: None,
                });
            }
        }

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit node insert: {}",
                e
            )))
        })?;

        Ok(inserted)
    }

    /// Check whether a node with this (virtual path, name) exists in the task
    pub async fn node_exists(
        &self,
        task_id: TaskId,
        virtual_path: &[String],
        name: &str,
    ) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM export_nodes WHERE task_id = ? AND virtual_path = ? AND name = ?",
        )
        .bind(task_id)
        .bind(encode_path(virtual_path)?)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to check node existence: {}",
                e
            )))
        })?;

        Ok(count > 0)
    }

    /// Get a node by ID
    pub async fn get_node(&self, id: NodeId) -> Result<Option<Node>> {
        let row = sqlx::query_as::<_, NodeRow>(&format!(
            "SELECT {} FROM export_nodes WHERE id = ?",
            NODE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get node: {}",
                e
            )))
        })?;

        row.map(Node::try_from).transpose()
    }

    /// List every node of a task in insertion order
    pub async fn list_nodes(&self, task_id: TaskId) -> Result<Vec<Node>> {
        let rows = sqlx::query_as::<_, NodeRow>(&format!(
            "SELECT {} FROM export_nodes WHERE task_id = ? ORDER BY id ASC",
            NODE_COLUMNS
        ))
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list nodes: {}",
                e
            )))
        })?;

        decode_rows(rows)
    }

    /// Containers of a task that discovery has not expanded yet
    pub async fn get_unexpanded_containers(&self, task_id: TaskId) -> Result<Vec<Node>> {
        let rows = sqlx::query_as::<_, NodeRow>(&format!(
            "SELECT {} FROM export_nodes WHERE task_id = ? AND is_leaf = 0 AND is_expanded = 0 ORDER BY id ASC",
            NODE_COLUMNS
        ))
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get unexpanded containers: {}",
                e
            )))
        })?;

        decode_rows(rows)
    }

    /// Number of containers of a task that discovery has not expanded yet
    pub async fn count_unexpanded_containers(&self, task_id: TaskId) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM export_nodes WHERE task_id = ? AND is_leaf = 0 AND is_expanded = 0",
        )
        .bind(task_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to count unexpanded containers: {}",
                e
            )))
        })?;

        Ok(count.max(0) as u64)
    }

    /// Mark the container identified by (task, virtual path, name) as expanded
    pub async fn mark_container_expanded(
        &self,
        task_id: TaskId,
        virtual_path: &[String],
        name: &str,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            UPDATE export_nodes
            SET is_expanded = 1, updated_at = ?
            WHERE task_id = ? AND virtual_path = ? AND name = ? AND is_leaf = 0
            "#,
        )
        .bind(now)
        .bind(task_id)
        .bind(encode_path(virtual_path)?)
        .bind(name)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to mark container expanded: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Record (or clear) the last error of a node
    pub async fn set_node_error(&self, id: NodeId, error: Option<&str>) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query("UPDATE export_nodes SET error_message = ?, updated_at = ? WHERE id = ?")
            .bind(error)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to set node error: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Leaves still to be fetched: pending, plus downloading ones left over by a crash
    pub async fn get_pending_leaves(&self, task_id: TaskId, limit: usize) -> Result<Vec<Node>> {
        let rows = sqlx::query_as::<_, NodeRow>(&format!(
            "SELECT {} FROM export_nodes WHERE task_id = ? AND is_leaf = 1 AND status IN (?, ?) ORDER BY id ASC LIMIT ?",
            NODE_COLUMNS
        ))
        .bind(task_id)
        .bind(FileStatus::Pending.to_i32())
        .bind(FileStatus::Downloading.to_i32())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get pending leaves: {}",
                e
            )))
        })?;

        decode_rows(rows)
    }

    /// Set the status of a leaf; the error message is replaced by `error`
    pub async fn update_leaf_status(
        &self,
        id: NodeId,
        status: FileStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            UPDATE export_nodes
            SET status = ?, error_message = ?, updated_at = ?
            WHERE id = ? AND is_leaf = 1
            "#,
        )
        .bind(status.to_i32())
        .bind(error)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update leaf status: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Count the leaves of a task per status
    pub async fn count_leaves_by_status(&self, task_id: TaskId) -> Result<LeafCounts> {
        let rows: Vec<(Option<i32>, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM export_nodes WHERE task_id = ? AND is_leaf = 1 GROUP BY status",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to count leaves by status: {}",
                e
            )))
        })?;

        let mut counts = LeafCounts::default();
        for (status, count) in rows {
            let count = count.max(0) as u64;
            match status.map(FileStatus::from_i32) {
                Some(FileStatus::Pending) | None => counts.pending += count,
                Some(FileStatus::Downloading) => counts.downloading += count,
                Some(FileStatus::Completed) => counts.completed += count,
                Some(FileStatus::Failed) => counts.failed += count,
            }
        }

        Ok(counts)
    }

    /// Total number of leaves of a task
    pub async fn count_leaves(&self, task_id: TaskId) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM export_nodes WHERE task_id = ? AND is_leaf = 1")
                .bind(task_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to count leaves: {}",
                        e
                    )))
                })?;

        Ok(count.max(0) as u64)
    }

    /// Reset every failed leaf of a task to pending and clear its error
    ///
    /// Returns the nodes that were reset.
    pub async fn reset_failed_leaves(&self, task_id: TaskId) -> Result<Vec<Node>> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;

        let rows = sqlx::query_as::<_, NodeRow>(&format!(
            "SELECT {} FROM export_nodes WHERE task_id = ? AND is_leaf = 1 AND status = ? ORDER BY id ASC",
            NODE_COLUMNS
        ))
        .bind(task_id)
        .bind(FileStatus::Failed.to_i32())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get failed leaves: {}",
                e
            )))
        })?;

        sqlx::query(
            r#"
            UPDATE export_nodes
            SET status = ?, error_message = NULL, updated_at = ?
            WHERE task_id = ? AND is_leaf = 1 AND status = ?
            "#,
        )
        .bind(FileStatus::Pending.to_i32())
        .bind(now)
        .bind(task_id)
        .bind(FileStatus::Failed.to_i32())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to reset failed leaves: {}",
                e
            )))
        })?;

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit leaf reset: {}",
                e
            )))
        })?;

        let mut nodes = decode_rows(rows)?;
        for node in &mut nodes {
            node.status = Some(FileStatus::Pending);
            node.error = None;
        }
        Ok(nodes)
    }

    /// Put leaves interrupted mid-download back to pending
    ///
    /// Returns the number of leaves reset.
    pub async fn reset_interrupted_leaves(&self) -> Result<u64> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            "UPDATE export_nodes SET status = ?, updated_at = ? WHERE is_leaf = 1 AND status = ?",
        )
        .bind(FileStatus::Pending.to_i32())
        .bind(now)
        .bind(FileStatus::Downloading.to_i32())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to reset interrupted leaves: {}",
                e
            )))
        })?;

        Ok(result.rows_affected())
    }
}
