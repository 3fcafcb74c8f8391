//! Database layer for feishu-export
//!
//! Handles SQLite persistence for export tasks and the nodes discovered for them.
//! Discovery and downloading communicate only through these tables, so the
//! whole process can be resumed from the database after a restart.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`tasks`] - Export task CRUD and aggregate counters
//! - [`nodes`] - Node tree: discovery obligations and leaf download state

use crate::error::{DatabaseError, Error};
use crate::provider::NodePayload;
use crate::types::{DiscoveredNode, FileStatus, NodeId, NodeKind, TaskId, TaskInfo, TaskStatus};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{FromRow, sqlite::SqlitePool};
use std::path::PathBuf;

mod migrations;
mod nodes;
mod tasks;

/// New export task to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewTask {
    /// Display name for this task
    pub name: String,
    /// Optional description
    pub description: Option<String>,
    /// Local directory the export tree is written into
    pub output_path: String,
    /// Initial status (see [`TaskStatus`])
    pub status: i32,
}

/// Export task record from database
#[derive(Debug, Clone, FromRow)]
pub struct Task {
    /// Unique database ID
    pub id: i64,
    /// Display name for this task
    pub name: String,
    /// Optional description
    pub description: Option<String>,
    /// Local directory the export tree is written into
    pub output_path: String,
    /// Current status (0=pending, 1=ready, 2=downloading, etc.)
    pub status: i32,
    /// Progress percentage (0.0-100.0)
    pub progress: f64,
    /// Leaves discovered so far
    pub total_files: i64,
    /// Leaves completed
    pub completed_files: i64,
    /// Leaves failed
    pub failed_files: i64,
    /// Unix timestamp when task was created
    pub created_at: i64,
    /// Unix timestamp of the last update
    pub updated_at: i64,
    /// Unix timestamp when task was last started
    pub started_at: Option<i64>,
    /// Unix timestamp when task reached a terminal status
    pub completed_at: Option<i64>,
}

impl Task {
    /// Typed status
    pub fn status(&self) -> TaskStatus {
        TaskStatus::from_i32(self.status)
    }
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

impl From<Task> for TaskInfo {
    fn from(row: Task) -> Self {
        TaskInfo {
            id: TaskId(row.id),
            status: TaskStatus::from_i32(row.status),
            name: row.name,
            description: row.description,
            output_path: PathBuf::from(row.output_path),
            progress: row.progress,
            total_files: row.total_files.max(0) as u64,
            completed_files: row.completed_files.max(0) as u64,
            failed_files: row.failed_files.max(0) as u64,
            created_at: timestamp(row.created_at),
            started_at: row.started_at.map(timestamp),
            completed_at: row.completed_at.map(timestamp),
        }
    }
}

/// New node to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewNode {
    /// Task this node belongs to
    pub task_id: TaskId,
    /// Container this node was discovered in (None for selected roots)
    pub parent_id: Option<NodeId>,
    /// Display name
    pub name: String,
    /// Ancestor directory names
    pub virtual_path: Vec<String>,
    /// Whether the node is a downloadable leaf
    pub is_leaf: bool,
    /// Provider identity of the node
    pub payload: NodePayload,
}

/// Node record from database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct NodeRow {
    /// Unique database ID
    pub id: i64,
    /// Task this node belongs to
    pub task_id: i64,
    /// Parent container ID
    pub parent_id: Option<i64>,
    /// Display name
    pub name: String,
    /// Ancestor directory names as a JSON array
    pub virtual_path: String,
    /// Node kind name
    pub kind: String,
    /// Whether the node is a downloadable leaf
    pub is_leaf: bool,
    /// Whether the container has been expanded
    pub is_expanded: bool,
    /// Leaf status code (NULL for containers)
    pub status: Option<i32>,
    /// Provider payload as JSON
    pub payload: String,
    /// Last error for this node
    pub error_message: Option<String>,
    /// Unix timestamp when node was created
    pub created_at: i64,
    /// Unix timestamp of the last update
    pub updated_at: i64,
}

/// Node of an export task
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Node ID
    pub id: NodeId,
    /// Task this node belongs to
    pub task_id: TaskId,
    /// Parent container ID
    pub parent_id: Option<NodeId>,
    /// Display name
    pub name: String,
    /// Ancestor directory names
    pub virtual_path: Vec<String>,
    /// Node kind
    pub kind: NodeKind,
    /// Whether the node is a downloadable leaf
    pub is_leaf: bool,
    /// Whether the container has been expanded (always true once set)
    pub is_expanded: bool,
    /// Leaf status (None for containers)
    pub status: Option<FileStatus>,
    /// Provider payload
    pub payload: NodePayload,
    /// Last error for this node
    pub error: Option<String>,
}

impl Node {
    /// Virtual path of this node's children
    pub fn child_path(&self) -> Vec<String> {
        let mut path = self.virtual_path.clone();
        if !self.payload.is_transparent() {
            path.push(self.name.clone());
        }
        path
    }
}

impl From<&Node> for DiscoveredNode {
    fn from(node: &Node) -> Self {
        DiscoveredNode {
            id: node.id,
            name: node.name.clone(),
            virtual_path: node.virtual_path.clone(),
            kind: node.kind,
            is_leaf: node.is_leaf,
        }
    }
}

impl TryFrom<NodeRow> for Node {
    type Error = Error;

    fn try_from(row: NodeRow) -> Result<Self, Self::Error> {
        let virtual_path: Vec<String> = serde_json::from_str(&row.virtual_path).map_err(|e| {
            Error::Database(DatabaseError::CorruptRecord(format!(
                "node {} has invalid virtual path: {}",
                row.id, e
            )))
        })?;
        let payload: NodePayload = serde_json::from_str(&row.payload).map_err(|e| {
            Error::Database(DatabaseError::CorruptRecord(format!(
                "node {} has invalid payload: {}",
                row.id, e
            )))
        })?;

        Ok(Node {
            id: NodeId(row.id),
            task_id: TaskId(row.task_id),
            parent_id: row.parent_id.map(NodeId),
            name: row.name,
            virtual_path,
            kind: payload.kind(),
            is_leaf: row.is_leaf,
            is_expanded: row.is_expanded,
            status: row.status.map(FileStatus::from_i32),
            payload,
            error: row.error_message,
        })
    }
}

/// Database handle for feishu-export
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
