//! Core types for feishu-export

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::provider::NodePayload;

// Integer-backed identifiers share conversions and sqlx support with i64
macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Get the inner i64 value
            pub fn get(&self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }

        impl sqlx::Type<sqlx::Sqlite> for $name {
            fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
                <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
            }

            fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
                <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
            ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
                sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for $name {
            fn decode(
                value: sqlx::sqlite::SqliteValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
                Ok(Self(id))
            }
        }
    };
}

id_newtype!(
    /// Unique identifier for an export task
    TaskId
);

id_newtype!(
    /// Unique identifier for a node of an export task
    NodeId
);

/// Export task status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created, never started
    Pending,
    /// Prepared and waiting to start
    Ready,
    /// Discovery and downloads running (or interrupted by a crash)
    Downloading,
    /// Stopped by the user
    Paused,
    /// Every file exported successfully
    Completed,
    /// Finished with at least one failed file
    Failed,
    /// Deleted by the user
    Cancelled,
}

impl TaskStatus {
    /// Convert integer status code to TaskStatus enum
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => TaskStatus::Pending,
            1 => TaskStatus::Ready,
            2 => TaskStatus::Downloading,
            3 => TaskStatus::Paused,
            4 => TaskStatus::Completed,
            5 => TaskStatus::Failed,
            6 => TaskStatus::Cancelled,
            _ => TaskStatus::Failed, // Default to Failed for unknown status
        }
    }

    /// Convert TaskStatus enum to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Ready => 1,
            TaskStatus::Downloading => 2,
            TaskStatus::Paused => 3,
            TaskStatus::Completed => 4,
            TaskStatus::Failed => 5,
            TaskStatus::Cancelled => 6,
        }
    }

    /// Lowercase name, as used in events and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Ready => "ready",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Statuses a restarted process resumes automatically
    pub fn resumable_on_startup() -> [TaskStatus; 3] {
        [
            TaskStatus::Downloading,
            TaskStatus::Pending,
            TaskStatus::Ready,
        ]
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single leaf (file) node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// Waiting to be downloaded
    Pending,
    /// Download in progress (or interrupted by a crash)
    Downloading,
    /// Written to the output directory
    Completed,
    /// Download or export failed
    Failed,
}

impl FileStatus {
    /// Convert integer status code to FileStatus enum
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => FileStatus::Pending,
            1 => FileStatus::Downloading,
            2 => FileStatus::Completed,
            3 => FileStatus::Failed,
            _ => FileStatus::Failed,
        }
    }

    /// Convert FileStatus enum to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            FileStatus::Pending => 0,
            FileStatus::Downloading => 1,
            FileStatus::Completed => 2,
            FileStatus::Failed => 3,
        }
    }
}

/// Kind of node in the remote hierarchy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// The user's drive root ("My Space")
    DriveRoot,
    /// Drive folder
    Folder,
    /// Virtual root listing all wiki spaces
    WikiRoot,
    /// Wiki space
    WikiSpace,
    /// Wiki page
    WikiNode,
    /// Drive file or document
    File,
}

impl NodeKind {
    /// Stable name used for persistence
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::DriveRoot => "drive_root",
            NodeKind::Folder => "folder",
            NodeKind::WikiRoot => "wiki_root",
            NodeKind::WikiSpace => "wiki_space",
            NodeKind::WikiNode => "wiki_node",
            NodeKind::File => "file",
        }
    }
}

/// A node selected by the user as the root of an export
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SelectedNode {
    /// Display name; becomes a directory or file name in the output tree
    pub name: String,
    /// Provider payload identifying the remote node
    pub payload: NodePayload,
}

/// Request to create a new export task
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportRequest {
    /// Task display name
    pub name: String,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
    /// Local directory the export tree is written into
    pub output_path: PathBuf,
    /// Selected roots
    pub roots: Vec<SelectedNode>,
}

/// Summary of a node reported in [`Event::NodesDiscovered`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredNode {
    /// Node ID
    pub id: NodeId,
    /// Node name
    pub name: String,
    /// Ancestor directory names
    pub virtual_path: Vec<String>,
    /// Node kind
    pub kind: NodeKind,
    /// Whether the node is a downloadable leaf
    pub is_leaf: bool,
}

/// Information about an export task
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskInfo {
    /// Task ID
    pub id: TaskId,
    /// Task name
    pub name: String,
    /// Optional description
    pub description: Option<String>,
    /// Output root directory
    pub output_path: PathBuf,
    /// Current status
    pub status: TaskStatus,
    /// Progress percentage (0.0 to 100.0)
    pub progress: f64,
    /// Number of leaves discovered so far
    pub total_files: u64,
    /// Number of leaves completed
    pub completed_files: u64,
    /// Number of leaves failed
    pub failed_files: u64,
    /// When the task was created
    pub created_at: DateTime<Utc>,
    /// When the task was last started
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal status
    pub completed_at: Option<DateTime<Utc>>,
}

/// Leaf status counts of one task
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafCounts {
    /// Leaves waiting to be downloaded
    pub pending: u64,
    /// Leaves currently downloading
    pub downloading: u64,
    /// Leaves completed
    pub completed: u64,
    /// Leaves failed
    pub failed: u64,
}

impl LeafCounts {
    /// Total number of leaves
    pub fn total(&self) -> u64 {
        self.pending + self.downloading + self.completed + self.failed
    }

    /// Leaves in a terminal status
    pub fn finished(&self) -> u64 {
        self.completed + self.failed
    }

    /// Finished share of all leaves as a percentage (0 when there are no leaves)
    pub fn percent(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.finished() as f64 / total as f64 * 100.0
        }
    }
}

/// Event emitted during the export lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// New nodes were inserted by tree discovery
    NodesDiscovered {
        /// Task ID
        task_id: TaskId,
        /// Newly inserted nodes
        nodes: Vec<DiscoveredNode>,
    },

    /// A leaf changed status
    FileStatusChanged {
        /// Task ID
        task_id: TaskId,
        /// Node ID
        node_id: NodeId,
        /// Node name
        name: String,
        /// New status
        status: FileStatus,
        /// Error message when the status is failed
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Aggregate task progress
    DownloadProgress {
        /// Task ID
        task_id: TaskId,
        /// Progress percentage (0.0 to 100.0)
        progress: f64,
        /// Completed leaves
        completed_files: u64,
        /// Failed leaves
        failed_files: u64,
        /// Leaves discovered so far
        total_files: u64,
    },

    /// Task orchestration started
    TaskStarted {
        /// Task ID
        task_id: TaskId,
    },

    /// Task stopped by the user
    TaskPaused {
        /// Task ID
        task_id: TaskId,
    },

    /// Task reached a terminal status
    TaskTerminal {
        /// Task ID
        task_id: TaskId,
        /// Terminal status (completed, failed or cancelled)
        status: TaskStatus,
    },

    /// Task and its nodes were deleted
    TaskRemoved {
        /// Task ID
        task_id: TaskId,
    },

    /// Exporter is shutting down
    Shutdown,
}
