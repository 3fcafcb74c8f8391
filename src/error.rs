//! Error types for feishu-export
//!
//! This module provides the error handling for the library:
//! - [`Error`], the top-level error returned by every public operation
//! - [`DatabaseError`] for task store failures
//! - [`TaskError`] for lifecycle operations rejected by the task state machine
//! - [`ProviderError`], the single normalized error of the remote content provider
//!
//! Every error has a stable machine-readable code via [`Error::error_code`].

use thiserror::Error;

/// Result type alias for feishu-export operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for feishu-export
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "batch_size")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Lifecycle operation rejected
    #[error("task error: {0}")]
    Task(#[from] TaskError),

    /// Remote content provider error
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Shutdown in progress - not accepting new runs
    #[error("shutdown in progress: not starting new tasks")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Stored value could not be decoded
    #[error("corrupt record: {0}")]
    CorruptRecord(String),
}

/// Errors returned by the task lifecycle controller
#[derive(Debug, Error)]
pub enum TaskError {
    /// Task not found in the store
    #[error("task {id} not found")]
    NotFound {
        /// The task ID that was not found
        id: i64,
    },

    /// Node not found, or not part of the given task
    #[error("node {node_id} not found in task {task_id}")]
    NodeNotFound {
        /// The task the node was looked up in
        task_id: i64,
        /// The node ID that was not found
        node_id: i64,
    },

    /// Task already has a running orchestrator
    #[error("task {id} is already running")]
    AlreadyActive {
        /// The task ID that is already active
        id: i64,
    },

    /// Task has no running orchestrator
    #[error("task {id} is not running")]
    NotActive {
        /// The task ID that is not active
        id: i64,
    },

    /// Cannot perform operation in current state
    #[error("cannot {operation} task {id} in state {current_state}")]
    InvalidState {
        /// The task ID that is in an invalid state for the operation
        id: i64,
        /// The operation that was attempted (e.g., "start", "resume", "retry")
        operation: String,
        /// The current state that prevents the operation (e.g., "completed")
        current_state: String,
    },

    /// Retry requested but no leaf has failed
    #[error("task {id} has no failed files to retry")]
    NoFailedFiles {
        /// The task ID without failed files
        id: i64,
    },
}

/// Normalized error of the remote content provider
///
/// Listing, export and download failures of any provider are mapped onto this
/// type, so the orchestrator never inspects transport-specific errors.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The remote API answered with a non-zero business code
    #[error("API error {code}: {message}")]
    Api {
        /// Business error code reported by the API
        code: i64,
        /// Error message reported by the API
        message: String,
    },

    /// Non-success HTTP status
    #[error("HTTP {status} from {url}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// Connection, timeout or other transport failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Response body could not be decoded
    #[error("malformed response: {0}")]
    Decode(String),

    /// The remote export job reported an error
    #[error("export job {ticket} failed: {message}")]
    ExportFailed {
        /// Export job ticket
        ticket: String,
        /// Error message reported by the export job
        message: String,
    },

    /// The remote export job did not finish within the polling budget
    #[error("export job {ticket} timed out after {attempts} polls")]
    ExportTimeout {
        /// Export job ticket
        ticket: String,
        /// Number of polls performed
        attempts: u32,
    },

    /// The resolved leaf cannot be fetched by this provider
    #[error("unsupported node: {0}")]
    Unsupported(String),

    /// Writing the downloaded bytes failed
    #[error("failed to write {path}: {message}")]
    Write {
        /// Destination path
        path: String,
        /// Underlying I/O error message
        message: String,
    },
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ProviderError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            ProviderError::Http {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            }
        } else {
            ProviderError::Transport(e.to_string())
        }
    }
}

impl Error {
    /// Get the machine-readable error code
    pub fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Database(_) => "database_error",
            Error::Sqlx(_) => "database_error",
            Error::Task(e) => match e {
                TaskError::NotFound { .. } => "task_not_found",
                TaskError::NodeNotFound { .. } => "node_not_found",
                TaskError::AlreadyActive { .. } => "already_active",
                TaskError::NotActive { .. } => "not_active",
                TaskError::InvalidState { .. } => "invalid_state",
                TaskError::NoFailedFiles { .. } => "no_failed_files",
            },
            Error::Provider(e) => match e {
                ProviderError::Api { .. } => "provider_api_error",
                ProviderError::Http { .. } => "provider_http_error",
                ProviderError::Transport(_) => "provider_transport_error",
                ProviderError::Decode(_) => "provider_decode_error",
                ProviderError::ExportFailed { .. } => "export_failed",
                ProviderError::ExportTimeout { .. } => "export_timeout",
                ProviderError::Unsupported(_) => "unsupported_node",
                ProviderError::Write { .. } => "write_failed",
            },
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::ShuttingDown => "shutting_down",
            Error::Other(_) => "internal_error",
        }
    }
}
