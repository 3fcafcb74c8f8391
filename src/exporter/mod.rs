//! Export orchestrator split into focused submodules.
//!
//! The `Exporter` struct and its methods are organized by domain:
//! - [`control`] - Task creation, start/stop/resume/delete and retries
//! - [`discovery`] - Breadth-wise expansion of container nodes
//! - [`scheduler`] - Draining pending leaves through export and download
//! - [`progress`] - Aggregate progress and task finalization
//! - [`lifecycle`] - Startup resume and graceful shutdown
//! - [`registry`] - Active runs and their cancellation tokens
//!
//! Discovery and the scheduler of one task run concurrently and communicate
//! only through the database, so a run can be stopped at any point and picked
//! up again later, even by another process.

mod control;
mod discovery;
mod lifecycle;
mod progress;
mod registry;
mod scheduler;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::provider::{ContentProvider, FeishuProvider};
use crate::types::Event;
use registry::TaskRegistry;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Main exporter instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct Exporter {
    /// Database instance for persistence (wrapped in Arc for sharing across tasks)
    /// Public for integration tests to inspect task and node state
    pub db: Arc<Database>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Remote content provider shared by discovery and the scheduler
    pub(crate) provider: Arc<dyn ContentProvider>,
    /// Runs currently in progress
    pub(crate) registry: TaskRegistry,
    /// Serializes progress updates, finalization and stop
    pub(crate) state_lock: Arc<tokio::sync::Mutex<()>>,
    /// Cleared during shutdown; no new runs are started afterwards
    pub(crate) accepting_new: Arc<AtomicBool>,
}

impl Exporter {
    /// Create a new Exporter backed by the given content provider
    ///
    /// This initializes all core components:
    /// - Validates the configuration
    /// - Opens/creates the SQLite database and runs migrations
    /// - Puts leaves interrupted by a crash back to pending
    /// - Sets up the event broadcast channel
    /// - Resumes unfinished tasks when `auto_resume` is enabled
    pub async fn new(config: Config, provider: Arc<dyn ContentProvider>) -> Result<Self> {
        config.validate()?;

        let db = Database::new(&config.persistence.database_path).await?;

        // Nothing is running yet, so every downloading leaf was interrupted
        let interrupted = db.reset_interrupted_leaves().await?;
        if interrupted > 0 {
            tracing::info!(interrupted, "Reset leaves interrupted by an unclean shutdown");
        }

        // Create broadcast channel with buffer size of 1000 events
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        let exporter = Self {
            db: Arc::new(db),
            event_tx,
            config: Arc::new(config),
            provider,
            registry: TaskRegistry::new(),
            state_lock: Arc::new(tokio::sync::Mutex::new(())),
            accepting_new: Arc::new(AtomicBool::new(true)),
        };

        if exporter.config.export.auto_resume {
            let resumed = exporter.resume_interrupted().await?;
            if !resumed.is_empty() {
                tracing::info!(count = resumed.len(), "Resumed unfinished export tasks");
            }
        }

        Ok(exporter)
    }

    /// Create a new Exporter talking to the Feishu open API
    ///
    /// The provider is built from `config.provider`.
    pub async fn with_feishu(config: Config) -> Result<Self> {
        let provider = FeishuProvider::new(&config.provider)?;
        Self::new(config, Arc::new(provider)).await
    }

    /// Subscribe to export events
    ///
    /// Returns a receiver that gets every event emitted after this call.
    /// Each subscriber receives events independently; a slow subscriber only
    /// lags itself.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use feishu_export::*;
    /// # async fn example(exporter: Exporter) {
    /// let mut events = exporter.subscribe();
    /// while let Ok(event) = events.recv().await {
    ///     if let Event::DownloadProgress { task_id, progress, .. } = event {
    ///         println!("task {}: {:.1}%", task_id, progress);
    ///     }
    /// }
    /// # }
    /// ```
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Sending with no subscribers is not an error.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Sleep for `delay` unless the token fires first
    ///
    /// Returns false if the run was cancelled.
    pub(crate) async fn wait_or_cancel(token: &CancellationToken, delay: Duration) -> bool {
        tokio::select! {
            _ = token.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
