//! Startup resume and shutdown coordination.

use crate::error::Result;
use crate::types::{Event, TaskId, TaskStatus};
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::Exporter;

/// Interval between checks while waiting for runs to wind down
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(100);

impl Exporter {
    /// Start every task that was still in progress when the process stopped
    ///
    /// Tasks in `downloading`, `pending` or `ready` that are not already
    /// running are started; their completed files and expanded containers are
    /// kept, so only the remaining work is done. A task that fails to start is
    /// logged and skipped.
    ///
    /// Called by [`Exporter::new`] when `auto_resume` is enabled.
    ///
    /// # Returns
    ///
    /// The IDs of the tasks that were started.
    pub async fn resume_interrupted(&self) -> Result<Vec<TaskId>> {
        let tasks = self
            .db
            .list_tasks_by_status(&TaskStatus::resumable_on_startup())
            .await?;

        let mut resumed = Vec::with_capacity(tasks.len());
        for task in tasks {
            let id = TaskId(task.id);
            if self.registry.is_running(id).await {
                continue;
            }

            match self.start(id).await {
                Ok(_handle) => {
                    tracing::info!(task_id = id.0, status = %task.status(), "Resumed export task");
                    resumed.push(id);
                }
                Err(e) => {
                    tracing::warn!(task_id = id.0, error = %e, "Failed to resume export task");
                }
            }
        }

        Ok(resumed)
    }

    /// Gracefully shut down the exporter
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting new runs
    /// 2. Cancels all active runs (the file in flight is finished)
    /// 3. Waits up to `shutdown_timeout` for the runs to wind down
    /// 4. Puts leaves that are still marked downloading back to pending
    /// 5. Emits [`Event::Shutdown`]
    ///
    /// Task statuses are left as they are, so tasks that were running are
    /// resumed by the next [`Exporter::new`] with `auto_resume` enabled.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.accepting_new.store(false, Ordering::SeqCst);

        let signalled = self.registry.cancel_all().await;
        tracing::info!(active = signalled, "Signaled cancellation to all active runs");

        let shutdown_timeout = self.config.export.shutdown_timeout;
        match tokio::time::timeout(shutdown_timeout, self.wait_for_active_runs()).await {
            Ok(()) => tracing::info!("All active runs finished"),
            Err(_) => tracing::warn!(
                timeout_secs = shutdown_timeout.as_secs(),
                "Timeout waiting for runs to finish, proceeding with shutdown"
            ),
        }

        match self.db.reset_interrupted_leaves().await {
            Ok(reset) => tracing::debug!(reset, "Reset interrupted leaves"),
            Err(e) => {
                tracing::error!(error = %e, "Failed to reset interrupted leaves during shutdown");
            }
        }

        self.emit_event(Event::Shutdown);

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    async fn wait_for_active_runs(&self) {
        loop {
            let active_count = self.registry.len().await;
            if active_count == 0 {
                return;
            }

            tracing::debug!(active_count, "Waiting for active runs to finish");
            tokio::time::sleep(SHUTDOWN_POLL_INTERVAL).await;
        }
    }
}
