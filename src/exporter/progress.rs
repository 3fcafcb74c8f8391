//! Progress aggregation and task finalization.

use crate::error::{Result, TaskError};
use crate::types::{Event, LeafCounts, TaskId, TaskStatus};

use super::Exporter;
use super::registry::ActiveTask;

impl Exporter {
    /// Recompute a task's progress from the stored leaf counts
    ///
    /// The result is persisted together with the counters and broadcast as
    /// [`Event::DownloadProgress`]. With `monotonic` set, a downloading task
    /// never reports less progress than before: newly discovered leaves grow
    /// the total and would otherwise pull the percentage back.
    pub(crate) async fn recompute_progress(&self, id: TaskId, monotonic: bool) -> Result<()> {
        let _guard = self.state_lock.lock().await;

        let task = self
            .db
            .get_task(id)
            .await?
            .ok_or(TaskError::NotFound { id: id.0 })?;
        let counts = self.db.count_leaves_by_status(id).await?;

        let mut progress = counts.percent();
        if monotonic && task.status() == TaskStatus::Downloading {
            progress = progress.max(task.progress);
        }

        self.db.update_task_progress(id, progress, &counts).await?;
        self.emit_progress(id, progress, &counts);

        Ok(())
    }

    /// Mark a task whose tree is exhausted as completed or failed
    ///
    /// Does nothing if the run was cancelled. The task fails if any of its
    /// files failed. A finalized run is unregistered before the lock is
    /// released, so a retry that follows starts a new run.
    ///
    /// Returns false if a file went back to pending since the scheduler last
    /// looked; the scheduler then keeps going.
    pub(crate) async fn finalize_task(&self, id: TaskId, run: &ActiveTask) -> Result<bool> {
        let _guard = self.state_lock.lock().await;

        if run.token.is_cancelled() {
            tracing::debug!(task_id = id.0, "Run cancelled, skipping finalization");
            return Ok(true);
        }

        let counts = self.db.count_leaves_by_status(id).await?;
        if counts.pending + counts.downloading > 0 {
            tracing::debug!(
                task_id = id.0,
                pending = counts.pending,
                downloading = counts.downloading,
                "Files left to download, not finalizing"
            );
            return Ok(false);
        }

        let status = if counts.failed > 0 {
            TaskStatus::Failed
        } else {
            TaskStatus::Completed
        };

        self.db.update_task_progress(id, 100.0, &counts).await?;
        self.db.update_task_status(id, status).await?;
        if let Err(e) = self.db.set_task_completed(id).await {
            tracing::error!(task_id = id.0, error = %e, "Failed to set completion time");
        }

        tracing::info!(
            task_id = id.0,
            status = %status,
            total_files = counts.total(),
            completed_files = counts.completed,
            failed_files = counts.failed,
            "Export task finished"
        );

        self.registry.remove_if(id, run.generation).await;

        self.emit_progress(id, 100.0, &counts);
        self.emit_event(Event::TaskTerminal {
            task_id: id,
            status,
        });

        Ok(true)
    }

    fn emit_progress(&self, id: TaskId, progress: f64, counts: &LeafCounts) {
        self.emit_event(Event::DownloadProgress {
            task_id: id,
            progress,
            completed_files: counts.completed,
            failed_files: counts.failed,
            total_files: counts.total(),
        });
    }
}
