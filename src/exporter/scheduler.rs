//! Download scheduler - drains pending leaves in batches.
//!
//! Each leaf is resolved to the document it stands for and then either
//! downloaded as-is or exported (start job, poll, download artifact).
//! A failing leaf is recorded as failed; the batch always continues.

use crate::db::Node;
use crate::error::{ProviderError, Result, TaskError};
use crate::provider::{ArtifactRef, ExportJob, ExportJobStatus, ExportMode};
use crate::retry::{Backoff, IsRetryable};
use crate::types::{FileStatus, TaskId};
use crate::utils::leaf_destination;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use super::Exporter;
use super::registry::ActiveTask;

/// How fetching a single leaf ended (errors aside)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeafOutcome {
    /// Bytes were written to the output directory
    Downloaded,
    /// Document type has no export format; nothing to write
    Skipped,
    /// Run was cancelled while waiting on an export job
    Interrupted,
}

impl Exporter {
    /// Download pending leaves until the tree is exhausted or the run is cancelled
    ///
    /// When no leaf is pending but discovery still has containers to expand,
    /// the scheduler waits `discovery_wait` and looks again. Once both are
    /// exhausted the task is finalized.
    pub(crate) async fn run_scheduler(&self, id: TaskId, run: &ActiveTask) {
        let token = &run.token;
        let batch_size = self.config.export.batch_size.max(1);
        let mut backoff = Backoff::new(
            self.config.export.store_retry_delay,
            self.config.export.store_retry_max_delay,
        );

        let output_root = loop {
            match self.db.get_task(id).await {
                Ok(Some(task)) => break PathBuf::from(task.output_path),
                Ok(None) => {
                    tracing::warn!(task_id = id.0, "Task disappeared before scheduling");
                    return;
                }
                Err(e) => {
                    if !self.store_backoff(id, token, &mut backoff, &e).await {
                        return;
                    }
                }
            }
        };

        loop {
            if token.is_cancelled() {
                tracing::debug!(task_id = id.0, "Scheduler cancelled");
                return;
            }

            let batch = match self.db.get_pending_leaves(id, batch_size).await {
                Ok(batch) => batch,
                Err(e) => {
                    if !self.store_backoff(id, token, &mut backoff, &e).await {
                        return;
                    }
                    continue;
                }
            };

            if !batch.is_empty() {
                tracing::debug!(task_id = id.0, batch = batch.len(), "Processing batch");
                for leaf in batch {
                    if token.is_cancelled() {
                        return;
                    }
                    match self.process_leaf(&output_root, leaf, token).await {
                        Ok(()) => backoff.reset(),
                        Err(e) => {
                            if !self.store_backoff(id, token, &mut backoff, &e).await {
                                return;
                            }
                            // Re-read the pending set after a store failure
                            break;
                        }
                    }
                }
                continue;
            }

            let remaining = match self.db.count_unexpanded_containers(id).await {
                Ok(remaining) => remaining,
                Err(e) => {
                    if !self.store_backoff(id, token, &mut backoff, &e).await {
                        return;
                    }
                    continue;
                }
            };

            if remaining > 0 {
                tracing::debug!(
                    task_id = id.0,
                    unexpanded = remaining,
                    "No pending files yet, waiting for discovery"
                );
                if !Self::wait_or_cancel(token, self.config.export.discovery_wait).await {
                    return;
                }
                continue;
            }

            // Discovery is done; anything it inserted is visible by now
            match self.db.get_pending_leaves(id, 1).await {
                Ok(late) if !late.is_empty() => continue,
                Ok(_) => {}
                Err(e) => {
                    if !self.store_backoff(id, token, &mut backoff, &e).await {
                        return;
                    }
                    continue;
                }
            }

            match self.finalize_task(id, run).await {
                Ok(true) => return,
                // A file was put back to pending meanwhile
                Ok(false) => continue,
                Err(e) => {
                    if !self.store_backoff(id, token, &mut backoff, &e).await {
                        return;
                    }
                }
            }
        }
    }

    /// Log a store failure and sleep for the next back-off delay
    ///
    /// Returns false if the run was cancelled meanwhile.
    async fn store_backoff(
        &self,
        id: TaskId,
        token: &CancellationToken,
        backoff: &mut Backoff,
        error: &crate::Error,
    ) -> bool {
        let delay = backoff.next_delay();
        tracing::warn!(
            task_id = id.0,
            error = %error,
            failures = backoff.failures(),
            delay_ms = delay.as_millis(),
            "Task store unavailable, backing off"
        );
        Self::wait_or_cancel(token, delay).await
    }

    /// Download one leaf and record its final status
    ///
    /// Only store errors are returned; provider and file-system errors mark
    /// the leaf failed.
    async fn process_leaf(
        &self,
        output_root: &Path,
        leaf: Node,
        token: &CancellationToken,
    ) -> Result<()> {
        {
            // Stop holds the same lock, so no file starts once it returned
            let _guard = self.state_lock.lock().await;
            if token.is_cancelled() {
                return Ok(());
            }
            self.db
                .update_leaf_status(leaf.id, FileStatus::Downloading, None)
                .await?;
            self.emit_file_status(&leaf, FileStatus::Downloading, None);
        }

        match self.fetch_leaf(output_root, &leaf, token).await {
            Ok(LeafOutcome::Interrupted) => {
                tracing::debug!(
                    task_id = leaf.task_id.0,
                    node_id = leaf.id.0,
                    "Export interrupted, file stays pending"
                );
                self.db
                    .update_leaf_status(leaf.id, FileStatus::Pending, None)
                    .await?;
                self.emit_file_status(&leaf, FileStatus::Pending, None);
                return Ok(());
            }
            Ok(outcome) => {
                if outcome == LeafOutcome::Downloaded {
                    tracing::debug!(
                        task_id = leaf.task_id.0,
                        node_id = leaf.id.0,
                        name = %leaf.name,
                        "File downloaded"
                    );
                }
                self.db
                    .update_leaf_status(leaf.id, FileStatus::Completed, None)
                    .await?;
                self.emit_file_status(&leaf, FileStatus::Completed, None);
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(
                    task_id = leaf.task_id.0,
                    node_id = leaf.id.0,
                    name = %leaf.name,
                    error = %message,
                    "File download failed"
                );
                self.db
                    .update_leaf_status(leaf.id, FileStatus::Failed, Some(&message))
                    .await?;
                self.emit_file_status(&leaf, FileStatus::Failed, Some(message));
            }
        }

        match self.recompute_progress(leaf.task_id, true).await {
            // Deleted while the file was in flight
            Err(crate::Error::Task(TaskError::NotFound { .. })) => Ok(()),
            other => other,
        }
    }

    async fn fetch_leaf(
        &self,
        output_root: &Path,
        leaf: &Node,
        token: &CancellationToken,
    ) -> std::result::Result<LeafOutcome, ProviderError> {
        let resolved = leaf.payload.resolve()?;

        match resolved.doc_type.export_mode() {
            ExportMode::Direct => {
                let dest = leaf_destination(output_root, &leaf.virtual_path, &leaf.name, None);
                create_parent_dir(&dest).await?;
                self.provider.download_direct(&resolved, &dest).await?;
                Ok(LeafOutcome::Downloaded)
            }
            ExportMode::Export { extension } => {
                let job = self.provider.start_export_job(&resolved, extension).await?;
                let artifact = match self.await_export(&job, token).await? {
                    Some(artifact) => artifact,
                    None => return Ok(LeafOutcome::Interrupted),
                };
                let dest = leaf_destination(
                    output_root,
                    &leaf.virtual_path,
                    &leaf.name,
                    Some(extension),
                );
                create_parent_dir(&dest).await?;
                self.provider.download_artifact(&artifact, &dest).await?;
                Ok(LeafOutcome::Downloaded)
            }
            ExportMode::Unsupported => {
                tracing::warn!(
                    task_id = leaf.task_id.0,
                    node_id = leaf.id.0,
                    name = %leaf.name,
                    doc_type = resolved.doc_type.as_str(),
                    "Document type cannot be exported, marking as done"
                );
                Ok(LeafOutcome::Skipped)
            }
        }
    }

    /// Poll an export job until it is done, failed or out of polls
    ///
    /// Returns `None` if the run was cancelled while waiting. Transient poll
    /// errors use up a poll but do not fail the job.
    async fn await_export(
        &self,
        job: &ExportJob,
        token: &CancellationToken,
    ) -> std::result::Result<Option<ArtifactRef>, ProviderError> {
        let max_polls = self.config.export.export_max_polls;

        for attempt in 1..=max_polls {
            if !Self::wait_or_cancel(token, self.config.export.export_poll_interval).await {
                return Ok(None);
            }

            match self.provider.poll_export_job(job).await {
                Ok(ExportJobStatus::Done(artifact)) => return Ok(Some(artifact)),
                Ok(ExportJobStatus::Failed(message)) => {
                    return Err(ProviderError::ExportFailed {
                        ticket: job.ticket.clone(),
                        message,
                    });
                }
                Ok(ExportJobStatus::Pending | ExportJobStatus::Processing) => {}
                Err(e) if e.is_retryable() => {
                    tracing::debug!(ticket = %job.ticket, attempt, error = %e, "Export poll failed");
                }
                Err(e) => return Err(e),
            }
        }

        Err(ProviderError::ExportTimeout {
            ticket: job.ticket.clone(),
            attempts: max_polls,
        })
    }
}

async fn create_parent_dir(dest: &Path) -> std::result::Result<(), ProviderError> {
    let Some(parent) = dest.parent() else {
        return Ok(());
    };
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| ProviderError::Write {
            path: parent.display().to_string(),
            message: e.to_string(),
        })
}
