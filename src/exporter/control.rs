//! Export task control - create, start, stop, resume, delete and retry.

use crate::db::{NewNode, NewTask, Node};
use crate::error::{Error, Result, TaskError};
use crate::types::{
    DiscoveredNode, Event, ExportRequest, FileStatus, NodeId, TaskId, TaskInfo, TaskStatus,
};
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use tokio::task::JoinHandle;

use super::Exporter;
use super::discovery::local_name;
use super::registry::{ActiveTask, Registration};

impl Exporter {
    /// Create a new export task from a selection of remote nodes
    ///
    /// The task starts out `pending` with every selected node stored as a root
    /// of its tree. Selected containers are expanded once the task is started;
    /// selected leaves are downloaded straight into the output directory.
    /// Roots that would land on the same local name are stored once.
    ///
    /// # Arguments
    ///
    /// * `request` - Task name, description, output directory and selected roots
    ///
    /// # Returns
    ///
    /// The ID of the new task.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use feishu_export::*;
    /// # async fn example(exporter: Exporter, root: SelectedNode) -> Result<()> {
    /// let id = exporter
    ///     .create_task(ExportRequest {
    ///         name: "Team drive backup".to_string(),
    ///         description: None,
    ///         output_path: "/backups/team".into(),
    ///         roots: vec![root],
    ///     })
    ///     .await?;
    /// exporter.start(id).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn create_task(&self, request: ExportRequest) -> Result<TaskId> {
        let id = self
            .db
            .insert_task(&NewTask {
                name: request.name,
                description: request.description,
                output_path: request.output_path.to_string_lossy().into_owned(),
                status: TaskStatus::Pending.to_i32(),
            })
            .await?;

        let mut seen = HashSet::new();
        let roots: Vec<NewNode> = request
            .roots
            .into_iter()
            .filter(|root| seen.insert(local_name(&root.name, &root.payload)))
            .map(|root| NewNode {
                task_id: id,
                parent_id: None,
                name: root.name,
                virtual_path: Vec::new(),
                is_leaf: !root.payload.is_container(),
                payload: root.payload,
            })
            .collect();

        let inserted = self.db.insert_nodes(&roots).await?;

        tracing::info!(task_id = id.0, roots = inserted.len(), "Created export task");

        if !inserted.is_empty() {
            self.emit_event(Event::NodesDiscovered {
                task_id: id,
                nodes: inserted.iter().map(DiscoveredNode::from).collect(),
            });
        }

        Ok(id)
    }

    /// Start (or restart) an export task
    ///
    /// Marks the task `downloading`, registers a cancellation token for it and
    /// spawns one background run in which tree discovery and the download
    /// scheduler work side by side. Work already done (expanded containers,
    /// completed files) is never repeated.
    ///
    /// If the task was just stopped and its previous run is still finishing
    /// the file in flight, this waits for that run to exit first, so two runs
    /// of one task never overlap.
    ///
    /// # Returns
    ///
    /// The handle of the spawned run. Dropping it detaches the run; awaiting it
    /// waits until the task finished, failed or was stopped.
    ///
    /// # Errors
    ///
    /// - [`TaskError::NotFound`] if the task doesn't exist
    /// - [`TaskError::InvalidState`] if the task is completed or cancelled
    /// - [`TaskError::AlreadyActive`] if the task already has a running run
    /// - [`Error::ShuttingDown`] after [`shutdown`](Exporter::shutdown) was called
    pub async fn start(&self, id: TaskId) -> Result<JoinHandle<()>> {
        let (active, status) = loop {
            if !self.accepting_new.load(Ordering::SeqCst) {
                return Err(Error::ShuttingDown);
            }

            let task = self.require_task(id).await?;
            let status = task.status();
            if matches!(status, TaskStatus::Completed | TaskStatus::Cancelled) {
                return Err(TaskError::InvalidState {
                    id: id.0,
                    operation: "start".to_string(),
                    current_state: status.to_string(),
                }
                .into());
            }

            match self.registry.register(id).await {
                Registration::Registered(active) => break (active, status),
                Registration::Running => {
                    return Err(TaskError::AlreadyActive { id: id.0 }.into());
                }
                Registration::Stopping(finished) => {
                    tracing::debug!(task_id = id.0, "Waiting for the stopped run to exit");
                    finished.cancelled().await;
                }
            }
        };

        if let Err(e) = self.mark_started(id).await {
            self.registry.finish(id, &active).await;
            return Err(e);
        }

        tracing::info!(
            task_id = id.0,
            generation = active.generation,
            previous_status = %status,
            "Starting export task"
        );
        self.emit_event(Event::TaskStarted { task_id: id });

        let exporter = self.clone();
        Ok(tokio::spawn(async move {
            exporter.run_task(id, active).await;
        }))
    }

    /// Stop a running export task
    ///
    /// Cancellation is cooperative: the file currently being downloaded is
    /// finished, but no further file or container is started. The task is
    /// marked `paused` and can be continued with [`resume`](Exporter::resume).
    /// The run stays registered until it has exited.
    ///
    /// # Errors
    ///
    /// [`TaskError::NotActive`] if the task has no running run.
    pub async fn stop(&self, id: TaskId) -> Result<()> {
        // Held so a run cannot finalize between cancellation and the status update
        let _guard = self.state_lock.lock().await;

        self.registry
            .cancel(id)
            .await
            .ok_or(TaskError::NotActive { id: id.0 })?;

        self.db.update_task_status(id, TaskStatus::Paused).await?;

        tracing::info!(task_id = id.0, "Export task paused");
        self.emit_event(Event::TaskPaused { task_id: id });

        Ok(())
    }

    /// Resume a paused export task
    ///
    /// # Errors
    ///
    /// [`TaskError::InvalidState`] unless the task is `paused`; otherwise the
    /// same errors as [`start`](Exporter::start).
    pub async fn resume(&self, id: TaskId) -> Result<JoinHandle<()>> {
        let task = self.require_task(id).await?;
        let status = task.status();
        if status != TaskStatus::Paused {
            return Err(TaskError::InvalidState {
                id: id.0,
                operation: "resume".to_string(),
                current_state: status.to_string(),
            }
            .into());
        }

        self.start(id).await
    }

    /// Delete an export task and all of its nodes
    ///
    /// A running task is stopped first. Files already written to the output
    /// directory are left in place.
    pub async fn delete(&self, id: TaskId) -> Result<()> {
        self.require_task(id).await?;

        match self.stop(id).await {
            Ok(()) | Err(Error::Task(TaskError::NotActive { .. })) => {}
            Err(e) => return Err(e),
        }

        self.db.update_task_status(id, TaskStatus::Cancelled).await?;
        self.emit_event(Event::TaskTerminal {
            task_id: id,
            status: TaskStatus::Cancelled,
        });

        self.db.delete_task(id).await?;

        tracing::info!(task_id = id.0, "Export task deleted");
        self.emit_event(Event::TaskRemoved { task_id: id });

        Ok(())
    }

    /// Retry every failed file of a task
    ///
    /// Failed leaves go back to `pending` with their error cleared, progress is
    /// recomputed from scratch and the task is started again.
    ///
    /// # Errors
    ///
    /// - [`TaskError::NotFound`] if the task doesn't exist
    /// - [`TaskError::AlreadyActive`] if the task is running
    /// - [`TaskError::NoFailedFiles`] if there is nothing to retry
    pub async fn retry_failed(&self, id: TaskId) -> Result<JoinHandle<()>> {
        self.require_task(id).await?;

        let reset = {
            // Finalization holds the same lock, so the reset is either seen
            // by the running pass or happens after it unregistered
            let _guard = self.state_lock.lock().await;
            if self.registry.is_running(id).await {
                return Err(TaskError::AlreadyActive { id: id.0 }.into());
            }
            self.db.reset_failed_leaves(id).await?
        };
        if reset.is_empty() {
            return Err(TaskError::NoFailedFiles { id: id.0 }.into());
        }

        tracing::info!(task_id = id.0, files = reset.len(), "Retrying failed files");

        for node in &reset {
            self.emit_file_status(node, FileStatus::Pending, None);
        }
        self.recompute_progress(id, false).await?;

        self.start(id).await
    }

    /// Retry a single failed file
    ///
    /// The leaf goes back to `pending`. If the task is not running it is
    /// started and the handle of the new run is returned; a running task picks
    /// the file up by itself.
    ///
    /// # Errors
    ///
    /// - [`TaskError::NodeNotFound`] if the node doesn't belong to the task
    /// - [`TaskError::InvalidState`] if the node is not a failed leaf
    pub async fn retry_file(
        &self,
        task_id: TaskId,
        node_id: NodeId,
    ) -> Result<Option<JoinHandle<()>>> {
        let node = self
            .db
            .get_node(node_id)
            .await?
            .filter(|node| node.task_id == task_id)
            .ok_or(TaskError::NodeNotFound {
                task_id: task_id.0,
                node_id: node_id.0,
            })?;

        if node.status != Some(FileStatus::Failed) {
            let current_state = node
                .status
                .map(|s| format!("{:?}", s).to_lowercase())
                .unwrap_or_else(|| node.kind.as_str().to_string());
            return Err(TaskError::InvalidState {
                id: node_id.0,
                operation: "retry_file".to_string(),
                current_state,
            }
            .into());
        }

        let running = {
            let _guard = self.state_lock.lock().await;
            self.db
                .update_leaf_status(node_id, FileStatus::Pending, None)
                .await?;
            self.registry.is_running(task_id).await
        };
        self.emit_file_status(&node, FileStatus::Pending, None);

        tracing::info!(task_id = task_id.0, node_id = node_id.0, running, "Retrying file");

        self.recompute_progress(task_id, false).await?;

        if running {
            return Ok(None);
        }
        self.start(task_id).await.map(Some)
    }

    /// Rename a task or change its description
    ///
    /// `None` leaves a field as it is. Works in any status, including while
    /// the task is running.
    ///
    /// # Errors
    ///
    /// [`TaskError::NotFound`] if the task doesn't exist.
    pub async fn update_task(
        &self,
        id: TaskId,
        name: Option<String>,
        description: Option<String>,
    ) -> Result<TaskInfo> {
        let updated = self
            .db
            .update_task_details(id, name.as_deref(), description.as_deref())
            .await?;
        if !updated {
            return Err(TaskError::NotFound { id: id.0 }.into());
        }

        tracing::info!(task_id = id.0, "Updated export task details");
        self.get_task(id).await
    }

    /// Get a task by ID
    pub async fn get_task(&self, id: TaskId) -> Result<TaskInfo> {
        self.require_task(id).await.map(TaskInfo::from)
    }

    /// List all tasks, newest first
    pub async fn list_tasks(&self) -> Result<Vec<TaskInfo>> {
        let tasks = self.db.list_tasks().await?;
        Ok(tasks.into_iter().map(TaskInfo::from).collect())
    }

    /// List every node discovered for a task
    pub async fn list_nodes(&self, id: TaskId) -> Result<Vec<Node>> {
        self.require_task(id).await?;
        self.db.list_nodes(id).await
    }

    /// Whether the task has a run that was not asked to stop
    pub async fn is_active(&self, id: TaskId) -> bool {
        self.registry.is_running(id).await
    }

    async fn require_task(&self, id: TaskId) -> Result<crate::db::Task> {
        self.db
            .get_task(id)
            .await?
            .ok_or_else(|| TaskError::NotFound { id: id.0 }.into())
    }

    async fn mark_started(&self, id: TaskId) -> Result<()> {
        self.db
            .update_task_status(id, TaskStatus::Downloading)
            .await?;
        self.db.set_task_started(id).await
    }

    /// Body of one run: discovery and scheduler side by side
    async fn run_task(self, id: TaskId, active: ActiveTask) {
        let token = active.token.clone();

        tokio::join!(
            self.run_discovery(id, &token),
            self.run_scheduler(id, &active)
        );

        self.registry.finish(id, &active).await;
        tracing::debug!(
            task_id = id.0,
            generation = active.generation,
            cancelled = token.is_cancelled(),
            "Export run finished"
        );
    }

    pub(crate) fn emit_file_status(&self, node: &Node, status: FileStatus, error: Option<String>) {
        self.emit_event(Event::FileStatusChanged {
            task_id: node.task_id,
            node_id: node.id,
            name: node.name.clone(),
            status,
            error,
        });
    }
}
