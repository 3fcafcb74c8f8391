//! Registry of running export tasks and their cancellation tokens.

use crate::types::TaskId;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

/// Handle of one run of an export task
#[derive(Debug, Clone)]
pub(crate) struct ActiveTask {
    /// Cancelled when the run must stop at its next checkpoint
    pub(crate) token: CancellationToken,
    /// Distinguishes this run from later runs of the same task
    pub(crate) generation: u64,
    /// Cancelled once the run has exited
    pub(crate) finished: CancellationToken,
}

/// Outcome of registering a new run
#[derive(Debug)]
pub(crate) enum Registration {
    /// The task had no run; this is the new one
    Registered(ActiveTask),
    /// The task already has a run that was not asked to stop
    Running,
    /// The previous run was stopped but has not exited yet
    ///
    /// Carries the run's `finished` token.
    Stopping(CancellationToken),
}

/// Map of task ID to the handle of its current run
///
/// A run stays registered from `start` until it has exited, including the
/// time between being stopped and winding down. Owned by the
/// [`Exporter`](super::Exporter); clones share the same map.
#[derive(Clone, Default)]
pub(crate) struct TaskRegistry {
    active: Arc<tokio::sync::Mutex<HashMap<TaskId, ActiveTask>>>,
    next_generation: Arc<AtomicU64>,
}

impl TaskRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a new run of `id`
    pub(crate) async fn register(&self, id: TaskId) -> Registration {
        let mut active = self.active.lock().await;
        if let Some(existing) = active.get(&id) {
            return if existing.token.is_cancelled() {
                Registration::Stopping(existing.finished.clone())
            } else {
                Registration::Running
            };
        }

        let entry = ActiveTask {
            token: CancellationToken::new(),
            generation: self.next_generation.fetch_add(1, Ordering::SeqCst),
            finished: CancellationToken::new(),
        };
        active.insert(id, entry.clone());
        Registration::Registered(entry)
    }

    /// Ask the run of `id` to stop
    ///
    /// The entry stays until the run calls [`finish`](Self::finish). Returns
    /// `None` if the task has no run or its run was already stopped.
    pub(crate) async fn cancel(&self, id: TaskId) -> Option<ActiveTask> {
        let active = self.active.lock().await;
        let entry = active.get(&id).filter(|entry| !entry.token.is_cancelled())?;
        entry.token.cancel();
        Some(entry.clone())
    }

    /// Remove the run of `id` if it is still the given generation
    ///
    /// Used by finalization so a follow-up run can be registered while the
    /// finished run is still returning.
    pub(crate) async fn remove_if(&self, id: TaskId, generation: u64) -> bool {
        let mut active = self.active.lock().await;
        match active.get(&id) {
            Some(entry) if entry.generation == generation => {
                active.remove(&id);
                true
            }
            _ => false,
        }
    }

    /// Unregister an exiting run and wake everyone waiting for it
    pub(crate) async fn finish(&self, id: TaskId, run: &ActiveTask) {
        self.remove_if(id, run.generation).await;
        run.finished.cancel();
    }

    /// Whether `id` has a run that was not asked to stop
    pub(crate) async fn is_running(&self, id: TaskId) -> bool {
        self.active
            .lock()
            .await
            .get(&id)
            .is_some_and(|entry| !entry.token.is_cancelled())
    }

    /// Cancel every registered run without removing it
    ///
    /// Runs remove themselves once they have wound down. Returns the number of
    /// runs signalled.
    pub(crate) async fn cancel_all(&self) -> usize {
        let active = self.active.lock().await;
        for (id, entry) in active.iter() {
            tracing::debug!(task_id = id.0, "Signaling cancellation");
            entry.token.cancel();
        }
        active.len()
    }

    /// Number of registered runs, stopping ones included
    pub(crate) async fn len(&self) -> usize {
        self.active.lock().await.len()
    }
}
