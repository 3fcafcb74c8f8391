//! Custom test assertions for E2E tests

use feishu_export::{Event, Exporter, TaskId, TaskStatus};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Result of waiting for a task to finish
#[derive(Debug, PartialEq)]
pub enum WaitResult {
    /// Task reached a terminal status
    Terminal(TaskStatus),
    /// Task was paused
    Paused,
    /// Timeout waiting for the task
    Timeout,
    /// Channel closed unexpectedly
    ChannelClosed,
}

/// Wait for a task to reach a terminal status or pause
///
/// Subscribe before starting the task, otherwise a fast task may finish
/// before the receiver exists.
///
/// # Arguments
/// * `events` - Receiver obtained from [`Exporter::subscribe`]
/// * `id` - Task ID to wait for
/// * `timeout` - Maximum time to wait
pub async fn wait_for_terminal(
    events: &mut tokio::sync::broadcast::Receiver<Event>,
    id: TaskId,
    timeout: Duration,
) -> WaitResult {
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::TaskTerminal { task_id, status }) if task_id == id => {
                    return WaitResult::Terminal(status);
                }
                Ok(Event::TaskPaused { task_id }) if task_id == id => {
                    return WaitResult::Paused;
                }
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => return WaitResult::ChannelClosed,
            }
        }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Poll the task until it reaches `status`
pub async fn wait_for_status(
    exporter: &Exporter,
    id: TaskId,
    status: TaskStatus,
    timeout: Duration,
) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if let Ok(task) = exporter.get_task(id).await
            && task.status == status
        {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// Relative paths of every regular file below `root`, sorted
pub fn files_under(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.path().strip_prefix(root).ok().map(Path::to_path_buf))
        .collect();
    files.sort();
    files
}

/// Assert the task status and that its counters agree with the stored leaves
pub async fn assert_task_status(exporter: &Exporter, id: TaskId, expected: TaskStatus) {
    let task = exporter.get_task(id).await.unwrap();
    assert_eq!(
        task.status, expected,
        "task {} has status {} (expected {})",
        id, task.status, expected
    );

    let counts = exporter.db.count_leaves_by_status(id).await.unwrap();
    assert_eq!(task.total_files, counts.total());
    assert_eq!(task.completed_files, counts.completed);
    assert_eq!(task.failed_files, counts.failed);
}
