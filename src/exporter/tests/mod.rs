
use super::test_helpers::*;
use super::*;
use crate::error::{Error, ProviderError, TaskError};
use crate::types::{FileStatus, NodeId, TaskId, TaskStatus};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Relative paths of every regular file below `root`, sorted
fn files_under(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.path().strip_prefix(root).unwrap().to_path_buf())
        .collect();
    files.sort();
    files
}

/// Poll the task until it reaches `status` (panics after 10 seconds)
async fn wait_for_status(exporter: &Exporter, id: TaskId, status: TaskStatus) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let task = exporter.get_task(id).await.unwrap();
        if task.status == status {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {} stuck in {} waiting for {}",
            id,
            task.status,
            status
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Every leaf carries exactly one status and the task counters agree with the store
async fn assert_counters_consistent(exporter: &Exporter, id: TaskId) {
    let counts = exporter.db.count_leaves_by_status(id).await.unwrap();
    let total = exporter.db.count_leaves(id).await.unwrap();
    assert_eq!(counts.total(), total);

    let task = exporter.get_task(id).await.unwrap();
    assert_eq!(task.total_files, total);
    assert_eq!(task.completed_files, counts.completed);
    assert_eq!(task.failed_files, counts.failed);
}
