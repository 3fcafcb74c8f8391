//! Shared test helpers: an in-memory content provider and Exporter factories.

use crate::config::Config;
use crate::error::ProviderError;
use crate::exporter::Exporter;
use crate::provider::{
    ArtifactRef, ContentProvider, ExportJob, ExportJobStatus, NodePayload, RemoteEntry,
    ResolvedLeaf, ShortcutTarget,
};
use crate::types::{Event, ExportRequest, SelectedNode, TaskId};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::tempdir;

/// Behaviour of the export job of one document token
#[derive(Debug, Clone)]
pub(crate) enum ExportBehaviour {
    /// Done after the given number of "processing" polls
    DoneAfter(u32),
    /// Job reports an error
    Fail(String),
    /// Job never finishes
    Stall,
}

/// In-memory tree of remote nodes
///
/// Containers are keyed by [`container_key`]. Downloads write a short text
/// file; failures and delays are injected per token.
#[derive(Default)]
pub(crate) struct MockProvider {
    children: Mutex<HashMap<String, Vec<RemoteEntry>>>,
    list_failures: Mutex<HashMap<String, (u32, ProviderError)>>,
    download_failures: Mutex<HashMap<String, ProviderError>>,
    exports: Mutex<HashMap<String, ExportBehaviour>>,
    polls: Mutex<HashMap<String, u32>>,
    download_delay: Mutex<Option<Duration>>,
    list_calls: Mutex<HashMap<String, usize>>,
    downloads: AtomicUsize,
    downloaded_tokens: Mutex<Vec<String>>,
}

/// Key under which the children of a container are stored
pub(crate) fn container_key(payload: &NodePayload) -> String {
    match payload {
        NodePayload::DriveRoot { token } | NodePayload::Folder { token } => token.clone(),
        NodePayload::WikiRoot => "wiki".to_string(),
        NodePayload::WikiSpace { space_id } => space_id.clone(),
        NodePayload::WikiNode { node_token, .. } => node_token.clone(),
        NodePayload::File { token, .. } => token.clone(),
    }
}

impl MockProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Set the children listed for the container with this key
    pub(crate) fn set_children(&self, key: &str, entries: Vec<RemoteEntry>) {
        self.children
            .lock()
            .unwrap()
            .insert(key.to_string(), entries);
    }

    /// Make listing this container fail `times` times before succeeding
    pub(crate) fn fail_listing(&self, key: &str, times: u32, error: ProviderError) {
        self.list_failures
            .lock()
            .unwrap()
            .insert(key.to_string(), (times, error));
    }

    /// Make every download of this token fail
    pub(crate) fn fail_download(&self, token: &str, error: ProviderError) {
        self.download_failures
            .lock()
            .unwrap()
            .insert(token.to_string(), error);
    }

    pub(crate) fn clear_download_failure(&self, token: &str) {
        self.download_failures.lock().unwrap().remove(token);
    }

    pub(crate) fn set_export(&self, token: &str, behaviour: ExportBehaviour) {
        self.exports
            .lock()
            .unwrap()
            .insert(token.to_string(), behaviour);
    }

    pub(crate) fn set_download_delay(&self, delay: Duration) {
        *self.download_delay.lock().unwrap() = Some(delay);
    }

    pub(crate) fn list_calls(&self, key: &str) -> usize {
        self.list_calls
            .lock()
            .unwrap()
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    /// Tokens downloaded so far, in order
    pub(crate) fn downloaded_tokens(&self) -> Vec<String> {
        self.downloaded_tokens.lock().unwrap().clone()
    }

    async fn write(&self, token: &str, dest: &Path) -> Result<u64, ProviderError> {
        let delay = *self.download_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.download_failures.lock().unwrap().get(token).cloned();
        if let Some(error) = failure {
            return Err(error);
        }

        let body = format!("content of {}", token);
        tokio::fs::write(dest, body.as_bytes())
            .await
            .map_err(|e| ProviderError::Write {
                path: dest.display().to_string(),
                message: e.to_string(),
            })?;

        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.downloaded_tokens
            .lock()
            .unwrap()
            .push(token.to_string());
        Ok(body.len() as u64)
    }
}

#[async_trait]
impl ContentProvider for MockProvider {
    async fn list_children(&self, parent: &NodePayload) -> Result<Vec<RemoteEntry>, ProviderError> {
        let key = container_key(parent);
        *self
            .list_calls
            .lock()
            .unwrap()
            .entry(key.clone())
            .or_insert(0) += 1;

        {
            let mut failures = self.list_failures.lock().unwrap();
            if let Some((remaining, error)) = failures.get_mut(&key)
                && *remaining > 0
            {
                *remaining -= 1;
                return Err(error.clone());
            }
        }

        Ok(self
            .children
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_default())
    }

    async fn start_export_job(
        &self,
        leaf: &ResolvedLeaf,
        _extension: &str,
    ) -> Result<ExportJob, ProviderError> {
        Ok(ExportJob {
            ticket: format!("ticket-{}", leaf.token),
            token: leaf.token.clone(),
        })
    }

    async fn poll_export_job(&self, job: &ExportJob) -> Result<ExportJobStatus, ProviderError> {
        let behaviour = self
            .exports
            .lock()
            .unwrap()
            .get(&job.token)
            .cloned()
            .unwrap_or(ExportBehaviour::DoneAfter(0));

        let polls = {
            let mut polls = self.polls.lock().unwrap();
            let count = polls.entry(job.ticket.clone()).or_insert(0);
            *count += 1;
            *count
        };

        Ok(match behaviour {
            ExportBehaviour::DoneAfter(processing) if polls > processing => {
                ExportJobStatus::Done(ArtifactRef {
                    file_token: format!("artifact-{}", job.token),
                    file_size: None,
                })
            }
            ExportBehaviour::DoneAfter(_) | ExportBehaviour::Stall => ExportJobStatus::Processing,
            ExportBehaviour::Fail(message) => ExportJobStatus::Failed(message),
        })
    }

    async fn download_artifact(
        &self,
        artifact: &ArtifactRef,
        dest: &Path,
    ) -> Result<u64, ProviderError> {
        let token = artifact
            .file_token
            .strip_prefix("artifact-")
            .unwrap_or(&artifact.file_token)
            .to_string();
        self.write(&token, dest).await
    }

    async fn download_direct(&self, leaf: &ResolvedLeaf, dest: &Path) -> Result<u64, ProviderError> {
        self.write(&leaf.token, dest).await
    }
}

pub(crate) fn folder_entry(name: &str, token: &str) -> RemoteEntry {
    RemoteEntry {
        name: name.to_string(),
        payload: NodePayload::Folder {
            token: token.to_string(),
        },
    }
}

/// Online document exported as docx
pub(crate) fn doc_entry(name: &str, token: &str) -> RemoteEntry {
    RemoteEntry {
        name: name.to_string(),
        payload: NodePayload::File {
            token: token.to_string(),
            file_type: "docx".to_string(),
            shortcut: None,
        },
    }
}

/// Uploaded file downloaded as-is
pub(crate) fn file_entry(name: &str, token: &str) -> RemoteEntry {
    RemoteEntry {
        name: name.to_string(),
        payload: NodePayload::File {
            token: token.to_string(),
            file_type: "file".to_string(),
            shortcut: None,
        },
    }
}

pub(crate) fn shortcut_entry(name: &str, target_token: &str, target_type: &str) -> RemoteEntry {
    RemoteEntry {
        name: name.to_string(),
        payload: NodePayload::File {
            token: format!("shortcut-{}", target_token),
            file_type: "shortcut".to_string(),
            shortcut: Some(ShortcutTarget {
                target_token: target_token.to_string(),
                target_type: target_type.to_string(),
            }),
        },
    }
}

pub(crate) fn wiki_entry(
    name: &str,
    node_token: &str,
    obj_type: &str,
    has_child: bool,
) -> RemoteEntry {
    RemoteEntry {
        name: name.to_string(),
        payload: NodePayload::WikiNode {
            space_id: "space".to_string(),
            node_token: node_token.to_string(),
            obj_token: format!("obj-{}", node_token),
            obj_type: obj_type.to_string(),
            has_child,
        },
    }
}

pub(crate) fn folder_root(name: &str, token: &str) -> SelectedNode {
    let entry = folder_entry(name, token);
    SelectedNode {
        name: entry.name,
        payload: entry.payload,
    }
}

/// Test configuration with short intervals, rooted in `dir`
pub(crate) fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = dir.join("test.db");
    config.export.batch_size = 5;
    config.export.discovery_wait = Duration::from_millis(10);
    config.export.export_poll_interval = Duration::from_millis(1);
    config.export.export_max_polls = 5;
    config.export.auto_resume = false;
    config.export.shutdown_timeout = Duration::from_secs(5);
    config.export.store_retry_delay = Duration::from_millis(10);
    config.export.store_retry_max_delay = Duration::from_millis(100);
    config.discovery.list_retry.max_attempts = 2;
    config.discovery.list_retry.initial_delay = Duration::from_millis(1);
    config.discovery.list_retry.max_delay = Duration::from_millis(5);
    config.discovery.list_retry.jitter = false;
    config
}

/// Helper to create a test Exporter over a fresh mock provider.
/// Returns the exporter, the provider and the tempdir (which must be kept alive).
pub(crate) async fn create_test_exporter() -> (Exporter, Arc<MockProvider>, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let provider = Arc::new(MockProvider::new());
    let exporter = Exporter::new(test_config(temp_dir.path()), provider.clone())
        .await
        .unwrap();
    (exporter, provider, temp_dir)
}

/// Create a task exporting `roots` into `<temp_dir>/output`
pub(crate) async fn create_export(
    exporter: &Exporter,
    temp_dir: &tempfile::TempDir,
    roots: Vec<SelectedNode>,
) -> TaskId {
    exporter
        .create_task(ExportRequest {
            name: "Test Export".to_string(),
            description: None,
            output_path: temp_dir.path().join("output"),
            roots,
        })
        .await
        .unwrap()
}

/// Start a task and wait for its run to end
pub(crate) async fn run_to_end(exporter: &Exporter, id: TaskId) {
    let handle = exporter.start(id).await.unwrap();
    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("export run did not finish in time")
        .unwrap();
}

/// Drain every event currently buffered in the receiver
pub(crate) fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
