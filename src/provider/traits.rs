//! Traits and types for remote content providers

use async_trait::async_trait;
use std::path::Path;

use super::payload::{NodePayload, ResolvedLeaf};
use crate::error::ProviderError;

/// Immediate child of a container, as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// Display name
    pub name: String,
    /// Provider identity of the child
    pub payload: NodePayload,
}

/// Handle of a started export job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportJob {
    /// Job ticket
    pub ticket: String,
    /// Token of the document being exported
    pub token: String,
}

/// Downloadable result of a finished export job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    /// Token of the exported file
    pub file_token: String,
    /// Size in bytes, when reported
    pub file_size: Option<u64>,
}

/// State of an export job
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportJobStatus {
    /// Accepted, not started yet
    Pending,
    /// Running
    Processing,
    /// Finished; the artifact can be downloaded
    Done(ArtifactRef),
    /// Finished with an error
    Failed(String),
}

/// Trait for remote content providers
///
/// A provider lists the children of container nodes, runs export jobs for
/// online documents and writes file bytes to disk. Every failure is reported
/// as a [`ProviderError`]; the orchestrator decides whether to retry, skip or
/// mark a file as failed.
///
/// Downloads must be idempotent: writing to an existing `dest` replaces it.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// List the immediate children of a container node
    async fn list_children(&self, parent: &NodePayload) -> Result<Vec<RemoteEntry>, ProviderError>;

    /// Start exporting a document to the given file extension
    async fn start_export_job(
        &self,
        leaf: &ResolvedLeaf,
        extension: &str,
    ) -> Result<ExportJob, ProviderError>;

    /// Query the state of an export job
    async fn poll_export_job(&self, job: &ExportJob) -> Result<ExportJobStatus, ProviderError>;

    /// Download the artifact of a finished export job to `dest`
    ///
    /// Returns the number of bytes written.
    async fn download_artifact(
        &self,
        artifact: &ArtifactRef,
        dest: &Path,
    ) -> Result<u64, ProviderError>;

    /// Download a stored file as-is to `dest`
    ///
    /// Returns the number of bytes written.
    async fn download_direct(&self, leaf: &ResolvedLeaf, dest: &Path)
    -> Result<u64, ProviderError>;
}
