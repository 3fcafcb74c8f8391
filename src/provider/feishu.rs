//! Feishu / Lark open API provider
//!
//! Talks to the drive and wiki endpoints of the open platform over HTTPS with a
//! user access token. Responses use the `{code, msg, data}` envelope; a
//! non-zero `code` is reported as [`ProviderError::Api`].

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use super::payload::{NodePayload, ResolvedLeaf, ShortcutTarget};
use super::traits::{ArtifactRef, ContentProvider, ExportJob, ExportJobStatus, RemoteEntry};
use crate::config::ProviderConfig;
use crate::error::{Error, ProviderError, Result};
use crate::types::SelectedNode;
use crate::utils::part_path;

/// Name used for the drive root, which the API does not name
pub const DRIVE_ROOT_NAME: &str = "My Space";

/// Name used for the virtual root of all wiki spaces
pub const WIKI_ROOT_NAME: &str = "Wiki";

/// Feishu open API client implementing [`ContentProvider`]
pub struct FeishuProvider {
    client: reqwest::Client,
    endpoint: String,
    access_token: RwLock<Option<String>>,
    drive_page_size: u32,
    wiki_space_page_size: u32,
    wiki_node_page_size: u32,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new", alias = "files")]
    items: Vec<T>,
    #[serde(default, alias = "next_page_token")]
    page_token: Option<String>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    token: String,
    name: String,
    #[serde(rename = "type")]
    file_type: String,
    #[serde(default)]
    shortcut_info: Option<ShortcutTarget>,
}

#[derive(Debug, Deserialize)]
struct WikiSpace {
    space_id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct WikiNode {
    space_id: String,
    node_token: String,
    obj_token: String,
    obj_type: String,
    title: String,
    #[serde(default)]
    has_child: bool,
}

#[derive(Debug, Deserialize)]
struct RootFolderMeta {
    token: String,
}

#[derive(Debug, Deserialize)]
struct ExportTicket {
    ticket: String,
}

#[derive(Debug, Deserialize)]
struct ExportResultData {
    result: ExportResult,
}

#[derive(Debug, Deserialize)]
struct ExportResult {
    #[serde(default)]
    file_token: String,
    job_status: i64,
    #[serde(default)]
    job_error_msg: String,
    #[serde(default)]
    file_size: Option<u64>,
}

impl FeishuProvider {
    /// Create a provider from configuration
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                Error::Io(std::io::Error::other(format!(
                    "Failed to create HTTP client: {}",
                    e
                )))
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            access_token: RwLock::new(config.access_token.clone()),
            drive_page_size: config.drive_page_size,
            wiki_space_page_size: config.wiki_space_page_size,
            wiki_node_page_size: config.wiki_node_page_size,
        })
    }

    /// Replace the access token used for subsequent requests
    pub async fn set_access_token(&self, token: impl Into<String>) {
        *self.access_token.write().await = Some(token.into());
    }

    /// Look up the drive root of the token's user, ready to be selected for export
    pub async fn drive_root(&self) -> std::result::Result<SelectedNode, ProviderError> {
        let url = format!("{}/drive/explorer/v2/root_folder/meta", self.endpoint);
        let meta: RootFolderMeta = self.get_json(&url, &[]).await?;
        Ok(SelectedNode {
            name: DRIVE_ROOT_NAME.to_string(),
            payload: NodePayload::DriveRoot { token: meta.token },
        })
    }

    /// The virtual root of all wiki spaces, ready to be selected for export
    pub fn wiki_root() -> SelectedNode {
        SelectedNode {
            name: WIKI_ROOT_NAME.to_string(),
            payload: NodePayload::WikiRoot,
        }
    }

    async fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.access_token.read().await.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> std::result::Result<T, ProviderError> {
        let request = self.authorized(self.client.get(url).query(query)).await;
        let response = request.send().await.map_err(ProviderError::from)?;
        Self::decode(url, response).await
    }

    async fn decode<T: DeserializeOwned>(
        url: &str,
        response: reqwest::Response,
    ) -> std::result::Result<T, ProviderError> {
        let status = response.status();
        let body = response.bytes().await.map_err(ProviderError::from)?;

        let envelope: Envelope<T> = match serde_json::from_slice(&body) {
            Ok(envelope) => envelope,
            Err(e) => {
                if !status.is_success() {
                    return Err(api_error_or_http(status, url, &body));
                }
                return Err(ProviderError::Decode(format!("{}: {}", url, e)));
            }
        };

        if envelope.code != 0 {
            return Err(ProviderError::Api {
                code: envelope.code,
                message: envelope.msg,
            });
        }
        if !status.is_success() {
            return Err(ProviderError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        envelope
            .data
            .ok_or_else(|| ProviderError::Decode(format!("{}: response has no data", url)))
    }

    async fn list_pages<T: DeserializeOwned>(
        &self,
        url: &str,
        query: Vec<(&str, String)>,
    ) -> std::result::Result<Vec<T>, ProviderError> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut page_query = query.clone();
            if let Some(token) = &page_token {
                page_query.push(("page_token", token.clone()));
            }

            let page: Page<T> = self.get_json(url, &page_query).await?;
            items.extend(page.items);

            match page.page_token {
                Some(next) if page.has_more && !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        Ok(items)
    }

    async fn list_folder(
        &self,
        folder_token: &str,
    ) -> std::result::Result<Vec<RemoteEntry>, ProviderError> {
        let url = format!("{}/drive/v1/files", self.endpoint);
        let mut query = vec![("page_size", self.drive_page_size.to_string())];
        if !folder_token.is_empty() {
            query.push(("folder_token", folder_token.to_string()));
        }

        let files: Vec<DriveFile> = self.list_pages(&url, query).await?;
        Ok(files
            .into_iter()
            .map(|f| {
                let payload = if f.file_type == "folder" {
                    NodePayload::Folder { token: f.token }
                } else {
                    NodePayload::File {
                        token: f.token,
                        file_type: f.file_type,
                        shortcut: f.shortcut_info,
                    }
                };
                RemoteEntry {
                    name: f.name,
                    payload,
                }
            })
            .collect())
    }

    async fn list_spaces(&self) -> std::result::Result<Vec<RemoteEntry>, ProviderError> {
        let url = format!("{}/wiki/v2/spaces", self.endpoint);
        let query = vec![("page_size", self.wiki_space_page_size.to_string())];

        let spaces: Vec<WikiSpace> = self.list_pages(&url, query).await?;
        Ok(spaces
            .into_iter()
            .map(|s| RemoteEntry {
                name: s.name,
                payload: NodePayload::WikiSpace {
                    space_id: s.space_id,
                },
            })
            .collect())
    }

    async fn list_space_nodes(
        &self,
        space_id: &str,
        parent_node_token: Option<&str>,
    ) -> std::result::Result<Vec<RemoteEntry>, ProviderError> {
        let url = format!(
            "{}/wiki/v2/spaces/{}/nodes",
            self.endpoint,
            urlencoding::encode(space_id)
        );
        let mut query = vec![("page_size", self.wiki_node_page_size.to_string())];
        if let Some(parent) = parent_node_token {
            query.push(("parent_node_token", parent.to_string()));
        }

        let nodes: Vec<WikiNode> = self.list_pages(&url, query).await?;
        Ok(nodes
            .into_iter()
            .map(|n| RemoteEntry {
                name: n.title,
                payload: NodePayload::WikiNode {
                    space_id: n.space_id,
                    node_token: n.node_token,
                    obj_token: n.obj_token,
                    obj_type: n.obj_type,
                    has_child: n.has_child,
                },
            })
            .collect())
    }

    async fn download_to(&self, url: &str, dest: &Path) -> std::result::Result<u64, ProviderError> {
        let request = self.authorized(self.client.get(url)).await;
        let response = request.send().await.map_err(ProviderError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(api_error_or_http(status, url, &body));
        }

        let part = part_path(dest);
        match write_stream(response, &part).await {
            Ok(written) => {
                tokio::fs::rename(&part, dest)
                    .await
                    .map_err(|e| write_error(dest, e))?;
                tracing::debug!(url, dest = %dest.display(), bytes = written, "Downloaded file");
                Ok(written)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                Err(e)
            }
        }
    }
}

async fn write_stream(
    response: reqwest::Response,
    part: &Path,
) -> std::result::Result<u64, ProviderError> {
    let mut file = tokio::fs::File::create(part)
        .await
        .map_err(|e| write_error(part, e))?;

    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(ProviderError::from)?;
        file.write_all(&chunk)
            .await
            .map_err(|e| write_error(part, e))?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| write_error(part, e))?;

    Ok(written)
}

fn write_error(path: &Path, e: std::io::Error) -> ProviderError {
    ProviderError::Write {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

// Error responses usually still carry the envelope with a business code
fn api_error_or_http(status: reqwest::StatusCode, url: &str, body: &[u8]) -> ProviderError {
    match serde_json::from_slice::<Envelope<serde_json::Value>>(body) {
        Ok(envelope) if envelope.code != 0 => ProviderError::Api {
            code: envelope.code,
            message: envelope.msg,
        },
        _ => ProviderError::Http {
            status: status.as_u16(),
            url: url.to_string(),
        },
    }
}

#[async_trait]
impl ContentProvider for FeishuProvider {
    async fn list_children(
        &self,
        parent: &NodePayload,
    ) -> std::result::Result<Vec<RemoteEntry>, ProviderError> {
        match parent {
            NodePayload::DriveRoot { token } | NodePayload::Folder { token } => {
                self.list_folder(token).await
            }
            NodePayload::WikiRoot => self.list_spaces().await,
            NodePayload::WikiSpace { space_id } => self.list_space_nodes(space_id, None).await,
            NodePayload::WikiNode {
                space_id,
                node_token,
                ..
            } => self.list_space_nodes(space_id, Some(node_token)).await,
            NodePayload::File { .. } => Ok(Vec::new()),
        }
    }

    async fn start_export_job(
        &self,
        leaf: &ResolvedLeaf,
        extension: &str,
    ) -> std::result::Result<ExportJob, ProviderError> {
        let url = format!("{}/drive/v1/export_tasks", self.endpoint);
        let body = serde_json::json!({
            "file_extension": extension,
            "token": leaf.token,
            "type": leaf.doc_type.as_str(),
        });

        let request = self.authorized(self.client.post(&url).json(&body)).await;
        let response = request.send().await.map_err(ProviderError::from)?;
        let ticket: ExportTicket = Self::decode(&url, response).await?;

        tracing::debug!(ticket = %ticket.ticket, token = %leaf.token, "Export job created");
        Ok(ExportJob {
            ticket: ticket.ticket,
            token: leaf.token.clone(),
        })
    }

    async fn poll_export_job(
        &self,
        job: &ExportJob,
    ) -> std::result::Result<ExportJobStatus, ProviderError> {
        let url = format!(
            "{}/drive/v1/export_tasks/{}",
            self.endpoint,
            urlencoding::encode(&job.ticket)
        );
        let data: ExportResultData = self.get_json(&url, &[("token", job.token.clone())]).await?;
        let result = data.result;

        Ok(match result.job_status {
            0 => ExportJobStatus::Done(ArtifactRef {
                file_token: result.file_token,
                file_size: result.file_size,
            }),
            1 => ExportJobStatus::Pending,
            2 => ExportJobStatus::Processing,
            other if result.job_error_msg.is_empty() => {
                ExportJobStatus::Failed(format!("job status {}", other))
            }
            _ => ExportJobStatus::Failed(result.job_error_msg),
        })
    }

    async fn download_artifact(
        &self,
        artifact: &ArtifactRef,
        dest: &Path,
    ) -> std::result::Result<u64, ProviderError> {
        let url = format!(
            "{}/drive/v1/export_tasks/file/{}/download",
            self.endpoint,
            urlencoding::encode(&artifact.file_token)
        );
        self.download_to(&url, dest).await
    }

    async fn download_direct(
        &self,
        leaf: &ResolvedLeaf,
        dest: &Path,
    ) -> std::result::Result<u64, ProviderError> {
        let url = format!(
            "{}/drive/v1/files/{}/download",
            self.endpoint,
            urlencoding::encode(&leaf.token)
        );
        self.download_to(&url, dest).await
    }
}
