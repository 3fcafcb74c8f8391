//! Tree discovery - lazily expands container nodes into their children.
//!
//! Every pass lists the containers of a task that are not expanded yet,
//! inserts the children that are not stored yet and then marks the container
//! expanded. Children are inserted before the flag is set, so the scheduler
//! never sees "no unexpanded containers" while a listing result is still
//! unsaved.

use crate::db::{NewNode, Node};
use crate::error::Result;
use crate::provider::{ExportMode, NodePayload};
use crate::retry::{Backoff, retry_with_backoff};
use crate::types::{DiscoveredNode, Event, TaskId};
use crate::utils::{leaf_file_name, sanitize_component};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

use super::Exporter;

impl Exporter {
    /// Expand containers of a task until none is left or the run is cancelled
    ///
    /// Store failures never end the loop: they are logged and retried after
    /// an exponential back-off.
    pub(crate) async fn run_discovery(&self, id: TaskId, token: &CancellationToken) {
        let concurrency = self.config.discovery.discovery_concurrency.max(1);
        let mut backoff = Backoff::new(
            self.config.export.store_retry_delay,
            self.config.export.store_retry_max_delay,
        );
        let mut pass = 0u32;

        loop {
            if token.is_cancelled() {
                tracing::debug!(task_id = id.0, "Discovery cancelled");
                return;
            }

            let containers = match self.db.get_unexpanded_containers(id).await {
                Ok(containers) => containers,
                Err(e) => {
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        task_id = id.0,
                        error = %e,
                        failures = backoff.failures(),
                        delay_ms = delay.as_millis(),
                        "Failed to query unexpanded containers, backing off"
                    );
                    if !Self::wait_or_cancel(token, delay).await {
                        return;
                    }
                    continue;
                }
            };

            if containers.is_empty() {
                tracing::debug!(task_id = id.0, passes = pass, "Tree discovery finished");
                return;
            }

            pass += 1;
            tracing::debug!(
                task_id = id.0,
                pass,
                containers = containers.len(),
                "Expanding containers"
            );

            let results: Vec<Result<()>> = stream::iter(containers)
                .map(|container| self.expand_container(id, container, token))
                .buffer_unordered(concurrency)
                .collect()
                .await;

            match results.into_iter().find_map(|r| r.err()) {
                None => backoff.reset(),
                Some(e) => {
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        task_id = id.0,
                        error = %e,
                        failures = backoff.failures(),
                        delay_ms = delay.as_millis(),
                        "Failed to store discovered nodes, backing off"
                    );
                    if !Self::wait_or_cancel(token, delay).await {
                        return;
                    }
                }
            }
        }
    }

    /// List one container and store its new children
    ///
    /// Listing failures are retried and then recorded on the container, which
    /// is marked expanded anyway. Only store errors are returned; the
    /// container then stays unexpanded and is picked up by the next pass.
    pub(crate) async fn expand_container(
        &self,
        id: TaskId,
        container: Node,
        token: &CancellationToken,
    ) -> Result<()> {
        if token.is_cancelled() {
            return Ok(());
        }

        let listing = tokio::select! {
            _ = token.cancelled() => return Ok(()),
            listing = retry_with_backoff(&self.config.discovery.list_retry, || {
                self.provider.list_children(&container.payload)
            }) => listing,
        };

        let child_path = container.child_path();
        let mut new_nodes = Vec::new();

        match listing {
            Ok(entries) => {
                // Keyed by the name on disk: two remote names that sanitize
                // to the same file would otherwise overwrite each other
                let mut seen = HashSet::new();

                // A wiki page with child pages still has its own document
                if container.payload.has_own_content() {
                    seen.insert(local_name(&container.name, &container.payload.as_leaf()));
                    if !self.db.node_exists(id, &child_path, &container.name).await? {
                        new_nodes.push(NewNode {
                            task_id: id,
                            parent_id: Some(container.id),
                            name: container.name.clone(),
                            virtual_path: child_path.clone(),
                            is_leaf: true,
                            payload: container.payload.as_leaf(),
                        });
                    }
                }

                for entry in entries {
                    if !seen.insert(local_name(&entry.name, &entry.payload)) {
                        tracing::warn!(
                            task_id = id.0,
                            container_id = container.id.0,
                            name = %entry.name,
                            "Skipping entry whose local name is already taken"
                        );
                        continue;
                    }
                    if self.db.node_exists(id, &child_path, &entry.name).await? {
                        continue;
                    }
                    new_nodes.push(NewNode {
                        task_id: id,
                        parent_id: Some(container.id),
                        is_leaf: !entry.payload.is_container(),
                        name: entry.name,
                        virtual_path: child_path.clone(),
                        payload: entry.payload,
                    });
                }
            }
            Err(e) => {
                tracing::warn!(
                    task_id = id.0,
                    container_id = container.id.0,
                    container = %container.name,
                    error = %e,
                    "Failed to list container, skipping its children"
                );
                self.db
                    .set_node_error(container.id, Some(&e.to_string()))
                    .await?;
            }
        }

        let inserted = self.db.insert_nodes(&new_nodes).await?;
        self.db
            .mark_container_expanded(id, &container.virtual_path, &container.name)
            .await?;

        if !inserted.is_empty() {
            tracing::debug!(
                task_id = id.0,
                container_id = container.id.0,
                inserted = inserted.len(),
                "Discovered new nodes"
            );
            self.emit_event(Event::NodesDiscovered {
                task_id: id,
                nodes: inserted.iter().map(DiscoveredNode::from).collect(),
            });
            self.recompute_progress(id, true).await?;
        }

        Ok(())
    }
}

/// Name a node occupies in its parent's output directory
pub(crate) fn local_name(name: &str, payload: &NodePayload) -> String {
    if payload.is_container() {
        return sanitize_component(name);
    }
    let extension = payload
        .resolve()
        .ok()
        .and_then(|leaf| match leaf.doc_type.export_mode() {
            ExportMode::Export { extension } => Some(extension),
            ExportMode::Direct | ExportMode::Unsupported => None,
        });
    leaf_file_name(name, extension)
}
