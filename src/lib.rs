//! # feishu-export
//!
//! Resumable export of Feishu drive folders and wiki spaces into a local
//! directory tree.
//!
//! ## Design Philosophy
//!
//! feishu-export is designed to be:
//! - **Resumable** - Every discovered node and file status is persisted, so an
//!   interrupted export continues where it stopped, even in a new process
//! - **Concurrent** - Tree discovery and downloads of one task run side by side
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use feishu_export::{Config, ExportRequest, Exporter, FeishuProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.provider.access_token = Some("u-xxxx".to_string());
//!
//!     let exporter = Exporter::with_feishu(config).await?;
//!
//!     // Subscribe to events
//!     let mut events = exporter.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let id = exporter
//!         .create_task(ExportRequest {
//!             name: "Wiki backup".to_string(),
//!             description: None,
//!             output_path: "/backups/wiki".into(),
//!             roots: vec![FeishuProvider::wiki_root()],
//!         })
//!         .await?;
//!
//!     exporter.start(id).await?.await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Export orchestrator (decomposed into focused submodules)
pub mod exporter;
/// Remote content provider interface and the Feishu implementation
pub mod provider;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{Config, DiscoveryConfig, ExportConfig, ProviderConfig, RetryConfig};
pub use db::Database;
pub use error::{DatabaseError, Error, ProviderError, Result, TaskError};
pub use exporter::Exporter;
pub use provider::{
    ContentProvider, DocType, ExportMode, FeishuProvider, NodePayload, RemoteEntry,
};
pub use types::{
    DiscoveredNode, Event, ExportRequest, FileStatus, LeafCounts, NodeId, NodeKind, SelectedNode,
    TaskId, TaskInfo, TaskStatus,
};

/// Helper function to run the exporter with graceful signal handling.
///
/// Waits for a termination signal and then calls the exporter's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use feishu_export::{Config, Exporter, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut config = Config::default();
///     config.export.auto_resume = true;
///     let exporter = Exporter::with_feishu(config).await?;
///
///     // Unfinished tasks were resumed by `with_feishu`; stop cleanly on a signal
///     run_with_shutdown(exporter).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(exporter: Exporter) -> Result<()> {
    wait_for_signal().await;
    exporter.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
