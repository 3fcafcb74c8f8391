//! Remote content providers
//!
//! The orchestrator only talks to the [`ContentProvider`] trait. Node identity
//! is carried by [`NodePayload`], which is persisted with every node and
//! resolved to a [`ResolvedLeaf`] right before a download.
//!
//! [`FeishuProvider`] implements the trait on top of the Feishu open API.

mod feishu;
mod payload;
mod traits;

pub use feishu::{DRIVE_ROOT_NAME, FeishuProvider, WIKI_ROOT_NAME};
pub use payload::{DocType, ExportMode, NodePayload, ResolvedLeaf, ShortcutTarget};
pub use traits::{ArtifactRef, ContentProvider, ExportJob, ExportJobStatus, RemoteEntry};
