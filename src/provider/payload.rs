//! Remote node payloads and leaf resolution

use crate::error::ProviderError;
use crate::types::NodeKind;
use serde::{Deserialize, Serialize};

/// Target of a drive shortcut
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortcutTarget {
    /// Token of the document the shortcut points to
    pub target_token: String,
    /// Type of the document the shortcut points to
    pub target_type: String,
}

/// Provider-specific identity of a remote node
///
/// Persisted as JSON with every node, so it carries everything needed to list
/// a container or fetch a leaf after a process restart.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodePayload {
    /// The user's drive root ("My Space")
    DriveRoot {
        /// Root folder token
        token: String,
    },
    /// Drive folder
    Folder {
        /// Folder token
        token: String,
    },
    /// Drive file, online document or shortcut
    File {
        /// File token
        token: String,
        /// Drive file type (doc, docx, sheet, bitable, file, shortcut, ...)
        file_type: String,
        /// Shortcut target when `file_type` is "shortcut"
        #[serde(default, skip_serializing_if = "Option::is_none")]
        shortcut: Option<ShortcutTarget>,
    },
    /// Virtual root listing every wiki space the user can see
    WikiRoot,
    /// Wiki space
    WikiSpace {
        /// Space ID
        space_id: String,
    },
    /// Wiki page, backed by a document object
    WikiNode {
        /// Space the page lives in
        space_id: String,
        /// Page token (used to list children)
        node_token: String,
        /// Token of the backing document
        obj_token: String,
        /// Type of the backing document
        obj_type: String,
        /// Whether the page has child pages
        #[serde(default)]
        has_child: bool,
    },
}

impl NodePayload {
    /// Node kind of this payload
    pub fn kind(&self) -> NodeKind {
        match self {
            NodePayload::DriveRoot { .. } => NodeKind::DriveRoot,
            NodePayload::Folder { .. } => NodeKind::Folder,
            NodePayload::File { .. } => NodeKind::File,
            NodePayload::WikiRoot => NodeKind::WikiRoot,
            NodePayload::WikiSpace { .. } => NodeKind::WikiSpace,
            NodePayload::WikiNode { .. } => NodeKind::WikiNode,
        }
    }

    /// Whether discovery must expand this node
    ///
    /// Wiki pages are containers only when they report child pages; every
    /// drive file (shortcuts included) is a leaf.
    pub fn is_container(&self) -> bool {
        match self {
            NodePayload::DriveRoot { .. }
            | NodePayload::Folder { .. }
            | NodePayload::WikiRoot
            | NodePayload::WikiSpace { .. } => true,
            NodePayload::WikiNode { has_child, .. } => *has_child,
            NodePayload::File { .. } => false,
        }
    }

    /// Whether children of this node are placed next to it instead of inside it
    ///
    /// The drive root is not materialized as a directory.
    pub fn is_transparent(&self) -> bool {
        matches!(self, NodePayload::DriveRoot { .. })
    }

    /// Follow one level of indirection to the document that gets downloaded
    ///
    /// Shortcuts resolve to their target and wiki pages to their backing
    /// object. Containers cannot be resolved.
    pub fn resolve(&self) -> Result<ResolvedLeaf, ProviderError> {
        match self {
            NodePayload::File {
                shortcut: Some(target),
                ..
            } => Ok(ResolvedLeaf {
                token: target.target_token.clone(),
                doc_type: DocType::parse(&target.target_type),
            }),
            NodePayload::File {
                token, file_type, ..
            } => Ok(ResolvedLeaf {
                token: token.clone(),
                doc_type: DocType::parse(file_type),
            }),
            NodePayload::WikiNode {
                obj_token,
                obj_type,
                ..
            } => Ok(ResolvedLeaf {
                token: obj_token.clone(),
                doc_type: DocType::parse(obj_type),
            }),
            other => Err(ProviderError::Unsupported(format!(
                "{} nodes have no content to download",
                other.kind().as_str()
            ))),
        }
    }

    /// Whether a wiki page with children also has exportable content of its own
    pub fn has_own_content(&self) -> bool {
        match self {
            NodePayload::WikiNode {
                has_child: true,
                obj_type,
                ..
            } => !matches!(DocType::parse(obj_type).export_mode(), ExportMode::Unsupported),
            _ => false,
        }
    }

    /// Same node treated as a leaf, used for the own content of wiki pages
    pub fn as_leaf(&self) -> NodePayload {
        match self {
            NodePayload::WikiNode {
                space_id,
                node_token,
                obj_token,
                obj_type,
                ..
            } => NodePayload::WikiNode {
                space_id: space_id.clone(),
                node_token: node_token.clone(),
                obj_token: obj_token.clone(),
                obj_type: obj_type.clone(),
                has_child: false,
            },
            other => other.clone(),
        }
    }
}

/// Document type of a resolved leaf
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DocType {
    /// Legacy document
    Doc,
    /// New-style document
    Docx,
    /// Spreadsheet
    Sheet,
    /// Multi-dimensional table
    Bitable,
    /// Mind map
    Mindnote,
    /// Presentation
    Slides,
    /// Uploaded binary file
    File,
    /// Anything else the API may report
    Other(String),
}

/// How a resolved leaf is fetched
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportMode {
    /// Download the stored bytes as they are
    Direct,
    /// Run a remote export job and download its artifact
    Export {
        /// Extension of the exported artifact
        extension: &'static str,
    },
    /// Nothing to fetch
    Unsupported,
}

impl DocType {
    /// Parse the type string reported by the API
    pub fn parse(s: &str) -> Self {
        match s {
            "doc" => DocType::Doc,
            "docx" => DocType::Docx,
            "sheet" => DocType::Sheet,
            "bitable" => DocType::Bitable,
            "mindnote" => DocType::Mindnote,
            "slides" => DocType::Slides,
            "file" => DocType::File,
            other => DocType::Other(other.to_string()),
        }
    }

    /// Type string as used by the API
    pub fn as_str(&self) -> &str {
        match self {
            DocType::Doc => "doc",
            DocType::Docx => "docx",
            DocType::Sheet => "sheet",
            DocType::Bitable => "bitable",
            DocType::Mindnote => "mindnote",
            DocType::Slides => "slides",
            DocType::File => "file",
            DocType::Other(s) => s,
        }
    }

    /// Extension an export of this type produces
    pub fn export_extension(&self) -> &'static str {
        match self {
            DocType::Doc | DocType::Docx => "docx",
            DocType::Sheet | DocType::Bitable => "xlsx",
            DocType::Slides => "pptx",
            _ => "pdf",
        }
    }

    /// Fetch strategy for this type
    pub fn export_mode(&self) -> ExportMode {
        match self {
            DocType::File => ExportMode::Direct,
            DocType::Doc | DocType::Docx | DocType::Sheet | DocType::Bitable => {
                ExportMode::Export {
                    extension: self.export_extension(),
                }
            }
            DocType::Mindnote | DocType::Slides | DocType::Other(_) => ExportMode::Unsupported,
        }
    }
}

/// A leaf after indirection has been resolved
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedLeaf {
    /// Token of the document to fetch
    pub token: String,
    /// Document type
    pub doc_type: DocType,
}
