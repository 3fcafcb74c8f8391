//! Utility functions for path manipulation

use std::path::{Path, PathBuf};

/// Characters that are invalid in file names on at least one supported platform
const INVALID_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Make a remote node name safe to use as a single path component
///
/// Path separators, reserved characters and control characters are replaced
/// with `_`, trailing dots and spaces are dropped (Windows silently strips
/// them), and empty or relative names (`.`, `..`) are replaced.
///
/// # Examples
///
/// ```
/// use feishu_export::utils::sanitize_component;
///
/// assert_eq!(sanitize_component("Q1/Q2 plan"), "Q1_Q2 plan");
/// assert_eq!(sanitize_component(".."), "_");
/// ```
pub fn sanitize_component(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if INVALID_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = replaced.trim().trim_end_matches(['.', ' ']);

    match trimmed {
        "" if replaced.trim().is_empty() => "untitled".to_string(),
        "" => "_".to_string(),
        other => other.to_string(),
    }
}

/// Local directory for a node's virtual path under the output root
pub fn local_dir(output_root: &Path, virtual_path: &[String]) -> PathBuf {
    let mut dir = output_root.to_path_buf();
    for component in virtual_path {
        dir.push(sanitize_component(component));
    }
    dir
}

/// File name of a leaf in the output directory
///
/// Exported documents always get the extension of their export format
/// appended, even if the remote name already ends with it; direct downloads
/// keep their (sanitized) remote name.
pub fn leaf_file_name(name: &str, extension: Option<&str>) -> String {
    let mut file_name = sanitize_component(name);
    if let Some(ext) = extension {
        file_name.push('.');
        file_name.push_str(ext);
    }
    file_name
}

/// Local destination of a leaf, optionally with an export extension
pub fn leaf_destination(
    output_root: &Path,
    virtual_path: &[String],
    name: &str,
    extension: Option<&str>,
) -> PathBuf {
    local_dir(output_root, virtual_path).join(leaf_file_name(name, extension))
}

/// Temporary path a download is streamed into before being renamed over `dest`
pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}
