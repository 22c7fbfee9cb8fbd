//! Path jail: the containment boundary every file tool goes through.
//!
//! [`resolve`] validates a workspace-relative path and maps it onto the
//! workspace root, rejecting traversal, absolute paths, and symlinked
//! components. Violations are rejected with a specific error code, never
//! silently repaired. The only filesystem access is the symlink check;
//! everything else is lexical, so the boundary is reusable by any tool.

pub mod gitignore;
pub mod listing;


use std::path::{Component, Path, PathBuf};

use serde::Serialize;

/// Security and lookup failures surfaced by the jail and the file tools.
#[derive(Debug, thiserror::Error)]
pub enum JailError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("path traversal rejected: {0}")]
    PathTraversal(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("no workspace folder is set")]
    WorkspaceNotSet,
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("denied by user: {0}")]
    UserDenied(String),
}

impl JailError {
    pub const fn code(&self) -> &'static str {
        match self {
            JailError::InvalidInput(_) => "INVALID_INPUT",
            JailError::PathTraversal(_) => "PATH_TRAVERSAL",
            JailError::PermissionDenied(_) => "PERMISSION_DENIED",
            JailError::WorkspaceNotSet => "WORKSPACE_NOT_SET",
            JailError::FileNotFound(_) => "FILE_NOT_FOUND",
            JailError::UserDenied(_) => "USER_DENIED",
        }
    }

    /// Structured form the orchestrator feeds back to the model.
    pub fn to_result_value(&self) -> serde_json::Value {
        serde_json::json!({"error": self.to_string(), "code": self.code()})
    }
}

impl Serialize for JailError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_result_value().serialize(serializer)
    }
}

/// Resolve `relative` against `root`, enforcing containment.
///
/// Checks run in a fixed order: input validation (empty, NUL/control
/// characters, platform-invalid characters), traversal-pattern rejection
/// (`..` segments, `~`, absolute and UNC paths, drive letters), lexical
/// normalization plus containment, and finally a component walk that
/// rejects any existing symlink between the root and the target.
/// Non-existent trailing components are permitted so tools can write new
/// files.
pub fn resolve(root: &Path, relative: &str) -> Result<PathBuf, JailError> {
    if relative.trim().is_empty() {
        return Err(JailError::InvalidInput("path must not be empty".into()));
    }
    if relative
        .chars()
        .any(|c| c == '\0' || (c.is_control() && c != '\t'))
    {
        return Err(JailError::InvalidInput(
            "path contains control characters".into(),
        ));
    }
    #[cfg(windows)]
    if relative.chars().any(|c| matches!(c, '<' | '>' | '"' | '|' | '?' | '*')) {
        return Err(JailError::InvalidInput(format!(
            "path contains characters invalid on this platform: {relative}"
        )));
    }

    reject_traversal_patterns(relative)?;

    let resolved = normalize_under_root(root, relative)?;

    if !is_contained(root, &resolved) {
        return Err(JailError::PathTraversal(format!(
            "resolved path escapes the workspace: {relative}"
        )));
    }

    reject_symlink_components(root, &resolved)?;

    Ok(resolved)
}

/// Fixed set of shapes that can only mean an escape attempt.
fn reject_traversal_patterns(relative: &str) -> Result<(), JailError> {
    let rejected = relative == ".."
        || relative.starts_with("../")
        || relative.starts_with("..\\")
        || relative.contains("/../")
        || relative.contains("\\..\\")
        || relative.ends_with("/..")
        || relative.ends_with("\\..")
        || relative.starts_with('~')
        || relative.starts_with('/')
        || relative.starts_with('\\')
        || is_drive_absolute(relative);
    if rejected {
        return Err(JailError::PathTraversal(format!(
            "path escapes the workspace: {relative}"
        )));
    }
    Ok(())
}

/// `C:\…`, `C:/…`, and also bare `C:` which Windows treats as drive-relative.
fn is_drive_absolute(relative: &str) -> bool {
    let bytes = relative.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Join and lexically normalize without touching the filesystem. `..`
/// segments were rejected above; a popped-past-root component here means
/// the pattern check was bypassed, which is still an escape.
fn normalize_under_root(root: &Path, relative: &str) -> Result<PathBuf, JailError> {
    let mut resolved = root.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if resolved == root || !resolved.pop() {
                    return Err(JailError::PathTraversal(format!(
                        "path escapes the workspace: {relative}"
                    )));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(JailError::PathTraversal(format!(
                    "absolute path rejected: {relative}"
                )));
            }
        }
    }
    Ok(resolved)
}

fn is_contained(root: &Path, candidate: &Path) -> bool {
    if candidate.starts_with(root) {
        return true;
    }
    // Windows paths compare case-insensitively.
    #[cfg(windows)]
    {
        let root_str = root.to_string_lossy().to_lowercase();
        let candidate_str = candidate.to_string_lossy().to_lowercase();
        return candidate_str == root_str
            || candidate_str.starts_with(&format!("{root_str}\\"))
            || candidate_str.starts_with(&format!("{root_str}/"));
    }
    #[cfg(not(windows))]
    false
}

/// Walk each component from the root down to the target; any existing
/// symlink on the way is an escape hatch and gets rejected. Components that
/// do not exist yet are fine (write-to-new-file).
fn reject_symlink_components(root: &Path, resolved: &Path) -> Result<(), JailError> {
    let Ok(remainder) = resolved.strip_prefix(root) else {
        return Ok(());
    };
    let mut current = root.to_path_buf();
    for component in remainder.components() {
        current.push(component);
        match std::fs::symlink_metadata(&current) {
            Ok(metadata) => {
                if metadata.file_type().is_symlink() {
                    return Err(JailError::PermissionDenied(format!(
                        "symbolic links are not allowed inside the workspace: {}",
                        current.display()
                    )));
                }
            }
            // Not existing yet is allowed; anything deeper cannot exist
            // either, so the walk is done.
            Err(_) => break,
        }
    }
    Ok(())
}
