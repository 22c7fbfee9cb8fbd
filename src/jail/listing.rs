//! Gitignore-aware recursive directory listing for the `list_directory`
//! tool.

use std::path::Path;

use serde::Serialize;

use crate::jail::gitignore::GitignoreFilter;
use crate::jail::JailError;

/// Directory names never worth descending into, gitignore or not.
const SKIP_DIRS: &[&str] = &["node_modules", ".git"];

#[derive(Debug, Clone, Serialize)]
pub struct ListEntry {
    pub name: String,
    /// Workspace-relative, `/`-separated.
    pub path: String,
    pub is_dir: bool,
    pub depth: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Listing {
    pub entries: Vec<ListEntry>,
    pub truncated: bool,
}

/// Walk `dir` (already jail-resolved) depth-first. Symlinks, dotfiles, and
/// the fixed skip-set are dropped; the gitignore filter applies per entry
/// and prunes ignored directories. Each level lists directories first, then
/// lexicographically.
pub fn list_directory(
    root: &Path,
    dir: &Path,
    filter: &GitignoreFilter,
    max_depth: usize,
    max_entries: usize,
) -> Result<Listing, JailError> {
    let metadata = std::fs::metadata(dir)
        .map_err(|_| JailError::FileNotFound(dir.to_string_lossy().into_owned()))?;
    if !metadata.is_dir() {
        return Err(JailError::InvalidInput(format!(
            "not a directory: {}",
            dir.display()
        )));
    }

    let mut listing = Listing {
        entries: Vec::new(),
        truncated: false,
    };
    walk(root, dir, filter, 0, max_depth, max_entries, &mut listing)?;
    Ok(listing)
}

fn walk(
    root: &Path,
    dir: &Path,
    filter: &GitignoreFilter,
    depth: usize,
    max_depth: usize,
    max_entries: usize,
    listing: &mut Listing,
) -> Result<(), JailError> {
    let read_dir = std::fs::read_dir(dir).map_err(|e| {
        JailError::PermissionDenied(format!("cannot read {}: {e}", dir.display()))
    })?;

    struct Candidate {
        name: String,
        rel: String,
        is_dir: bool,
        path: std::path::PathBuf,
    }

    let mut level: Vec<Candidate> = Vec::new();
    for item in read_dir.flatten() {
        let name = item.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || SKIP_DIRS.contains(&name.as_str()) {
            continue;
        }
        let Ok(file_type) = item.file_type() else {
            continue;
        };
        if file_type.is_symlink() {
            continue;
        }
        let path = item.path();
        let rel = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");
        let is_dir = file_type.is_dir();
        if filter.is_ignored(&rel, is_dir) {
            continue;
        }
        level.push(Candidate {
            name,
            rel,
            is_dir,
            path,
        });
    }

    level.sort_by(|a, b| {
        b.is_dir
            .cmp(&a.is_dir)
            .then_with(|| a.name.cmp(&b.name))
    });

    for candidate in level {
        if listing.entries.len() >= max_entries {
            listing.truncated = true;
            return Ok(());
        }
        listing.entries.push(ListEntry {
            name: candidate.name,
            path: candidate.rel,
            is_dir: candidate.is_dir,
            depth,
        });
        if candidate.is_dir && depth < max_depth {
            walk(
                root,
                &candidate.path,
                filter,
                depth + 1,
                max_depth,
                max_entries,
                listing,
            )?;
            if listing.truncated {
                return Ok(());
            }
        }
    }
    Ok(())
}
