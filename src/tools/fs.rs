//! Filesystem tools for reading, writing, and listing workspace files.
//!
//! Every path argument passes through the path jail before any I/O.

use crate::jail::gitignore::GitignoreFilter;
use crate::jail::{self, listing, JailError};
use crate::provider::types::ToolDefinition;
use crate::tools::types::{
    bounded_u64, optional_bool, optional_str, required_str, Args, NumberSpec, Tool, ToolContext,
    ToolError,
};

/// Read a file inside the workspace, optionally a line window of it.
pub struct ReadFileTool;

#[async_trait::async_trait]
impl Tool for ReadFileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "read_file".into(),
            description: "Read the contents of a file in the workspace. Supports reading a window of lines with offset/limit for large files.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "File path relative to the workspace root"},
                    "offset": {"type": "integer", "description": "Start reading from this line number (1-indexed). Default: 1."},
                    "limit": {"type": "integer", "description": "Maximum number of lines to read. Default: 2000."}
                },
                "required": ["path"]
            }),
        }
    }

    async fn execute(
        &self,
        args: &Args,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, ToolError> {
        let path = required_str("read_file", args, "path")?;
        let offset = bounded_u64(
            "read_file",
            args,
            "offset",
            NumberSpec {
                default: 1,
                min: 1,
                max: u64::MAX,
            },
        )?;
        let limit = bounded_u64(
            "read_file",
            args,
            "limit",
            NumberSpec {
                default: 2000,
                min: 1,
                max: 100_000,
            },
        )?;

        let root = ctx.workspace_root()?;
        let full = jail::resolve(root, path)?;

        let content = tokio::fs::read_to_string(&full).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ToolError::Jail(JailError::FileNotFound(path.to_string()))
            } else {
                ToolError::Execution(format!("failed to read {path}: {e}"))
            }
        })?;

        let total_lines = content.lines().count();
        let window: Vec<&str> = content
            .lines()
            .skip((offset - 1) as usize)
            .take(limit as usize)
            .collect();

        Ok(serde_json::json!({
            "path": path,
            "content": window.join("\n"),
            "offset": offset,
            "lines_returned": window.len(),
            "total_lines": total_lines,
        }))
    }
}

/// Write a file inside the workspace, creating parent directories as
/// needed. Overwrites ask the confirmation collaborator first when the
/// settings demand it.
pub struct WriteFileTool;

#[async_trait::async_trait]
impl Tool for WriteFileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "write_file".into(),
            description: "Write content to a file in the workspace. Creates the file and any missing parent directories; overwrites after confirmation.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "File path relative to the workspace root"},
                    "content": {"type": "string", "description": "Full file content to write"}
                },
                "required": ["path", "content"]
            }),
        }
    }

    async fn execute(
        &self,
        args: &Args,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, ToolError> {
        let path = required_str("write_file", args, "path")?;
        let content = required_str("write_file", args, "content")?;

        let root = ctx.workspace_root()?;
        let full = jail::resolve(root, path)?;

        let existed = tokio::fs::try_exists(&full).await.unwrap_or(false);
        if existed && ctx.settings.confirm_overwrite {
            let approved = ctx
                .confirmer
                .confirm(&format!("Overwrite existing file {path}?"))
                .await;
            if !approved {
                return Err(ToolError::Jail(JailError::UserDenied(format!(
                    "overwrite of {path} was declined"
                ))));
            }
        }

        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::Execution(format!("failed to create directories: {e}")))?;
        }
        tokio::fs::write(&full, content)
            .await
            .map_err(|e| ToolError::Execution(format!("failed to write {path}: {e}")))?;

        Ok(serde_json::json!({
            "path": path,
            "bytes_written": content.len(),
            "created": !existed,
        }))
    }
}

/// List workspace contents, `.gitignore`-aware.
pub struct ListDirectoryTool;

#[async_trait::async_trait]
impl Tool for ListDirectoryTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_directory".into(),
            description: "List files and directories in the workspace. Respects .gitignore, skips hidden files, and recurses up to max_depth.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Directory path relative to the workspace root (default: the root itself)"},
                    "max_depth": {"type": "integer", "description": "How many directory levels to descend (default: 3)"},
                    "limit": {"type": "integer", "description": "Maximum number of entries to return (default: 200)"},
                    "include_ignored": {"type": "boolean", "description": "If true, skip .gitignore filtering"}
                }
            }),
        }
    }

    async fn execute(
        &self,
        args: &Args,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, ToolError> {
        let path = optional_str("list_directory", args, "path")?.unwrap_or(".");
        let max_depth = bounded_u64(
            "list_directory",
            args,
            "max_depth",
            NumberSpec {
                default: 3,
                min: 0,
                max: 16,
            },
        )? as usize;
        let limit = bounded_u64(
            "list_directory",
            args,
            "limit",
            NumberSpec {
                default: 200,
                min: 1,
                max: 2000,
            },
        )? as usize;
        let include_ignored = optional_bool("list_directory", args, "include_ignored", false)?;

        let root = ctx.workspace_root()?.to_path_buf();
        let full = jail::resolve(&root, path)?;

        let filter = if include_ignored {
            GitignoreFilter::empty()
        } else {
            GitignoreFilter::load(&root)
        };

        // Directory walking is blocking I/O; keep it off the async runtime.
        let listing = tokio::task::spawn_blocking(move || {
            listing::list_directory(&root, &full, &filter, max_depth, limit)
        })
        .await
        .map_err(|e| ToolError::Execution(format!("listing task failed: {e}")))??;

        Ok(serde_json::json!({
            "path": path,
            "count": listing.entries.len(),
            "truncated": listing.truncated,
            "entries": listing.entries,
        }))
    }
}
