//! Filesystem tools, jailed to `ToolContext::fs_allowed_path`.

use std::collections::HashMap;

use agentry_core::{Role, ToolSpec};
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{roles_at_or_above, Tool, ToolContext};

/// Largest byte offset `<= max` landing on a UTF-8 char boundary.
pub(super) fn truncate_byte_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

fn jailed_path(ctx: &ToolContext, rel_path: &str) -> Result<std::path::PathBuf> {
    let root = ctx
        .fs_allowed_path
        .canonicalize()
        .unwrap_or_else(|_| ctx.fs_allowed_path.clone());
    let candidate = root.join(rel_path);
    if let Ok(canonical) = candidate.canonicalize() {
        if !canonical.starts_with(&root) {
            bail!("path escapes filesystem root: {}", canonical.display());
        }
        Ok(canonical)
    } else {
        // File may not exist yet (write_file); validate via the parent.
        let parent = candidate
            .parent()
            .ok_or_else(|| anyhow::anyhow!("invalid path: {rel_path}"))?;
        std::fs::create_dir_all(parent)?;
        let parent_canonical = parent.canonicalize()?;
        if !parent_canonical.starts_with(&root) {
            bail!("path escapes filesystem root: {}", parent_canonical.display());
        }
        Ok(candidate)
    }
}

fn required_str<'a>(args: &'a HashMap<String, Value>, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("missing required param: {key}"))
}

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "read_file".to_string(),
            description: "Read the contents of a file within the configured filesystem root."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Relative path from the filesystem root"},
                    "max_bytes": {"type": "integer", "description": "Maximum bytes to read (default 65536)"}
                },
                "required": ["path"]
            }),
            required_roles: roles_at_or_above(Role::Readonly),
            safe_for_production: true,
        }
    }

    async fn run(&self, args: &HashMap<String, Value>, ctx: &ToolContext) -> Result<Value> {
        let rel_path = required_str(args, "path")?;
        let max_bytes = args
            .get("max_bytes")
            .and_then(|v| v.as_u64())
            .unwrap_or(65536) as usize;

        let full = jailed_path(ctx, rel_path)?;
        let content = std::fs::read_to_string(&full)?;
        let truncated = if content.len() > max_bytes {
            let end = truncate_byte_boundary(&content, max_bytes);
            format!("{}…[truncated at {} bytes]", &content[..end], max_bytes)
        } else {
            content
        };
        Ok(json!({"path": rel_path, "content": truncated}))
    }
}

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "write_file".to_string(),
            description: "Write content to a file within the configured filesystem root (creates or overwrites)."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "content": {"type": "string"}
                },
                "required": ["path", "content"]
            }),
            required_roles: roles_at_or_above(Role::Dev),
            safe_for_production: false,
        }
    }

    async fn run(&self, args: &HashMap<String, Value>, ctx: &ToolContext) -> Result<Value> {
        let rel_path = required_str(args, "path")?;
        let content = required_str(args, "content")?;

        let full = jailed_path(ctx, rel_path)?;
        std::fs::write(&full, content)?;
        Ok(json!({"path": rel_path, "bytes_written": content.len()}))
    }
}

pub struct ListDirTool;

#[async_trait]
impl Tool for ListDirTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "list_dir".to_string(),
            description: "List entries of a directory within the configured filesystem root."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Relative path, defaults to the root itself"}
                }
            }),
            required_roles: roles_at_or_above(Role::Readonly),
            safe_for_production: true,
        }
    }

    async fn run(&self, args: &HashMap<String, Value>, ctx: &ToolContext) -> Result<Value> {
        let rel_path = args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let full = jailed_path(ctx, rel_path)?;
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&full)? {
            let entry = entry?;
            entries.push(json!({
                "name": entry.file_name().to_string_lossy(),
                "is_dir": entry.file_type()?.is_dir(),
            }));
        }
        Ok(json!({"path": rel_path, "entries": entries}))
    }
}

pub struct FileExistsTool;

#[async_trait]
impl Tool for FileExistsTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "file_exists".to_string(),
            description: "Check whether a path exists within the configured filesystem root."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"path": {"type": "string"}},
                "required": ["path"]
            }),
            required_roles: roles_at_or_above(Role::Readonly),
            safe_for_production: true,
        }
    }

    async fn run(&self, args: &HashMap<String, Value>, ctx: &ToolContext) -> Result<Value> {
        let rel_path = required_str(args, "path")?;
        let root = ctx
            .fs_allowed_path
            .canonicalize()
            .unwrap_or_else(|_| ctx.fs_allowed_path.clone());
        let candidate = root.join(rel_path);
        Ok(json!({"path": rel_path, "exists": candidate.exists()}))
    }
}
