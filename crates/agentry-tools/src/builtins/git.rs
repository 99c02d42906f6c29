//! Git tools. Shell out to the `git` binary rather than linking libgit2;
//! every call is scoped to `repo_path`, which falls back to the process
//! working directory when missing, not a directory, or not a repository —
//! the executor's path-fallback rule applies before dispatch, but these
//! tools re-check defensively since they can be called directly in tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use agentry_core::{Role, ToolSpec};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{roles_at_or_above, Tool, ToolContext};

fn resolve_repo_path(args: &HashMap<String, Value>) -> PathBuf {
    let supplied = args.get("repo_path").and_then(|v| v.as_str());
    match supplied {
        Some(p) if Path::new(p).is_dir() && Path::new(p).join(".git").exists() => PathBuf::from(p),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

pub struct GitLogTool;

#[async_trait]
impl Tool for GitLogTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "git_log".to_string(),
            description: "Show recent commits for a repository.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "repo_path": {"type": "string"},
                    "limit": {"type": "integer", "description": "default 10"}
                }
            }),
            required_roles: roles_at_or_above(Role::Readonly),
            safe_for_production: true,
        }
    }

    async fn run(&self, args: &HashMap<String, Value>, _ctx: &ToolContext) -> Result<Value> {
        let repo_path = resolve_repo_path(args);
        let limit = args.get("limit").and_then(|v| v.as_u64()).unwrap_or(10);

        let out = tokio::process::Command::new("git")
            .args(["log", &format!("-{limit}"), "--oneline"])
            .current_dir(&repo_path)
            .output()
            .await?;
        if !out.status.success() {
            anyhow::bail!("git log failed: {}", String::from_utf8_lossy(&out.stderr));
        }
        let lines: Vec<String> = String::from_utf8_lossy(&out.stdout)
            .lines()
            .map(str::to_string)
            .collect();
        Ok(json!({"repo_path": repo_path.display().to_string(), "commits": lines}))
    }
}

pub struct GitDiffTool;

#[async_trait]
impl Tool for GitDiffTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "git_diff".to_string(),
            description: "Show the working-tree diff for a repository.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"repo_path": {"type": "string"}}
            }),
            required_roles: roles_at_or_above(Role::Readonly),
            safe_for_production: true,
        }
    }

    async fn run(&self, args: &HashMap<String, Value>, _ctx: &ToolContext) -> Result<Value> {
        let repo_path = resolve_repo_path(args);
        let out = tokio::process::Command::new("git")
            .args(["diff"])
            .current_dir(&repo_path)
            .output()
            .await?;
        if !out.status.success() {
            anyhow::bail!("git diff failed: {}", String::from_utf8_lossy(&out.stderr));
        }
        Ok(json!({
            "repo_path": repo_path.display().to_string(),
            "diff": String::from_utf8_lossy(&out.stdout),
        }))
    }
}

pub struct GitStatusTool;

#[async_trait]
impl Tool for GitStatusTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "git_status".to_string(),
            description: "Show the working-tree status for a repository.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"repo_path": {"type": "string"}}
            }),
            required_roles: roles_at_or_above(Role::Readonly),
            safe_for_production: true,
        }
    }

    async fn run(&self, args: &HashMap<String, Value>, _ctx: &ToolContext) -> Result<Value> {
        let repo_path = resolve_repo_path(args);
        let out = tokio::process::Command::new("git")
            .args(["status", "--porcelain"])
            .current_dir(&repo_path)
            .output()
            .await?;
        if !out.status.success() {
            anyhow::bail!("git status failed: {}", String::from_utf8_lossy(&out.stderr));
        }
        let entries: Vec<String> = String::from_utf8_lossy(&out.stdout)
            .lines()
            .map(str::to_string)
            .collect();
        Ok(json!({"repo_path": repo_path.display().to_string(), "entries": entries}))
    }
}

pub struct GitRollbackTool;

#[async_trait]
impl Tool for GitRollbackTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "git_rollback".to_string(),
            description: "Revert the most recent commit via `git revert HEAD`.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"repo_path": {"type": "string"}}
            }),
            required_roles: roles_at_or_above(Role::Operator),
            safe_for_production: false,
        }
    }

    async fn run(&self, args: &HashMap<String, Value>, _ctx: &ToolContext) -> Result<Value> {
        let repo_path = resolve_repo_path(args);
        let out = tokio::process::Command::new("git")
            .args(["revert", "HEAD", "--no-edit"])
            .env("GIT_AUTHOR_NAME", "agentry")
            .env("GIT_AUTHOR_EMAIL", "agentry@localhost")
            .env("GIT_COMMITTER_NAME", "agentry")
            .env("GIT_COMMITTER_EMAIL", "agentry@localhost")
            .current_dir(&repo_path)
            .output()
            .await?;

        if !out.status.success() {
            anyhow::bail!("git revert failed: {}", String::from_utf8_lossy(&out.stderr));
        }
        let summary = String::from_utf8_lossy(&out.stdout).trim().to_string();
        Ok(json!({
            "repo_path": repo_path.display().to_string(),
            "summary": if summary.is_empty() { "Last commit reverted.".to_string() } else { summary },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_repo_path_falls_back_to_cwd_when_missing() {
        let args = HashMap::new();
        let resolved = resolve_repo_path(&args);
        assert_eq!(resolved, std::env::current_dir().unwrap());
    }

    #[test]
    fn resolve_repo_path_falls_back_when_not_a_repo() {
        let mut args = HashMap::new();
        args.insert("repo_path".to_string(), json!("/tmp"));
        let resolved = resolve_repo_path(&args);
        assert_eq!(resolved, std::env::current_dir().unwrap());
    }
}
