//! Built-in tool implementations, spanning the six required subdomains:
//! database, REST, filesystem, git, key-value/queue, and web.

pub(crate) mod db;
pub(crate) mod fs;
pub(crate) mod git;
pub(crate) mod kv;
pub(crate) mod rest;
pub(crate) mod web;

pub use db::{DbMigrateTool, DbQueryTool};
pub use fs::{FileExistsTool, ListDirTool, ReadFileTool, WriteFileTool};
pub use git::{GitDiffTool, GitLogTool, GitRollbackTool, GitStatusTool};
pub use kv::{KvDeleteTool, KvGetTool, KvSetTool, QueuePopTool, QueuePushTool};
pub use rest::RestRequestTool;
pub use web::{WebFetchJsonTool, WebFetchTextTool, WebSearchTool};

use crate::ToolRegistry;

/// Populate a fresh registry with every built-in tool. Database and
/// key-value tools share a backing store per registry so that, e.g., a
/// `db_query` insert is visible to a later `db_query` select within the
/// same process.
pub fn register_all(registry: &mut ToolRegistry) {
    let db_store = db::new_store();
    let kv_store = kv::new_store();

    registry.register(Box::new(ReadFileTool));
    registry.register(Box::new(WriteFileTool));
    registry.register(Box::new(ListDirTool));
    registry.register(Box::new(FileExistsTool));

    registry.register(Box::new(DbQueryTool::new(db_store.clone())));
    registry.register(Box::new(DbMigrateTool::new(db_store)));

    registry.register(Box::new(RestRequestTool));

    registry.register(Box::new(GitLogTool));
    registry.register(Box::new(GitDiffTool));
    registry.register(Box::new(GitStatusTool));
    registry.register(Box::new(GitRollbackTool));

    registry.register(Box::new(KvGetTool::new(kv_store.clone())));
    registry.register(Box::new(KvSetTool::new(kv_store.clone())));
    registry.register(Box::new(KvDeleteTool::new(kv_store.clone())));
    registry.register(Box::new(QueuePushTool::new(kv_store.clone())));
    registry.register(Box::new(QueuePopTool::new(kv_store)));

    registry.register(Box::new(WebSearchTool));
    registry.register(Box::new(WebFetchJsonTool));
    registry.register(Box::new(WebFetchTextTool));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_all_populates_every_subdomain() {
        let mut registry = ToolRegistry::new();
        register_all(&mut registry);
        let names: Vec<String> = registry.all().into_iter().map(|s| s.name).collect();

        for expected in [
            "read_file", "write_file", "db_query", "db_migrate", "rest_request", "git_log",
            "git_rollback", "kv_get", "kv_set", "queue_push", "queue_pop", "web_search",
        ] {
            assert!(names.contains(&expected.to_string()), "missing tool: {expected}");
        }
        assert_eq!(names.len(), 19);
    }
}
