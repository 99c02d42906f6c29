//! Tool Executor: the single choke point every tool call passes through,
//! whether it targets a built-in tool or a federated external one.

use std::collections::HashMap;

use agentry_core::{Role, ToolCall};
use agentry_mcp::ExternalServerManager;
use agentry_tools::ToolRegistry;
use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};

/// Matches a `{placeholder}` style substitution left in a raw SQL string.
/// `db_query` requires bound parameters; a surviving placeholder means the
/// caller tried to interpolate a value into the query text instead.
fn placeholder_pattern() -> &'static Regex {
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{[A-Za-z_][A-Za-z0-9_]*\}").unwrap())
}

pub struct ToolExecutor {
    registry: ToolRegistry,
    external: ExternalServerManager,
    context: agentry_tools::ToolContext,
}

impl ToolExecutor {
    pub fn new(
        registry: ToolRegistry,
        external: ExternalServerManager,
        context: agentry_tools::ToolContext,
    ) -> Self {
        ToolExecutor { registry, external, context }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn external(&self) -> &ExternalServerManager {
        &self.external
    }

    /// Runs one tool call end to end: allocate a pending `ToolCall`, resolve
    /// the tool, check the caller's role against it, guard against raw SQL
    /// placeholders, dispatch, and always stamp `finished_at`/`duration_ms`
    /// on the way out — success or failure.
    pub async fn execute(
        &self,
        tool_name: &str,
        args: HashMap<String, Value>,
        caller_role: Role,
    ) -> ToolCall {
        let mut call = ToolCall::new_pending(tool_name.to_string(), args.clone());

        if agentry_core::is_federated_tool_name(tool_name) {
            return self.execute_federated(call, tool_name, args).await;
        }

        let Some(spec) = self.registry.by_name(tool_name) else {
            call.finish_error(format!("Unknown tool: {tool_name}"));
            return call;
        };

        if !spec.allows(caller_role) {
            warn!(tool = %tool_name, role = %caller_role, "permission denied");
            call.finish_error_zero_duration(format!(
                "Permission denied: role '{caller_role}' cannot use tool '{tool_name}'"
            ));
            return call;
        }

        if let Some(message) = sql_placeholder_violation(tool_name, &args) {
            call.finish_error_zero_duration(message);
            return call;
        }

        let Some(tool) = self.registry.get(tool_name) else {
            call.finish_error(format!("Unknown tool: {tool_name}"));
            return call;
        };

        match tool.run(&args, &self.context).await {
            Ok(result) => {
                info!(tool = %tool_name, "tool call succeeded");
                call.finish_success(result);
            }
            Err(err) => {
                warn!(tool = %tool_name, error = %err, "tool call failed");
                call.finish_error(err.to_string());
            }
        }
        call
    }

    async fn execute_federated(
        &self,
        mut call: ToolCall,
        tool_name: &str,
        args: HashMap<String, Value>,
    ) -> ToolCall {
        let payload = serde_json::to_value(&args).unwrap_or(Value::Null);
        match self.external.execute(tool_name, &payload).await {
            Ok(result) => {
                call.finish_success(result);
            }
            Err(err) => {
                call.finish_error(err.to_string());
            }
        }
        call
    }
}

/// Only applies to args containing a top-level `sql` string — the shape
/// every SQL-bearing tool uses for its query text.
fn sql_placeholder_violation(tool_name: &str, args: &HashMap<String, Value>) -> Option<String> {
    let sql = args.get("sql")?.as_str()?;
    if placeholder_pattern().is_match(sql) {
        Some(format!(
            "{tool_name}: query contains an unbound placeholder; use parameterized bindings instead of string interpolation"
        ))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentry_core::ToolCallStatus;
    use agentry_tools::builtins::register_all;

    fn test_executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        register_all(&mut registry);
        let context = agentry_tools::ToolContext {
            fs_allowed_path: std::env::temp_dir(),
            database: agentry_config::DatabaseConfig::default(),
            redis: agentry_config::RedisConfig::default(),
        };
        ToolExecutor::new(registry, ExternalServerManager::new(), context)
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_as_an_error() {
        let executor = test_executor();
        let call = executor.execute("does_not_exist", HashMap::new(), Role::Admin).await;
        assert_eq!(call.status, ToolCallStatus::Error);
        assert!(call.error.unwrap().contains("Unknown tool"));
    }

    #[tokio::test]
    async fn readonly_caller_is_denied_a_dev_only_tool() {
        let executor = test_executor();
        let mut args = HashMap::new();
        args.insert("path".to_string(), Value::String("scratch.txt".to_string()));
        args.insert("content".to_string(), Value::String("hi".to_string()));

        let call = executor.execute("write_file", args, Role::Readonly).await;
        assert_eq!(call.status, ToolCallStatus::Error);
        assert_eq!(call.duration_ms, Some(0));
        assert!(call.error.unwrap().contains("Permission denied"));
    }

    #[tokio::test]
    async fn readonly_caller_may_use_a_readonly_tool() {
        let executor = test_executor();
        let mut args = HashMap::new();
        args.insert("path".to_string(), Value::String(".".to_string()));

        let call = executor.execute("list_dir", args, Role::Readonly).await;
        assert_eq!(call.status, ToolCallStatus::Success);
    }

    #[tokio::test]
    async fn sql_placeholder_in_query_text_is_rejected_before_dispatch() {
        let executor = test_executor();
        let mut args = HashMap::new();
        args.insert(
            "sql".to_string(),
            Value::String("select * from users where id = {user_id}".to_string()),
        );

        let call = executor.execute("db_query", args, Role::Dev).await;
        assert_eq!(call.status, ToolCallStatus::Error);
        assert_eq!(call.duration_ms, Some(0));
        assert!(call.error.unwrap().contains("placeholder"));
    }

    #[tokio::test]
    async fn bound_sql_without_placeholders_is_dispatched() {
        let executor = test_executor();
        let mut args = HashMap::new();
        args.insert(
            "sql".to_string(),
            Value::String("insert into widgets (name) values ('demo')".to_string()),
        );

        let call = executor.execute("db_query", args, Role::Dev).await;
        assert_eq!(call.status, ToolCallStatus::Success);
    }

    #[tokio::test]
    async fn unrouted_federated_call_fails_with_unknown_server() {
        let executor = test_executor();
        let name = format!("mcp__{}__search", uuid::Uuid::new_v4());
        let call = executor.execute(&name, HashMap::new(), Role::Admin).await;
        assert_eq!(call.status, ToolCallStatus::Error);
    }
}
