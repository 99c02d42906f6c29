//! Database tools.
//!
//! The actual SQL client is an external collaborator behind this uniform
//! interface; this in-process table store stands in for it so the tool
//! contract (and the executor's placeholder guard ahead of it) can be
//! exercised without a live database. `database` in `ToolContext` still
//! carries the configured coordinates, echoed back in responses.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use agentry_core::{Role, ToolSpec};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{roles_at_or_above, Tool, ToolContext};

#[derive(Default)]
pub struct TableStore {
    rows: HashMap<String, Vec<Value>>,
    migrations: Vec<String>,
}

pub struct DbQueryTool {
    store: Arc<Mutex<TableStore>>,
}

impl DbQueryTool {
    pub fn new(store: Arc<Mutex<TableStore>>) -> Self {
        DbQueryTool { store }
    }
}

/// Shared handle constructor so `DbQueryTool` and `DbMigrateTool` can be
/// registered against the same backing store.
pub fn new_store() -> Arc<Mutex<TableStore>> {
    Arc::new(Mutex::new(TableStore::default()))
}

fn table_name_from_insert(sql: &str) -> Option<String> {
    let lower = sql.to_ascii_lowercase();
    let idx = lower.find("insert into")?;
    let rest = sql[idx + "insert into".len()..].trim_start();
    let end = rest.find(|c: char| c.is_whitespace() || c == '(')?;
    Some(rest[..end].to_string())
}

#[async_trait]
impl Tool for DbQueryTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "db_query".to_string(),
            description: "Execute a parameterized SQL statement against the configured database."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "sql": {"type": "string"},
                    "params": {"type": "array", "items": {}}
                },
                "required": ["sql"]
            }),
            required_roles: roles_at_or_above(Role::Dev),
            safe_for_production: false,
        }
    }

    async fn run(&self, args: &HashMap<String, Value>, ctx: &ToolContext) -> Result<Value> {
        let sql = args
            .get("sql")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing required param: sql"))?;
        let params = args
            .get("params")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let mut store = self.store.lock().expect("db store lock");
        if let Some(table) = table_name_from_insert(sql) {
            store
                .rows
                .entry(table.clone())
                .or_default()
                .push(json!({"params": params}));
            return Ok(json!({
                "database": ctx.database.name,
                "rows_affected": 1,
                "table": table,
            }));
        }

        let lower = sql.to_ascii_lowercase();
        if let Some(idx) = lower.find("from") {
            let rest = sql[idx + 4..].trim_start();
            let end = rest
                .find(|c: char| c.is_whitespace() || c == ';')
                .unwrap_or(rest.len());
            let table = rest[..end].to_string();
            let rows = store.rows.get(&table).cloned().unwrap_or_default();
            return Ok(json!({"database": ctx.database.name, "table": table, "rows": rows}));
        }

        Ok(json!({"database": ctx.database.name, "rows_affected": 0}))
    }
}

pub struct DbMigrateTool {
    store: Arc<Mutex<TableStore>>,
}

impl DbMigrateTool {
    pub fn new(store: Arc<Mutex<TableStore>>) -> Self {
        DbMigrateTool { store }
    }
}

#[async_trait]
impl Tool for DbMigrateTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "db_migrate".to_string(),
            description: "Apply a named schema migration against the configured database."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"migration_name": {"type": "string"}},
                "required": ["migration_name"]
            }),
            required_roles: roles_at_or_above(Role::Admin),
            safe_for_production: false,
        }
    }

    async fn run(&self, args: &HashMap<String, Value>, ctx: &ToolContext) -> Result<Value> {
        let name = args
            .get("migration_name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing required param: migration_name"))?;

        let mut store = self.store.lock().expect("db store lock");
        store.migrations.push(name.to_string());
        Ok(json!({
            "database": ctx.database.name,
            "applied": name,
            "total_migrations": store.migrations.len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_ctx() -> ToolContext {
        ToolContext {
            fs_allowed_path: std::env::temp_dir(),
            database: agentry_config::DatabaseConfig::default(),
            redis: agentry_config::RedisConfig::default(),
        }
    }

    #[tokio::test]
    async fn insert_then_select_round_trips_through_the_store() {
        let store = new_store();
        let insert_tool = DbQueryTool::new(store.clone());
        let select_tool = DbQueryTool::new(store.clone());
        let ctx = test_ctx();

        let mut args = HashMap::new();
        args.insert(
            "sql".to_string(),
            json!("INSERT INTO gold(price) VALUES (?)"),
        );
        args.insert("params".to_string(), json!([2650.5]));
        let insert_result = insert_tool.run(&args, &ctx).await.unwrap();
        assert_eq!(insert_result["rows_affected"], json!(1));

        let mut select_args = HashMap::new();
        select_args.insert("sql".to_string(), json!("SELECT * FROM gold"));
        let select_result = select_tool.run(&select_args, &ctx).await.unwrap();
        assert_eq!(select_result["rows"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn migrate_records_applied_name() {
        let store = new_store();
        let tool = DbMigrateTool::new(store);
        let mut args = HashMap::new();
        args.insert("migration_name".to_string(), json!("001_init"));
        let result = tool.run(&args, &test_ctx()).await.unwrap();
        assert_eq!(result["applied"], json!("001_init"));
    }
}
