use std::collections::{BTreeSet, HashMap};

use agentry_core::{Role, ToolDescriptor, ToolSpec};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

pub mod builtins;

/// Shared context every built-in connector may need: the filesystem
/// jail, and the database/cache coordinates from configuration.
#[derive(Clone)]
pub struct ToolContext {
    pub fs_allowed_path: std::path::PathBuf,
    pub database: agentry_config::DatabaseConfig,
    pub redis: agentry_config::RedisConfig,
}

/// Trait implemented by every built-in tool connector.
#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;
    async fn run(&self, args: &HashMap<String, Value>, ctx: &ToolContext) -> Result<Value>;
}

fn valid_tool_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Read-only catalog of built-in tools, populated once at startup.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        ToolRegistry { tools: Vec::new() }
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let spec = tool.spec();
        debug_assert!(valid_tool_name(&spec.name), "invalid tool name: {}", spec.name);
        self.tools.push(tool);
    }

    pub fn all(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    pub fn by_name(&self, name: &str) -> Option<ToolSpec> {
        self.tools.iter().find(|t| t.spec().name == name).map(|t| t.spec())
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.spec().name == name)
            .map(|t| t.as_ref())
    }

    /// Filter by role, and by `safe_for_production` when `production_safe_mode`
    /// is on.
    pub fn for_role(&self, role: Role, production_safe_mode: bool) -> Vec<ToolSpec> {
        self.all()
            .into_iter()
            .filter(|s| s.allows(role))
            .filter(|s| !production_safe_mode || s.safe_for_production)
            .collect()
    }

    pub fn to_model_tool_descriptors(specs: &[ToolSpec]) -> Vec<ToolDescriptor> {
        specs.iter().map(ToolDescriptor::from).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a `ToolSpec` whose `required_roles` is every role at or above
/// `minimum`.
pub fn roles_at_or_above(minimum: Role) -> BTreeSet<Role> {
    [Role::Readonly, Role::Dev, Role::Operator, Role::Admin]
        .into_iter()
        .filter(|r| *r >= minimum)
        .collect()
}

pub use builtins::register_all;
