//! Shared data model for the agent runtime: roles, tool specs, messages,
//! timelines, session memory, and the federated-server config/status shapes.
//!
//! Every other crate in the workspace depends on this one; it carries no
//! I/O and no business logic, only the types the rest of the system passes
//! around.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Privilege level, totally ordered `readonly < dev < operator < admin`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Readonly,
    Dev,
    Operator,
    Admin,
}

impl Role {
    pub fn level(self) -> u8 {
        match self {
            Role::Readonly => 0,
            Role::Dev => 1,
            Role::Operator => 2,
            Role::Admin => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Readonly => "readonly",
            Role::Dev => "dev",
            Role::Operator => "operator",
            Role::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "readonly" => Ok(Role::Readonly),
            "dev" => Ok(Role::Dev),
            "operator" => Ok(Role::Operator),
            "admin" => Ok(Role::Admin),
            other => Err(CoreError::InvalidRole(other.to_string())),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid role '{0}'")]
    InvalidRole(String),
}

/// Declarative description of a callable tool, built-in or federated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub required_roles: BTreeSet<Role>,
    pub safe_for_production: bool,
}

impl ToolSpec {
    pub fn allows(&self, role: Role) -> bool {
        self.required_roles.contains(&role)
    }
}

/// Projection of a `ToolSpec` into the shape an LLM tool-calling API expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ToolDescriptorFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptorFunction {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl From<&ToolSpec> for ToolDescriptor {
    fn from(spec: &ToolSpec) -> Self {
        ToolDescriptor {
            kind: "function".to_string(),
            function: ToolDescriptorFunction {
                name: spec.name.clone(),
                description: spec.description.clone(),
                parameters: spec.input_schema.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Pending,
    Running,
    Success,
    Error,
    Skipped,
}

/// A single execution record. Mutated only by the executor that created it;
/// once `finished_at` is set the record must not change further.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: Uuid,
    pub tool_name: String,
    pub args: HashMap<String, Value>,
    pub status: ToolCallStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

impl ToolCall {
    pub fn new_pending(tool_name: impl Into<String>, args: HashMap<String, Value>) -> Self {
        ToolCall {
            id: Uuid::new_v4(),
            tool_name: tool_name.into(),
            args,
            status: ToolCallStatus::Pending,
            result: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
        }
    }

    pub fn finish_success(&mut self, result: Value) {
        let now = Utc::now();
        self.status = ToolCallStatus::Success;
        self.result = Some(result);
        self.finished_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds());
    }

    /// Finish with an error, with zero recorded duration — used for
    /// permission and validation failures that never actually dispatched.
    pub fn finish_error_zero_duration(&mut self, error: impl Into<String>) {
        let now = Utc::now();
        self.status = ToolCallStatus::Error;
        self.error = Some(error.into());
        self.finished_at = Some(now);
        self.duration_ms = Some(0);
    }

    pub fn finish_error(&mut self, error: impl Into<String>) {
        let now = Utc::now();
        self.status = ToolCallStatus::Error;
        self.error = Some(error.into());
        self.finished_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool the model chose to call, as emitted inside an assistant turn.
/// Distinct from `ToolCall`: this only carries the request, not the result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundToolCallRef {
    pub id: String,
    pub name: String,
    pub args: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OutboundToolCallRef>>,
    pub timestamp: DateTime<Utc>,
}

impl AgentMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(MessageRole::Assistant, content)
    }

    pub fn assistant_with_tool_calls(
        content: impl Into<String>,
        tool_calls: Vec<OutboundToolCallRef>,
    ) -> Self {
        AgentMessage {
            role: MessageRole::Assistant,
            content: content.into(),
            tool_calls: Some(tool_calls),
            timestamp: Utc::now(),
        }
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self::plain(MessageRole::Tool, content)
    }

    fn plain(role: MessageRole, content: impl Into<String>) -> Self {
        AgentMessage {
            role,
            content: content.into(),
            tool_calls: None,
            timestamp: Utc::now(),
        }
    }
}

/// Append-only record of a single reasoning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTimeline {
    pub session_id: Uuid,
    pub user_prompt: String,
    pub tool_calls: Vec<ToolCall>,
    pub final_response: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total_duration_ms: Option<i64>,
}

impl ExecutionTimeline {
    pub fn new(session_id: Uuid, user_prompt: impl Into<String>) -> Self {
        ExecutionTimeline {
            session_id,
            user_prompt: user_prompt.into(),
            tool_calls: Vec::new(),
            final_response: String::new(),
            started_at: Utc::now(),
            finished_at: None,
            total_duration_ms: None,
        }
    }

    pub fn finish(&mut self, final_response: impl Into<String>) {
        let now = Utc::now();
        self.final_response = final_response.into();
        self.finished_at = Some(now);
        self.total_duration_ms = Some((now - self.started_at).num_milliseconds());
    }
}

/// In-process, ephemeral history bound to a session id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMemory {
    pub session_id: Uuid,
    pub user_id: String,
    pub role: Role,
    pub messages: Vec<AgentMessage>,
    pub variables: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionMemory {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        let now = Utc::now();
        SessionMemory {
            session_id: Uuid::new_v4(),
            user_id: user_id.into(),
            role,
            messages: Vec::new(),
            variables: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message and bump `updated_at`. The vector is never truncated
    /// or reordered here; pruning for LLM context happens at the call site.
    pub fn push(&mut self, message: AgentMessage) {
        self.messages.push(message);
        self.touch();
    }

    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    /// Session history only ever carries user/assistant pairs (tool-call and
    /// tool-result messages live in the ephemeral per-run history, not here),
    /// so this sums the tool-call refs attached to each assistant message.
    pub fn tool_call_count(&self) -> usize {
        self.messages
            .iter()
            .filter_map(|m| m.tool_calls.as_ref())
            .map(|calls| calls.len())
            .sum()
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub message_count: usize,
    pub tool_call_count: usize,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanComplexity {
    Simple,
    Medium,
    Complex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Done,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub step_no: u32,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_hint: Option<String>,
    pub status: StepStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub goal: String,
    pub complexity: PlanComplexity,
    pub estimated_tools: Vec<String>,
    pub steps: Vec<PlanStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub passed: bool,
    pub score: i32,
    pub feedback: String,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
}

impl Review {
    pub fn clamp_score(&mut self) {
        self.score = self.score.clamp(0, 10);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalServerConfig {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalServerStatus {
    #[serde(flatten)]
    pub config: ExternalServerConfig,
    pub connected: bool,
    pub tool_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A federated tool discovered from an external server, named
/// `mcp__<server_id>__<tool_name>` only at the boundary that talks to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederatedTool {
    pub server_id: Uuid,
    pub tool_name: String,
    pub description: String,
    pub input_schema: Value,
}

impl FederatedTool {
    pub fn full_name(&self) -> String {
        format!("mcp__{}__{}", self.server_id, self.tool_name)
    }
}

/// One entry in an orchestrator run's `agent_logs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLogEntry {
    pub stage: AgentStage,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStage {
    Planner,
    Executor,
    Reviewer,
}

/// Composed result of a multi-agent (plan → execute → review) run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiAgentTimeline {
    pub timeline: ExecutionTimeline,
    pub plan: Plan,
    pub review: Review,
    pub agent_logs: Vec<AgentLogEntry>,
}

pub const MCP_TOOL_PREFIX: &str = "mcp__";

pub fn is_federated_tool_name(name: &str) -> bool {
    name.starts_with(MCP_TOOL_PREFIX)
}
