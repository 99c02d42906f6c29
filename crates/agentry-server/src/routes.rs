//! HTTP handlers for every endpoint in the external interface table.

use agentry_agent::{OrchestratorInput, RunInput};
use agentry_core::{ExternalServerConfig, Role};
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::auth::role_from_headers;
use crate::envelope::{ok, ApiError, ApiResult};
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub llm_available: bool,
    pub llm_models: Vec<String>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let llm = state.llm.health().await;
    Json(HealthResponse {
        status: "ok",
        llm_available: llm.available,
        llm_models: llm.models,
    })
}

pub async fn list_tools(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Vec<agentry_core::ToolSpec>> {
    let role = role_from_headers(&headers);
    let specs = state.executor.registry().for_role(role, state.config.production_safe_mode);
    ok(specs)
}

pub async fn list_sessions(
    State(state): State<AppState>,
) -> ApiResult<Vec<agentry_core::SessionSummary>> {
    ok(state.store.list().await)
}

#[derive(Deserialize)]
pub struct CreateSessionRequest {
    pub user_id: Option<String>,
    pub role: Option<String>,
}

pub async fn create_session(
    State(state): State<AppState>,
    Json(body): Json<CreateSessionRequest>,
) -> ApiResult<agentry_core::SessionMemory> {
    let role = parse_role_field(body.role.as_deref())?;
    let memory = state.store.create(body.user_id.unwrap_or_else(|| "anonymous".to_string()), role).await;
    ok(memory)
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<agentry_core::SessionSummary> {
    match state.store.get(id).await {
        Some(memory) => ok(agentry_core::SessionSummary {
            session_id: memory.session_id,
            message_count: memory.messages.len(),
            tool_call_count: memory.tool_call_count(),
            last_activity: memory.last_activity(),
        }),
        None => Err(ApiError::not_found(format!("unknown session: {id}"))),
    }
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    state
        .store
        .clear(id)
        .await
        .map_err(|e| ApiError::not_found(e.to_string()))?;
    ok(())
}

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: Option<Uuid>,
    pub user_id: Option<String>,
    pub role: Option<String>,
    #[serde(default = "default_mode")]
    pub mode: String,
}

fn default_mode() -> String {
    "single".to_string()
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub session_id: Uuid,
    pub response: String,
    pub timeline: agentry_core::ExecutionTimeline,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<agentry_core::Plan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<agentry_core::Review>,
    pub mode: String,
}

pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ChatRequest>,
) -> ApiResult<ChatResponse> {
    if body.message.trim().is_empty() {
        return Err(ApiError::bad_request("message must not be empty"));
    }

    let token_role = role_from_headers(&headers);
    let role = match body.role.as_deref() {
        Some(requested) => {
            let requested = parse_role_field(Some(requested))?;
            requested.min(token_role)
        }
        None => token_role,
    };

    let memory = state
        .store
        .get_or_create(body.session_id, body.user_id.unwrap_or_else(|| "anonymous".to_string()), role)
        .await;

    let response = match body.mode.as_str() {
        "multi" => {
            let result = state
                .orchestrator
                .run(OrchestratorInput {
                    user_prompt: body.message,
                    session_id: memory.session_id,
                    role,
                })
                .await;
            ChatResponse {
                session_id: memory.session_id,
                response: result.timeline.final_response.clone(),
                timeline: result.timeline,
                plan: Some(result.plan),
                review: Some(result.review),
                mode: "multi".to_string(),
            }
        }
        "single" => {
            let input = RunInput::new(body.message, memory.session_id, role);
            let timeline = state.agent.run(input, true).await;
            ChatResponse {
                session_id: memory.session_id,
                response: timeline.final_response.clone(),
                timeline,
                plan: None,
                review: None,
                mode: "single".to_string(),
            }
        }
        other => return Err(ApiError::bad_request(format!("unknown mode: {other}"))),
    };

    ok(response)
}

pub async fn get_metrics(State(state): State<AppState>) -> ApiResult<agentry_metrics::SystemMetrics> {
    ok(state.metrics.snapshot())
}

pub async fn reset_metrics(State(state): State<AppState>) -> ApiResult<()> {
    state.metrics.reset();
    ok(())
}

#[derive(Serialize)]
pub struct PermissionsResponse {
    pub role: String,
    pub allowed: Vec<String>,
    pub blocked: Vec<String>,
}

pub async fn get_permissions(
    State(state): State<AppState>,
    Path(role): Path<String>,
) -> ApiResult<PermissionsResponse> {
    let role = parse_role_field(Some(&role))?;
    let all = state.executor.registry().all();
    let allowed: Vec<String> = all
        .iter()
        .filter(|s| s.allows(role))
        .map(|s| s.name.clone())
        .collect();
    let blocked: Vec<String> = all
        .iter()
        .filter(|s| !s.allows(role))
        .map(|s| s.name.clone())
        .collect();
    ok(PermissionsResponse { role: role.to_string(), allowed, blocked })
}

pub async fn list_mcp_servers(
    State(state): State<AppState>,
) -> ApiResult<Vec<agentry_core::ExternalServerStatus>> {
    ok(state.executor.external().status().await)
}

#[derive(Deserialize)]
pub struct NewExternalServer {
    pub name: String,
    pub description: Option<String>,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: std::collections::HashMap<String, String>,
    pub enabled: bool,
}

pub async fn add_mcp_server(
    State(state): State<AppState>,
    Json(body): Json<NewExternalServer>,
) -> ApiResult<()> {
    let config = ExternalServerConfig {
        id: Uuid::new_v4(),
        name: body.name,
        description: body.description,
        command: body.command,
        args: body.args,
        env: body.env,
        enabled: body.enabled,
    };
    state
        .executor
        .external()
        .add(config)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    ok(())
}

pub async fn update_mcp_server(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(config): Json<ExternalServerConfig>,
) -> ApiResult<()> {
    state
        .executor
        .external()
        .update(id, config)
        .await
        .map_err(|e| ApiError::not_found(e.to_string()))?;
    ok(())
}

pub async fn delete_mcp_server(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<()> {
    state
        .executor
        .external()
        .remove(id)
        .await
        .map_err(|e| ApiError::not_found(e.to_string()))?;
    ok(())
}

pub async fn reconnect_mcp_server(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    state
        .executor
        .external()
        .reconnect(id)
        .await
        .map_err(|e| ApiError::not_found(e.to_string()))?;
    ok(())
}

#[derive(Serialize)]
pub struct FederatedToolView {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

pub async fn list_mcp_tools(State(state): State<AppState>) -> ApiResult<Vec<FederatedToolView>> {
    let tools = state
        .executor
        .external()
        .all_tools()
        .await
        .into_iter()
        .map(|t| FederatedToolView {
            name: t.full_name(),
            description: t.description.clone(),
            input_schema: t.input_schema.clone(),
        })
        .collect();
    ok(tools)
}

fn parse_role_field(raw: Option<&str>) -> Result<Role, ApiError> {
    match raw {
        None => Ok(Role::Readonly),
        Some(value) => value
            .parse::<Role>()
            .map_err(|_| ApiError::bad_request(format!("invalid role: {value}"))),
    }
}
