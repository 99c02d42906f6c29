//! Thin client over a local chat-completion backend (an Ollama-compatible
//! `/api/chat` endpoint). Exposes exactly `chat`, `chat_stream`, and
//! `health` — the reasoning loop owns retry/fallback policy, this client
//! does not retry on its own.

use std::time::Duration;

use agentry_config::LlmConfig;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// Wire-level chat message, distinct from `agentry_core::AgentMessage`:
/// this shape matches what the backend's `/api/chat` expects and returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::Assistant, content)
    }

    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        ChatMessage {
            role: ChatRole::Assistant,
            content: None,
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        ChatMessage {
            role: ChatRole::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn plain(role: ChatRole, content: impl Into<String>) -> Self {
        ChatMessage {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(default = "default_tool_call_type", rename = "type")]
    pub kind: String,
    pub function: ToolCallFunction,
}

fn default_tool_call_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub done_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub available: bool,
    pub models: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM transport error: {0}")]
    Transport(String),
    #[error("LLM server error: {0}")]
    Server(String),
}

pub struct LlmClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .unwrap_or_default();
        LlmClient {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    /// One synchronous round-trip: `{message:{content, tool_calls?}, done_reason}`.
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: Option<&Value>,
    ) -> Result<ChatResponse, LlmError> {
        let endpoint = format!("{}/api/chat", self.base_url);
        let payload = self.build_payload(messages, tools, false);

        let response = self
            .http
            .post(&endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(LlmError::Server(format!("{status}: {body}")));
        }

        parse_chat_response(&body)
    }

    /// Identical inputs to `chat`; emits content fragments via `on_token` as
    /// they arrive and returns the aggregated content on completion. Tool
    /// calls never appear on the streamed path.
    pub async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        on_token: mpsc::Sender<String>,
    ) -> Result<String, LlmError> {
        let endpoint = format!("{}/api/chat", self.base_url);
        let payload = self.build_payload(messages, None, true);

        let mut response = self
            .http
            .post(&endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body: Value = response
                .json()
                .await
                .map_err(|e| LlmError::Transport(e.to_string()))?;
            return Err(LlmError::Server(format!("{status}: {body}")));
        }

        let mut full_content = String::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?
        {
            let chunk_str = String::from_utf8_lossy(&chunk);
            for line in chunk_str.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                if let Ok(json) = serde_json::from_str::<Value>(line) {
                    if let Some(content) = json
                        .get("message")
                        .and_then(|m| m.get("content"))
                        .and_then(|v| v.as_str())
                    {
                        if !content.is_empty() {
                            full_content.push_str(content);
                            let _ = on_token.send(content.to_string()).await;
                        }
                    }
                }
            }
        }

        Ok(full_content)
    }

    /// Liveness + the set of models the backend currently reports.
    pub async fn health(&self) -> HealthStatus {
        let endpoint = format!("{}/api/tags", self.base_url);
        let attempt = self
            .http
            .get(&endpoint)
            .timeout(self.timeout)
            .send()
            .await;

        match attempt {
            Ok(resp) if resp.status().is_success() => {
                let models = resp
                    .json::<Value>()
                    .await
                    .ok()
                    .and_then(|body| {
                        body.get("models")?
                            .as_array()
                            .map(|arr| {
                                arr.iter()
                                    .filter_map(|m| m.get("name")?.as_str().map(String::from))
                                    .collect()
                            })
                    })
                    .unwrap_or_default();
                HealthStatus {
                    available: true,
                    models,
                }
            }
            _ => HealthStatus {
                available: false,
                models: Vec::new(),
            },
        }
    }

    fn build_payload(&self, messages: &[ChatMessage], tools: Option<&Value>, stream: bool) -> Value {
        let mut payload = json!({
            "model": self.model,
            "messages": messages_to_wire(messages),
            "stream": stream,
        });
        if let Some(tools_val) = tools {
            payload["tools"] = tools_val.clone();
        }
        payload
    }
}

fn messages_to_wire(messages: &[ChatMessage]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                ChatRole::System => "system",
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
                ChatRole::Tool => "tool",
            };
            let mut msg = json!({ "role": role });
            if let Some(ref content) = m.content {
                msg["content"] = json!(content);
            }
            if !m.tool_calls.is_empty() {
                let calls: Vec<Value> = m
                    .tool_calls
                    .iter()
                    .map(|tc| {
                        json!({
                            "function": {
                                "name": tc.function.name,
                                "arguments": tc.function.arguments,
                            }
                        })
                    })
                    .collect();
                msg["tool_calls"] = json!(calls);
            }
            if let Some(ref id) = m.tool_call_id {
                msg["tool_call_id"] = json!(id);
            }
            msg
        })
        .collect()
}

fn parse_chat_response(body: &Value) -> Result<ChatResponse, LlmError> {
    let content = body
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let tool_calls = body
        .get("message")
        .and_then(|m| m.get("tool_calls"))
        .and_then(|v| v.as_array())
        .map(|calls| parse_tool_calls(calls))
        .unwrap_or_default();

    let done_reason = if !tool_calls.is_empty() {
        "tool_calls".to_string()
    } else {
        "stop".to_string()
    };

    Ok(ChatResponse {
        content,
        tool_calls,
        done_reason,
    })
}

/// The backend does not always supply call ids, so synthesize stable ones
/// from position within the turn.
fn parse_tool_calls(calls: &[Value]) -> Vec<ToolCall> {
    calls
        .iter()
        .enumerate()
        .filter_map(|(i, call)| {
            let func = call.get("function")?;
            let name = func.get("name")?.as_str()?.to_string();
            let arguments = func.get("arguments").cloned().unwrap_or(json!({}));
            Some(ToolCall {
                id: format!("call_{i}"),
                kind: default_tool_call_type(),
                function: ToolCallFunction { name, arguments },
            })
        })
        .collect()
}

/// Strip a `json` code fence (or fall back to the first balanced bare
/// object) and parse the remainder as `T`. Used by the planner and
/// reviewer sub-agents to tolerate chatty model output around their
/// required JSON payload.
pub fn extract_json_output<T: serde::de::DeserializeOwned>(response: &str) -> Option<T> {
    if let Some(fence_start) = response.find("```json") {
        let after_fence = &response[fence_start + "```json".len()..];
        if let Some(json_start) = after_fence.find(|c: char| !c.is_whitespace()) {
            let json_body = &after_fence[json_start..];
            if let Some(fence_end) = json_body.find("```") {
                let json_str = json_body[..fence_end].trim();
                if let Ok(val) = serde_json::from_str(json_str) {
                    return Some(val);
                }
            }
        }
    }

    let trimmed = response.trim();
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if end > start {
                let candidate = &trimmed[start..=end];
                if let Ok(val) = serde_json::from_str(candidate) {
                    return Some(val);
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        goal: String,
    }

    #[test]
    fn parses_non_streaming_response_with_tool_calls() {
        let body = json!({
            "message": {
                "content": "",
                "tool_calls": [
                    {"function": {"name": "db_query", "arguments": {"sql": "select 1"}}}
                ]
            }
        });
        let parsed = parse_chat_response(&body).unwrap();
        assert_eq!(parsed.done_reason, "tool_calls");
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].id, "call_0");
        assert_eq!(parsed.tool_calls[0].function.name, "db_query");
    }

    #[test]
    fn parses_plain_text_response_as_stop() {
        let body = json!({"message": {"content": "Hi"}});
        let parsed = parse_chat_response(&body).unwrap();
        assert_eq!(parsed.content, "Hi");
        assert_eq!(parsed.done_reason, "stop");
        assert!(parsed.tool_calls.is_empty());
    }

    #[test]
    fn extract_fenced_json() {
        let raw = "Sure!\n```json\n{\"goal\":\"ship it\"}\n```";
        let out: Sample = extract_json_output(raw).unwrap();
        assert_eq!(out.goal, "ship it");
    }

    #[test]
    fn extract_bare_json_with_surrounding_text() {
        let raw = "here you go {\"goal\":\"ship it\"} thanks";
        let out: Sample = extract_json_output(raw).unwrap();
        assert_eq!(out.goal, "ship it");
    }

    #[test]
    fn extract_returns_none_for_plain_text() {
        let out: Option<Sample> = extract_json_output("no json here");
        assert!(out.is_none());
    }

    #[test]
    fn tool_result_message_carries_call_id() {
        let msg = ChatMessage::tool_result("call_0", "42");
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_0"));
        assert_eq!(msg.role, ChatRole::Tool);
    }
}
