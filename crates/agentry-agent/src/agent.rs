//! The bounded LLM/tools loop (C8): build a prompt, call the LLM, execute
//! any requested tool calls, feed results back, and terminate on a
//! tool-less turn or the iteration cap.

use std::collections::HashMap;
use std::sync::Arc;

use agentry_config::AppConfig;
use agentry_core::{
    AgentMessage, ExecutionTimeline, FederatedTool, MessageRole, OutboundToolCallRef, Role,
    ToolCallStatus, ToolDescriptor, ToolDescriptorFunction,
};
use agentry_events::{names, SharedEventBus};
use agentry_exec::ToolExecutor;
use agentry_llm::{ChatMessage, LlmClient};
use agentry_memory::SessionStore;
use agentry_metrics::MetricsStore;
use agentry_tools::ToolRegistry;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::prompt::build_operating_prompt;

/// Last N messages from session history carried into a fresh run.
const HISTORY_WINDOW: usize = 8;
const DEFAULT_MAX_ITERATIONS: usize = 6;

pub struct RunInput {
    pub user_prompt: String,
    pub session_id: Uuid,
    pub role: Role,
    pub allowed_tools: Option<Vec<String>>,
    pub max_iterations: usize,
    pub on_token: Option<mpsc::Sender<String>>,
}

impl RunInput {
    pub fn new(user_prompt: impl Into<String>, session_id: Uuid, role: Role) -> Self {
        RunInput {
            user_prompt: user_prompt.into(),
            session_id,
            role,
            allowed_tools: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            on_token: None,
        }
    }
}

pub struct ReasoningAgent {
    config: Arc<AppConfig>,
    llm: Arc<LlmClient>,
    executor: Arc<ToolExecutor>,
    store: Arc<SessionStore>,
    events: SharedEventBus,
    metrics: Arc<MetricsStore>,
}

impl ReasoningAgent {
    pub fn new(
        config: Arc<AppConfig>,
        llm: Arc<LlmClient>,
        executor: Arc<ToolExecutor>,
        store: Arc<SessionStore>,
        events: SharedEventBus,
        metrics: Arc<MetricsStore>,
    ) -> Self {
        ReasoningAgent { config, llm, executor, store, events, metrics }
    }

    /// `emit_lifecycle` controls whether this run publishes its own
    /// `agent:start`/`agent:done`/`agent:error` bookend events. The
    /// orchestrator (C11) runs with this off, since it owns the phase
    /// events for a multi-agent run; a standalone single-mode call runs
    /// with it on.
    pub async fn run(&self, input: RunInput, emit_lifecycle: bool) -> ExecutionTimeline {
        let mut timeline = ExecutionTimeline::new(input.session_id, input.user_prompt.clone());
        self.metrics.record_request();
        self.metrics.touch_session(input.session_id);

        if emit_lifecycle {
            self.events
                .publish(
                    input.session_id,
                    names::AGENT_START,
                    json!({"user_prompt": input.user_prompt}),
                )
                .await;
        }

        let available = self.available_tools(input.role, &input.allowed_tools);
        let model_tools = self.model_tool_descriptors(&available).await;
        let tools_json = if model_tools.is_empty() {
            None
        } else {
            Some(serde_json::to_value(&model_tools).unwrap_or(Value::Null))
        };

        let mut messages = vec![ChatMessage::system(build_operating_prompt(&self.config, input.role))];
        if let Some(memory) = self.store.get(input.session_id).await {
            let start = memory.messages.len().saturating_sub(HISTORY_WINDOW);
            messages.extend(memory.messages[start..].iter().map(agent_message_to_chat));
        }
        messages.push(ChatMessage::user(input.user_prompt.clone()));

        let _ = self
            .store
            .push(input.session_id, AgentMessage::user(input.user_prompt.clone()))
            .await;

        let mut executed_refs: Vec<OutboundToolCallRef> = Vec::new();
        let mut final_response = String::new();

        for _ in 0..input.max_iterations {
            let response = match self.llm.chat(&messages, tools_json.as_ref()).await {
                Ok(response) => response,
                Err(err) => {
                    final_response = format!("AI Error: {err}");
                    if emit_lifecycle {
                        self.events
                            .publish(
                                input.session_id,
                                names::AGENT_ERROR,
                                json!({"message": err.to_string()}),
                            )
                            .await;
                    }
                    break;
                }
            };

            if response.tool_calls.is_empty() {
                final_response = response.content.clone();
                if let Some(tx) = &input.on_token {
                    for ch in final_response.chars() {
                        let _ = tx.send(ch.to_string()).await;
                    }
                }
                break;
            }

            messages.push(ChatMessage::assistant_tool_calls(response.tool_calls.clone()));

            for call in &response.tool_calls {
                let args: HashMap<String, Value> = call
                    .function
                    .arguments
                    .as_object()
                    .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                    .unwrap_or_default();

                let tool_call = self.executor.execute(&call.function.name, args.clone(), input.role).await;

                self.metrics.record_tool_call(
                    &tool_call.tool_name,
                    tool_call.status == ToolCallStatus::Success,
                    tool_call.duration_ms.unwrap_or(0),
                );

                self.events
                    .publish(
                        input.session_id,
                        names::TOOL_EXECUTED,
                        serde_json::to_value(&tool_call).unwrap_or(Value::Null),
                    )
                    .await;

                let content = match (tool_call.status, &tool_call.result, &tool_call.error) {
                    (ToolCallStatus::Success, Some(result), _) => {
                        serde_json::to_string_pretty(result).unwrap_or_default()
                    }
                    (_, _, Some(error)) => format!("ERROR: {error}"),
                    _ => "ERROR: tool produced no result".to_string(),
                };
                messages.push(ChatMessage::tool_result(call.id.clone(), content));

                executed_refs.push(OutboundToolCallRef {
                    id: call.id.clone(),
                    name: call.function.name.clone(),
                    args,
                });

                timeline.tool_calls.push(tool_call);
            }
        }

        if final_response.is_empty() {
            final_response = format!(
                "Completed {} tool operations. Check the execution timeline for details.",
                timeline.tool_calls.len()
            );
        }

        timeline.finish(final_response.clone());

        let _ = self
            .store
            .push(
                input.session_id,
                AgentMessage::assistant_with_tool_calls(final_response.clone(), executed_refs),
            )
            .await;

        if emit_lifecycle {
            self.events
                .publish(
                    input.session_id,
                    names::AGENT_DONE,
                    json!({"final_response": final_response}),
                )
                .await;
        }

        timeline
    }

    fn available_tools(
        &self,
        role: Role,
        allowed_tools: &Option<Vec<String>>,
    ) -> Vec<agentry_core::ToolSpec> {
        let specs = self.executor.registry().for_role(role, self.config.production_safe_mode);
        match allowed_tools {
            Some(allow) => specs.into_iter().filter(|s| allow.contains(&s.name)).collect(),
            None => specs,
        }
    }

    async fn model_tool_descriptors(&self, specs: &[agentry_core::ToolSpec]) -> Vec<ToolDescriptor> {
        let mut descriptors = ToolRegistry::to_model_tool_descriptors(specs);
        let federated = self.executor.external().all_tools().await;
        descriptors.extend(federated.iter().map(federated_descriptor));
        descriptors
    }
}

fn federated_descriptor(tool: &FederatedTool) -> ToolDescriptor {
    ToolDescriptor {
        kind: "function".to_string(),
        function: ToolDescriptorFunction {
            name: tool.full_name(),
            description: tool.description.clone(),
            parameters: tool.input_schema.clone(),
        },
    }
}

fn agent_message_to_chat(message: &AgentMessage) -> ChatMessage {
    match message.role {
        MessageRole::System => ChatMessage::system(message.content.clone()),
        MessageRole::User => ChatMessage::user(message.content.clone()),
        MessageRole::Tool => ChatMessage::tool_result(String::new(), message.content.clone()),
        MessageRole::Assistant => match &message.tool_calls {
            Some(calls) if !calls.is_empty() => {
                let wire_calls = calls
                    .iter()
                    .map(|call| agentry_llm::ToolCall {
                        id: call.id.clone(),
                        kind: "function".to_string(),
                        function: agentry_llm::ToolCallFunction {
                            name: call.name.clone(),
                            arguments: serde_json::to_value(&call.args).unwrap_or(Value::Null),
                        },
                    })
                    .collect();
                ChatMessage::assistant_tool_calls(wire_calls)
            }
            _ => ChatMessage::assistant(message.content.clone()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentry_tools::builtins::register_all;
    use std::collections::VecDeque;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn test_agent() -> ReasoningAgent {
        test_agent_with_base_url(&agentry_config::LlmConfig::default())
    }

    fn test_agent_with_base_url(llm_config: &agentry_config::LlmConfig) -> ReasoningAgent {
        let mut registry = ToolRegistry::new();
        register_all(&mut registry);
        let context = agentry_tools::ToolContext {
            fs_allowed_path: std::env::temp_dir(),
            database: agentry_config::DatabaseConfig::default(),
            redis: agentry_config::RedisConfig::default(),
        };
        let executor = ToolExecutor::new(
            registry,
            agentry_mcp::ExternalServerManager::new(),
            context,
        );
        ReasoningAgent::new(
            Arc::new(AppConfig::default()),
            Arc::new(LlmClient::new(llm_config)),
            Arc::new(executor),
            Arc::new(SessionStore::new()),
            agentry_events::shared_bus(),
            Arc::new(MetricsStore::new()),
        )
    }

    /// A one-shot Ollama-compatible `/api/chat` stand-in: answers each
    /// accepted connection with the next queued body, in order, then
    /// closes. Good enough to drive the reasoning loop without a real
    /// model backend.
    async fn spawn_stub_llm(mut responses: VecDeque<Value>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else { return };
                let Some(body) = responses.pop_front() else { return };
                tokio::spawn(async move {
                    let _ = read_http_request(&mut stream).await;
                    let payload = body.to_string();
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        payload.len(),
                        payload
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                });
            }
        });
        format!("http://{addr}")
    }

    async fn read_http_request(stream: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 512];
        loop {
            let n = stream.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(header_end) = find_subslice(&buf, b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&buf[..header_end]);
                let content_length = headers
                    .lines()
                    .find_map(|l| l.strip_prefix("Content-Length: "))
                    .or_else(|| headers.lines().find_map(|l| l.strip_prefix("content-length: ")))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                let body_so_far = buf.len() - (header_end + 4);
                if body_so_far >= content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    fn tool_turn(name: &str, args: Value) -> Value {
        json!({
            "message": {
                "content": "",
                "tool_calls": [{"function": {"name": name, "arguments": args}}]
            }
        })
    }

    fn final_turn(content: &str) -> Value {
        json!({"message": {"content": content, "tool_calls": []}})
    }

    #[tokio::test]
    async fn run_input_defaults_to_six_iterations() {
        let input = RunInput::new("hi", Uuid::new_v4(), Role::Dev);
        assert_eq!(input.max_iterations, DEFAULT_MAX_ITERATIONS);
    }

    #[tokio::test]
    async fn readonly_role_never_sees_admin_only_tools_in_the_catalog() {
        let agent = test_agent();
        let specs = agent.available_tools(Role::Readonly, &None);
        assert!(specs.iter().all(|s| s.allows(Role::Readonly)));
        assert!(!specs.iter().any(|s| s.name == "db_migrate"));
    }

    /// S1: a single tool-less turn ends the loop immediately and appends
    /// exactly one user/assistant pair to session history.
    #[tokio::test]
    async fn single_turn_with_no_tool_calls_ends_the_loop_immediately() {
        let base_url = spawn_stub_llm(VecDeque::from([final_turn("Hi")])).await;
        let mut llm_config = agentry_config::LlmConfig::default();
        llm_config.base_url = base_url;
        let agent = test_agent_with_base_url(&llm_config);

        let session_id = Uuid::new_v4();
        let timeline = agent.run(RunInput::new("Hello", session_id, Role::Dev), false).await;

        assert!(timeline.tool_calls.is_empty());
        assert_eq!(timeline.final_response, "Hi");
        let memory = agent.store.get(session_id).await.unwrap();
        assert_eq!(memory.messages.len(), 2);
    }

    /// Property #1 / S5: a synthetic LLM that always emits a tool call
    /// forces the loop to run exactly `max_iterations` times and fall back
    /// to the "Completed k tool operations" response.
    #[tokio::test]
    async fn loop_terminates_at_the_iteration_cap() {
        let turns: VecDeque<Value> = (0..3)
            .map(|_| tool_turn("kv_get", json!({"key": "price"})))
            .collect();
        let base_url = spawn_stub_llm(turns).await;
        let mut llm_config = agentry_config::LlmConfig::default();
        llm_config.base_url = base_url;
        let agent = test_agent_with_base_url(&llm_config);

        let mut input = RunInput::new("loop forever", Uuid::new_v4(), Role::Dev);
        input.max_iterations = 3;
        let timeline = agent.run(input, false).await;

        assert_eq!(timeline.tool_calls.len(), 3);
        assert_eq!(timeline.final_response, "Completed 3 tool operations. Check the execution timeline for details.");
    }

    /// Property #2: a single assistant turn requesting three tools must
    /// execute them in the order the model emitted them.
    #[tokio::test]
    async fn tool_calls_within_one_turn_execute_in_emission_order() {
        let first_turn = json!({
            "message": {
                "content": "",
                "tool_calls": [
                    {"function": {"name": "kv_get", "arguments": {"key": "a"}}},
                    {"function": {"name": "kv_get", "arguments": {"key": "b"}}},
                    {"function": {"name": "kv_get", "arguments": {"key": "c"}}},
                ]
            }
        });
        let base_url = spawn_stub_llm(VecDeque::from([first_turn, final_turn("done")])).await;
        let mut llm_config = agentry_config::LlmConfig::default();
        llm_config.base_url = base_url;
        let agent = test_agent_with_base_url(&llm_config);

        let timeline = agent
            .run(RunInput::new("fetch a, b, c", Uuid::new_v4(), Role::Dev), false)
            .await;

        let keys: Vec<String> = timeline
            .tool_calls
            .iter()
            .map(|c| c.args.get("key").and_then(|v| v.as_str()).unwrap_or("").to_string())
            .collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    /// Property #3: a readonly caller asking for an admin-only tool gets a
    /// recorded error and the loop continues rather than aborting.
    #[tokio::test]
    async fn permission_denial_is_recorded_and_the_loop_continues() {
        let turns = VecDeque::from([
            tool_turn("db_migrate", json!({})),
            final_turn("refused"),
        ]);
        let base_url = spawn_stub_llm(turns).await;
        let mut llm_config = agentry_config::LlmConfig::default();
        llm_config.base_url = base_url;
        let agent = test_agent_with_base_url(&llm_config);

        let timeline = agent
            .run(RunInput::new("migrate now", Uuid::new_v4(), Role::Readonly), false)
            .await;

        assert_eq!(timeline.tool_calls.len(), 1);
        let call = &timeline.tool_calls[0];
        assert_eq!(call.status, ToolCallStatus::Error);
        assert_eq!(call.duration_ms, Some(0));
        assert!(call.error.as_deref().unwrap_or("").contains("Permission denied"));
        assert_eq!(timeline.final_response, "refused");
    }

    /// Property #5: repeated runs on the same session only ever append
    /// user/assistant pairs, and `updated_at` never moves backwards.
    #[tokio::test]
    async fn session_history_is_append_only_across_multiple_runs() {
        let turns = VecDeque::from([final_turn("first"), final_turn("second")]);
        let base_url = spawn_stub_llm(turns).await;
        let mut llm_config = agentry_config::LlmConfig::default();
        llm_config.base_url = base_url;
        let agent = test_agent_with_base_url(&llm_config);
        let session_id = Uuid::new_v4();

        agent.run(RunInput::new("first prompt", session_id, Role::Dev), false).await;
        let after_first = agent.store.get(session_id).await.unwrap();
        let first_updated_at = after_first.last_activity();
        assert_eq!(after_first.messages.len(), 2);

        agent.run(RunInput::new("second prompt", session_id, Role::Dev), false).await;
        let after_second = agent.store.get(session_id).await.unwrap();
        assert_eq!(after_second.messages.len(), 4);
        assert!(after_second.last_activity() >= first_updated_at);
        assert_eq!(after_second.messages[0].content, "first prompt");
        assert_eq!(after_second.messages[2].content, "second prompt");
    }
}
