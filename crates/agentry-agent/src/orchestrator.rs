//! Orchestrator (C11): composes the planner, the reasoning loop, and the
//! reviewer into one multi-agent run, emitting the phase events the single
//! `ReasoningAgent::run` does not (it runs with `emit_lifecycle=false` here).

use std::sync::Arc;

use agentry_config::AppConfig;
use agentry_core::{AgentLogEntry, AgentStage, MultiAgentTimeline, Role};
use agentry_events::{names, SharedEventBus};
use agentry_exec::ToolExecutor;
use agentry_llm::LlmClient;
use agentry_memory::SessionStore;
use agentry_metrics::MetricsStore;
use serde_json::json;
use uuid::Uuid;

use crate::agent::{ReasoningAgent, RunInput};
use crate::planner::plan;
use crate::reviewer::review;

pub struct OrchestratorInput {
    pub user_prompt: String,
    pub session_id: Uuid,
    pub role: Role,
}

pub struct Orchestrator {
    agent: ReasoningAgent,
    llm: Arc<LlmClient>,
    executor: Arc<ToolExecutor>,
    events: SharedEventBus,
}

impl Orchestrator {
    pub fn new(
        config: Arc<AppConfig>,
        llm: Arc<LlmClient>,
        executor: Arc<ToolExecutor>,
        store: Arc<SessionStore>,
        events: SharedEventBus,
        metrics: Arc<MetricsStore>,
    ) -> Self {
        let agent = ReasoningAgent::new(
            config,
            llm.clone(),
            executor.clone(),
            store,
            events.clone(),
            metrics,
        );
        Orchestrator { agent, llm, executor, events }
    }

    pub async fn run(&self, input: OrchestratorInput) -> MultiAgentTimeline {
        let known_tools: Vec<String> = self
            .executor
            .registry()
            .for_role(input.role, false)
            .into_iter()
            .map(|s| s.name)
            .collect();

        self.events
            .publish(input.session_id, names::AGENT_PLANNING, json!({}))
            .await;
        let plan = plan(&self.llm, &input.user_prompt, &known_tools).await;
        self.events
            .publish(
                input.session_id,
                names::AGENT_PLAN_READY,
                serde_json::to_value(&plan).unwrap_or(json!({})),
            )
            .await;
        let planner_log = AgentLogEntry {
            stage: AgentStage::Planner,
            message: format!("planned {} step(s) for: {}", plan.steps.len(), plan.goal),
            timestamp: chrono::Utc::now(),
        };

        self.events
            .publish(input.session_id, names::AGENT_EXECUTING, json!({}))
            .await;
        let run_input = RunInput::new(input.user_prompt.clone(), input.session_id, input.role);
        let timeline = self.agent.run(run_input, false).await;
        let executor_log = AgentLogEntry {
            stage: AgentStage::Executor,
            message: format!("executed {} tool call(s)", timeline.tool_calls.len()),
            timestamp: chrono::Utc::now(),
        };

        self.events
            .publish(input.session_id, names::AGENT_REVIEWING, json!({}))
            .await;
        let review = review(&self.llm, &timeline).await;
        self.events
            .publish(
                input.session_id,
                names::AGENT_REVIEW_DONE,
                serde_json::to_value(&review).unwrap_or(json!({})),
            )
            .await;
        let reviewer_log = AgentLogEntry {
            stage: AgentStage::Reviewer,
            message: format!("score {} — passed: {}", review.score, review.passed),
            timestamp: chrono::Utc::now(),
        };

        self.events
            .publish(
                input.session_id,
                names::AGENT_DONE,
                json!({"final_response": timeline.final_response}),
            )
            .await;

        MultiAgentTimeline {
            timeline,
            plan,
            review,
            agent_logs: vec![planner_log, executor_log, reviewer_log],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_log_stages_land_in_planner_executor_reviewer_order() {
        let logs = vec![
            AgentLogEntry { stage: AgentStage::Planner, message: String::new(), timestamp: chrono::Utc::now() },
            AgentLogEntry { stage: AgentStage::Executor, message: String::new(), timestamp: chrono::Utc::now() },
            AgentLogEntry { stage: AgentStage::Reviewer, message: String::new(), timestamp: chrono::Utc::now() },
        ];
        let stages: Vec<AgentStage> = logs.iter().map(|l| l.stage).collect();
        assert_eq!(stages, vec![AgentStage::Planner, AgentStage::Executor, AgentStage::Reviewer]);
    }
}
