//! Planner sub-agent (C9): a single LLM call that turns a user prompt into
//! a `Plan`, with a deterministic fallback when the model's output can't be
//! parsed.

use std::sync::Arc;

use agentry_core::{Plan, PlanComplexity, PlanStep, StepStatus};
use agentry_llm::{extract_json_output, ChatMessage, LlmClient};
use serde::Deserialize;

const PLANNER_SYSTEM_PROMPT: &str = "You are the planning stage of an agent pipeline. Given a \
user request, respond with a single JSON object of the shape \
{\"goal\":string,\"complexity\":\"simple\"|\"medium\"|\"complex\",\"estimated_tools\":[string],\
\"steps\":[{\"step_no\":int,\"description\":string,\"tool_hint\":string|null}]}. \
Respond with JSON only, no commentary.";

#[derive(Debug, Deserialize)]
struct RawPlan {
    goal: String,
    complexity: PlanComplexity,
    #[serde(default)]
    estimated_tools: Vec<String>,
    #[serde(default)]
    steps: Vec<RawStep>,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    step_no: u32,
    description: String,
    #[serde(default)]
    tool_hint: Option<String>,
}

/// Calls the LLM once to produce a `Plan` for `user_prompt`. `known_tools`
/// is the set of tool names the model is allowed to reference in
/// `estimated_tools`; anything else is dropped.
pub async fn plan(llm: &Arc<LlmClient>, user_prompt: &str, known_tools: &[String]) -> Plan {
    let messages = vec![
        ChatMessage::system(PLANNER_SYSTEM_PROMPT),
        ChatMessage::user(user_prompt.to_string()),
    ];

    let raw = match llm.chat(&messages, None).await {
        Ok(response) => extract_json_output::<RawPlan>(&response.content),
        Err(_) => None,
    };

    match raw {
        Some(raw) => {
            let estimated_tools = raw
                .estimated_tools
                .into_iter()
                .filter(|t| known_tools.contains(t))
                .collect();
            let steps = if raw.steps.is_empty() {
                vec![fallback_step(user_prompt)]
            } else {
                raw.steps
                    .into_iter()
                    .map(|s| PlanStep {
                        step_no: s.step_no,
                        description: s.description,
                        tool_hint: s.tool_hint,
                        status: StepStatus::Pending,
                    })
                    .collect()
            };
            Plan { goal: raw.goal, complexity: raw.complexity, estimated_tools, steps }
        }
        None => fallback_plan(user_prompt),
    }
}

fn fallback_step(user_prompt: &str) -> PlanStep {
    PlanStep {
        step_no: 1,
        description: user_prompt.to_string(),
        tool_hint: None,
        status: StepStatus::Pending,
    }
}

fn fallback_plan(user_prompt: &str) -> Plan {
    Plan {
        goal: user_prompt.to_string(),
        complexity: PlanComplexity::Simple,
        estimated_tools: Vec::new(),
        steps: vec![fallback_step(user_prompt)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_plan_echoes_the_user_prompt_as_a_single_step() {
        let plan = fallback_plan("fix the flaky test");
        assert_eq!(plan.goal, "fix the flaky test");
        assert_eq!(plan.complexity, PlanComplexity::Simple);
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].description, "fix the flaky test");
    }

    #[test]
    fn extract_json_output_drops_unknown_tools_via_the_filter_used_in_plan() {
        let raw: RawPlan = extract_json_output(
            "```json\n{\"goal\":\"g\",\"complexity\":\"medium\",\"estimated_tools\":[\"read_file\",\"nope\"],\"steps\":[]}\n```",
        )
        .unwrap();
        let known = vec!["read_file".to_string()];
        let filtered: Vec<String> =
            raw.estimated_tools.into_iter().filter(|t| known.contains(t)).collect();
        assert_eq!(filtered, vec!["read_file".to_string()]);
    }
}
