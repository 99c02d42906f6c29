//! Reviewer sub-agent (C10): a single LLM call that scores an executed
//! timeline, with a deterministic fallback computed from the tool-call
//! outcomes when the model's output can't be parsed.

use std::sync::Arc;

use agentry_core::{ExecutionTimeline, Review, ToolCallStatus};
use agentry_llm::{extract_json_output, ChatMessage, LlmClient};
use serde::Deserialize;

const REVIEWER_SYSTEM_PROMPT: &str = "You are the review stage of an agent pipeline. You are \
given the user's goal and the tool calls executed to satisfy it. Respond with a single JSON \
object of the shape {\"passed\":bool,\"score\":int,\"feedback\":string,\"issues\":[string],\
\"suggestions\":[string]}. score is 0-10. Respond with JSON only, no commentary.";

#[derive(Debug, Deserialize)]
struct RawReview {
    passed: bool,
    score: i32,
    #[serde(default)]
    feedback: String,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    suggestions: Vec<String>,
}

pub async fn review(llm: &Arc<LlmClient>, timeline: &ExecutionTimeline) -> Review {
    let successes = timeline
        .tool_calls
        .iter()
        .filter(|c| c.status == ToolCallStatus::Success)
        .count();
    let errors = timeline
        .tool_calls
        .iter()
        .filter(|c| c.status == ToolCallStatus::Error)
        .count();

    let summary = format!(
        "Goal: {}\nFinal response: {}\nTool calls: {} succeeded, {} failed.",
        timeline.user_prompt, timeline.final_response, successes, errors
    );
    let messages = vec![
        ChatMessage::system(REVIEWER_SYSTEM_PROMPT),
        ChatMessage::user(summary),
    ];

    let raw = match llm.chat(&messages, None).await {
        Ok(response) => extract_json_output::<RawReview>(&response.content),
        Err(_) => None,
    };

    let mut review = match raw {
        Some(raw) => Review {
            passed: raw.passed,
            score: raw.score,
            feedback: raw.feedback,
            issues: raw.issues,
            suggestions: raw.suggestions,
        },
        None => fallback_review(successes, errors),
    };
    review.clamp_score();
    review
}

fn fallback_review(successes: usize, errors: usize) -> Review {
    let passed = errors == 0 || successes > errors;
    let score = if errors == 0 {
        8
    } else if successes > 0 {
        6
    } else {
        4
    };
    Review {
        passed,
        score,
        feedback: format!("{successes} tool call(s) succeeded, {errors} failed."),
        issues: Vec::new(),
        suggestions: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_passes_when_there_are_no_errors() {
        let review = fallback_review(3, 0);
        assert!(review.passed);
        assert_eq!(review.score, 8);
    }

    #[test]
    fn fallback_passes_when_successes_outnumber_errors() {
        let review = fallback_review(2, 1);
        assert!(review.passed);
        assert_eq!(review.score, 6);
    }

    #[test]
    fn fallback_fails_when_every_tool_call_errored() {
        let review = fallback_review(0, 2);
        assert!(!review.passed);
        assert_eq!(review.score, 4);
    }

    #[test]
    fn clamp_score_bounds_into_zero_to_ten() {
        let mut review = fallback_review(0, 0);
        review.score = 42;
        review.clamp_score();
        assert_eq!(review.score, 10);
        review.score = -5;
        review.clamp_score();
        assert_eq!(review.score, 0);
    }
}
