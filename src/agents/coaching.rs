use serde_json::{Map, Value};

use super::{get_str, get_string_list, invoke_for_task};
use crate::llm::{GatewayError, LlmGateway, TaskKind};
use crate::models::CoachingResult;

const ROLE: &str = "You are an experienced Team Leader and Coach. You provide constructive, actionable feedback to customer service agents to help them improve.";

pub fn build_prompt(transcript: &str) -> String {
    format!(
        r#"Provide coaching feedback for the customer service agent based on this call transcript.

TRANSCRIPT:
{transcript}

TASK:
1. Identify top 3 strengths demonstrated by the agent
2. Identify top 3 areas for improvement
3. Provide specific, actionable advice the agent can apply immediately
4. Recommend training topics that would help

Be constructive and specific. Reference actual moments from the call where possible.

You MUST respond with ONLY this JSON format, no other text:

{{
    "strengths": [
        "<Specific strength 1>",
        "<Specific strength 2>",
        "<Specific strength 3>"
    ],
    "weaknesses": [
        "<Area for improvement 1>",
        "<Area for improvement 2>",
        "<Area for improvement 3>"
    ],
    "actionable_feedback": "<Specific, actionable coaching advice in 1-2 sentences>",
    "recommended_training": ["<Training Topic 1>", "<Training Topic 2>"]
}}
"#
    )
}

pub async fn run(gateway: &LlmGateway, transcript: &str) -> Result<CoachingResult, GatewayError> {
    let map = invoke_for_task(
        gateway,
        TaskKind::Coaching,
        ROLE,
        &build_prompt(transcript),
        transcript,
    )
    .await?;
    Ok(backfill(&map))
}

/// Complete a parsed response. The target is three strengths and three
/// weaknesses but shorter lists are tolerated as-is.
pub fn backfill(map: &Map<String, Value>) -> CoachingResult {
    CoachingResult {
        strengths: get_string_list(map, "strengths").unwrap_or_default(),
        weaknesses: get_string_list(map, "weaknesses").unwrap_or_default(),
        actionable_feedback: get_str(map, "actionable_feedback")
            .unwrap_or("No specific coaching guidance generated for this call.")
            .to_string(),
        recommended_training: get_string_list(map, "recommended_training").unwrap_or_default(),
    }
}
