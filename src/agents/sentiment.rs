use serde_json::{Map, Value};

use super::{get_array, get_bool, get_i64, get_str, invoke_for_task};
use crate::llm::{GatewayError, LlmGateway, TaskKind};
use crate::models::{SentimentPhase, SentimentResult};

const ROLE: &str = "You are an expert Sentiment Analyst. You analyze customer service calls for emotional shifts and sentiment patterns.";

const PHASES: [&str; 3] = ["Opening", "Middle", "Closing"];

pub fn build_prompt(transcript: &str) -> String {
    format!(
        r#"Analyze the following call transcript for sentiment.

TRANSCRIPT:
{transcript}

TASK:
1. Determine overall sentiment score (-100 to +100, where -100 is very negative, 0 is neutral, +100 is very positive).
2. Identify the sentiment at the Beginning (Opening), Middle, and End (Closing) phases.
3. Flag if any escalation indicators are present (threats to cancel, legal mentions, extreme frustration).

You MUST respond with ONLY this JSON format, no other text:

{{
    "score": <integer from -100 to 100>,
    "trajectory": [
        {{ "phase": "Opening", "score": <integer>, "label": "<sentiment label>" }},
        {{ "phase": "Middle", "score": <integer>, "label": "<sentiment label>" }},
        {{ "phase": "Closing", "score": <integer>, "label": "<sentiment label>" }}
    ],
    "label": "<Positive|Neutral|Negative>",
    "escalation_detected": <true|false>
}}
"#
    )
}

pub async fn run(
    gateway: &LlmGateway,
    transcript: &str,
) -> Result<SentimentResult, GatewayError> {
    let map = invoke_for_task(
        gateway,
        TaskKind::Sentiment,
        ROLE,
        &build_prompt(transcript),
        transcript,
    )
    .await?;
    Ok(backfill(&map))
}

/// Label derived from the score thresholds: >20 Positive, <-20 Negative,
/// else Neutral.
pub fn label_for(score: i64) -> &'static str {
    if score > 20 {
        "Positive"
    } else if score < -20 {
        "Negative"
    } else {
        "Neutral"
    }
}

/// Complete a parsed response with deterministic defaults so the result
/// always satisfies the sentiment contract.
pub fn backfill(map: &Map<String, Value>) -> SentimentResult {
    let score = get_i64(map, "score").unwrap_or(0).clamp(-100, 100);
    let label = get_str(map, "label")
        .map(str::to_string)
        .unwrap_or_else(|| label_for(score).to_string());

    let mut trajectory: Vec<SentimentPhase> = get_array(map, "trajectory")
        .map(|phases| {
            phases
                .iter()
                .take(PHASES.len())
                .enumerate()
                .map(|(idx, value)| phase_from_value(value, idx, score, &label))
                .collect()
        })
        .unwrap_or_default();
    // Pad to the three phases with copies of the overall sentiment
    while trajectory.len() < PHASES.len() {
        trajectory.push(SentimentPhase {
            phase: PHASES[trajectory.len()].to_string(),
            score,
            label: label.clone(),
        });
    }

    let escalation_detected = get_bool(map, "escalation_detected").unwrap_or(score < -50);

    SentimentResult {
        score,
        label,
        trajectory,
        escalation_detected,
    }
}

fn phase_from_value(value: &Value, idx: usize, score: i64, label: &str) -> SentimentPhase {
    let object = value.as_object();
    let phase = object
        .and_then(|o| get_str(o, "phase"))
        .unwrap_or(PHASES[idx])
        .to_string();
    let phase_score = object
        .and_then(|o| get_i64(o, "score"))
        .unwrap_or(score)
        .clamp(-100, 100);
    let phase_label = object
        .and_then(|o| get_str(o, "label"))
        .unwrap_or(label)
        .to_string();
    SentimentPhase {
        phase,
        score: phase_score,
        label: phase_label,
    }
}
