use serde_json::{Map, Value};

use super::{get_bool, get_i64, get_str, invoke_for_task};
use crate::llm::{GatewayError, LlmGateway, TaskKind};
use crate::models::{QaBreakdown, QaScoreResult};

const ROLE: &str = "You are a Quality Assurance Specialist. You evaluate customer service calls based on strict quality criteria.";

/// Neutral total used when the model supplies neither a total nor any
/// component to derive one from.
const NEUTRAL_TOTAL: i64 = 50;

pub fn build_prompt(transcript: &str) -> String {
    format!(
        r#"Evaluate the following customer service call transcript for Quality Assurance.

TRANSCRIPT:
{transcript}

SCORING CRITERIA (Total 100 points):
- Greeting & Closing (10 points): Professional opening and closing of the call
- Empathy & Tone (20 points): Showing understanding, active listening, appropriate tone
- Solution Accuracy (40 points): Correctly addressing the customer's issue, providing accurate information
- Efficiency (10 points): Handling the call without unnecessary delays
- Compliance (20 points): Following proper procedures, verification, legal requirements

Score each category and provide an overall assessment.

You MUST respond with ONLY this JSON format, no other text:

{{
    "total_score": <0-100 integer>,
    "breakdown": {{
        "greeting": <0-10 integer>,
        "empathy": <0-20 integer>,
        "solution": <0-40 integer>,
        "efficiency": <0-10 integer>,
        "compliance": <0-20 integer>
    }},
    "critical_fail": <true if any major issue like rudeness or misinformation, else false>,
    "comments": "<Brief summary of the agent's performance>"
}}
"#
    )
}

pub async fn run(gateway: &LlmGateway, transcript: &str) -> Result<QaScoreResult, GatewayError> {
    let map = invoke_for_task(
        gateway,
        TaskKind::QaScore,
        ROLE,
        &build_prompt(transcript),
        transcript,
    )
    .await?;
    Ok(backfill(&map))
}

/// Complete a parsed response. A missing total is the sum of the breakdown;
/// with no breakdown either, any adherence-style score present is used,
/// and failing that a neutral constant.
pub fn backfill(map: &Map<String, Value>) -> QaScoreResult {
    let breakdown = map
        .get("breakdown")
        .and_then(Value::as_object)
        .map(|object| QaBreakdown {
            greeting: get_i64(object, "greeting").unwrap_or(0).clamp(0, 10),
            empathy: get_i64(object, "empathy").unwrap_or(0).clamp(0, 20),
            solution: get_i64(object, "solution").unwrap_or(0).clamp(0, 40),
            efficiency: get_i64(object, "efficiency").unwrap_or(0).clamp(0, 10),
            compliance: get_i64(object, "compliance").unwrap_or(0).clamp(0, 20),
        });

    let total_score = get_i64(map, "total_score")
        .or_else(|| breakdown.as_ref().map(QaBreakdown::total))
        .or_else(|| get_i64(map, "adherence_score"))
        .or_else(|| get_i64(map, "score"))
        .unwrap_or(NEUTRAL_TOTAL)
        .clamp(0, 100);

    // With no breakdown, distribute the total by rubric weights; the
    // solution component absorbs integer rounding
    let breakdown = breakdown.unwrap_or_else(|| {
        let greeting = total_score / 10;
        let empathy = total_score / 5;
        let efficiency = total_score / 10;
        let compliance = total_score / 5;
        QaBreakdown {
            greeting,
            empathy,
            solution: total_score - greeting - empathy - efficiency - compliance,
            efficiency,
            compliance,
        }
    });

    QaScoreResult {
        total_score,
        breakdown,
        critical_fail: get_bool(map, "critical_fail").unwrap_or(false),
        comments: get_str(map, "comments").unwrap_or_default().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map_from(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_backfill_total_from_breakdown() {
        let result = backfill(&map_from(json!({
            "breakdown": {
                "greeting": 8,
                "empathy": 15,
                "solution": 35,
                "efficiency": 8,
                "compliance": 14,
            },
        })));
        assert_eq!(result.total_score, 80);
        assert_eq!(result.breakdown.solution, 35);
    }

    #[test]
    fn test_backfill_total_from_adherence_style_field() {
        let result = backfill(&map_from(json!({"adherence_score": 72})));
        assert_eq!(result.total_score, 72);
    }

    #[test]
    fn test_backfill_neutral_constant_when_nothing_present() {
        let result = backfill(&Map::new());
        assert_eq!(result.total_score, 50);
        assert!(!result.critical_fail);
    }

    #[test]
    fn test_backfill_distributes_breakdown_from_total() {
        let result = backfill(&map_from(json!({"total_score": 100})));
        assert_eq!(result.breakdown.greeting, 10);
        assert_eq!(result.breakdown.empathy, 20);
        assert_eq!(result.breakdown.solution, 40);
        assert_eq!(result.breakdown.efficiency, 10);
        assert_eq!(result.breakdown.compliance, 20);
        assert_eq!(result.breakdown.total(), 100);
    }

    #[test]
    fn test_backfill_breakdown_sum_matches_total_after_rounding() {
        let result = backfill(&map_from(json!({"total_score": 77})));
        assert_eq!(result.breakdown.total(), 77);
    }

    #[test]
    fn test_backfill_clamps_components() {
        let result = backfill(&map_from(json!({
            "breakdown": {
                "greeting": 50,
                "empathy": 0,
                "solution": 0,
                "efficiency": 0,
                "compliance": 0,
            },
        })));
        assert_eq!(result.breakdown.greeting, 10);
        assert_eq!(result.total_score, 10);
    }
}
