use serde_json::{Map, Value};

use super::{get_array, get_bool, get_i64, get_str, get_string_list, invoke_for_task};
use crate::llm::fallback::DEFAULT_SOP_STEPS;
use crate::llm::{GatewayError, LlmGateway, TaskKind};
use crate::models::{ChecklistItem, SopComplianceResult};

const ROLE: &str = "You are a strict QA Compliance Officer. You verify if customer service agents followed the Standard Operating Procedure (SOP) during calls.";

pub fn build_prompt(transcript: &str, steps: &[String]) -> String {
    let steps_list = steps
        .iter()
        .map(|step| format!("- {step}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        r#"Verify if the customer service agent followed these SOP steps in the transcript.

REQUIRED SOP STEPS:
{steps_list}

TRANSCRIPT:
{transcript}

For each step, determine if it was followed (pass) or missed (fail), and provide evidence from the transcript.

You MUST respond with ONLY this JSON format, no other text:

{{
    "adherence_score": <0-100 integer representing percentage of steps passed>,
    "compliant": <true if adherence_score >= 80, else false>,
    "missed_steps": ["<step name>", ...],
    "checklist": [
        {{ "step": "<step name>", "status": "<pass|fail>", "evidence": "<quote or description from transcript>" }},
        ...
    ]
}}
"#
    )
}

/// Check SOP compliance against the supplied steps, or the default step
/// list when none are given.
pub async fn run(
    gateway: &LlmGateway,
    transcript: &str,
    sop_steps: Option<&[String]>,
) -> Result<SopComplianceResult, GatewayError> {
    let steps: Vec<String> = match sop_steps {
        Some(steps) if !steps.is_empty() => steps.to_vec(),
        _ => DEFAULT_SOP_STEPS.iter().map(|s| s.to_string()).collect(),
    };
    let map = invoke_for_task(
        gateway,
        TaskKind::SopCompliance,
        ROLE,
        &build_prompt(transcript, &steps),
        transcript,
    )
    .await?;
    Ok(backfill(&map, &steps))
}

/// Complete a parsed response against the step list. The checklist is the
/// source of truth: adherence, compliance, and missed steps are derived
/// from it whenever the model omits them.
pub fn backfill(map: &Map<String, Value>, steps: &[String]) -> SopComplianceResult {
    let checklist: Vec<ChecklistItem> = match get_array(map, "checklist") {
        Some(items) if !items.is_empty() => items
            .iter()
            .map(|value| {
                let object = value.as_object();
                ChecklistItem {
                    step: object
                        .and_then(|o| get_str(o, "step"))
                        .unwrap_or("Unnamed Step")
                        .to_string(),
                    status: match object.and_then(|o| get_str(o, "status")) {
                        Some("pass") => "pass".to_string(),
                        _ => "fail".to_string(),
                    },
                    evidence: object
                        .and_then(|o| get_str(o, "evidence"))
                        .unwrap_or("not assessed")
                        .to_string(),
                }
            })
            .collect(),
        _ => steps
            .iter()
            .map(|step| ChecklistItem {
                step: step.clone(),
                status: "fail".to_string(),
                evidence: "not assessed".to_string(),
            })
            .collect(),
    };

    let passed = checklist.iter().filter(|item| item.status == "pass").count();
    let derived_adherence = if checklist.is_empty() {
        0
    } else {
        (passed * 100 / checklist.len()) as i64
    };

    let adherence_score = get_i64(map, "adherence_score")
        .unwrap_or(derived_adherence)
        .clamp(0, 100);
    let compliant = get_bool(map, "compliant").unwrap_or(adherence_score >= 80);
    let missed_steps = get_string_list(map, "missed_steps").unwrap_or_else(|| {
        checklist
            .iter()
            .filter(|item| item.status != "pass")
            .map(|item| item.step.clone())
            .collect()
    });

    SopComplianceResult {
        adherence_score,
        compliant,
        missed_steps,
        checklist,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn default_steps() -> Vec<String> {
        DEFAULT_SOP_STEPS.iter().map(|s| s.to_string()).collect()
    }

    fn map_from(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_backfill_empty_response_fails_all_steps() {
        let result = backfill(&Map::new(), &default_steps());
        assert_eq!(result.checklist.len(), 5);
        assert_eq!(result.adherence_score, 0);
        assert!(!result.compliant);
        assert_eq!(result.missed_steps.len(), 5);
    }

    #[test]
    fn test_backfill_derives_adherence_from_checklist() {
        let result = backfill(
            &map_from(json!({
                "checklist": [
                    {"step": "Professional Greeting", "status": "pass", "evidence": "Hello"},
                    {"step": "Customer Verification", "status": "fail"},
                    {"step": "Empathetic Response", "status": "pass", "evidence": "I'm sorry"},
                    {"step": "Solution Provided", "status": "pass", "evidence": "refund issued"},
                    {"step": "Proper Closing", "status": "pass", "evidence": "goodbye"},
                ],
            })),
            &default_steps(),
        );
        assert_eq!(result.adherence_score, 80);
        assert!(result.compliant);
        assert_eq!(result.missed_steps, vec!["Customer Verification"]);
    }

    #[test]
    fn test_backfill_derives_compliance_from_adherence() {
        let result = backfill(&map_from(json!({"adherence_score": 60})), &default_steps());
        assert_eq!(result.adherence_score, 60);
        assert!(!result.compliant);
    }

    #[test]
    fn test_backfill_keeps_explicit_fields() {
        let result = backfill(
            &map_from(json!({"adherence_score": 90, "compliant": false, "missed_steps": []})),
            &default_steps(),
        );
        assert_eq!(result.adherence_score, 90);
        assert!(!result.compliant);
        assert!(result.missed_steps.is_empty());
    }
}
