use futures::future::join_all;
use serde_json::{Map, Value};
use tracing::warn;

use super::{clamp_confidence, get_bool, get_f64, get_str, invoke_for_task};
use crate::llm::fallback::{CHURN_WORDS, LEGAL_WORDS, contains_term};
use crate::llm::{GatewayError, LlmGateway, TaskKind};
use crate::models::{
    ClassifiedIssue, GroundingExcerpt, KnowledgeResult, ValidatedSeverity, severity_bucket,
    severity_label,
};

const ROLE: &str = "You are the FINAL AUTHORITY for severity validation. You validate a proposed severity against the fixed rubric and grounded SOP knowledge, correcting it when the grounding contradicts the proposal. Your final_severity is the only severity value used downstream.";

const RUBRIC: &str = r#"Severity Rubric (1-5 integer scale):
1 = Minor inconvenience, no repetition
2 = Repeated issue, no financial impact
3 = Service degradation, temporary impact
4 = Revenue loss, payment failure, trust impact
5 = Legal risk, mass outage, churn threat"#;

pub fn build_prompt(issue: &ClassifiedIssue, grounding: &KnowledgeResult) -> String {
    let issue_json = serde_json::to_string_pretty(issue).unwrap_or_else(|_| "{}".to_string());
    let grounding_json =
        serde_json::to_string_pretty(grounding).unwrap_or_else(|_| "{}".to_string());
    format!(
        r#"Validate the proposed severity for this classified issue.

{RUBRIC}

CLASSIFIED ISSUE:
{issue_json}

GROUNDING CONTEXT:
{grounding_json}

RULES:
- If grounding context contradicts the proposed severity, correct it.
- If no grounding applies, keep the proposed severity but document lower confidence.
- Always output severity as an integer between 1 and 5.

You MUST respond with ONLY this JSON format, no other text:

{{
    "issue_id": "{issue_id}",
    "final_severity": <integer 1-5>,
    "severity_label": "<Low|Moderate|Elevated|High|Critical>",
    "validated": true,
    "confidence": <float between 0.0 and 1.0>,
    "justification": "<reasoning, citing grounding when available>",
    "grounding_source": "<doc id and section, or null>"
}}
"#,
        issue_id = issue.issue_id
    )
}

/// Result of the severity validation stage: the authoritative verdicts plus
/// how many per-issue invocations had to be substituted after a failure.
#[derive(Debug)]
pub struct SeverityOutcome {
    pub validated: Vec<ValidatedSeverity>,
    pub failures: usize,
}

/// Validate severity for every classified issue, one model call per issue,
/// fanned out concurrently. A failed invocation is substituted with the
/// deterministic rubric mapping rather than aborting the stage.
pub async fn run(
    gateway: &LlmGateway,
    classified: &[ClassifiedIssue],
    grounding: &KnowledgeResult,
) -> SeverityOutcome {
    let calls = classified
        .iter()
        .map(|issue| validate_one(gateway, issue, grounding));
    let results = join_all(calls).await;

    let mut validated = Vec::with_capacity(classified.len());
    let mut failures = 0;
    for (issue, result) in classified.iter().zip(results) {
        match result {
            Ok(verdict) => validated.push(verdict),
            Err(e) => {
                warn!(
                    "severity validation for {} failed ({e}), applying rubric mapping",
                    issue.issue_id
                );
                failures += 1;
                validated.push(backfill(&Map::new(), issue, grounding));
            }
        }
    }

    SeverityOutcome {
        validated,
        failures,
    }
}

async fn validate_one(
    gateway: &LlmGateway,
    issue: &ClassifiedIssue,
    grounding: &KnowledgeResult,
) -> Result<ValidatedSeverity, GatewayError> {
    let map = invoke_for_task(
        gateway,
        TaskKind::SeverityValidation,
        ROLE,
        &build_prompt(issue, grounding),
        &issue.issue_text,
    )
    .await?;
    Ok(backfill(&map, issue, grounding))
}

/// Complete a parsed verdict and enforce the grounding contract: when a
/// relevant policy excerpt sets a higher severity floor than the model's
/// answer, the floor wins and the correction is recorded in the
/// justification.
pub fn backfill(
    map: &Map<String, Value>,
    issue: &ClassifiedIssue,
    grounding: &KnowledgeResult,
) -> ValidatedSeverity {
    let mut final_severity = parse_final_severity(map, issue);
    let relevant = relevant_excerpt(issue, grounding);

    let mut justification = get_str(map, "justification")
        .map(str::to_string)
        .unwrap_or_else(|| {
            format!(
                "Proposed severity {:.2} mapped to {} under the fixed rubric.",
                issue.proposed_severity, final_severity
            )
        });
    let mut grounding_source = get_str(map, "grounding_source").map(str::to_string);

    if let Some(excerpt) = relevant {
        if let Some(floor) = severity_floor(excerpt, issue) {
            if floor > final_severity {
                justification = format!(
                    "Severity raised from {} to {} per {}: {}",
                    final_severity,
                    floor,
                    excerpt.citation(),
                    excerpt.content
                );
                final_severity = floor;
            }
        }
        if grounding_source.is_none() {
            grounding_source = Some(excerpt.citation());
        }
    }

    let default_confidence = if relevant.is_some() { 0.8 } else { 0.6 };
    let confidence =
        clamp_confidence(get_f64(map, "confidence").unwrap_or(default_confidence));

    let label = get_str(map, "severity_label")
        .map(str::to_string)
        .unwrap_or_else(|| severity_label(final_severity).to_string());

    ValidatedSeverity {
        issue_id: issue.issue_id.clone(),
        final_severity,
        severity_label: label,
        validated: get_bool(map, "validated").unwrap_or(true),
        confidence,
        justification,
        grounding_source,
    }
}

fn parse_final_severity(map: &Map<String, Value>, issue: &ClassifiedIssue) -> i64 {
    match map.get("final_severity") {
        Some(value) => {
            if let Some(severity) = value.as_i64() {
                if (1..=5).contains(&severity) {
                    return severity;
                }
            } else if let Some(fraction) = value.as_f64() {
                // A fractional echo of the proposal gets the same bucketing
                // as the proposal itself
                if (0.0..=1.0).contains(&fraction) {
                    return severity_bucket(fraction);
                }
                let rounded = fraction.round() as i64;
                if (1..=5).contains(&rounded) {
                    return rounded;
                }
            }
            severity_bucket(issue.proposed_severity)
        }
        None => severity_bucket(issue.proposed_severity),
    }
}

fn relevant_excerpt<'a>(
    issue: &ClassifiedIssue,
    grounding: &'a KnowledgeResult,
) -> Option<&'a GroundingExcerpt> {
    grounding
        .grounding_context
        .iter()
        .find(|excerpt| excerpt.related_issue_id == issue.issue_id)
        .or_else(|| {
            grounding
                .grounding_context
                .iter()
                .find(|excerpt| severity_floor(excerpt, issue).is_some())
        })
}

/// Minimum severity a known policy document imposes on a matching issue.
fn severity_floor(excerpt: &GroundingExcerpt, issue: &ClassifiedIssue) -> Option<i64> {
    let text = format!("{} {}", issue.issue_text, issue.category).to_lowercase();
    match excerpt.doc_id.as_str() {
        // Billing disputes are revenue-impacting
        "SOP-2024-001" if issue.category == "Billing / Pricing" => Some(4),
        // Unresolved cancellation intent is a churn threat
        "SOP-2024-002" if CHURN_WORDS.iter().any(|term| contains_term(&text, term)) => Some(5),
        // Legal mentions are highest severity
        "SOP-2024-003" if LEGAL_WORDS.iter().any(|term| contains_term(&text, term)) => Some(5),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn classified(id: &str, text: &str, category: &str, proposed: f64) -> ClassifiedIssue {
        ClassifiedIssue {
            issue_id: id.to_string(),
            issue_text: text.to_string(),
            category: category.to_string(),
            proposed_severity: proposed,
            confidence: 0.85,
        }
    }

    fn billing_grounding() -> KnowledgeResult {
        KnowledgeResult {
            grounding_context: vec![GroundingExcerpt {
                doc_id: "SOP-2024-001".to_string(),
                version: "1.2".to_string(),
                section: "§3.2".to_string(),
                content: "Billing disputes are revenue-impacting.".to_string(),
                effective_from: "2024-01-01".to_string(),
                related_issue_id: String::new(),
            }],
            confidence: 0.7,
        }
    }

    fn map_from(value: serde_json::Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_backfill_maps_proposal_through_rubric() {
        let issue = classified("issue_1", "Slow response", "Response Time", 0.45);
        let verdict = backfill(&Map::new(), &issue, &KnowledgeResult::default());
        assert_eq!(verdict.final_severity, 3);
        assert_eq!(verdict.severity_label, "Elevated");
        assert!(verdict.validated);
        assert_eq!(verdict.confidence, 0.6);
        assert!(verdict.grounding_source.is_none());
    }

    #[test]
    fn test_grounding_floor_overrides_low_severity() {
        let issue = classified("issue_1", "Charged twice this month", "Billing / Pricing", 0.3);
        let verdict = backfill(&Map::new(), &issue, &billing_grounding());
        assert_eq!(verdict.final_severity, 4);
        assert!(verdict.justification.contains("Severity raised from 2 to 4"));
        assert_eq!(verdict.grounding_source.as_deref(), Some("SOP-2024-001 §3.2"));
    }

    #[test]
    fn test_grounding_does_not_lower_severity() {
        let issue = classified("issue_1", "Charged twice", "Billing / Pricing", 0.95);
        let verdict = backfill(&Map::new(), &issue, &billing_grounding());
        assert_eq!(verdict.final_severity, 5);
    }

    #[test]
    fn test_model_verdict_respected_within_range() {
        let issue = classified("issue_1", "Minor typo in email", "Other", 0.1);
        let map = map_from(json!({
            "final_severity": 2,
            "severity_label": "Moderate",
            "validated": true,
            "confidence": 0.9,
            "justification": "Repeated but harmless.",
        }));
        let verdict = backfill(&map, &issue, &KnowledgeResult::default());
        assert_eq!(verdict.final_severity, 2);
        assert_eq!(verdict.confidence, 0.9);
        assert_eq!(verdict.justification, "Repeated but harmless.");
    }

    #[test]
    fn test_out_of_range_model_severity_falls_back_to_proposal() {
        let issue = classified("issue_1", "Outage", "Technical Issues", 0.85);
        let map = map_from(json!({"final_severity": 11}));
        let verdict = backfill(&map, &issue, &KnowledgeResult::default());
        assert_eq!(verdict.final_severity, 5);
    }

    #[tokio::test]
    async fn test_run_with_fallback_gateway_validates_every_issue() {
        let gateway = LlmGateway::new(crate::llm::GatewayConfig::default());
        let issues = vec![
            classified("issue_1", "Billing dispute", "Billing / Pricing", 0.7),
            classified("issue_2", "Rude agent", "Customer Support", 0.4),
        ];
        let outcome = run(&gateway, &issues, &KnowledgeResult::default()).await;
        assert_eq!(outcome.failures, 0);
        assert_eq!(outcome.validated.len(), 2);
        assert_eq!(outcome.validated[0].issue_id, "issue_1");
        assert_eq!(outcome.validated[1].issue_id, "issue_2");
    }
}
