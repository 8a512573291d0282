use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::debug;

use super::{clamp_confidence, get_array, get_f64, get_str, invoke_for_task};
use crate::llm::fallback::{
    BILLING_WORDS, CHURN_WORDS, LEGAL_WORDS, NEGATIVE_WORDS, contains_term, first_term,
};
use crate::llm::{GatewayError, LlmGateway, TaskKind};
use crate::models::{ClassifiedIssue, Issue, KnowledgeResult, SERVICE_CATEGORIES};

const ROLE: &str = "You are a Service Classification Agent. You take a list of customer issues with grounding context and map each issue to a service category with a proposed severity. Your severity is a proposal only; the Severity Validation Agent is the final authority.";

pub fn build_prompt(issues: &[Issue], grounding: &KnowledgeResult) -> String {
    let issues_json =
        serde_json::to_string_pretty(issues).unwrap_or_else(|_| "[]".to_string());
    let grounding_json =
        serde_json::to_string_pretty(grounding).unwrap_or_else(|_| "{}".to_string());
    let categories = SERVICE_CATEGORIES
        .iter()
        .map(|category| format!("- {category}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        r#"Classify each extracted customer issue into a service category.

ALLOWED SERVICE CATEGORIES:
{categories}

ISSUES:
{issues_json}

GROUNDING CONTEXT:
{grounding_json}

RULES:
- Do NOT change the issue_id or issue_text.
- Do NOT add new issues.
- Propose severity as a score between 0.0 and 1.0 based on impact; it is a PROPOSAL ONLY, not final.

You MUST respond with ONLY this JSON format, no other text:

{{
    "classified_issues": [
        {{
            "issue_id": "issue_1",
            "issue_text": "<unchanged issue text>",
            "category": "<one of the allowed categories>",
            "proposed_severity": <float between 0.0 and 1.0>,
            "confidence": <float between 0.0 and 1.0>
        }}
    ]
}}
"#
    )
}

/// Classify each issue into a category with a proposed severity. Output is
/// always set-equal to the input on issue_id: model entries for unknown
/// ids are dropped and missing ids are synthesized by keyword rules.
pub async fn run(
    gateway: &LlmGateway,
    issues: &[Issue],
    grounding: &KnowledgeResult,
) -> Result<Vec<ClassifiedIssue>, GatewayError> {
    let map = invoke_for_task(
        gateway,
        TaskKind::Classification,
        ROLE,
        &build_prompt(issues, grounding),
        "",
    )
    .await?;
    Ok(backfill(&map, issues))
}

pub fn backfill(map: &Map<String, Value>, issues: &[Issue]) -> Vec<ClassifiedIssue> {
    let mut by_id: HashMap<&str, &Value> = HashMap::new();
    if let Some(values) = get_array(map, "classified_issues") {
        for value in values {
            if let Some(id) = value.as_object().and_then(|o| get_str(o, "issue_id")) {
                if issues.iter().any(|issue| issue.issue_id == id) {
                    by_id.insert(id, value);
                } else {
                    debug!("dropping classification for unknown issue id {id}");
                }
            }
        }
    }

    issues
        .iter()
        .map(|issue| match by_id.get(issue.issue_id.as_str()).copied() {
            Some(value) => normalize(value, issue),
            None => classify_by_keywords(issue),
        })
        .collect()
}

fn normalize(value: &Value, issue: &Issue) -> ClassifiedIssue {
    let object = value.as_object();
    let category = object
        .and_then(|o| get_str(o, "category"))
        .unwrap_or_else(|| keyword_category(&issue_terms(issue)))
        .to_string();
    let proposed_severity = object
        .and_then(|o| get_f64(o, "proposed_severity"))
        .map(normalize_proposed)
        .unwrap_or_else(|| proposed_by_keywords(&issue_terms(issue)));
    let confidence = clamp_confidence(
        object.and_then(|o| get_f64(o, "confidence")).unwrap_or(0.8),
    );
    ClassifiedIssue {
        issue_id: issue.issue_id.clone(),
        issue_text: issue.issue_text.clone(),
        category,
        proposed_severity,
        confidence,
    }
}

fn classify_by_keywords(issue: &Issue) -> ClassifiedIssue {
    let text = issue_terms(issue);
    ClassifiedIssue {
        issue_id: issue.issue_id.clone(),
        issue_text: issue.issue_text.clone(),
        category: keyword_category(&text).to_string(),
        proposed_severity: proposed_by_keywords(&text),
        confidence: 0.8,
    }
}

fn issue_terms(issue: &Issue) -> String {
    format!("{} {}", issue.issue_text, issue.evidence_span).to_lowercase()
}

const RESPONSE_TIME_WORDS: [&str; 6] = ["wait", "waiting", "hours", "hold", "delay", "slow"];
const PRODUCT_WORDS: [&str; 5] = ["broken", "damaged", "defective", "quality", "stopped working"];
const SUPPORT_WORDS: [&str; 5] = ["rude", "agent", "support", "service", "hung up"];
const TECHNICAL_WORDS: [&str; 6] = ["error", "crash", "bug", "login", "website", "app"];
const DELIVERY_WORDS: [&str; 5] = ["delivery", "shipping", "package", "courier", "late"];

/// Keyword mapping into the fixed category set; always returns a member of
/// SERVICE_CATEGORIES.
fn keyword_category(text: &str) -> &'static str {
    if first_term(text, &BILLING_WORDS).is_some() {
        "Billing / Pricing"
    } else if first_term(text, &RESPONSE_TIME_WORDS).is_some() {
        "Response Time"
    } else if first_term(text, &PRODUCT_WORDS).is_some() {
        "Product Quality"
    } else if first_term(text, &TECHNICAL_WORDS).is_some() {
        "Technical Issues"
    } else if first_term(text, &DELIVERY_WORDS).is_some() {
        "Delivery / Logistics"
    } else if first_term(text, &SUPPORT_WORDS).is_some() {
        "Customer Support"
    } else {
        "Other"
    }
}

fn proposed_by_keywords(text: &str) -> f64 {
    let mut proposed: f64 = 0.5;
    if LEGAL_WORDS.iter().any(|term| contains_term(text, term)) {
        proposed += 0.3;
    }
    if CHURN_WORDS.iter().any(|term| contains_term(text, term)) {
        proposed += 0.2;
    }
    if NEGATIVE_WORDS.iter().any(|term| contains_term(text, term)) {
        proposed += 0.1;
    }
    proposed.min(0.95)
}

/// Normalize a model-proposed severity to [0,1]. Values in (1,5] are
/// treated as the legacy 1-5 integer scale and mapped back linearly.
fn normalize_proposed(value: f64) -> f64 {
    if !value.is_finite() {
        0.5
    } else if value <= 1.0 {
        value.clamp(0.0, 1.0)
    } else if value <= 5.0 {
        (value - 1.0) / 4.0
    } else {
        1.0
    }
}
