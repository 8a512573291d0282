use serde_json::{Map, Value};

use super::{get_str, get_string_list, invoke_for_task};
use crate::llm::{GatewayError, LlmGateway, TaskKind};
use crate::models::{InsightResult, KnowledgeResult, Priority, PriorityLevel, ValidatedSeverity};

const ROLE: &str = "You are an Insight and Report Generation Agent. You run only after validation and consume only validated data: final severities, priority scores, and grounded evidence. You identify the most critical service weaknesses and produce short, actionable, business-oriented recommendations. You never modify severity or priority values.";

pub fn build_prompt(
    validated: &[ValidatedSeverity],
    priority: &Priority,
    grounding: &KnowledgeResult,
) -> String {
    let validated_json =
        serde_json::to_string_pretty(validated).unwrap_or_else(|_| "[]".to_string());
    let priority_json =
        serde_json::to_string_pretty(priority).unwrap_or_else(|_| "{}".to_string());
    let grounding_json =
        serde_json::to_string_pretty(grounding).unwrap_or_else(|_| "{}".to_string());
    format!(
        r#"Generate business insights from this VALIDATED issue data.

VALIDATED SEVERITY:
{validated_json}

PRIORITY:
{priority_json}

GROUNDING CONTEXT:
{grounding_json}

RULES:
- Use the final_severity and priority_level as given; do NOT change them.
- Reference grounding sources (SOPs, policies) when available.
- Focus on decision-making value, not storytelling.

You MUST respond with ONLY this JSON format, no other text:

{{
    "insights": "<short analysis of the most critical weaknesses>",
    "recommended_actions": ["<action 1>", "<action 2>"],
    "business_impact": "<impact assessment>"
}}
"#
    )
}

pub async fn run(
    gateway: &LlmGateway,
    validated: &[ValidatedSeverity],
    priority: &Priority,
    grounding: &KnowledgeResult,
) -> Result<InsightResult, GatewayError> {
    let map = invoke_for_task(
        gateway,
        TaskKind::Insight,
        ROLE,
        &build_prompt(validated, priority, grounding),
        "",
    )
    .await?;
    Ok(backfill(&map, validated, priority))
}

/// Complete a parsed response; defaults are synthesized from the validated
/// upstream data so the insight never contradicts it.
pub fn backfill(
    map: &Map<String, Value>,
    validated: &[ValidatedSeverity],
    priority: &Priority,
) -> InsightResult {
    let insights = get_str(map, "insights")
        .map(str::to_string)
        .unwrap_or_else(|| default_insights(validated, priority));

    let recommended_actions = match get_string_list(map, "recommended_actions") {
        Some(actions) if !actions.is_empty() => actions,
        _ => default_actions(priority.priority_level),
    };

    let business_impact = get_str(map, "business_impact")
        .map(str::to_string)
        .unwrap_or_else(|| default_impact(priority.priority_level).to_string());

    InsightResult {
        insights,
        recommended_actions,
        business_impact,
    }
}

fn default_insights(validated: &[ValidatedSeverity], priority: &Priority) -> String {
    match validated.iter().max_by_key(|v| v.final_severity) {
        Some(worst) => format!(
            "{} validated issue(s); highest severity {} ({}) at priority {}.",
            validated.len(),
            worst.final_severity,
            worst.severity_label,
            priority.priority_level.as_str()
        ),
        None => "No validated issues for this call.".to_string(),
    }
}

fn default_actions(level: PriorityLevel) -> Vec<String> {
    match level {
        PriorityLevel::P0 | PriorityLevel::P1 => vec![
            "Escalate to the duty supervisor within the priority SLA".to_string(),
            "Follow up with the customer within 24 hours".to_string(),
        ],
        PriorityLevel::P2 | PriorityLevel::P3 => {
            vec!["Follow up with the customer within 24 hours".to_string()]
        }
    }
}

fn default_impact(level: PriorityLevel) -> &'static str {
    match level {
        PriorityLevel::P0 | PriorityLevel::P1 => {
            "High risk of customer churn from unresolved high-severity issues"
        }
        PriorityLevel::P2 => "Moderate impact; monitor for recurrence",
        PriorityLevel::P3 => "Standard interaction",
    }
}
