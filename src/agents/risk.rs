use serde_json::{Map, Value};

use super::{get_array, get_bool, get_str, invoke_for_task};
use crate::llm::{GatewayError, LlmGateway, TaskKind, fallback::risk_severity_rank};
use crate::models::{RiskFlag, RiskResult};
use tracing::debug;

const ROLE: &str = "You are a Risk Management AI specialized in identifying churn risks, legal threats, and compliance violations in customer service calls.";

const RISK_CATEGORIES: [&str; 3] = ["Churn", "Legal", "Compliance"];

pub fn build_prompt(transcript: &str) -> String {
    format!(
        r#"Scan this customer service transcript for high-risk markers.

RISK CATEGORIES TO CHECK:
- Churn Risk: Customer threatening to cancel, leave, switch to competitor
- Legal Risk: Mentions of lawsuit, lawyer, attorney, suing, court, legal action
- Compliance Risk: Profanity, abuse, data breach mentions, privacy violations

TRANSCRIPT:
{transcript}

Analyze carefully and identify any risk flags with their severity.

You MUST respond with ONLY this JSON format, no other text:

{{
    "risk_detected": <true if any risks found, else false>,
    "severity": "<low|medium|high|critical>",
    "flags": [
        {{ "category": "<Churn|Legal|Compliance>", "confidence": "<low|medium|high>", "quote": "<relevant quote from transcript>" }},
        ...
    ],
    "summary": "<Brief risk assessment summary>"
}}

If no risks detected, return empty flags array and severity "low".
"#
    )
}

pub async fn run(gateway: &LlmGateway, transcript: &str) -> Result<RiskResult, GatewayError> {
    let map = invoke_for_task(
        gateway,
        TaskKind::Risk,
        ROLE,
        &build_prompt(transcript),
        transcript,
    )
    .await?;
    Ok(backfill(&map))
}

/// Complete a parsed response with deterministic defaults. Flags with a
/// category outside the fixed set are dropped.
pub fn backfill(map: &Map<String, Value>) -> RiskResult {
    let flags: Vec<RiskFlag> = get_array(map, "flags")
        .map(|values| {
            values
                .iter()
                .filter_map(|value| flag_from_value(value))
                .collect()
        })
        .unwrap_or_default();

    let risk_detected = get_bool(map, "risk_detected").unwrap_or(!flags.is_empty());

    let severity = match get_str(map, "severity").map(str::to_lowercase) {
        Some(s) if risk_severity_rank(&s) > 0 || s == "none" => s,
        _ => {
            if risk_detected {
                "low".to_string()
            } else {
                "none".to_string()
            }
        }
    };

    let summary = get_str(map, "summary").unwrap_or_default().to_string();

    RiskResult {
        risk_detected,
        severity,
        flags,
        summary,
    }
}

fn flag_from_value(value: &Value) -> Option<RiskFlag> {
    let object = value.as_object()?;
    let raw_category = get_str(object, "category")?;
    let category = RISK_CATEGORIES
        .iter()
        .find(|c| c.eq_ignore_ascii_case(raw_category))?;
    if !category.eq_ignore_ascii_case(raw_category) {
        debug!("normalized risk category {raw_category} to {category}");
    }
    Some(RiskFlag {
        category: category.to_string(),
        confidence: get_str(object, "confidence").unwrap_or("low").to_string(),
        quote: get_str(object, "quote").unwrap_or_default().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map_from(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_backfill_empty_response() {
        let result = backfill(&Map::new());
        assert!(!result.risk_detected);
        assert_eq!(result.severity, "none");
        assert!(result.flags.is_empty());
    }

    #[test]
    fn test_backfill_detection_derived_from_flags() {
        let result = backfill(&map_from(json!({
            "flags": [{"category": "Churn", "confidence": "high", "quote": "I'll cancel"}],
        })));
        assert!(result.risk_detected);
        assert_eq!(result.severity, "low");
        assert_eq!(result.flags.len(), 1);
    }

    #[test]
    fn test_backfill_drops_unknown_categories() {
        let result = backfill(&map_from(json!({
            "risk_detected": true,
            "severity": "medium",
            "flags": [
                {"category": "Weather", "confidence": "high", "quote": "it rained"},
                {"category": "legal", "confidence": "high", "quote": "my lawyer"},
            ],
        })));
        assert_eq!(result.flags.len(), 1);
        assert_eq!(result.flags[0].category, "Legal");
    }

    #[test]
    fn test_backfill_rejects_invalid_severity() {
        let result = backfill(&map_from(json!({
            "risk_detected": true,
            "severity": "catastrophic",
        })));
        assert_eq!(result.severity, "low");
    }
}
