use serde_json::{Map, Value};

use super::{clamp_confidence, get_array, get_f64, get_str, invoke_for_task};
use crate::llm::{GatewayError, LlmGateway, TaskKind};
use crate::models::{GroundingExcerpt, Issue, KnowledgeResult};

const ROLE: &str = "You are a knowledge retrieval and grounding agent. You identify which SOPs, policies, or rule documents are relevant to extracted issues and return only factual, authoritative excerpts with document id, version, and section. You do not assign severity, classify, or summarize.";

pub fn build_prompt(transcript: &str, issues: &[Issue]) -> String {
    let issues_json =
        serde_json::to_string_pretty(issues).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"Retrieve authoritative knowledge relevant to these extracted issues and transcript.

ISSUES:
{issues_json}

TRANSCRIPT:
{transcript}

RULES:
- Extract ONLY factual, authoritative excerpts.
- Include document ID, version, and section for every excerpt.
- Match grounding to a specific issue_id when applicable.
- If no relevant knowledge is found, return an empty list.

You MUST respond with ONLY this JSON format, no other text:

{{
    "grounding_context": [
        {{
            "doc_id": "SOP-2024-001",
            "version": "1.2",
            "section": "§3.2",
            "content": "<verbatim excerpt>",
            "effective_from": "2024-01-01",
            "related_issue_id": "issue_1"
        }}
    ],
    "confidence": <float between 0.0 and 1.0>
}}
"#
    )
}

/// Retrieve versioned policy excerpts grounding the extracted issues.
pub async fn run(
    gateway: &LlmGateway,
    transcript: &str,
    issues: &[Issue],
) -> Result<KnowledgeResult, GatewayError> {
    let map = invoke_for_task(
        gateway,
        TaskKind::KnowledgeRetrieval,
        ROLE,
        &build_prompt(transcript, issues),
        transcript,
    )
    .await?;
    Ok(backfill(&map))
}

/// Normalize the parsed grounding excerpts; entries with no document id
/// carry no authority and are dropped.
pub fn backfill(map: &Map<String, Value>) -> KnowledgeResult {
    let grounding_context: Vec<GroundingExcerpt> = get_array(map, "grounding_context")
        .map(|values| {
            values
                .iter()
                .filter_map(|value| excerpt_from_value(value))
                .collect()
        })
        .unwrap_or_default();

    let default_confidence = if grounding_context.is_empty() { 0.0 } else { 0.7 };
    let confidence =
        clamp_confidence(get_f64(map, "confidence").unwrap_or(default_confidence));

    KnowledgeResult {
        grounding_context,
        confidence,
    }
}

fn excerpt_from_value(value: &Value) -> Option<GroundingExcerpt> {
    let object = value.as_object()?;
    let doc_id = get_str(object, "doc_id")?.to_string();
    Some(GroundingExcerpt {
        doc_id,
        version: get_str(object, "version").unwrap_or_default().to_string(),
        section: get_str(object, "section").unwrap_or_default().to_string(),
        content: get_str(object, "content").unwrap_or_default().to_string(),
        effective_from: get_str(object, "effective_from")
            .unwrap_or_default()
            .to_string(),
        related_issue_id: get_str(object, "related_issue_id")
            .unwrap_or_default()
            .to_string(),
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
        assert!(result.grounding_context.is_empty());
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_backfill_drops_excerpts_without_doc_id() {
        let result = backfill(&map_from(json!({
            "grounding_context": [
                {"content": "orphan excerpt"},
                {"doc_id": "SOP-2024-001", "section": "§3.2", "content": "billing rule"},
            ],
        })));
        assert_eq!(result.grounding_context.len(), 1);
        assert_eq!(result.grounding_context[0].doc_id, "SOP-2024-001");
        assert_eq!(result.confidence, 0.7);
    }

    #[test]
    fn test_excerpt_citation() {
        let result = backfill(&map_from(json!({
            "grounding_context": [
                {"doc_id": "SOP-2024-003", "section": "§2.1"},
            ],
            "confidence": 0.9,
        })));
        assert_eq!(result.grounding_context[0].citation(), "SOP-2024-003 §2.1");
        assert_eq!(result.confidence, 0.9);
    }
}
