use std::collections::HashSet;

use serde_json::{Map, Value};

use super::{clamp_confidence, get_array, get_f64, get_str, invoke_for_task};
use crate::llm::{GatewayError, LlmGateway, TaskKind};
use crate::models::Issue;

const ROLE: &str = "You are an Issue Extraction Agent. You analyze customer call transcripts and identify problems, complaints, or dissatisfaction reasons mentioned by the customer. You do not perform sentiment analysis, classify issues, or assign severity.";

pub fn build_prompt(transcript: &str) -> String {
    format!(
        r#"Extract customer issues from the following call transcript.

TRANSCRIPT:
{transcript}

RULES:
- Focus only on extracting issues, pain points, or negative experiences.
- If no issue exists, return an empty list.
- Include evidence from the transcript for each issue.
- Avoid assumptions that are not present in the text.

You MUST respond with ONLY this JSON format, no other text:

{{
    "issues": [
        {{
            "issue_id": "issue_1",
            "issue_text": "<clear description of the problem>",
            "evidence_span": "<direct quote or paraphrase from transcript>",
            "confidence": <float between 0.0 and 1.0>
        }}
    ]
}}
"#
    )
}

/// Extract customer issues from a transcript. An empty list is a valid
/// result for a transcript with no complaint signal.
pub async fn run(gateway: &LlmGateway, transcript: &str) -> Result<Vec<Issue>, GatewayError> {
    let map = invoke_for_task(
        gateway,
        TaskKind::IssueExtraction,
        ROLE,
        &build_prompt(transcript),
        transcript,
    )
    .await?;
    Ok(backfill(&map))
}

/// Normalize the parsed issue list: every issue gets a non-empty
/// description and an id unique within the run.
pub fn backfill(map: &Map<String, Value>) -> Vec<Issue> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut issues = Vec::new();

    for (idx, value) in get_array(map, "issues")
        .map(|v| v.as_slice())
        .unwrap_or_default()
        .iter()
        .enumerate()
    {
        let Some(object) = value.as_object() else {
            continue;
        };

        let issue_text = get_str(object, "issue_text")
            .unwrap_or("Customer concern (unspecified)")
            .to_string();
        let evidence_span = get_str(object, "evidence_span").unwrap_or_default().to_string();
        let confidence = clamp_confidence(get_f64(object, "confidence").unwrap_or(0.5));

        let mut issue_id = get_str(object, "issue_id").unwrap_or_default().to_string();
        if issue_id.is_empty() || seen.contains(&issue_id) {
            issue_id = unique_id(idx, &seen);
        }
        seen.insert(issue_id.clone());

        issues.push(Issue {
            issue_id,
            issue_text,
            evidence_span,
            confidence,
        });
    }

    issues
}

fn unique_id(idx: usize, seen: &HashSet<String>) -> String {
    let mut n = idx + 1;
    loop {
        let candidate = format!("issue_{n}");
        if !seen.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
