use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::evaluations::{
    CaseSentiment, CoachingResult, InsightResult, KnowledgeResult, QaScoreResult, RiskResult,
    SentimentResult, SopComplianceResult,
};
use crate::models::issue::{ClassifiedIssue, Issue, ValidatedSeverity};
use crate::models::priority::Priority;

/// Outcome of one evaluator inside a merged analysis.
///
/// Serializes either as the evaluator's result object or as
/// `{"error": "..."}` when the evaluator failed, matching the interchange
/// shape downstream consumers read.
// Failed must precede Completed: untagged deserialization tries variants in
// order, and every result type tolerates missing fields, so an error object
// would otherwise decode as an all-default result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgentOutcome<T> {
    Failed { error: String },
    Completed(T),
}

impl<T> AgentOutcome<T> {
    pub fn as_completed(&self) -> Option<&T> {
        match self {
            AgentOutcome::Completed(result) => Some(result),
            AgentOutcome::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, AgentOutcome::Failed { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            AgentOutcome::Failed { error } => Some(error),
            AgentOutcome::Completed(_) => None,
        }
    }
}

/// Merged output of the parallel orchestrator for one call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallAnalysis {
    pub call_id: String,
    pub transcript_text: String,
    pub sentiment: AgentOutcome<SentimentResult>,
    pub sop_compliance: AgentOutcome<SopComplianceResult>,
    pub risk_analysis: AgentOutcome<RiskResult>,
    pub qa_score: AgentOutcome<QaScoreResult>,
    pub coaching: AgentOutcome<CoachingResult>,
    pub summary_metrics: SummaryMetrics,
    pub summary: AnalysisSummary,
}

/// Headline metrics read out of the evaluator results with safe defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryMetrics {
    pub sentiment_score: i64,
    pub sop_score: i64,
    pub qa_score: i64,
    pub risk_detected: bool,
    pub risk_severity: String,
}

/// Condensed summary block kept for downstream consumers; `risk_severity`
/// collapses to "none" when no risk was detected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub sentiment_score: i64,
    pub sop_score: i64,
    pub qa_score: i64,
    pub risk_severity: String,
}

/// Overall state of one case-pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Success,
    Partial,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    pub state: PipelineState,
    #[serde(default)]
    pub failed_agents: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Result of validating an assembled case report, embedded in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Full output of the rigorous case pipeline for one call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseReport {
    #[serde(default)]
    pub call_id: String,
    pub system_status: SystemStatus,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub classified_issues: Vec<ClassifiedIssue>,
    #[serde(default)]
    pub validated_severity: Vec<ValidatedSeverity>,
    #[serde(default)]
    pub grounding: KnowledgeResult,
    pub sentiment: CaseSentiment,
    pub priority: Priority,
    #[serde(default)]
    pub insights: InsightResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationSummary>,
}

/// Lifecycle status of a persisted call record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Processing,
    Completed,
    Failed,
}

/// Flattened scores indexed alongside the full analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallScores {
    pub qa: i64,
    pub sop: i64,
    pub sentiment: i64,
    pub risk: i64,
}

/// One persisted document per call id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    pub call_id: String,
    pub status: CallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<CallScores>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Field-level patch applied by an upsert; only present fields are written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CallStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scores: Option<CallScores>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CallPatch {
    /// Patch recorded when an analysis run begins.
    pub fn processing() -> Self {
        Self {
            status: Some(CallStatus::Processing),
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Patch recorded when an analysis run completes.
    pub fn completed(analysis: Value, scores: CallScores, transcript: String) -> Self {
        Self {
            status: Some(CallStatus::Completed),
            analysis: Some(analysis),
            scores: Some(scores),
            transcript: Some(transcript),
            ended_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Patch recorded when an analysis run fails.
    pub fn failed(error: String) -> Self {
        Self {
            status: Some(CallStatus::Failed),
            error: Some(error),
            ended_at: Some(Utc::now()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_outcome_serializes_error_object() {
        let outcome: AgentOutcome<RiskResult> = AgentOutcome::Failed {
            error: "model backend error: 500".to_string(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["error"], "model backend error: 500");
    }

    #[test]
    fn test_agent_outcome_roundtrip_failed() {
        // An error object must not decode as an all-default result.
        let json = serde_json::json!({"error": "timed out after 90s"});
        let outcome: AgentOutcome<RiskResult> = serde_json::from_value(json).unwrap();
        assert!(outcome.is_failed());
        assert_eq!(outcome.error(), Some("timed out after 90s"));
    }

    #[test]
    fn test_agent_outcome_roundtrip_completed() {
        let json = serde_json::json!({"risk_detected": true, "severity": "high"});
        let outcome: AgentOutcome<RiskResult> = serde_json::from_value(json).unwrap();
        let risk = outcome.as_completed().unwrap();
        assert!(risk.risk_detected);
        assert_eq!(risk.severity, "high");
    }

    #[test]
    fn test_call_patch_skips_absent_fields() {
        let patch = CallPatch::failed("boom".to_string());
        let json = serde_json::to_value(&patch).unwrap();
        let object = json.as_object().unwrap();
        assert!(object.contains_key("status"));
        assert!(object.contains_key("error"));
        assert!(!object.contains_key("analysis"));
        assert!(!object.contains_key("started_at"));
    }
}
