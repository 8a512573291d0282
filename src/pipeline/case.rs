use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::Map;
use tracing::{info, warn};

use crate::agents::{
    classification, fallback_map, insight, issues, knowledge, sentiment, severity,
};
use crate::llm::{GatewayError, LlmGateway, TaskKind};
use crate::models::{
    CaseReport, CaseSentiment, ClassifiedIssue, InsightResult, Issue, KnowledgeResult,
    PipelineState, SystemStatus, ValidatedSeverity,
};
use crate::pipeline::priority::calculate_priority;
use crate::pipeline::validate::validate_report;

/// Configuration for the rigorous case pipeline.
#[derive(Debug, Clone)]
pub struct CasePipelineConfig {
    /// Upper bound on each stage's wall-clock time
    pub agent_timeout: Duration,
}

impl Default for CasePipelineConfig {
    fn default() -> Self {
        Self {
            agent_timeout: Duration::from_secs(90),
        }
    }
}

/// Run the sequential case pipeline for one call.
///
/// The issue chain (extraction, knowledge retrieval, classification,
/// severity validation) is a strict dependency chain; sentiment has no
/// upstream dependency and runs concurrently with it, joined before
/// priority scoring. Stage failures are substituted with deterministic
/// output and recorded in `system_status.failed_agents`; only a failure in
/// the merge itself propagates as an error.
pub async fn run_case_pipeline(
    gateway: &LlmGateway,
    call_id: &str,
    transcript: &str,
    config: &CasePipelineConfig,
) -> Result<CaseReport> {
    info!(
        "starting case pipeline for call {call_id} ({} chars)",
        transcript.len()
    );

    let ((case_sentiment, sentiment_failed), chain) = tokio::join!(
        sentiment_stage(gateway, transcript, config.agent_timeout),
        issue_chain(gateway, transcript, config.agent_timeout),
    );

    let mut failed = chain.failed;
    if sentiment_failed {
        failed.push("sentiment".to_string());
    }

    // Priority derives from the worst validated severity and the sentiment
    // score; inputs are clamped into the scorer's domain
    let max_severity = chain
        .validated
        .iter()
        .map(|v| v.final_severity)
        .max()
        .unwrap_or(1)
        .clamp(1, 5);
    let severity_confidence = chain
        .validated
        .iter()
        .map(|v| v.confidence)
        .fold(f64::INFINITY, f64::min);
    let severity_confidence = if severity_confidence.is_finite() {
        severity_confidence.clamp(0.0, 1.0)
    } else {
        0.5
    };
    let priority = calculate_priority(
        max_severity,
        severity_confidence,
        case_sentiment.sentiment_score.clamp(-1.0, 1.0),
        case_sentiment.confidence.clamp(0.0, 1.0),
    )
    .context("priority scoring failed")?;

    let mut report = CaseReport {
        call_id: call_id.to_string(),
        system_status: SystemStatus {
            state: PipelineState::Success,
            failed_agents: failed.clone(),
            timestamp: Utc::now(),
        },
        issues: chain.issues,
        classified_issues: chain.classified,
        validated_severity: chain.validated,
        grounding: chain.grounding,
        sentiment: case_sentiment,
        priority,
        insights: InsightResult::default(),
        validation: None,
    };

    let validation = validate_report(&report);
    if !validation.is_valid {
        warn!(
            "case report for {call_id} failed validation with {} error(s)",
            validation.errors.len()
        );
    }
    report.validation = Some(validation.summary());

    // Insight runs last and consumes only validated data
    let insights = match stage(
        config.agent_timeout,
        insight::run(
            gateway,
            &report.validated_severity,
            &report.priority,
            &report.grounding,
        ),
    )
    .await
    {
        Ok(result) => result,
        Err(e) => {
            warn!("insight agent failed ({e}), using deterministic summary");
            failed.push("insight".to_string());
            insight::backfill(&Map::new(), &report.validated_severity, &report.priority)
        }
    };
    report.insights = insights;

    report.system_status.state = if failed.is_empty() {
        PipelineState::Success
    } else {
        PipelineState::Partial
    };
    report.system_status.failed_agents = failed;

    info!(
        "case pipeline complete for {call_id}: {} issue(s), priority {}",
        report.issues.len(),
        report.priority.priority_level.as_str()
    );

    Ok(report)
}

struct ChainOutput {
    issues: Vec<Issue>,
    grounding: KnowledgeResult,
    classified: Vec<ClassifiedIssue>,
    validated: Vec<ValidatedSeverity>,
    failed: Vec<String>,
}

async fn stage<T>(
    timeout: Duration,
    evaluation: impl Future<Output = Result<T, GatewayError>>,
) -> Result<T, GatewayError> {
    match tokio::time::timeout(timeout, evaluation).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout(timeout.as_secs())),
    }
}

async fn sentiment_stage(
    gateway: &LlmGateway,
    transcript: &str,
    timeout: Duration,
) -> (CaseSentiment, bool) {
    match stage(timeout, sentiment::run(gateway, transcript)).await {
        Ok(result) => (CaseSentiment::from(&result), false),
        Err(e) => {
            warn!("sentiment agent failed ({e}), using deterministic fallback");
            let map = fallback_map(TaskKind::Sentiment, transcript);
            (CaseSentiment::from(&sentiment::backfill(&map)), true)
        }
    }
}

/// The strict extraction -> knowledge -> classification -> severity chain.
/// Stage N+1 starts only once stage N has produced (possibly substituted)
/// output.
async fn issue_chain(
    gateway: &LlmGateway,
    transcript: &str,
    timeout: Duration,
) -> ChainOutput {
    let mut failed = Vec::new();

    let issues = match stage(timeout, issues::run(gateway, transcript)).await {
        Ok(list) => list,
        Err(e) => {
            warn!("issue extraction failed ({e}), using deterministic fallback");
            failed.push("issue_extraction".to_string());
            issues::backfill(&fallback_map(TaskKind::IssueExtraction, transcript))
        }
    };
    info!("extracted {} issue(s)", issues.len());

    let grounding = match stage(timeout, knowledge::run(gateway, transcript, &issues)).await {
        Ok(result) => result,
        Err(e) => {
            warn!("knowledge retrieval failed ({e}), using deterministic fallback");
            failed.push("knowledge_retrieval".to_string());
            knowledge::backfill(&fallback_map(TaskKind::KnowledgeRetrieval, transcript))
        }
    };

    let classified = match stage(timeout, classification::run(gateway, &issues, &grounding)).await
    {
        Ok(result) => result,
        Err(e) => {
            warn!("classification failed ({e}), using keyword classification");
            failed.push("classification".to_string());
            classification::backfill(&Map::new(), &issues)
        }
    };

    let outcome =
        match tokio::time::timeout(timeout, severity::run(gateway, &classified, &grounding)).await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    "severity validation timed out after {}s, applying rubric mapping",
                    timeout.as_secs()
                );
                severity::SeverityOutcome {
                    validated: classified
                        .iter()
                        .map(|issue| severity::backfill(&Map::new(), issue, &grounding))
                        .collect(),
                    failures: classified.len(),
                }
            }
        };
    if outcome.failures > 0 {
        failed.push("severity_validation".to_string());
    }

    ChainOutput {
        issues,
        grounding,
        classified,
        validated: outcome.validated,
        failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::GatewayConfig;
    use crate::models::PriorityLevel;

    const ESCALATION_TRANSCRIPT: &str =
        "I want to cancel immediately, your billing is always wrong";

    fn fallback_gateway() -> LlmGateway {
        LlmGateway::new(GatewayConfig::default())
    }

    #[tokio::test]
    async fn test_escalated_case_end_to_end() {
        let gateway = fallback_gateway();
        let config = CasePipelineConfig::default();
        let report = run_case_pipeline(&gateway, "case-1", ESCALATION_TRANSCRIPT, &config)
            .await
            .unwrap();

        assert_eq!(report.system_status.state, PipelineState::Success);
        assert!(report.system_status.failed_agents.is_empty());

        // Churn and billing signals each produce an issue, classified and
        // validated one-to-one
        assert_eq!(report.issues.len(), 2);
        assert_eq!(report.classified_issues.len(), 2);
        assert_eq!(report.validated_severity.len(), 2);

        // The churn threat is raised to the rubric ceiling by its grounding
        let churn = &report.validated_severity[0];
        assert_eq!(churn.final_severity, 5);
        assert!(churn.justification.contains("SOP-2024-002"));

        assert_eq!(report.sentiment.sentiment_label, "Negative");
        assert_eq!(report.priority.priority_level, PriorityLevel::P0);

        let validation = report.validation.as_ref().unwrap();
        assert!(validation.valid, "errors: {:?}", validation.errors);
        assert!(!report.insights.insights.is_empty());
    }

    #[tokio::test]
    async fn test_clean_transcript_yields_empty_low_priority_report() {
        let gateway = fallback_gateway();
        let config = CasePipelineConfig::default();
        let report = run_case_pipeline(
            &gateway,
            "case-2",
            "Thank you so much, everything was resolved perfectly",
            &config,
        )
        .await
        .unwrap();

        assert!(report.issues.is_empty());
        assert!(report.classified_issues.is_empty());
        assert!(report.validated_severity.is_empty());
        assert_eq!(report.priority.priority_level, PriorityLevel::P3);
        assert!(report.validation.as_ref().unwrap().valid);
        assert_eq!(report.insights.business_impact, "Standard interaction");
        assert!(!report.insights.recommended_actions.is_empty());
    }

    #[tokio::test]
    async fn test_case_pipeline_is_deterministic() {
        let gateway = fallback_gateway();
        let config = CasePipelineConfig::default();
        let first = run_case_pipeline(&gateway, "case-3", ESCALATION_TRANSCRIPT, &config)
            .await
            .unwrap();
        let second = run_case_pipeline(&gateway, "case-3", ESCALATION_TRANSCRIPT, &config)
            .await
            .unwrap();
        assert_eq!(
            serde_json::to_value(&first.validated_severity).unwrap(),
            serde_json::to_value(&second.validated_severity).unwrap()
        );
        assert_eq!(first.priority.priority_score, second.priority.priority_score);
    }
}
