use std::future::Future;
use std::time::Duration;

use tracing::{error, info};

use crate::agents::{coaching, qa, risk, sentiment, sop};
use crate::llm::{GatewayError, LlmGateway};
use crate::models::{
    AgentOutcome, AnalysisSummary, CallAnalysis, CoachingResult, QaScoreResult, RiskResult,
    SentimentResult, SopComplianceResult, SummaryMetrics,
};

/// Configuration for the parallel orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Upper bound on each evaluator's wall-clock time; a timeout is that
    /// evaluator's local failure, never a global abort
    pub agent_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            agent_timeout: Duration::from_secs(90),
        }
    }
}

/// Run the five independent evaluators concurrently against one transcript
/// and merge their results into a single analysis.
///
/// Each evaluator is isolated: a failure or timeout in one becomes an
/// error entry under that evaluator's key while the others complete. The
/// merge is keyed, not positional, so it is independent of completion
/// order.
pub async fn run_orchestrator(
    gateway: &LlmGateway,
    call_id: &str,
    transcript: &str,
    config: &OrchestratorConfig,
) -> CallAnalysis {
    info!(
        "starting analysis pipeline for call {call_id} ({} chars)",
        transcript.len()
    );

    let timeout = config.agent_timeout;
    let (sentiment, sop_compliance, risk_analysis, qa_score, coaching) = tokio::join!(
        outcome(timeout, "sentiment", sentiment::run(gateway, transcript)),
        outcome(timeout, "sop_compliance", sop::run(gateway, transcript, None)),
        outcome(timeout, "risk_analysis", risk::run(gateway, transcript)),
        outcome(timeout, "qa_score", qa::run(gateway, transcript)),
        outcome(timeout, "coaching", coaching::run(gateway, transcript)),
    );

    let analysis = assemble(
        call_id,
        transcript,
        sentiment,
        sop_compliance,
        risk_analysis,
        qa_score,
        coaching,
    );

    info!(
        "analysis complete for {call_id}: sentiment {}, sop {}, qa {}, risk {}",
        analysis.summary_metrics.sentiment_score,
        analysis.summary_metrics.sop_score,
        analysis.summary_metrics.qa_score,
        analysis.summary_metrics.risk_severity,
    );

    analysis
}

async fn outcome<T>(
    timeout: Duration,
    name: &str,
    evaluation: impl Future<Output = Result<T, GatewayError>>,
) -> AgentOutcome<T> {
    match tokio::time::timeout(timeout, evaluation).await {
        Ok(Ok(result)) => {
            info!("agent [{name}] completed");
            AgentOutcome::Completed(result)
        }
        Ok(Err(e)) => {
            error!("agent [{name}] failed: {e}");
            AgentOutcome::Failed {
                error: e.to_string(),
            }
        }
        Err(_) => {
            error!("agent [{name}] timed out after {}s", timeout.as_secs());
            AgentOutcome::Failed {
                error: format!("timed out after {}s", timeout.as_secs()),
            }
        }
    }
}

/// Merge evaluator outcomes into one analysis. Summary metrics read fixed
/// fields out of each result with safe defaults when the evaluator failed.
fn assemble(
    call_id: &str,
    transcript: &str,
    sentiment: AgentOutcome<SentimentResult>,
    sop_compliance: AgentOutcome<SopComplianceResult>,
    risk_analysis: AgentOutcome<RiskResult>,
    qa_score: AgentOutcome<QaScoreResult>,
    coaching: AgentOutcome<CoachingResult>,
) -> CallAnalysis {
    let sentiment_score = sentiment.as_completed().map(|s| s.score).unwrap_or(0);
    let sop_score = sop_compliance
        .as_completed()
        .map(|s| s.adherence_score)
        .unwrap_or(0);
    let qa_total = qa_score.as_completed().map(|q| q.total_score).unwrap_or(0);
    let risk_detected = risk_analysis
        .as_completed()
        .map(|r| r.risk_detected)
        .unwrap_or(false);
    let risk_severity = risk_analysis
        .as_completed()
        .map(|r| r.severity.clone())
        .unwrap_or_else(|| "none".to_string());

    let summary_metrics = SummaryMetrics {
        sentiment_score,
        sop_score,
        qa_score: qa_total,
        risk_detected,
        risk_severity: risk_severity.clone(),
    };
    let summary = AnalysisSummary {
        sentiment_score,
        sop_score,
        qa_score: qa_total,
        risk_severity: if risk_detected {
            risk_severity
        } else {
            "none".to_string()
        },
    };

    CallAnalysis {
        call_id: call_id.to_string(),
        transcript_text: transcript.to_string(),
        sentiment,
        sop_compliance,
        risk_analysis,
        qa_score,
        coaching,
        summary_metrics,
        summary,
    }
}
