use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::llm::LlmGateway;
use crate::models::{CallAnalysis, CallPatch, CallScores, SummaryMetrics};
use crate::pipeline::{OrchestratorConfig, run_orchestrator};
use crate::service::store::CallStore;
use crate::service::transcription::Transcriber;

/// Input for one analysis run: a transcript, or an audio file to
/// transcribe first.
#[derive(Debug, Clone)]
pub enum CallInput {
    Transcript(String),
    AudioPath(PathBuf),
}

/// End-to-end entry point for one call: optional transcription,
/// orchestration, score extraction, persistence, failure recording.
///
/// Owns the persisted record's lifecycle: created as processing, moved to
/// completed or failed exactly once per run; re-running the same call id
/// replaces the record. The whole pipeline suspends at network boundaries
/// only; callers serving requests should spawn `analyze_call` as
/// background work rather than awaiting it inline.
pub struct AnalysisService {
    gateway: Arc<LlmGateway>,
    store: Arc<dyn CallStore>,
    transcriber: Arc<dyn Transcriber>,
    orchestrator: OrchestratorConfig,
}

impl AnalysisService {
    pub fn new(
        gateway: Arc<LlmGateway>,
        store: Arc<dyn CallStore>,
        transcriber: Arc<dyn Transcriber>,
        orchestrator: OrchestratorConfig,
    ) -> Self {
        Self {
            gateway,
            store,
            transcriber,
            orchestrator,
        }
    }

    pub async fn analyze_call(&self, call_id: &str, input: CallInput) -> Result<CallAnalysis> {
        info!("analysis service: starting pipeline for call {call_id}");

        if let Err(e) = self.store.upsert(call_id, CallPatch::processing()).await {
            warn!("could not record processing status for {call_id}: {e}");
        }

        match self.run_pipeline(call_id, input).await {
            Ok(analysis) => {
                let scores = extract_scores(&analysis.summary_metrics);
                info!(
                    "scores for {call_id}: qa {}, sop {}, sentiment {}, risk {}",
                    scores.qa, scores.sop, scores.sentiment, scores.risk
                );

                let patch = CallPatch::completed(
                    serde_json::to_value(&analysis)
                        .context("failed to serialize analysis for persistence")?,
                    scores,
                    analysis.transcript_text.clone(),
                );
                if let Err(e) = self.store.upsert(call_id, patch).await {
                    // Partial degradation: the caller still gets the
                    // analysis, it just is not durably saved
                    error!("analysis for {call_id} completed but was not persisted: {e}");
                }
                Ok(analysis)
            }
            Err(e) => {
                error!("analysis failed for {call_id}: {e:#}");
                if let Err(store_error) = self
                    .store
                    .upsert(call_id, CallPatch::failed(format!("{e:#}")))
                    .await
                {
                    error!("could not record failure for {call_id}: {store_error}");
                }
                Err(e)
            }
        }
    }

    async fn run_pipeline(&self, call_id: &str, input: CallInput) -> Result<CallAnalysis> {
        let transcript = match input {
            CallInput::Transcript(text) => text,
            CallInput::AudioPath(path) => {
                info!("transcribing audio file {path:?}");
                let transcription = self
                    .transcriber
                    .transcribe(&path)
                    .await
                    .context("transcription failed")?;
                info!(
                    "transcription complete: {} chars ({}, confidence {:.2})",
                    transcription.text.len(),
                    transcription.language,
                    transcription.confidence
                );
                transcription.text
            }
        };

        Ok(run_orchestrator(&self.gateway, call_id, &transcript, &self.orchestrator).await)
    }
}

/// Flatten summary metrics into the indexed score document; risk collapses
/// to a 0/100 indicator.
fn extract_scores(metrics: &SummaryMetrics) -> CallScores {
    CallScores {
        qa: metrics.qa_score,
        sop: metrics.sop_score,
        sentiment: metrics.sentiment_score,
        risk: if metrics.risk_detected { 100 } else { 0 },
    }
}
