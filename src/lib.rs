pub mod agents;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod service;

pub use llm::{GatewayConfig, GatewayError, LlmGateway, TaskKind, extract_json};
pub use models::{
    CallAnalysis, CallRecord, CallStatus, CaseReport, Priority, PriorityLevel, SummaryMetrics,
};
pub use pipeline::{
    CasePipelineConfig, OrchestratorConfig, ReportValidation, calculate_priority,
    run_case_pipeline, run_orchestrator, validate_report, validate_value,
};
pub use service::{
    AnalysisService, CallInput, CallStore, HttpTranscriber, JsonFileStore, Transcriber,
    TranscriberConfig,
};
