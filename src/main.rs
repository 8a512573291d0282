use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use callscope::{
    AnalysisService, CallInput, CasePipelineConfig, GatewayConfig, HttpTranscriber,
    JsonFileStore, LlmGateway, OrchestratorConfig, TranscriberConfig, run_case_pipeline,
    validate_value,
};

#[derive(Parser)]
#[command(name = "callscope")]
#[command(author, version, about = "Customer service call analysis pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full analysis service on one call and persist the record
    Analyze {
        /// Input file: a UTF-8 transcript, or an audio file with --audio
        #[arg(short, long)]
        input: PathBuf,

        /// Treat the input as an audio file to transcribe first
        #[arg(long)]
        audio: bool,

        /// Call identifier (generated when omitted)
        #[arg(long)]
        call_id: Option<String>,

        /// Directory for persisted call records
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// Optional file to write the full analysis JSON to
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Run the rigorous case pipeline on a transcript and print the report
    Case {
        /// Input transcript file (UTF-8 text)
        #[arg(short, long)]
        input: PathBuf,

        /// Call identifier (generated when omitted)
        #[arg(long)]
        call_id: Option<String>,

        /// Optional file to write the report JSON to
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate an assembled case report document
    Validate {
        /// Report JSON file
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            input,
            audio,
            call_id,
            data_dir,
            output,
            verbose,
        } => {
            setup_logging(verbose);
            analyze(input, audio, call_id, data_dir, output).await
        }
        Commands::Case {
            input,
            call_id,
            output,
            verbose,
        } => {
            setup_logging(verbose);
            case(input, call_id, output).await
        }
        Commands::Validate { input } => {
            setup_logging(false);
            validate(input)
        }
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn resolve_call_id(call_id: Option<String>) -> String {
    call_id.unwrap_or_else(|| format!("call-{}", uuid::Uuid::new_v4()))
}

async fn analyze(
    input: PathBuf,
    audio: bool,
    call_id: Option<String>,
    data_dir: PathBuf,
    output: Option<PathBuf>,
) -> Result<()> {
    let call_id = resolve_call_id(call_id);
    let gateway = Arc::new(LlmGateway::new(GatewayConfig::from_env()));
    let store = Arc::new(JsonFileStore::new(data_dir));
    let transcriber = Arc::new(HttpTranscriber::new(TranscriberConfig::from_env()));
    let service = AnalysisService::new(gateway, store, transcriber, OrchestratorConfig::default());

    let call_input = if audio {
        CallInput::AudioPath(input)
    } else {
        let transcript = std::fs::read_to_string(&input)
            .with_context(|| format!("Failed to read transcript: {input:?}"))?;
        CallInput::Transcript(transcript)
    };

    let analysis = service.analyze_call(&call_id, call_input).await?;

    println!("Call Analysis: {call_id}");
    println!("==============");
    println!("Sentiment score: {}", analysis.summary_metrics.sentiment_score);
    println!("SOP score:       {}", analysis.summary_metrics.sop_score);
    println!("QA score:        {}", analysis.summary_metrics.qa_score);
    println!(
        "Risk:            {} ({})",
        analysis.summary_metrics.risk_detected, analysis.summary_metrics.risk_severity
    );

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&analysis)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write analysis: {path:?}"))?;
        info!("analysis written to {path:?}");
    }

    Ok(())
}

async fn case(input: PathBuf, call_id: Option<String>, output: Option<PathBuf>) -> Result<()> {
    let call_id = resolve_call_id(call_id);
    let gateway = LlmGateway::new(GatewayConfig::from_env());
    let transcript = std::fs::read_to_string(&input)
        .with_context(|| format!("Failed to read transcript: {input:?}"))?;

    let report =
        run_case_pipeline(&gateway, &call_id, &transcript, &CasePipelineConfig::default()).await?;

    let json = serde_json::to_string_pretty(&report)?;
    match output {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("Failed to write report: {path:?}"))?;
            info!("report written to {path:?}");
        }
        None => println!("{json}"),
    }

    if let Some(validation) = &report.validation {
        if !validation.valid {
            for error in &validation.errors {
                eprintln!("validation error: {error}");
            }
        }
    }

    Ok(())
}

fn validate(input: PathBuf) -> Result<()> {
    let text = std::fs::read_to_string(&input)
        .with_context(|| format!("Failed to read report: {input:?}"))?;
    let value: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("Not valid JSON: {input:?}"))?;

    let result = validate_value(&value);
    if result.is_valid {
        println!("Report is valid.");
        Ok(())
    } else {
        for error in &result.errors {
            eprintln!("validation error: {error}");
        }
        anyhow::bail!("report failed validation with {} error(s)", result.errors.len())
    }
}
