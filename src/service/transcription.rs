use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("audio file not found: {0}")]
    NotFound(PathBuf),
    #[error("transcription backend error: {0}")]
    Backend(String),
    #[error("transcription job failed: {0}")]
    Job(String),
    #[error("transcription timed out after {0} poll attempts")]
    Timeout(u32),
}

/// Output of a transcription run.
#[derive(Debug, Clone, Deserialize)]
pub struct Transcription {
    pub text: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub duration_secs: f64,
    #[serde(default)]
    pub confidence: f64,
}

/// Transcription collaborator. One blocking call per audio file; retry and
/// timeout policy live behind this boundary.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> Result<Transcription, TranscriptionError>;
}

#[derive(Debug, Clone)]
pub struct TranscriberConfig {
    /// Base URL of the transcription service
    pub endpoint: String,
    /// Fixed interval between job status polls
    pub poll_interval: Duration,
    /// Maximum number of polls before giving up
    pub max_poll_attempts: u32,
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9090".to_string(),
            poll_interval: Duration::from_secs(2),
            max_poll_attempts: 60,
        }
    }
}

impl TranscriberConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(endpoint) = std::env::var("CALLSCOPE_TRANSCRIBER_URL") {
            if !endpoint.is_empty() {
                config.endpoint = endpoint;
            }
        }
        config
    }
}

/// Client for an HTTP transcription service with a submit-then-poll job
/// model. Polling is bounded: `max_poll_attempts` at `poll_interval`, then
/// an explicit timeout error rather than polling indefinitely.
pub struct HttpTranscriber {
    client: Client,
    config: TranscriberConfig,
}

impl HttpTranscriber {
    pub fn new(config: TranscriberConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[derive(Debug, Deserialize)]
struct JobCreated {
    job_id: String,
}

#[derive(Debug, Deserialize)]
struct JobStatus {
    status: String,
    #[serde(default)]
    result: Option<Transcription>,
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> Result<Transcription, TranscriptionError> {
        if !audio_path.exists() {
            return Err(TranscriptionError::NotFound(audio_path.to_path_buf()));
        }
        let audio = std::fs::read(audio_path)
            .map_err(|e| TranscriptionError::Backend(format!("{audio_path:?}: {e}")))?;
        info!(
            "submitting {} KiB of audio for transcription",
            audio.len() / 1024
        );

        let created: JobCreated = self
            .client
            .post(format!("{}/jobs", self.config.endpoint))
            .header("content-type", "application/octet-stream")
            .body(audio)
            .send()
            .await
            .map_err(|e| TranscriptionError::Backend(e.to_string()))?
            .error_for_status()
            .map_err(|e| TranscriptionError::Backend(e.to_string()))?
            .json()
            .await
            .map_err(|e| TranscriptionError::Backend(format!("malformed response: {e}")))?;

        for attempt in 1..=self.config.max_poll_attempts {
            tokio::time::sleep(self.config.poll_interval).await;

            let status: JobStatus = self
                .client
                .get(format!("{}/jobs/{}", self.config.endpoint, created.job_id))
                .send()
                .await
                .map_err(|e| TranscriptionError::Backend(e.to_string()))?
                .error_for_status()
                .map_err(|e| TranscriptionError::Backend(e.to_string()))?
                .json()
                .await
                .map_err(|e| TranscriptionError::Backend(format!("malformed response: {e}")))?;

            match status.status.as_str() {
                "completed" => {
                    let result = status.result.ok_or_else(|| {
                        TranscriptionError::Job("completed without a result".to_string())
                    })?;
                    info!(
                        "transcription complete: {} chars, {:.1}s audio",
                        result.text.len(),
                        result.duration_secs
                    );
                    return Ok(result);
                }
                "failed" => {
                    return Err(TranscriptionError::Job(
                        status.error.unwrap_or_else(|| "unknown failure".to_string()),
                    ));
                }
                other => {
                    debug!(
                        "transcription job {} still {other} (attempt {attempt}/{})",
                        created.job_id, self.config.max_poll_attempts
                    );
                }
            }
        }

        Err(TranscriptionError::Timeout(self.config.max_poll_attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let transcriber = HttpTranscriber::new(TranscriberConfig::default());
        let result = transcriber
            .transcribe(Path::new("/nonexistent/audio.wav"))
            .await;
        assert!(matches!(result, Err(TranscriptionError::NotFound(_))));
    }

    #[test]
    fn test_job_status_parses_result() {
        let status: JobStatus = serde_json::from_str(
            r#"{"status": "completed", "result": {"text": "hello", "language": "en-US", "duration_secs": 12.5, "confidence": 0.9}}"#,
        )
        .unwrap();
        assert_eq!(status.status, "completed");
        assert_eq!(status.result.unwrap().text, "hello");
    }
}
