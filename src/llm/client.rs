use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors surfaced by the model gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No credentials configured; callers fall back to the deterministic
    /// generator instead of treating this as a hard failure.
    #[error("no model backend configured")]
    BackendUnavailable,
    /// Non-recoverable backend failure, after the single throttle retry.
    #[error("model backend error: {0}")]
    Backend(String),
    #[error("model invocation timed out after {0}s")]
    Timeout(u64),
}

/// Configuration for the Bedrock model gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bearer token (from AWS_BEARER_TOKEN_BEDROCK); None puts the gateway
    /// in fallback mode
    pub bearer_token: Option<String>,
    pub region: String,
    pub model_id: String,
    pub max_tokens: u32,
    /// Lower temperature for more consistent structured output
    pub temperature: f64,
    /// Per-invocation timeout
    pub timeout: Duration,
    /// Backoff before the single retry on a throttled request
    pub retry_backoff: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bearer_token: None,
            region: "us-east-1".to_string(),
            model_id: "anthropic.claude-3-sonnet-20240229-v1:0".to_string(),
            max_tokens: 4096,
            temperature: 0.2,
            timeout: Duration::from_secs(90),
            retry_backoff: Duration::from_secs(2),
        }
    }
}

impl GatewayConfig {
    /// Create config from environment variables. A missing token is not an
    /// error: the gateway reports BackendUnavailable per call and agents
    /// use their deterministic fallback.
    pub fn from_env() -> Self {
        let bearer_token = std::env::var("AWS_BEARER_TOKEN_BEDROCK")
            .ok()
            .filter(|t| !t.is_empty());
        let mut config = Self {
            bearer_token,
            ..Default::default()
        };
        if let Ok(region) = std::env::var("AWS_DEFAULT_REGION") {
            if !region.is_empty() {
                config.region = region;
            }
        }
        if let Ok(model_id) = std::env::var("BEDROCK_MODEL_ID") {
            if !model_id.is_empty() {
                config.model_id = model_id;
            }
        }
        config
    }
}

/// HTTP gateway to the Bedrock text-generation backend.
///
/// Constructed once at startup and passed by reference to every component
/// that invokes the model; safe for concurrent use.
pub struct LlmGateway {
    client: Client,
    config: GatewayConfig,
}

impl LlmGateway {
    pub fn new(config: GatewayConfig) -> Self {
        if config.bearer_token.is_some() {
            info!(
                "model gateway: live mode, model {} in {}",
                config.model_id, config.region
            );
        } else {
            warn!("model gateway: no credentials, deterministic fallback mode");
        }
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Whether a live backend is configured.
    pub fn is_live(&self) -> bool {
        self.config.bearer_token.is_some()
    }

    fn endpoint(&self) -> String {
        format!(
            "https://bedrock-runtime.{}.amazonaws.com/model/{}/invoke",
            self.config.region, self.config.model_id
        )
    }

    /// Send a prompt to the model and return the raw response text.
    ///
    /// Retries exactly once after a fixed backoff when throttled, then
    /// surfaces the failure. Does not mutate any caller state.
    pub async fn invoke(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<String, GatewayError> {
        let token = self
            .config
            .bearer_token
            .as_deref()
            .ok_or(GatewayError::BackendUnavailable)?;

        let request = InvokeRequest {
            anthropic_version: "bedrock-2023-05-31",
            max_tokens: self.config.max_tokens,
            temperature: Some(self.config.temperature),
            system: system.map(str::to_string),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        debug!("model request: {} chars", prompt.len());

        let mut retried = false;
        loop {
            let response = self
                .client
                .post(self.endpoint())
                .bearer_auth(token)
                .timeout(self.config.timeout)
                .json(&request)
                .send()
                .await;

            let response = match response {
                Ok(response) => response,
                Err(e) if e.is_timeout() => {
                    return Err(GatewayError::Timeout(self.config.timeout.as_secs()));
                }
                Err(e) => return Err(GatewayError::Backend(e.to_string())),
            };

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS && !retried {
                warn!(
                    "model backend throttled, retrying after {:?}",
                    self.config.retry_backoff
                );
                retried = true;
                tokio::time::sleep(self.config.retry_backoff).await;
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let body = body.chars().take(200).collect::<String>();
                return Err(GatewayError::Backend(format!("{status}: {body}")));
            }

            let parsed: InvokeResponse = response
                .json()
                .await
                .map_err(|e| GatewayError::Backend(format!("malformed response: {e}")))?;

            let text = parsed
                .content
                .iter()
                .find(|block| block.content_type == "text")
                .map(|block| block.text.clone())
                .ok_or_else(|| {
                    GatewayError::Backend("no text content in response".to_string())
                })?;

            debug!("model response: {} chars", text.len());
            return Ok(text);
        }
    }
}

#[derive(Debug, Serialize)]
struct InvokeRequest {
    anthropic_version: &'static str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct InvokeResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.max_tokens, 4096);
        assert_eq!(config.retry_backoff, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_invoke_without_credentials_is_unavailable() {
        let gateway = LlmGateway::new(GatewayConfig::default());
        assert!(!gateway.is_live());
        let result = gateway.invoke("hello", None).await;
        assert!(matches!(result, Err(GatewayError::BackendUnavailable)));
    }
}
