use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{MessagesRequest, MessagesResponse};
use crate::config::{LlmConfig, RequestConfig};
use crate::error::{LlmError, LlmResult};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Client for the Anthropic Messages API
#[derive(Clone)]
pub struct CompletionClient {
    client: Client,
    base_url: String,
    api_key: String,
    request_config: RequestConfig,
}

impl CompletionClient {
    /// Create a new completion client
    pub fn new(config: &LlmConfig, request_config: RequestConfig) -> LlmResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(LlmError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.trim().to_string(),
            request_config,
        })
    }

    /// Run a completion and return its concatenated text.
    pub async fn complete(&self, request: MessagesRequest) -> LlmResult<String> {
        let response = self.send_messages(request).await?;
        let text = response.text();
        if text.trim().is_empty() {
            return Err(LlmError::InvalidResponse {
                message: "Completion contained no text".to_string(),
            });
        }
        Ok(text)
    }

    /// Call the messages endpoint, retrying transient failures
    pub async fn send_messages(&self, request: MessagesRequest) -> LlmResult<MessagesResponse> {
        if self.api_key.is_empty() {
            return Err(LlmError::MissingCredentials {
                message: "completion API key is empty".to_string(),
            });
        }

        let url = format!("{}/v1/messages", self.base_url);
        let model = request.model.clone();

        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = self.request_config.backoff_delay(retries);
                warn!(
                    model = %model,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying completion request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(&url, &request).await {
                Ok(response) => {
                    let latency = start.elapsed();
                    info!(
                        model = %model,
                        latency_ms = latency.as_millis(),
                        "Completion call succeeded"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    let latency = start.elapsed();
                    error!(
                        model = %model,
                        error = %e,
                        latency_ms = latency.as_millis(),
                        retry = retries,
                        "Completion call failed"
                    );
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        Err(LlmError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries,
        })
    }

    /// Execute a single request (internal)
    async fn execute_request(
        &self,
        url: &str,
        request: &MessagesRequest,
    ) -> LlmResult<MessagesResponse> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Calling completion API"
        );

        let response = self
            .client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    LlmError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        response
            .json::<MessagesResponse>()
            .await
            .map_err(|e| LlmError::InvalidResponse {
                message: format!("Failed to parse response: {}", e),
            })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}
