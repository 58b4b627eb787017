//! Client for the completion model that picks the next command.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

/// Sampling parameters, fixed for every query.
pub const TEMPERATURE: f64 = 0.5;
pub const FREQUENCY_PENALTY: f64 = 1.0;
pub const MAX_TOKENS: u32 = 50;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("OPENAI_API_KEY not set in environment")]
    MissingApiKey,
    #[error("completion request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("completion API error ({status}): {message}")]
    Api { status: StatusCode, message: String },
    #[error("no completion text in response: {0}")]
    MalformedResponse(Value),
}

/// Anything that can turn a prompt into a reply.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ModelError>;
}

/// First line of a model reply, trimmed. Replies often carry trailing
/// newlines or extra lines; only the first is the command.
pub fn first_line(reply: &str) -> &str {
    reply.trim().split('\n').next().unwrap_or("").trim()
}

/// OpenAI-compatible `/v1/completions` client.
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    /// Reads the API key from `OPENAI_API_KEY`.
    pub fn new(model: impl Into<String>) -> Result<Self, ModelError> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| ModelError::MissingApiKey)?;
        Self::with_base_url("https://api.openai.com", api_key, model, None)
    }

    /// `request_timeout` bounds each attempt end to end; `None` means the
    /// production default.
    pub fn with_base_url(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        request_timeout: Option<Duration>,
    ) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(request_timeout.unwrap_or(REQUEST_TIMEOUT))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// POST with bounded retry. Retries transport errors, 429 and 5xx with
    /// exponential backoff; other client errors are returned as-is.
    async fn post_with_retry(&self, url: &str, body: &Value) -> Result<reqwest::Response, ModelError> {
        let mut attempt = 0;
        let mut backoff = INITIAL_BACKOFF;
        loop {
            attempt += 1;
            match self
                .client
                .post(url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(body)
                .send()
                .await
            {
                Ok(resp) => {
                    let status = resp.status();
                    let retryable =
                        status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS;
                    if !retryable || attempt >= MAX_ATTEMPTS {
                        return Ok(resp);
                    }
                    warn!(%status, attempt, "completion request failed, retrying");
                }
                Err(err) => {
                    if attempt >= MAX_ATTEMPTS {
                        return Err(ModelError::Http(err));
                    }
                    warn!(error = %err, attempt, "completion request failed, retrying");
                }
            }
            sleep(backoff).await;
            backoff *= 2;
        }
    }
}

#[async_trait]
impl CompletionModel for OpenAiClient {
    async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        let url = format!("{}/v1/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "temperature": TEMPERATURE,
            "frequency_penalty": FREQUENCY_PENALTY,
            "max_tokens": MAX_TOKENS,
        });

        let response = self.post_with_retry(&url, &body).await?;
        let status = response.status();
        let json_resp: Value = response.json().await?;

        if !status.is_success() {
            let message = json_resp["error"]["message"]
                .as_str()
                .unwrap_or("unknown API error")
                .to_owned();
            return Err(ModelError::Api { status, message });
        }

        match json_resp["choices"][0]["text"].as_str() {
            Some(text) => Ok(text.to_owned()),
            None => Err(ModelError::MalformedResponse(json_resp)),
        }
    }
}
