//! Anthropic Messages API backend.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{DecisionError, DecisionMaker, DecisionRequest};

const API_BASE: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

/// Asks a Claude model for the next command.
#[derive(Clone)]
pub struct AnthropicDecider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    base_url: String,
}

impl AnthropicDecider {
    /// Create a decider. An empty key is [`DecisionError::NoApiKey`].
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
    ) -> Result<Self, DecisionError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(DecisionError::NoApiKey);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DecisionError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            model: model.into(),
            max_tokens,
            base_url: API_BASE.to_string(),
        })
    }

    /// Create a decider from the `ANTHROPIC_API_KEY` environment variable.
    pub fn from_env(model: impl Into<String>, max_tokens: u32) -> Result<Self, DecisionError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| DecisionError::NoApiKey)?;
        Self::new(api_key, model, max_tokens)
    }

    /// Point at a different API root, e.g. a proxy.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Model name sent with each request.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_headers(&self) -> Result<HeaderMap, DecisionError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| DecisionError::Config(format!("invalid API key: {e}")))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        Ok(headers)
    }

    fn build_api_request<'a>(&'a self, request: &'a DecisionRequest) -> ApiRequest<'a> {
        let mut messages = Vec::with_capacity(request.history.len() * 2 + 1);
        for exchange in &request.history {
            messages.push(ApiMessage {
                role: "user",
                content: format!(
                    "Game output:\n{}\n\nWhat's your next command?",
                    exchange.narrative
                ),
            });
            messages.push(ApiMessage {
                role: "assistant",
                content: exchange.command.clone(),
            });
        }
        messages.push(ApiMessage {
            role: "user",
            content: format!(
                "What you know so far:\n{}\nGame output:\n{}\n\nWhat's your next command?",
                request.context, request.narrative
            ),
        });

        ApiRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: &request.system,
            messages,
        }
    }
}

#[async_trait]
impl DecisionMaker for AnthropicDecider {
    async fn decide(&self, request: &DecisionRequest) -> Result<String, DecisionError> {
        let body = self.build_api_request(request);
        let headers = self.build_headers()?;

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| DecisionError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(DecisionError::Api { status, message });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| DecisionError::Parse(e.to_string()))?;
        let text = first_text(api_response)?;
        debug!(model = %self.model, text = %text, "decision received");
        Ok(text)
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

fn first_text(response: ApiResponse) -> Result<String, DecisionError> {
    response
        .content
        .into_iter()
        .find_map(|block| match block {
            ApiContent::Text { text } => Some(text),
            ApiContent::Other => None,
        })
        .ok_or_else(|| DecisionError::Parse("response has no text block".into()))
}

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<ApiMessage>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ApiContent>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContent {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}
