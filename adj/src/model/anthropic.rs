//! Anthropic Messages API client
//!
//! The terminal fallback of the provider chain: availability is key
//! presence, and the chain always ends here. The router never streams,
//! so only the blocking endpoint is implemented.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{ModelError, ModelReply, Provider, SmallModel};
use crate::config::ModelConfig;

pub struct AnthropicClient {
    model: String,
    api_key: Option<String>,
    base_url: String,
    http: Client,
    max_tokens: u32,
}

impl AnthropicClient {
    /// Create a client from configuration; the key is read from the
    /// environment variable named in config and may be absent
    pub fn from_config(config: &ModelConfig) -> Self {
        let api_key = std::env::var(&config.anthropic.api_key_env).ok().filter(|k| !k.is_empty());
        let http = Client::builder()
            .timeout(Duration::from_secs(config.cloud_timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            model: config.anthropic.model.clone(),
            api_key,
            base_url: config.anthropic.base_url.clone(),
            http,
            max_tokens: config.max_tokens,
        }
    }
}

#[async_trait]
impl SmallModel for AnthropicClient {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn call(&self, prompt: &str, max_tokens: u32, instructions: Option<&str>) -> Result<ModelReply, ModelError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ModelError::Unavailable("anthropic key missing".to_string()))?;

        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": max_tokens.min(self.max_tokens),
            "messages": [{ "role": "user", "content": prompt }],
        });
        if let Some(system) = instructions {
            body["system"] = serde_json::json!(system);
        }

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Err(ModelError::Unauthorized {
                provider: "anthropic".to_string(),
            });
        }
        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ModelError::ApiError { status, message });
        }

        let api_response: MessagesResponse = response.json().await?;
        let content = api_response
            .content
            .into_iter()
            .find_map(|block| match block {
                AnthropicContentBlock::Text { text } => Some(text),
            })
            .ok_or_else(|| ModelError::InvalidResponse("no text content in response".to_string()))?;

        Ok(ModelReply {
            content,
            input_tokens: api_response.usage.input_tokens,
            output_tokens: api_response.usage.output_tokens,
        })
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<AnthropicContentBlock>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum AnthropicContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}
