//! MLX local classification server client
//!
//! Minimal wire format: `POST /classify` with `{"prompt","max_tokens"}`,
//! `{"content":"…"}` back. The server reports no token counts, so usage
//! is estimated.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{ModelError, ModelReply, PROBE_TIMEOUT_MS, Provider, SmallModel, estimate_tokens};
use crate::config::ModelConfig;

pub struct MlxClient {
    base_url: String,
    http: Client,
    probe: Client,
}

impl MlxClient {
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            base_url: config.mlx.base_url.clone(),
            http: Client::builder()
                .timeout(Duration::from_secs(config.local_timeout_secs))
                .build()
                .unwrap_or_default(),
            probe: Client::builder()
                .timeout(Duration::from_millis(PROBE_TIMEOUT_MS))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl SmallModel for MlxClient {
    fn provider(&self) -> Provider {
        Provider::Mlx
    }

    async fn is_available(&self) -> bool {
        let reachable = self.probe.get(&self.base_url).send().await.is_ok();
        debug!(reachable, "MLX probe");
        reachable
    }

    async fn call(&self, prompt: &str, max_tokens: u32, instructions: Option<&str>) -> Result<ModelReply, ModelError> {
        let prompt = match instructions {
            Some(instructions) => format!("{instructions}\n\n{prompt}"),
            None => prompt.to_string(),
        };

        let response = self
            .http
            .post(format!("{}/classify", self.base_url))
            .json(&serde_json::json!({
                "prompt": prompt,
                "max_tokens": max_tokens,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ModelError::ApiError { status, message });
        }

        let api_response: ClassifyResponse = response.json().await?;
        Ok(ModelReply {
            input_tokens: estimate_tokens(&prompt),
            output_tokens: estimate_tokens(&api_response.content),
            content: api_response.content,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ClassifyResponse {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_parsing() {
        let parsed: ClassifyResponse = serde_json::from_str(r#"{"content":"answer"}"#).unwrap();
        assert_eq!(parsed.content, "answer");
    }
}
