//! Ollama generate-endpoint client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{ModelError, ModelReply, PROBE_TIMEOUT_MS, Provider, SmallModel, estimate_tokens};
use crate::config::ModelConfig;

pub struct OllamaClient {
    model: String,
    base_url: String,
    http: Client,
    probe: Client,
}

impl OllamaClient {
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            model: config.ollama.model.clone(),
            base_url: config.ollama.base_url.clone(),
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

    async fn generate(&self, prompt: &str, max_tokens: u32, json_format: bool) -> Result<ModelReply, ModelError> {
        let mut body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "num_predict": max_tokens,
                "temperature": 0.2,
            },
        });
        if json_format {
            body["format"] = serde_json::json!("json");
        }

        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ModelError::ApiError { status, message });
        }

        let api_response: GenerateResponse = response.json().await?;
        let input_tokens = api_response.prompt_eval_count.unwrap_or_else(|| estimate_tokens(prompt));
        let output_tokens = api_response
            .eval_count
            .unwrap_or_else(|| estimate_tokens(&api_response.response));

        Ok(ModelReply {
            content: api_response.response,
            input_tokens,
            output_tokens,
        })
    }
}

#[async_trait]
impl SmallModel for OllamaClient {
    fn provider(&self) -> Provider {
        Provider::Ollama
    }

    async fn is_available(&self) -> bool {
        let reachable = self.probe.get(&self.base_url).send().await.is_ok();
        debug!(reachable, "Ollama probe");
        reachable
    }

    async fn call(&self, prompt: &str, max_tokens: u32, instructions: Option<&str>) -> Result<ModelReply, ModelError> {
        // The generate endpoint has no system slot; prepend instructions
        let prompt = match instructions {
            Some(instructions) => format!("{instructions}\n\n{prompt}"),
            None => prompt.to_string(),
        };
        self.generate(&prompt, max_tokens, false).await
    }

    async fn classify(&self, json_prompt: &str, max_tokens: u32) -> Result<ModelReply, ModelError> {
        self.generate(json_prompt, max_tokens, true).await
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    prompt_eval_count: Option<u64>,
    eval_count: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_parsing() {
        let json = r#"{"model":"llama3.2","response":"{\"category_id\":\"files\"}","done":true,"prompt_eval_count":31,"eval_count":9}"#;
        let parsed: GenerateResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.response, "{\"category_id\":\"files\"}");
        assert_eq!(parsed.prompt_eval_count, Some(31));
    }

    #[test]
    fn test_response_parsing_without_counts() {
        let json = r#"{"response":"hi"}"#;
        let parsed: GenerateResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.eval_count.is_none());
    }
}
