//! Google Gemini generateContent client
//!
//! Auth is a query parameter, not a header; classification requests set
//! `responseMimeType` so the model emits bare JSON.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{ModelError, ModelReply, Provider, SmallModel, estimate_tokens};
use crate::config::ModelConfig;

pub struct GeminiClient {
    model: String,
    base_url: String,
    api_key: Option<String>,
    http: Client,
}

impl GeminiClient {
    pub fn from_config(config: &ModelConfig) -> Self {
        let api_key = std::env::var(&config.gemini.api_key_env).ok().filter(|k| !k.is_empty());
        Self {
            model: config.gemini.model.clone(),
            base_url: config.gemini.base_url.clone(),
            api_key,
            http: Client::builder()
                .timeout(Duration::from_secs(config.cloud_timeout_secs))
                .build()
                .unwrap_or_default(),
        }
    }

    async fn generate(&self, prompt: &str, max_tokens: u32, json_mode: bool) -> Result<ModelReply, ModelError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ModelError::Unavailable("gemini key missing".to_string()))?;

        let mut generation_config = serde_json::json!({
            "maxOutputTokens": max_tokens,
            "temperature": 0.2,
        });
        if json_mode {
            generation_config["responseMimeType"] = serde_json::json!("application/json");
        }

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, api_key
        );
        let response = self
            .http
            .post(url)
            .json(&serde_json::json!({
                "contents": [{ "parts": [{ "text": prompt }] }],
                "generationConfig": generation_config,
            }))
            .send()
            .await?;

        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Err(ModelError::Unauthorized {
                provider: "gemini".to_string(),
            });
        }
        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ModelError::ApiError { status, message });
        }

        let api_response: GenerateContentResponse = response.json().await?;
        let content = api_response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| ModelError::InvalidResponse("no candidates in response".to_string()))?;

        let (input_tokens, output_tokens) = match api_response.usage_metadata {
            Some(usage) => (usage.prompt_token_count, usage.candidates_token_count),
            None => (estimate_tokens(prompt), estimate_tokens(&content)),
        };

        Ok(ModelReply {
            content,
            input_tokens,
            output_tokens,
        })
    }
}

#[async_trait]
impl SmallModel for GeminiClient {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    async fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn call(&self, prompt: &str, max_tokens: u32, instructions: Option<&str>) -> Result<ModelReply, ModelError> {
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
struct GenerateContentResponse {
    candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount")]
    prompt_token_count: u64,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_parsing() {
        let json = r#"{
            "candidates": [{"content": {"parts": [{"text": "pong"}], "role": "model"}}],
            "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 1}
        }"#;
        let parsed: GenerateContentResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.candidates[0].content.parts[0].text, "pong");
        assert_eq!(parsed.usage_metadata.unwrap().prompt_token_count, 4);
    }
}
