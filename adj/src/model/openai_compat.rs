//! OpenAI-compatible chat-completions client
//!
//! One implementation serves both LM Studio (local, no auth) and Groq
//! (cloud, bearer token); the wire shape is identical. Classification
//! requests set `response_format: json_object`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{ModelError, ModelReply, PROBE_TIMEOUT_MS, Provider, SmallModel, estimate_tokens};
use crate::config::ModelConfig;

pub struct OpenAiCompatClient {
    which: Provider,
    model: String,
    base_url: String,
    api_key: Option<String>,
    http: Client,
    probe: Client,
}

impl OpenAiCompatClient {
    /// LM Studio: local endpoint, availability by probe, no auth
    pub fn lmstudio(config: &ModelConfig) -> Self {
        Self::new(
            Provider::LmStudio,
            config.lmstudio.base_url.clone(),
            config.lmstudio.model.clone(),
            None,
            Duration::from_secs(config.local_timeout_secs),
        )
    }

    /// Groq: cloud endpoint, availability by key presence
    pub fn groq(config: &ModelConfig) -> Self {
        let api_key = std::env::var(&config.groq.api_key_env).ok().filter(|k| !k.is_empty());
        Self::new(
            Provider::Groq,
            config.groq.base_url.clone(),
            config.groq.model.clone(),
            api_key,
            Duration::from_secs(config.cloud_timeout_secs),
        )
    }

    fn new(which: Provider, base_url: String, model: String, api_key: Option<String>, timeout: Duration) -> Self {
        let http = Client::builder().timeout(timeout).build().unwrap_or_default();
        let probe = Client::builder()
            .timeout(Duration::from_millis(PROBE_TIMEOUT_MS))
            .build()
            .unwrap_or_default();
        Self {
            which,
            model,
            base_url,
            api_key,
            http,
            probe,
        }
    }

    async fn request(&self, prompt: &str, max_tokens: u32, system: Option<&str>, json_mode: bool) -> Result<ModelReply, ModelError> {
        let mut messages = Vec::new();
        if let Some(system) = system {
            messages.push(serde_json::json!({ "role": "system", "content": system }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": prompt }));

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": max_tokens,
            "temperature": 0.2,
        });
        if json_mode {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }

        let mut request = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        if status == 401 || status == 403 {
            return Err(ModelError::Unauthorized {
                provider: self.which.as_str().to_string(),
            });
        }
        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ModelError::ApiError { status, message });
        }

        let api_response: ChatCompletionResponse = response.json().await?;
        let content = api_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ModelError::InvalidResponse("no choices in response".to_string()))?;

        let (input_tokens, output_tokens) = match api_response.usage {
            Some(usage) => (usage.prompt_tokens, usage.completion_tokens),
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
impl SmallModel for OpenAiCompatClient {
    fn provider(&self) -> Provider {
        self.which
    }

    async fn is_available(&self) -> bool {
        match self.which {
            // Cloud: key presence is the whole check
            Provider::Groq => self.api_key.is_some(),
            // Local: any response within the probe window counts
            _ => {
                let reachable = self.probe.get(&self.base_url).send().await.is_ok();
                debug!(provider = %self.which, reachable, "Local endpoint probe");
                reachable
            }
        }
    }

    async fn call(&self, prompt: &str, max_tokens: u32, instructions: Option<&str>) -> Result<ModelReply, ModelError> {
        self.request(prompt, max_tokens, instructions, false).await
    }

    async fn classify(&self, json_prompt: &str, max_tokens: u32) -> Result<ModelReply, ModelError> {
        self.request(json_prompt, max_tokens, None, true).await
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}
