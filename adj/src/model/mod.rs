//! Small-model delegation fabric
//!
//! A uniform interface over seven providers for cheap classification,
//! summarization, and extraction work. Providers are probed once, in
//! strict priority order (on-device first, Anthropic always last), and
//! the binding is cached; individual call failures still fall through to
//! the next available provider.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

mod anthropic;
mod error;
mod gemini;
mod mlx;
mod ollama;
mod ondevice;
mod openai_compat;

pub use anthropic::AnthropicClient;
pub use error::ModelError;
pub use gemini::GeminiClient;
pub use mlx::MlxClient;
pub use ollama::OllamaClient;
pub use ondevice::OnDeviceClient;
pub use openai_compat::OpenAiCompatClient;

use crate::config::ModelConfig;
use crate::ledger::{Purpose, TokenLedger};

/// Default working-context bound, in characters
pub const DEFAULT_PROMPT_CHARS: usize = 12_800;

/// Marker appended when a prompt is truncated to fit the working context
pub const ELISION_MARKER: &str = "\n[... input truncated to fit context ...]";

/// Instructions appended by the default `classify` path
const JSON_INSTRUCTIONS: &str = "Respond with a single JSON object and nothing else.";

/// Availability probe timeout for local HTTP providers
pub(crate) const PROBE_TIMEOUT_MS: u64 = 500;

/// The seven supported providers, in probe priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Provider {
    OnDevice,
    Mlx,
    Ollama,
    LmStudio,
    Groq,
    Gemini,
    Anthropic,
}

impl Provider {
    /// Stable name used in config, ledger entries, and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OnDevice => "ondevice",
            Provider::Mlx => "mlx",
            Provider::Ollama => "ollama",
            Provider::LmStudio => "lmstudio",
            Provider::Groq => "groq",
            Provider::Gemini => "gemini",
            Provider::Anthropic => "anthropic",
        }
    }

    /// Parse a config override value; `auto` and unknown values are None
    pub fn parse_override(s: &str) -> Option<Provider> {
        match s {
            "ondevice" => Some(Provider::OnDevice),
            "mlx" => Some(Provider::Mlx),
            "ollama" => Some(Provider::Ollama),
            "lmstudio" => Some(Provider::LmStudio),
            "groq" => Some(Provider::Groq),
            "gemini" => Some(Provider::Gemini),
            "anthropic" => Some(Provider::Anthropic),
            _ => None,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A completed model call
#[derive(Debug, Clone)]
pub struct ModelReply {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// One small-model provider
#[async_trait]
pub trait SmallModel: Send + Sync {
    /// Which provider this is
    fn provider(&self) -> Provider;

    /// Provider-level availability (key present, endpoint reachable,
    /// bridge runnable); a positive answer does not guarantee any single
    /// call succeeds
    async fn is_available(&self) -> bool;

    /// One generation call; `instructions` become the system prompt
    async fn call(&self, prompt: &str, max_tokens: u32, instructions: Option<&str>) -> Result<ModelReply, ModelError>;

    /// Classification call; providers with a JSON output mode override
    /// this to request it on the wire
    async fn classify(&self, json_prompt: &str, max_tokens: u32) -> Result<ModelReply, ModelError> {
        self.call(json_prompt, max_tokens, Some(JSON_INSTRUCTIONS)).await
    }

    /// Working-context bound in characters; prompts beyond it are
    /// truncated from the tail before submission
    fn max_prompt_chars(&self) -> usize {
        DEFAULT_PROMPT_CHARS
    }
}

/// Truncate a prompt from the tail at `limit` chars with an elision marker
pub fn truncate_prompt(prompt: &str, limit: usize) -> String {
    if prompt.len() <= limit {
        return prompt.to_string();
    }
    let keep = limit.saturating_sub(ELISION_MARKER.len());
    let mut cut = keep;
    while cut > 0 && !prompt.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &prompt[..cut], ELISION_MARKER)
}

/// Estimate tokens as ceil(chars / 4); used where providers report none
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64).div_ceil(4)
}

/// The provider-abstracted fabric callers actually use
///
/// Owns the priority-ordered provider list, the cached resolution, and
/// the ledger accounting for every successful call.
pub struct ModelFabric {
    providers: Vec<Arc<dyn SmallModel>>,
    resolved: OnceCell<Option<usize>>,
    ledger: Arc<TokenLedger>,
}

impl ModelFabric {
    /// Build the fabric from configuration
    ///
    /// An explicit provider override keeps only that provider in the
    /// chain (plus Anthropic as the terminal fallback when it differs).
    pub fn from_config(config: &ModelConfig, ledger: Arc<TokenLedger>) -> Self {
        let all: Vec<Arc<dyn SmallModel>> = vec![
            Arc::new(OnDeviceClient::from_config(config)),
            Arc::new(MlxClient::from_config(config)),
            Arc::new(OllamaClient::from_config(config)),
            Arc::new(OpenAiCompatClient::lmstudio(config)),
            Arc::new(OpenAiCompatClient::groq(config)),
            Arc::new(GeminiClient::from_config(config)),
            Arc::new(AnthropicClient::from_config(config)),
        ];

        let providers = match Provider::parse_override(&config.provider) {
            Some(chosen) => {
                let mut chain: Vec<Arc<dyn SmallModel>> =
                    all.iter().filter(|p| p.provider() == chosen).cloned().collect();
                if chosen != Provider::Anthropic {
                    chain.extend(all.iter().filter(|p| p.provider() == Provider::Anthropic).cloned());
                }
                chain
            }
            None => all,
        };

        Self {
            providers,
            resolved: OnceCell::new(),
            ledger,
        }
    }

    /// Build a fabric over an explicit provider chain (tests)
    pub fn with_providers(providers: Vec<Arc<dyn SmallModel>>, ledger: Arc<TokenLedger>) -> Self {
        Self {
            providers,
            resolved: OnceCell::new(),
            ledger,
        }
    }

    /// Resolve the first available provider, probing once and caching
    async fn resolve(&self) -> Option<usize> {
        *self
            .resolved
            .get_or_init(|| async {
                for (i, provider) in self.providers.iter().enumerate() {
                    if provider.is_available().await {
                        info!(provider = %provider.provider(), "Small-model provider resolved");
                        return Some(i);
                    }
                    debug!(provider = %provider.provider(), "Provider probe failed");
                }
                warn!("No small-model provider available");
                None
            })
            .await
    }

    /// Whether any provider resolved
    pub async fn is_available(&self) -> bool {
        self.resolve().await.is_some()
    }

    /// The resolved provider name, if any
    pub async fn provider_name(&self) -> Option<&'static str> {
        let index = self.resolve().await?;
        Some(self.providers[index].provider().as_str())
    }

    /// One call through the chain with lazy failover
    ///
    /// Starts at the resolved provider and falls through to later ones on
    /// call failure; every successful call is ledgered under `purpose`.
    pub async fn call(
        &self,
        prompt: &str,
        max_tokens: u32,
        purpose: Purpose,
        instructions: Option<&str>,
    ) -> Result<String, ModelError> {
        self.dispatch(prompt, max_tokens, purpose, instructions, false).await
    }

    /// Classification call returning the provider's JSON text
    pub async fn classify(&self, json_prompt: &str, max_tokens: u32) -> Result<String, ModelError> {
        self.dispatch(json_prompt, max_tokens, Purpose::Classification, None, true)
            .await
    }

    /// Summarize `content`, described by `context`, within `max_tokens`
    pub async fn summarize(&self, content: &str, context: &str, max_tokens: u32) -> Result<String, ModelError> {
        let prompt = format!(
            "Summarize the following content ({context}). Keep concrete values: numbers, \
             paths, names, error messages. Be brief.\n\n{content}"
        );
        self.call(&prompt, max_tokens, Purpose::Summarization, None).await
    }

    async fn dispatch(
        &self,
        prompt: &str,
        max_tokens: u32,
        purpose: Purpose,
        instructions: Option<&str>,
        json_mode: bool,
    ) -> Result<String, ModelError> {
        let start = self
            .resolve()
            .await
            .ok_or_else(|| ModelError::Unavailable("no provider resolved".to_string()))?;

        let mut last_error: Option<ModelError> = None;
        for provider in &self.providers[start..] {
            let bounded = truncate_prompt(prompt, provider.max_prompt_chars());
            let result = if json_mode {
                provider.classify(&bounded, max_tokens).await
            } else {
                provider.call(&bounded, max_tokens, instructions).await
            };

            match result {
                Ok(reply) => {
                    self.ledger.record_call(
                        provider.provider().as_str(),
                        purpose,
                        reply.input_tokens,
                        reply.output_tokens,
                    );
                    return Ok(reply.content);
                }
                Err(e) => {
                    warn!(provider = %provider.provider(), error = %e, "Model call failed, trying next provider");
                    last_error = Some(e);
                }
            }
        }

        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "empty chain".to_string());
        Err(ModelError::Exhausted(message))
    }
}
