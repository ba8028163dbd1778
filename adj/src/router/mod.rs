//! Tiered router - five escalation levels
//!
//! Each request tries increasingly expensive strategies until one
//! matches: instant patterns, bash shortcuts, cached category match,
//! the native classifier, and finally the small-model classifier. A tier
//! that errors falls through to the next; `route` itself never fails.

mod instant;
mod result;
mod shortcut;

pub use instant::match_instant;
pub use result::{RouteAnalysis, RouteResult};
pub use shortcut::match_shortcut;

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::capability::CapabilityRegistry;
use crate::classifier::{DEFAULT_THRESHOLD, NativeClassifier};
use crate::manifest::{AgentType, Category, Manifest, PromptTier, default_bash_commands, default_categories};
use crate::model::ModelFabric;

/// Tier-2 bonus when a whole pattern phrase is covered by the input
const PHRASE_BONUS: f64 = 2.0;

/// Tier-2 bonus per overlapping pattern token
const TOKEN_BONUS: f64 = 0.5;

/// Tier-2 minimum winning score
const CACHED_MIN_SCORE: f64 = 1.0;

/// Tier-2 score that maps to full confidence
const CACHED_FULL_SCORE: f64 = 3.0;

/// The tiered router
pub struct Router {
    manifest: Option<Manifest>,
    registry: Option<Arc<CapabilityRegistry>>,
    classifier: NativeClassifier,
    fabric: Option<Arc<ModelFabric>>,
}

impl Router {
    /// A router over a loaded manifest (or defaults when none loaded)
    pub fn new(manifest: Option<Manifest>) -> Self {
        Self {
            manifest,
            registry: None,
            classifier: NativeClassifier::new(),
            fabric: None,
        }
    }

    /// Attach a capability registry for skill resolution
    pub fn with_registry(mut self, registry: Arc<CapabilityRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Attach the small-model fabric enabling tier 3b
    pub fn with_fabric(mut self, fabric: Arc<ModelFabric>) -> Self {
        self.fabric = Some(fabric);
        self
    }

    /// The manifest in use, if one loaded
    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    /// Route an input through the tiers; never fails
    pub async fn route(&self, input: &str) -> RouteResult {
        let input = input.trim();
        if input.is_empty() {
            debug!("Empty input, using fallback route");
            return RouteResult::fallback();
        }

        // Tier 0: instant answers
        if let Some(answer) = match_instant(input, self.manifest.as_ref()) {
            debug!(input, "Tier 0 instant answer");
            return RouteResult::Instant { answer };
        }

        // Tier 1: bash shortcuts
        let default_commands;
        let bash_commands: &BTreeMap<String, String> = match &self.manifest {
            Some(manifest) => &manifest.bash_commands,
            None => {
                default_commands = default_bash_commands();
                &default_commands
            }
        };
        if let Some(command) = match_shortcut(input, bash_commands) {
            debug!(input, command, "Tier 1 bash shortcut");
            return RouteResult::BashShortcut {
                command: command.to_string(),
            };
        }

        // Tier 2: cached category match
        let default_cats;
        let categories: &[Category] = match &self.manifest {
            Some(manifest) => &manifest.categories,
            None => {
                default_cats = default_categories();
                &default_cats
            }
        };
        if let Some((category, confidence)) = cached_match(input, categories) {
            debug!(input, category = %category.id, confidence, "Tier 2 cached match");
            return RouteResult::Cached(self.analysis_for(input, category, confidence));
        }

        // Tier 3a: native classifier
        if let Some(classification) = self.classifier.classify(input, categories) {
            if classification.confidence >= DEFAULT_THRESHOLD {
                if let Some(category) = categories.iter().find(|c| c.id == classification.category_id) {
                    debug!(input, category = %category.id, confidence = classification.confidence, "Tier 3a native classification");
                    return RouteResult::Cached(self.analysis_for(input, category, classification.confidence));
                }
            }
        }

        // Tier 3b: model classifier; any failure lands on the fallback
        match self.model_classify(input, categories).await {
            Some(analysis) => RouteResult::Classified(analysis),
            None => RouteResult::fallback(),
        }
    }

    /// Build the analysis record for a matched category
    ///
    /// Ensures the shell/capability tool bracket and unions in skills the
    /// registry resolves from the input itself.
    fn analysis_for(&self, input: &str, category: &Category, confidence: f64) -> RouteAnalysis {
        let mut normalized = category.clone();
        normalized.normalize_tools();

        let mut skills = normalized.skills.clone();
        if let Some(registry) = &self.registry {
            let known: HashSet<&String> = skills.iter().collect();
            let resolved: Vec<String> = registry
                .resolve_skills(input)
                .into_iter()
                .map(|s| s.name.clone())
                .filter(|name| !known.contains(name))
                .collect();
            skills.extend(resolved);
        }

        RouteAnalysis {
            tools: normalized.tools,
            skills,
            agent_type: normalized.agent_type,
            prompt_tier: normalized.prompt_tier,
            confidence,
        }
    }

    async fn model_classify(&self, input: &str, categories: &[Category]) -> Option<RouteAnalysis> {
        let fabric = self.fabric.as_ref()?;

        let listing: Vec<serde_json::Value> = categories
            .iter()
            .map(|category| {
                let patterns: Vec<&str> = category.alternatives().take(3).collect();
                serde_json::json!({ "id": category.id, "patterns": patterns })
            })
            .collect();

        let prompt = serde_json::json!({
            "task": "Pick the best category for the user input.",
            "input": input,
            "categories": listing,
            "output": {
                "category_id": "<id>",
                "tools": ["<tool>"],
                "agent_type": "react|plan-execute|reflection",
                "prompt_tier": "minimal|standard|full"
            }
        })
        .to_string();

        let reply = match fabric.classify(&prompt, 256).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Model classification failed");
                return None;
            }
        };

        let parsed: ModelClassification = match serde_json::from_str(extract_json_object(&reply)?) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "Model classification output did not parse");
                return None;
            }
        };

        let category = categories.iter().find(|c| c.id == parsed.category_id)?;
        let mut analysis = self.analysis_for(input, category, 0.8);
        if let Some(agent_type) = parsed.agent_type {
            analysis.agent_type = agent_type;
        }
        if let Some(prompt_tier) = parsed.prompt_tier {
            analysis.prompt_tier = prompt_tier;
        }
        debug!(input, category = %parsed.category_id, "Tier 3b model classification");
        Some(analysis)
    }
}

/// Tier-2 scoring
///
/// A phrase counts as found when it appears as a substring of the raw
/// input or when every one of its tokens does; otherwise each overlapping
/// token earns a partial bonus. The winner needs a score of at least 1.0;
/// confidence is score / 3 capped at 1.
fn cached_match<'a>(input: &str, categories: &'a [Category]) -> Option<(&'a Category, f64)> {
    let input_lower = input.to_lowercase();
    let input_words: HashSet<&str> = input_lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 1)
        .collect();

    let mut best: Option<(&Category, f64)> = None;
    for category in categories {
        let mut score = 0.0;
        for alternative in category.alternatives() {
            let tokens: Vec<&str> = alternative
                .split(|c: char| !c.is_alphanumeric())
                .filter(|w| w.len() > 1)
                .collect();

            let covered = !tokens.is_empty() && tokens.iter().all(|t| input_words.contains(t));
            if input_lower.contains(alternative) || covered {
                score += PHRASE_BONUS;
            } else {
                score += TOKEN_BONUS * tokens.iter().filter(|t| input_words.contains(*t)).count() as f64;
            }
        }

        if score > best.map(|(_, s)| s).unwrap_or(0.0) {
            best = Some((category, score));
        }
    }

    best.filter(|(_, score)| *score >= CACHED_MIN_SCORE)
        .map(|(category, score)| (category, (score / CACHED_FULL_SCORE).min(1.0)))
}

/// Find the outermost JSON object in possibly fenced model output
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[derive(Debug, Deserialize)]
struct ModelClassification {
    category_id: String,
    #[serde(default)]
    agent_type: Option<AgentType>,
    #[serde(default)]
    prompt_tier: Option<PromptTier>,
}
