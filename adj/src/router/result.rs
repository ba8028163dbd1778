//! Route results - the router's tagged output type

use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};

use crate::capability::{CAPABILITY_TOOL, SHELL_TOOL};
use crate::exec::ShellRunner;
use crate::manifest::{AgentType, PromptTier};

/// The analysis record carried by non-early-exit routes
///
/// Consumed by the agent selector: tool set, planning/reflection choice,
/// prompt verbosity, and how sure the router is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteAnalysis {
    /// Tools to expose; shell first, capability lookup last
    pub tools: Vec<String>,
    pub skills: Vec<String>,
    pub agent_type: AgentType,
    pub prompt_tier: PromptTier,
    pub confidence: f64,
}

impl RouteAnalysis {
    /// The safe default analysis: shell plus capability lookup, reactive,
    /// standard prompt, low confidence
    pub fn fallback() -> Self {
        Self {
            tools: vec![SHELL_TOOL.to_string(), CAPABILITY_TOOL.to_string()],
            skills: vec![],
            agent_type: AgentType::React,
            prompt_tier: PromptTier::Standard,
            confidence: 0.3,
        }
    }
}

/// What the router decided
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RouteResult {
    /// Tier 0: answered without side effects
    Instant { answer: String },

    /// Tier 1: one safe shell command whose stdout is the answer
    BashShortcut { command: String },

    /// Tier 2/3a: a manifest category matched
    Cached(RouteAnalysis),

    /// Tier 3b (or terminal fallback): the model classified it
    Classified(RouteAnalysis),
}

impl RouteResult {
    /// The terminal fallback every tier miss lands on
    pub fn fallback() -> Self {
        RouteResult::Classified(RouteAnalysis::fallback())
    }

    /// Whether the route resolves without invoking the agent
    pub fn is_early_exit(&self) -> bool {
        matches!(self, RouteResult::Instant { .. } | RouteResult::BashShortcut { .. })
    }

    /// The analysis record for non-early-exit routes
    pub fn analysis(&self) -> Option<&RouteAnalysis> {
        match self {
            RouteResult::Cached(analysis) | RouteResult::Classified(analysis) => Some(analysis),
            _ => None,
        }
    }

    /// Resolve an early-exit route into its answer string
    ///
    /// Defined for `Instant` and `BashShortcut`; fails predictably for
    /// routes that need the agent.
    pub async fn resolve(&self, runner: &ShellRunner) -> Result<String> {
        match self {
            RouteResult::Instant { answer } => Ok(answer.clone()),
            RouteResult::BashShortcut { command } => {
                let result = runner.run(command).await?;
                Ok(result.answer())
            }
            _ => Err(eyre!("route requires the agent; nothing to resolve")),
        }
    }
}
