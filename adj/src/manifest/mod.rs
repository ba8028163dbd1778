//! Routing manifest - the persistent capability cache
//!
//! The manifest maps intent patterns to the tool/skill bundles and agent
//! configuration needed to serve them. It is generated once from the live
//! capability list, then extended incrementally as capabilities appear;
//! the router consults it on every request.

mod defaults;
mod store;

pub use defaults::{default_bash_commands, default_categories, default_instant_answers};
pub use store::ManifestStore;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capability::{CAPABILITY_TOOL, SHELL_TOOL};

/// Orchestration style selected per request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentType {
    /// Direct reactive loop
    React,
    /// Plan first, then execute the plan
    PlanExecute,
    /// Execute with a reflection pass
    Reflection,
}

impl Default for AgentType {
    fn default() -> Self {
        AgentType::React
    }
}

/// Verbosity of the agent's system prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PromptTier {
    Minimal,
    Standard,
    Full,
}

impl Default for PromptTier {
    fn default() -> Self {
        PromptTier::Standard
    }
}

/// One intent category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// Stable identifier
    pub id: String,

    /// Pipe-separated pattern alternatives, lowercase
    pub patterns: Vec<String>,

    /// Tools bundled with this category; the shell tool and the
    /// capability-lookup tool are always present
    pub tools: Vec<String>,

    /// Skills bundled with this category
    #[serde(default)]
    pub skills: Vec<String>,

    #[serde(default)]
    pub agent_type: AgentType,

    #[serde(default)]
    pub prompt_tier: PromptTier,
}

impl Category {
    /// Iterate every pattern alternative across all pattern strings
    pub fn alternatives(&self) -> impl Iterator<Item = &str> {
        self.patterns
            .iter()
            .flat_map(|p| p.split('|'))
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    /// Force the required tool bracket: shell first, capability lookup last
    pub fn normalize_tools(&mut self) {
        self.tools.retain(|t| t != SHELL_TOOL && t != CAPABILITY_TOOL);
        self.tools.insert(0, SHELL_TOOL.to_string());
        self.tools.push(CAPABILITY_TOOL.to_string());
    }
}

/// The versioned routing manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Monotonically increasing on every mutation
    pub version: u64,

    pub generated_at: DateTime<Utc>,

    /// Documentation-only: instant-answer pattern -> answer type
    #[serde(default)]
    pub instant_answers: BTreeMap<String, String>,

    /// Bash shortcut pattern -> command
    #[serde(default)]
    pub bash_commands: BTreeMap<String, String>,

    pub categories: Vec<Category>,

    /// Tool name -> short description
    #[serde(default)]
    pub tool_index: BTreeMap<String, String>,

    /// Skill name -> short description
    #[serde(default)]
    pub skill_index: BTreeMap<String, String>,
}

impl Manifest {
    /// An empty manifest at version 0 (never valid on disk; `save`
    /// increments before writing)
    pub fn empty() -> Self {
        Self {
            version: 0,
            generated_at: Utc::now(),
            instant_answers: BTreeMap::new(),
            bash_commands: BTreeMap::new(),
            categories: Vec::new(),
            tool_index: BTreeMap::new(),
            skill_index: BTreeMap::new(),
        }
    }

    /// Find a category by id
    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }
}
