//! Capability registry - the tools and skills currently available
//!
//! The registry is the router's and the manifest's view of what the agent
//! can do. Tool implementations live outside the core; here they are names
//! with descriptions. Skills additionally carry keywords and an optional
//! embedded instruction body (a parameterized shell procedure).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Name of the shell tool every category must carry
pub const SHELL_TOOL: &str = "bash";

/// Name of the capability-lookup tool every category must carry
pub const CAPABILITY_TOOL: &str = "list_capabilities";

/// Minimum score for a skill to be resolved against an input
const SKILL_RESOLUTION_THRESHOLD: f64 = 0.5;

/// A registered skill
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Embedded shell procedure with `{{NAME}}`-style placeholders, when
    /// the skill is directly executable
    #[serde(default)]
    pub instructions: Option<String>,
}

/// Opaque credential lookup consumed by skills that need secrets
///
/// The core never parses credential formats; it asks for a name and gets
/// a secret or nothing.
pub trait CredentialLookup: Send + Sync {
    fn lookup(&self, name: &str) -> Option<String>;
}

/// Enumerates the tools and skills available to the agent
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    tools: BTreeMap<String, String>,
    skills: BTreeMap<String, Skill>,
}

impl CapabilityRegistry {
    /// A registry preloaded with the two tools the core itself consumes
    pub fn with_builtins() -> Self {
        let mut registry = Self::default();
        registry.register_tool(SHELL_TOOL, "Run a shell command and capture its output");
        registry.register_tool(CAPABILITY_TOOL, "List the tools and skills currently available");
        registry
    }

    /// Register a tool name with a short description
    pub fn register_tool(&mut self, name: impl Into<String>, description: impl Into<String>) {
        self.tools.insert(name.into(), description.into());
    }

    /// Register a skill
    pub fn register_skill(&mut self, skill: Skill) {
        self.skills.insert(skill.name.clone(), skill);
    }

    /// Tool name -> description
    pub fn tool_index(&self) -> &BTreeMap<String, String> {
        &self.tools
    }

    /// All registered tool names
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// All registered skill names
    pub fn skill_names(&self) -> Vec<String> {
        self.skills.keys().cloned().collect()
    }

    /// Skill name -> description
    pub fn skill_index(&self) -> BTreeMap<String, String> {
        self.skills
            .iter()
            .map(|(name, skill)| (name.clone(), skill.description.clone()))
            .collect()
    }

    /// Look up a skill by name
    pub fn skill(&self, name: &str) -> Option<&Skill> {
        self.skills.get(name)
    }

    /// Skills whose metadata matches the input above the resolution
    /// threshold, best first
    ///
    /// Scoring is simple token overlap: each input token found in the
    /// skill's name, description, or keywords counts once; the score is
    /// matches / input tokens.
    pub fn resolve_skills(&self, input: &str) -> Vec<&Skill> {
        let tokens: Vec<String> = input
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > 1)
            .map(str::to_string)
            .collect();
        if tokens.is_empty() {
            return vec![];
        }

        let mut scored: Vec<(f64, &Skill)> = self
            .skills
            .values()
            .filter_map(|skill| {
                let haystack = format!(
                    "{} {} {}",
                    skill.name.to_lowercase(),
                    skill.description.to_lowercase(),
                    skill.keywords.join(" ").to_lowercase()
                );
                let matches = tokens.iter().filter(|t| haystack.contains(t.as_str())).count();
                let score = matches as f64 / tokens.len() as f64;
                (score >= SKILL_RESOLUTION_THRESHOLD).then_some((score, skill))
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        debug!(input, matched = scored.len(), "resolve_skills");
        scored.into_iter().map(|(_, s)| s).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> CapabilityRegistry {
        let mut registry = CapabilityRegistry::with_builtins();
        registry.register_skill(Skill {
            name: "send-sms".to_string(),
            description: "Send a text message to a contact".to_string(),
            keywords: vec!["sms".to_string(), "text".to_string(), "message".to_string()],
            instructions: None,
        });
        registry.register_skill(Skill {
            name: "weather-lookup".to_string(),
            description: "Fetch the weather forecast for a city".to_string(),
            keywords: vec!["weather".to_string(), "forecast".to_string()],
            instructions: Some("curl -s 'https://wttr.in/{{CITY}}?format=3'".to_string()),
        });
        registry
    }

    #[test]
    fn test_builtins_present() {
        let registry = CapabilityRegistry::with_builtins();
        assert!(registry.tool_index().contains_key(SHELL_TOOL));
        assert!(registry.tool_index().contains_key(CAPABILITY_TOOL));
    }

    #[test]
    fn test_resolve_skills_matches_keywords() {
        let registry = registry();
        let skills = registry.resolve_skills("send an sms to john");
        assert!(skills.iter().any(|s| s.name == "send-sms"));
    }

    #[test]
    fn test_resolve_skills_below_threshold() {
        let registry = registry();
        let skills = registry.resolve_skills("reorganize my bookshelf by color");
        assert!(skills.is_empty());
    }

    #[test]
    fn test_resolve_skills_empty_input() {
        let registry = registry();
        assert!(registry.resolve_skills("").is_empty());
        assert!(registry.resolve_skills("a !").is_empty());
    }

    #[test]
    fn test_skill_index() {
        let registry = registry();
        let index = registry.skill_index();
        assert_eq!(index.get("send-sms").unwrap(), "Send a text message to a contact");
    }
}
