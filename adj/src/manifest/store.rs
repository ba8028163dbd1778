//! Manifest persistence and incremental maintenance

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use eyre::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{AgentType, Category, Manifest, PromptTier, default_bash_commands, default_categories, default_instant_answers};
use crate::capability::CapabilityRegistry;
use crate::ledger::Purpose;
use crate::model::ModelFabric;

/// Minimum keyword matches for a new skill to join an existing category
const SKILL_ASSIGN_OVERLAP: usize = 2;

/// Owns the manifest file; the single writer
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    /// Create a store backed by the given file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the manifest; absent or malformed files are `None` and the
    /// router falls back to defaults
    pub fn load(&self) -> Option<Manifest> {
        if !self.path.exists() {
            debug!(path = ?self.path, "No manifest on disk");
            return None;
        }
        let content = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&content) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                warn!(path = ?self.path, error = %e, "Malformed manifest, ignoring");
                None
            }
        }
    }

    /// Persist the manifest atomically, incrementing its version first
    pub fn save(&self, manifest: &mut Manifest) -> Result<()> {
        manifest.version += 1;

        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).context("Failed to create manifest directory")?;

        let bytes = serde_json::to_vec_pretty(manifest).context("Failed to serialize manifest")?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent).context("Failed to create temp file")?;
        tmp.write_all(&bytes).context("Failed to write manifest")?;
        tmp.flush()?;
        tmp.persist(&self.path)
            .map_err(|e| e.error)
            .context("Failed to rename manifest into place")?;

        debug!(version = manifest.version, path = ?self.path, "Manifest saved");
        Ok(())
    }

    /// Generate a manifest from scratch using the small model
    ///
    /// The model proposes 10-20 categories from the live capability list;
    /// unparseable output falls back to the bundled default set. The
    /// instant-answer and bash-shortcut tables always come from the fixed
    /// defaults.
    pub async fn generate(&self, fabric: &ModelFabric, registry: &CapabilityRegistry) -> Result<Manifest> {
        info!("Generating routing manifest");

        let categories = match self.model_categories(fabric, registry).await {
            Some(categories) if !categories.is_empty() => categories,
            _ => {
                warn!("Model category generation failed, using bundled defaults");
                default_categories()
            }
        };

        let mut manifest = Manifest {
            version: 0,
            generated_at: Utc::now(),
            instant_answers: default_instant_answers(),
            bash_commands: default_bash_commands(),
            categories,
            tool_index: registry.tool_index().clone(),
            skill_index: registry.skill_index(),
        };
        self.save(&mut manifest)?;
        Ok(manifest)
    }

    async fn model_categories(&self, fabric: &ModelFabric, registry: &CapabilityRegistry) -> Option<Vec<Category>> {
        let tools: Vec<String> = registry
            .tool_index()
            .iter()
            .map(|(name, description)| format!("- {name}: {description}"))
            .collect();
        let skills: Vec<String> = registry
            .skill_index()
            .iter()
            .map(|(name, description)| format!("- {name}: {description}"))
            .collect();

        let prompt = format!(
            "You are building a routing table for a personal automation assistant.\n\
             Available tools:\n{}\n\nAvailable skills:\n{}\n\n\
             Produce 10-20 intent categories as a JSON array. Each element:\n\
             {{\"id\": \"snake_case_id\", \"patterns\": [\"pipe|separated|lowercase phrases\"],\n\
              \"tools\": [], \"skills\": [], \"agent_type\": \"react|plan-execute|reflection\",\n\
              \"prompt_tier\": \"minimal|standard|full\"}}\n\
             Output only the JSON array.",
            tools.join("\n"),
            skills.join("\n")
        );

        let reply = match fabric.call(&prompt, 2048, Purpose::ManifestGeneration, None).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Manifest generation call failed");
                return None;
            }
        };

        let json = extract_json_array(&reply)?;
        let generated: Vec<GeneratedCategory> = serde_json::from_str(json).ok()?;
        let categories: Vec<Category> = generated
            .into_iter()
            .map(|g| {
                let mut category = Category {
                    id: g.id,
                    patterns: g.patterns,
                    tools: g.tools,
                    skills: g.skills,
                    agent_type: g.agent_type.unwrap_or_default(),
                    prompt_tier: g.prompt_tier.unwrap_or_default(),
                };
                category.normalize_tools();
                category
            })
            .collect();
        Some(categories)
    }

    /// Whether the manifest is missing any live tool or skill
    pub fn is_stale(&self, manifest: &Manifest, registry: &CapabilityRegistry) -> bool {
        let missing_tool = registry.tool_names().iter().any(|t| !manifest.tool_index.contains_key(t));
        let missing_skill = registry
            .skill_names()
            .iter()
            .any(|s| !manifest.skill_index.contains_key(s));
        missing_tool || missing_skill
    }

    /// Append missing capabilities and save if anything changed
    ///
    /// New skills join an existing category when at least
    /// [`SKILL_ASSIGN_OVERLAP`] of their terms appear in the category's
    /// id or patterns.
    pub fn sync(&self, manifest: &mut Manifest, registry: &CapabilityRegistry) -> Result<bool> {
        let mut changed = false;

        for (name, description) in registry.tool_index() {
            if !manifest.tool_index.contains_key(name) {
                info!(tool = %name, "Indexing new tool");
                manifest.tool_index.insert(name.clone(), description.clone());
                changed = true;
            }
        }

        let new_skills: Vec<(String, String)> = registry
            .skill_index()
            .into_iter()
            .filter(|(name, _)| !manifest.skill_index.contains_key(name))
            .collect();

        for (name, description) in new_skills {
            info!(skill = %name, "Indexing new skill");
            if let Some(index) = assign_category(manifest, &name, &description) {
                let category = &mut manifest.categories[index];
                if !category.skills.contains(&name) {
                    debug!(skill = %name, category = %category.id, "Skill assigned to category");
                    category.skills.push(name.clone());
                }
            }
            manifest.skill_index.insert(name, description);
            changed = true;
        }

        if changed {
            self.save(manifest)?;
        }
        Ok(changed)
    }

    /// Add a skill to the index and save
    pub fn append_skill(&self, manifest: &mut Manifest, name: &str, description: &str) -> Result<()> {
        manifest.skill_index.insert(name.to_string(), description.to_string());
        self.save(manifest)
    }

    /// Add a tool to the index and save
    pub fn append_tool(&self, manifest: &mut Manifest, name: &str, description: &str) -> Result<()> {
        manifest.tool_index.insert(name.to_string(), description.to_string());
        self.save(manifest)
    }

    /// Add a bash shortcut and save
    pub fn append_bash_command(&self, manifest: &mut Manifest, pattern: &str, command: &str) -> Result<()> {
        manifest
            .bash_commands
            .insert(pattern.to_string(), command.to_string());
        self.save(manifest)
    }
}

/// Pick the category with the best keyword overlap for a new skill
fn assign_category(manifest: &Manifest, name: &str, description: &str) -> Option<usize> {
    let skill_terms: BTreeSet<String> = terms(&format!("{name} {description}"));

    let mut best: Option<(usize, usize)> = None;
    for (index, category) in manifest.categories.iter().enumerate() {
        let mut category_terms: BTreeSet<String> = terms(&category.id);
        for alternative in category.alternatives() {
            category_terms.extend(terms(alternative));
        }

        let overlap = skill_terms.intersection(&category_terms).count();
        if overlap >= SKILL_ASSIGN_OVERLAP && best.map(|(_, o)| overlap > o).unwrap_or(true) {
            best = Some((index, overlap));
        }
    }
    best.map(|(index, _)| index)
}

fn terms(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(str::to_string)
        .collect()
}

/// Find the outermost JSON array in possibly fenced model output
fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}

#[derive(Debug, Deserialize)]
struct GeneratedCategory {
    id: String,
    patterns: Vec<String>,
    #[serde(default)]
    tools: Vec<String>,
    #[serde(default)]
    skills: Vec<String>,
    #[serde(default)]
    agent_type: Option<AgentType>,
    #[serde(default)]
    prompt_tier: Option<PromptTier>,
}
