//! Adjutant configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Floor for the watcher poll interval
const MIN_POLL_INTERVAL_SECS: u64 = 10;

/// Floor for the scheduler tick interval
const MIN_TICK_INTERVAL_SECS: u64 = 30;

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("adjutant")
}

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Event listener (watchers) configuration
    pub listener: ListenerConfig,

    /// Scheduled-task configuration
    pub scheduler: SchedulerConfig,

    /// Small-model provider configuration
    pub model: ModelConfig,

    /// Context compaction budget
    pub context: ContextConfig,

    /// Tool-result summarization thresholds
    pub summarize: SummarizeConfig,

    /// Router and manifest configuration
    pub router: RouterConfig,

    /// Token ledger configuration
    pub ledger: LedgerConfig,

    /// Shell execution configuration
    pub exec: ExecConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .adjutant.yml
        let local_config = PathBuf::from(".adjutant.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/adjutant/adjutant.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("adjutant").join("adjutant.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Event listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Whether the listener runs at all
    pub enabled: bool,

    /// Seconds between watcher polls (floor 10)
    #[serde(rename = "poll-interval-secs")]
    pub poll_interval_secs: u64,

    /// Cursor store path
    #[serde(rename = "state-path")]
    pub state_path: PathBuf,

    /// Watcher ids to run
    pub watchers: Vec<String>,

    /// Maildir root for the mail watcher
    pub maildir: PathBuf,

    /// ICS calendar file for the calendar watcher
    #[serde(rename = "calendar-path")]
    pub calendar_path: PathBuf,

    /// Minutes before an event's start that the calendar watcher fires
    #[serde(rename = "calendar-lead-minutes")]
    pub calendar_lead_minutes: i64,

    /// JSONL message inbox for the messages watcher
    #[serde(rename = "messages-path")]
    pub messages_path: PathBuf,

    /// Notification spool directory for the notifications watcher
    #[serde(rename = "notifications-dir")]
    pub notifications_dir: PathBuf,

    /// Repository path for the upstream watcher
    #[serde(rename = "repo-path")]
    pub repo_path: PathBuf,

    /// Branch the upstream watcher follows
    #[serde(rename = "upstream-branch")]
    pub upstream_branch: String,

    /// Remote the upstream watcher fetches
    #[serde(rename = "upstream-remote")]
    pub upstream_remote: String,
}

impl ListenerConfig {
    /// Poll interval with the floor applied
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(MIN_POLL_INTERVAL_SECS))
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            enabled: true,
            poll_interval_secs: 30,
            state_path: data_dir().join("cursors.json"),
            watchers: vec![
                "mail".to_string(),
                "calendar".to_string(),
                "messages".to_string(),
                "notifications".to_string(),
                "upstream".to_string(),
            ],
            maildir: home.join("Maildir"),
            calendar_path: home.join(".calendar").join("events.ics"),
            calendar_lead_minutes: 15,
            messages_path: data_dir().join("messages.jsonl"),
            notifications_dir: data_dir().join("notifications"),
            repo_path: PathBuf::from("."),
            upstream_branch: "main".to_string(),
            upstream_remote: "origin".to_string(),
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Whether the scheduler runs at all
    pub enabled: bool,

    /// Seconds between scheduler ticks (floor 30)
    #[serde(rename = "tick-interval-secs")]
    pub tick_interval_secs: u64,

    /// Task store path
    #[serde(rename = "tasks-path")]
    pub tasks_path: PathBuf,

    /// Per-task execution timeout in seconds
    #[serde(rename = "task-timeout-secs")]
    pub task_timeout_secs: u64,

    /// Age after which a running task is considered orphaned
    #[serde(rename = "stale-running-secs")]
    pub stale_running_secs: u64,
}

impl SchedulerConfig {
    /// Tick interval with the floor applied
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(MIN_TICK_INTERVAL_SECS))
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval_secs: 60,
            tasks_path: data_dir().join("tasks.json"),
            task_timeout_secs: 300,
            stale_running_secs: 3600,
        }
    }
}

/// An HTTP provider endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    #[serde(rename = "base-url")]
    pub base_url: String,
    pub model: String,
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            model: String::new(),
            api_key_env: String::new(),
        }
    }
}

/// On-device bridge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OnDeviceConfig {
    /// Compiled bridge binary
    #[serde(rename = "bridge-path")]
    pub bridge_path: Option<PathBuf>,

    /// Bridge source tree, accepted as proof the binary can be built
    #[serde(rename = "bridge-source")]
    pub bridge_source: Option<PathBuf>,
}

/// Small-model provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Provider override: `auto` probes in priority order
    pub provider: String,

    /// Cap on response tokens for any small-model call
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Timeout for cloud classification calls, seconds
    #[serde(rename = "cloud-timeout-secs")]
    pub cloud_timeout_secs: u64,

    /// Timeout for local generation calls, seconds
    #[serde(rename = "local-timeout-secs")]
    pub local_timeout_secs: u64,

    pub ondevice: OnDeviceConfig,
    pub mlx: EndpointConfig,
    pub ollama: EndpointConfig,
    pub lmstudio: EndpointConfig,
    pub groq: EndpointConfig,
    pub gemini: EndpointConfig,
    pub anthropic: EndpointConfig,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "auto".to_string(),
            max_tokens: 1024,
            cloud_timeout_secs: 15,
            local_timeout_secs: 30,
            ondevice: OnDeviceConfig::default(),
            mlx: EndpointConfig {
                base_url: "http://127.0.0.1:8765".to_string(),
                model: String::new(),
                api_key_env: String::new(),
            },
            ollama: EndpointConfig {
                base_url: "http://localhost:11434".to_string(),
                model: "llama3.2".to_string(),
                api_key_env: String::new(),
            },
            lmstudio: EndpointConfig {
                base_url: "http://localhost:1234".to_string(),
                model: "local-model".to_string(),
                api_key_env: String::new(),
            },
            groq: EndpointConfig {
                base_url: "https://api.groq.com/openai".to_string(),
                model: "llama-3.1-8b-instant".to_string(),
                api_key_env: "GROQ_API_KEY".to_string(),
            },
            gemini: EndpointConfig {
                base_url: "https://generativelanguage.googleapis.com".to_string(),
                model: "gemini-2.0-flash".to_string(),
                api_key_env: "GEMINI_API_KEY".to_string(),
            },
            anthropic: EndpointConfig {
                base_url: "https://api.anthropic.com".to_string(),
                model: "claude-3-5-haiku-20241022".to_string(),
                api_key_env: "ANTHROPIC_API_KEY".to_string(),
            },
        }
    }
}

/// Context compaction budget
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Estimated-token ceiling for a transcript
    #[serde(rename = "max-tokens")]
    pub max_tokens: usize,

    /// Fraction of the ceiling at which compaction starts
    #[serde(rename = "compact-threshold")]
    pub compact_threshold: f64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_tokens: 80_000,
            compact_threshold: 0.5,
        }
    }
}

/// Tool-result summarization thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizeConfig {
    /// Results at or below this length pass untouched
    #[serde(rename = "skip-threshold")]
    pub skip_threshold: usize,

    /// Results above this length are model-summarized
    #[serde(rename = "summarize-threshold")]
    pub summarize_threshold: usize,
}

impl Default for SummarizeConfig {
    fn default() -> Self {
        Self {
            skip_threshold: 500,
            summarize_threshold: 800,
        }
    }
}

/// Router and manifest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Routing manifest path
    #[serde(rename = "manifest-path")]
    pub manifest_path: PathBuf,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            manifest_path: data_dir().join("manifest.json"),
        }
    }
}

/// Token ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// JSONL checkpoint path
    pub path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: data_dir().join("ledger.jsonl"),
        }
    }
}

/// Shell execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    /// Per-command timeout in seconds
    #[serde(rename = "command-timeout-secs")]
    pub command_timeout_secs: u64,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self { command_timeout_secs: 60 }
    }
}
