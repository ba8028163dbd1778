//! Adjutant - a minimum-cost personal automation daemon
//!
//! Adjutant routes natural-language requests, and passively observed
//! environmental events, to the cheapest execution path that can answer
//! them. Most requests never reach a large language model.
//!
//! # Core pieces
//!
//! - **Tiered router**: instant patterns -> bash shortcut -> cached
//!   category -> native classifier -> small-model classifier
//! - **Routing manifest**: a persistent capability cache mapping intent
//!   patterns to tool/skill bundles, generated once and synced
//!   incrementally
//! - **Small-model fabric**: one interface over seven providers with
//!   availability-ordered auto-detection and lazy failover
//! - **Daemon loop**: watcher polls, a scheduled-task tick, and a
//!   heartbeat on one timer loop with graceful shutdown
//!
//! # Modules
//!
//! - [`router`] - the five-tier escalation router
//! - [`manifest`] - routing manifest document and store
//! - [`classifier`] - in-process TF-IDF classifier
//! - [`model`] - the small-model provider fabric
//! - [`summarize`] / [`compact`] - output and context compression
//! - [`simple`] - the bash-only execute-and-format agent
//! - [`watchers`] / [`events`] - environmental sources and triage
//! - [`sched`] / [`runtime`] / [`daemon`] - the daemon itself

pub mod capability;
pub mod classifier;
pub mod cli;
pub mod compact;
pub mod config;
pub mod daemon;
pub mod dispatch;
pub mod events;
pub mod exec;
pub mod ledger;
pub mod manifest;
pub mod model;
pub mod parallel;
pub mod router;
pub mod runtime;
pub mod sched;
pub mod simple;
pub mod summarize;
pub mod transcript;
pub mod watchers;

// Re-export commonly used types
pub use capability::{CAPABILITY_TOOL, CapabilityRegistry, SHELL_TOOL, Skill};
pub use classifier::NativeClassifier;
pub use compact::ContextCompactor;
pub use config::Config;
pub use daemon::{DaemonManager, DaemonStatus};
pub use dispatch::{Dispatcher, TaskRunner};
pub use events::{EventAction, EventRecord, EventRouter};
pub use exec::{ShellResult, ShellRunner};
pub use ledger::{LedgerEntry, Purpose, TokenLedger};
pub use manifest::{AgentType, Category, Manifest, ManifestStore, PromptTier};
pub use model::{ModelError, ModelFabric, Provider, SmallModel};
pub use router::{RouteAnalysis, RouteResult, Router};
pub use runtime::{DaemonRuntime, RuntimeCounters};
pub use sched::SchedulerTick;
pub use simple::{SimpleOutcome, SimpleTaskAgent};
pub use summarize::ResultSummarizer;
pub use transcript::{ContentBlock, Message, MessageContent, Role};
