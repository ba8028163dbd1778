//! Integration tests for Adjutant
//!
//! These walk the daemon's end-to-end paths: routing, early-exit
//! resolution, summarization, and the watcher/scheduler tick loop.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use adjutant::config::{Config, ListenerConfig, SchedulerConfig};
use adjutant::dispatch::TaskRunner;
use adjutant::events::EventRouter;
use adjutant::exec::{ShellResult, ShellRunner};
use adjutant::ledger::TokenLedger;
use adjutant::manifest::{Manifest, ManifestStore, default_bash_commands, default_categories, default_instant_answers};
use adjutant::model::{ModelError, ModelFabric, ModelReply, Provider, SmallModel, estimate_tokens};
use adjutant::router::{RouteResult, Router};
use adjutant::runtime::DaemonRuntime;
use adjutant::sched::SchedulerTick;
use adjutant::summarize::ResultSummarizer;
use adjutant::watchers::build_watchers;
use adjutant::{CAPABILITY_TOOL, SHELL_TOOL};
use taskstore::TaskStore;
use tempfile::TempDir;

// =============================================================================
// Test doubles
// =============================================================================

/// Scripted in-memory model provider
struct ScriptedModel {
    replies: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn fabric(replies: Vec<&str>) -> Arc<ModelFabric> {
        let model = Arc::new(ScriptedModel {
            replies: Mutex::new(replies.into_iter().map(str::to_string).collect()),
        });
        Arc::new(ModelFabric::with_providers(
            vec![model],
            Arc::new(TokenLedger::new()),
        ))
    }
}

#[async_trait]
impl SmallModel for ScriptedModel {
    fn provider(&self) -> Provider {
        Provider::Mlx
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn call(&self, prompt: &str, _max_tokens: u32, _instructions: Option<&str>) -> Result<ModelReply, ModelError> {
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Err(ModelError::InvalidResponse("out of scripted replies".into()));
        }
        let content = replies.remove(0);
        Ok(ModelReply {
            input_tokens: estimate_tokens(prompt),
            output_tokens: estimate_tokens(&content),
            content,
        })
    }
}

struct NullRunner;

#[async_trait]
impl TaskRunner for NullRunner {
    async fn run_task(&self, _input: &str) -> eyre::Result<String> {
        Ok("ok".to_string())
    }
}

fn loaded_manifest() -> Manifest {
    let mut manifest = Manifest::empty();
    manifest.categories = default_categories();
    manifest.bash_commands = default_bash_commands();
    manifest.instant_answers = default_instant_answers();
    manifest
}

fn shell_runner() -> ShellRunner {
    ShellRunner::new(Duration::from_secs(10), std::env::temp_dir())
}

// =============================================================================
// Router scenarios
// =============================================================================

#[tokio::test]
async fn test_time_question_is_instant_with_weekday() {
    let router = Router::new(Some(loaded_manifest()));

    let route = router.route("what time is it").await;
    assert!(route.is_early_exit());

    let answer = route.resolve(&shell_runner()).await.unwrap();
    assert!(answer.contains("current time"));

    let weekday = chrono::Local::now().format("%A").to_string();
    assert!(answer.contains(&weekday), "answer {answer:?} missing {weekday}");
}

#[tokio::test]
async fn test_uptime_is_bash_shortcut() {
    let router = Router::new(Some(loaded_manifest()));

    let route = router.route("uptime").await;
    let RouteResult::BashShortcut { command } = &route else {
        panic!("expected bash shortcut, got {route:?}");
    };
    assert_eq!(command, "uptime");

    let answer = route.resolve(&shell_runner()).await.unwrap();
    assert!(!answer.is_empty());
    assert_eq!(answer, answer.trim());
}

#[tokio::test]
async fn test_create_file_is_cached_with_tool_bracket() {
    let router = Router::new(Some(loaded_manifest()));

    let route = router.route("create a file called notes.txt").await;
    let RouteResult::Cached(analysis) = route else {
        panic!("expected cached route");
    };
    assert_eq!(analysis.tools.first().map(String::as_str), Some(SHELL_TOOL));
    assert_eq!(analysis.tools.last().map(String::as_str), Some(CAPABILITY_TOOL));
    assert!(analysis.confidence >= 0.66);
}

#[tokio::test]
async fn test_native_classifier_catches_synonym_phrasing() {
    let router = Router::new(Some(loaded_manifest()));

    let route = router.route("dispatch a sms").await;
    let RouteResult::Cached(analysis) = route else {
        panic!("expected cached route via the native classifier");
    };
    assert!(analysis.confidence > 0.35);
    assert!(analysis.confidence <= 1.0);
}

#[tokio::test]
async fn test_route_never_fails_on_garbage() {
    let router = Router::new(None);

    let long = "x".repeat(50_000);
    for input in ["", "   ", "%%%%%", "\u{1F980}\u{1F980}\u{1F980}", long.as_str()] {
        let route = router.route(input).await;
        // Every input routes somewhere; unroutable ones land on the
        // terminal fallback with the default tool set
        if let Some(analysis) = route.analysis() {
            assert!(analysis.tools.contains(&SHELL_TOOL.to_string()));
        }
    }
}

// =============================================================================
// Summarizer scenario
// =============================================================================

#[tokio::test]
async fn test_large_shell_output_summarized_with_savings() {
    let fabric = ScriptedModel::fabric(vec!["a 12 KB directory listing"]);
    let ledger = Arc::new(TokenLedger::new());
    let summarizer = ResultSummarizer::new(Default::default(), Some(fabric), ledger.clone());

    let shell = ShellResult {
        command: "ls".to_string(),
        exit_code: 0,
        stdout: "entry-name\n".repeat(1200),
        stderr: String::new(),
        working_directory: "/home".to_string(),
        success: true,
        duration_ms: 3,
    };
    let content = serde_json::to_string(&shell).unwrap();
    assert!(content.len() > 12_000);

    let out = summarizer.summarize_result("bash", &content, false).await;
    assert!(out.len() < content.len());
    assert!(out.contains("\"command\": \"ls\""));
    assert!(out.contains("\"exit_code\": 0"));
    assert!(ledger.summary().bytes_saved > 0);
}

// =============================================================================
// Manifest round-trip law
// =============================================================================

#[test]
fn test_manifest_save_load_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = ManifestStore::new(dir.path().join("manifest.json"));

    let mut manifest = loaded_manifest();
    store.save(&mut manifest).unwrap();

    let loaded = store.load().unwrap();
    assert_eq!(loaded, manifest);
    assert_eq!(loaded.version, 1);
}

// =============================================================================
// Daemon tick scenario: empty sources, counters move only by polls/ticks
// =============================================================================

#[tokio::test]
async fn test_two_ticks_on_empty_mailbox() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        listener: ListenerConfig {
            state_path: dir.path().join("cursors.json"),
            maildir: dir.path().join("maildir"),
            calendar_path: dir.path().join("events.ics"),
            messages_path: dir.path().join("inbox.jsonl"),
            notifications_dir: dir.path().join("spool"),
            watchers: vec!["mail".to_string(), "messages".to_string()],
            ..Default::default()
        },
        scheduler: SchedulerConfig {
            tasks_path: dir.path().join("tasks.json"),
            ..Default::default()
        },
        ..Default::default()
    };

    let store = Arc::new(TaskStore::new(config.scheduler.tasks_path.clone()));
    let runner: Arc<dyn TaskRunner> = Arc::new(NullRunner);
    let watchers = build_watchers(&config.listener);
    let event_router = EventRouter::new(None, store.clone(), runner.clone());
    let scheduler = SchedulerTick::new(config.scheduler.clone(), store.clone(), runner);

    let mut runtime = DaemonRuntime::new(config, watchers, event_router, scheduler, Arc::new(TokenLedger::new()));

    runtime.poll_watchers().await;
    runtime.tick_scheduler().await;
    runtime.poll_watchers().await;
    runtime.tick_scheduler().await;

    let counters = runtime.counters();
    assert_eq!(counters.polls, 4);
    assert_eq!(counters.events, 0);
    assert_eq!(counters.ticks, 2);
    assert_eq!(counters.executions, 0);
    assert_eq!(store.load().unwrap().len(), 0);
}
