//! Event records and the event router
//!
//! Watchers emit deduplication-keyed [`EventRecord`]s; the event router
//! decides whether each one warrants action, and whether that action is
//! an immediate agent invocation or a deferred scheduled task.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use taskstore::{Schedule, ScheduledTask, TaskOrigin, TaskStore};

use crate::dispatch::TaskRunner;
use crate::model::ModelFabric;

/// A deduplication-keyed envelope produced by a watcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// The emitting watcher's id
    pub watcher_id: String,

    /// Stable within the watcher's namespace; with `watcher_id` it keys
    /// at-most-once handling across restarts
    pub event_id: String,

    pub timestamp: DateTime<Utc>,

    /// Arbitrary structured payload
    pub payload: serde_json::Value,
}

impl EventRecord {
    pub fn new(watcher_id: impl Into<String>, event_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            watcher_id: watcher_id.into(),
            event_id: event_id.into(),
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Flatten the payload into matchable lowercase text
    fn payload_text(&self) -> String {
        let mut out = String::new();
        flatten(&self.payload, &mut out);
        out.to_lowercase()
    }
}

fn flatten(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::String(s) => {
            out.push_str(s);
            out.push(' ');
        }
        serde_json::Value::Array(items) => items.iter().for_each(|v| flatten(v, out)),
        serde_json::Value::Object(map) => map.values().for_each(|v| flatten(v, out)),
        other => {
            out.push_str(&other.to_string());
            out.push(' ');
        }
    }
}

/// What the router decided to do with an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventAction {
    /// Nothing actionable
    Ignore,
    /// Invoke the agent now with this instruction
    Immediate(String),
    /// Enqueue a scheduled task with this directive
    Defer(String),
}

/// Payload keywords that demand action on this tick
const IMMEDIATE_KEYWORDS: &[&str] = &[
    "urgent", "asap", "immediately", "emergency", "alert", "failed", "failure", "error", "down", "security",
    "starting soon", "starts in",
];

/// Payload keywords worth a deferred task
const DEFER_KEYWORDS: &[&str] = &[
    "reminder", "follow up", "followup", "review", "invoice", "todo", "schedule", "tomorrow", "next week",
    "don't forget", "deadline",
];

/// Classifies watcher events and drives the chosen action
pub struct EventRouter {
    fabric: Option<Arc<ModelFabric>>,
    store: Arc<TaskStore>,
    runner: Arc<dyn TaskRunner>,
}

impl EventRouter {
    pub fn new(fabric: Option<Arc<ModelFabric>>, store: Arc<TaskStore>, runner: Arc<dyn TaskRunner>) -> Self {
        Self { fabric, store, runner }
    }

    /// Triage and act on one event; returns what was decided
    pub async fn handle(&self, event: &EventRecord) -> EventAction {
        let action = self.triage(event).await;

        match &action {
            EventAction::Ignore => {
                debug!(watcher = %event.watcher_id, event = %event.event_id, "Event ignored");
            }
            EventAction::Immediate(instruction) => {
                info!(watcher = %event.watcher_id, event = %event.event_id, "Immediate event action");
                match self.runner.run_task(instruction).await {
                    Ok(answer) => debug!(answer = %answer, "Immediate action completed"),
                    Err(e) => warn!(error = %e, "Immediate action failed"),
                }
            }
            EventAction::Defer(directive) => {
                info!(watcher = %event.watcher_id, event = %event.event_id, "Deferring event to scheduler");
                let task = ScheduledTask::new(
                    directive.clone(),
                    Schedule::OnceAt { at: Utc::now() },
                    TaskOrigin::EventRouter,
                );
                match task {
                    Some(task) => {
                        if let Err(e) = self.store.add(task) {
                            warn!(error = %e, "Failed to enqueue deferred task");
                        }
                    }
                    None => warn!("Deferred task could not be scheduled"),
                }
            }
        }
        action
    }

    /// Decide what an event warrants
    ///
    /// Uses the small model when configured; the fixed keyword table is
    /// both the no-model path and the fallback for model failures.
    async fn triage(&self, event: &EventRecord) -> EventAction {
        if let Some(fabric) = &self.fabric {
            if fabric.is_available().await {
                if let Some(action) = self.model_triage(fabric, event).await {
                    return action;
                }
            }
        }
        keyword_triage(event)
    }

    async fn model_triage(&self, fabric: &ModelFabric, event: &EventRecord) -> Option<EventAction> {
        let prompt = serde_json::json!({
            "task": "Triage this event for a personal automation assistant.",
            "watcher": event.watcher_id,
            "payload": event.payload,
            "output": {
                "action": "immediate|defer|ignore",
                "instruction": "<directive for the assistant, when action is not ignore>"
            }
        })
        .to_string();

        let reply = match fabric.classify(&prompt, 128).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Event triage call failed, using keyword table");
                return None;
            }
        };

        let start = reply.find('{')?;
        let end = reply.rfind('}')?;
        let parsed: TriageReply = serde_json::from_str(&reply[start..=end]).ok()?;

        let instruction = parsed
            .instruction
            .unwrap_or_else(|| default_instruction(event));
        match parsed.action.as_str() {
            "immediate" => Some(EventAction::Immediate(instruction)),
            "defer" => Some(EventAction::Defer(instruction)),
            "ignore" => Some(EventAction::Ignore),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TriageReply {
    action: String,
    #[serde(default)]
    instruction: Option<String>,
}

/// The fixed keyword table
fn keyword_triage(event: &EventRecord) -> EventAction {
    let text = event.payload_text();

    if IMMEDIATE_KEYWORDS.iter().any(|k| text.contains(k)) {
        return EventAction::Immediate(default_instruction(event));
    }
    if DEFER_KEYWORDS.iter().any(|k| text.contains(k)) {
        return EventAction::Defer(default_instruction(event));
    }
    EventAction::Ignore
}

fn default_instruction(event: &EventRecord) -> String {
    format!(
        "Handle this {} event: {}",
        event.watcher_id,
        serde_json::to_string(&event.payload).unwrap_or_default()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::testing::fake_fabric;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct RecordingRunner {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TaskRunner for RecordingRunner {
        async fn run_task(&self, input: &str) -> eyre::Result<String> {
            self.calls.lock().unwrap().push(input.to_string());
            Ok("done".to_string())
        }
    }

    fn setup(fabric: Option<Arc<ModelFabric>>) -> (EventRouter, Arc<TaskStore>, Arc<RecordingRunner>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = Arc::new(TaskStore::new(dir.path().join("tasks.json")));
        let runner = Arc::new(RecordingRunner {
            calls: Mutex::new(Vec::new()),
        });
        let router = EventRouter::new(fabric, store.clone(), runner.clone());
        (router, store, runner, dir)
    }

    fn event(payload: serde_json::Value) -> EventRecord {
        EventRecord::new("mail", "msg-1", payload)
    }

    #[tokio::test]
    async fn test_keyword_immediate_invokes_runner() {
        let (router, store, runner, _dir) = setup(None);
        let event = event(serde_json::json!({"subject": "URGENT: server down"}));

        let action = router.handle(&event).await;
        assert!(matches!(action, EventAction::Immediate(_)));
        assert_eq!(runner.calls.lock().unwrap().len(), 1);
        assert_eq!(store.load().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_keyword_defer_enqueues_task() {
        let (router, store, runner, _dir) = setup(None);
        let event = event(serde_json::json!({"subject": "Invoice #42 attached"}));

        let action = router.handle(&event).await;
        assert!(matches!(action, EventAction::Defer(_)));
        assert!(runner.calls.lock().unwrap().is_empty());

        let tasks = store.load().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].origin, TaskOrigin::EventRouter);
    }

    #[tokio::test]
    async fn test_keyword_ignore() {
        let (router, store, runner, _dir) = setup(None);
        let event = event(serde_json::json!({"subject": "weekly cat pictures"}));

        assert_eq!(router.handle(&event).await, EventAction::Ignore);
        assert!(runner.calls.lock().unwrap().is_empty());
        assert_eq!(store.load().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_model_triage_wins_when_available() {
        let (fabric, _) = fake_fabric(vec![Ok(
            r#"{"action": "defer", "instruction": "pay the electricity bill"}"#.to_string(),
        )]);
        let (router, store, _, _dir) = setup(Some(Arc::new(fabric)));

        // No defer keywords in the payload; only the model says defer
        let event = event(serde_json::json!({"subject": "electricity bill"}));
        let action = router.handle(&event).await;

        assert_eq!(action, EventAction::Defer("pay the electricity bill".to_string()));
        assert_eq!(store.load().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_model_failure_falls_back_to_keywords() {
        let (fabric, _) = fake_fabric(vec![Ok("not json at all".to_string())]);
        let (router, _, runner, _dir) = setup(Some(Arc::new(fabric)));

        let event = event(serde_json::json!({"subject": "URGENT thing"}));
        let action = router.handle(&event).await;

        assert!(matches!(action, EventAction::Immediate(_)));
        assert_eq!(runner.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_payload_text_flattens_nested() {
        let event = EventRecord::new(
            "mail",
            "m1",
            serde_json::json!({"a": {"b": ["Hello", {"c": "World"}]}, "n": 5}),
        );
        let text = event.payload_text();
        assert!(text.contains("hello"));
        assert!(text.contains("world"));
        assert!(text.contains('5'));
    }
}
