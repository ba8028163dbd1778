//! Scheduler tick - dispatching due tasks through the agent
//!
//! One tick loads the store, claims every due pending task, runs its
//! directive through the task runner with the configured timeout, and
//! records the outcome. Recurring tasks go back to pending with a fresh
//! `next_run_at`; the store enforces that a running task is never
//! claimed twice.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use taskstore::{StoreError, TaskStore};

use crate::config::SchedulerConfig;
use crate::dispatch::TaskRunner;

/// Counters from one tick, folded into the heartbeat
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub dispatched: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Drives scheduled tasks through the agent
pub struct SchedulerTick {
    config: SchedulerConfig,
    store: Arc<TaskStore>,
    runner: Arc<dyn TaskRunner>,
}

impl SchedulerTick {
    pub fn new(config: SchedulerConfig, store: Arc<TaskStore>, runner: Arc<dyn TaskRunner>) -> Self {
        Self { config, store, runner }
    }

    /// Startup crash recovery: promote orphaned running tasks
    pub fn recover(&self) -> usize {
        match self.store.recover_stale_running(Utc::now(), self.config.stale_running_secs) {
            Ok(count) => {
                if count > 0 {
                    info!(count, "Recovered stale running tasks");
                }
                count
            }
            Err(e) => {
                error!(error = %e, "Stale-task recovery failed");
                0
            }
        }
    }

    /// Run one tick
    pub async fn tick(&self) -> TickStats {
        let now = Utc::now();
        let due = match self.store.due(now) {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "Could not load due tasks");
                return TickStats::default();
            }
        };

        let mut stats = TickStats::default();
        for task in due {
            // Claiming can race a previous tick's leftover state; a task
            // that is no longer pending is simply skipped
            match self.store.mark_running(&task.id, now) {
                Ok(()) => {}
                Err(StoreError::WrongStatus { .. }) => {
                    debug!(id = %task.id, "Task no longer pending, skipping");
                    continue;
                }
                Err(e) => {
                    error!(id = %task.id, error = %e, "Could not claim task");
                    continue;
                }
            }

            stats.dispatched += 1;
            info!(id = %task.id, task = %task.task_string, "Dispatching scheduled task");

            let timeout = Duration::from_secs(self.config.task_timeout_secs);
            let outcome = tokio::time::timeout(timeout, self.runner.run_task(&task.task_string)).await;

            let done = Utc::now();
            match outcome {
                Ok(Ok(answer)) => {
                    debug!(id = %task.id, answer = %answer, "Task completed");
                    if let Err(e) = self.store.mark_completed(&task.id, done) {
                        error!(id = %task.id, error = %e, "Could not record completion");
                    }
                    stats.completed += 1;
                }
                Ok(Err(e)) => {
                    warn!(id = %task.id, error = %e, "Task failed");
                    if let Err(e) = self.store.mark_failed(&task.id, done, e.to_string()) {
                        error!(id = %task.id, error = %e, "Could not record failure");
                    }
                    stats.failed += 1;
                }
                Err(_) => {
                    warn!(id = %task.id, timeout_secs = self.config.task_timeout_secs, "Task timed out");
                    let message = format!("timeout after {}s", self.config.task_timeout_secs);
                    if let Err(e) = self.store.mark_failed(&task.id, done, message) {
                        error!(id = %task.id, error = %e, "Could not record timeout");
                    }
                    stats.failed += 1;
                }
            }
        }
        stats
    }

    /// Pending-task count for the heartbeat line
    pub fn pending(&self) -> usize {
        self.store.pending_count().unwrap_or(0)
    }
}
