//! Daemon loop - timers, heartbeat, graceful shutdown
//!
//! One task owns every timer: the watcher poll, the scheduler tick, and
//! the heartbeat. Watchers and the scheduler never run on their own
//! threads; everything is sequenced through this loop, which is what
//! lets the cursor stores stay lock-free.

use std::sync::Arc;

use eyre::Result;
use tracing::{debug, error, info, warn};

use taskstore::CursorStore;

use crate::config::Config;
use crate::events::EventRouter;
use crate::ledger::TokenLedger;
use crate::sched::SchedulerTick;
use crate::watchers::Watcher;

/// Heartbeat period, seconds
const HEARTBEAT_SECS: u64 = 300;

/// Rolling counters reported by the heartbeat
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeCounters {
    /// Watcher polls completed
    pub polls: u64,
    /// Events emitted by watchers
    pub events: u64,
    /// Scheduler ticks completed
    pub ticks: u64,
    /// Scheduled-task executions dispatched
    pub executions: u64,
}

impl RuntimeCounters {
    /// The one-line heartbeat summary
    pub fn heartbeat_line(&self, pending: usize) -> String {
        format!(
            "heartbeat: polls={} events={} ticks={} executions={} pending={}",
            self.polls, self.events, self.ticks, self.executions, pending
        )
    }
}

/// The long-lived daemon loop
pub struct DaemonRuntime {
    config: Config,
    watchers: Vec<Box<dyn Watcher>>,
    cursors: CursorStore,
    event_router: EventRouter,
    scheduler: SchedulerTick,
    ledger: Arc<TokenLedger>,
    counters: RuntimeCounters,
}

impl DaemonRuntime {
    pub fn new(
        config: Config,
        watchers: Vec<Box<dyn Watcher>>,
        event_router: EventRouter,
        scheduler: SchedulerTick,
        ledger: Arc<TokenLedger>,
    ) -> Self {
        let cursors = CursorStore::new(config.listener.state_path.clone());
        Self {
            config,
            watchers,
            cursors,
            event_router,
            scheduler,
            ledger,
            counters: RuntimeCounters::default(),
        }
    }

    /// Counters so far
    pub fn counters(&self) -> RuntimeCounters {
        self.counters
    }

    /// Run until a termination signal arrives
    pub async fn run(mut self) -> Result<()> {
        info!(
            watchers = self.watchers.len(),
            poll_interval = ?self.config.listener.poll_interval(),
            tick_interval = ?self.config.scheduler.tick_interval(),
            "adjutant daemon up"
        );

        // Crash recovery before the first tick
        self.scheduler.recover();

        let mut poll_timer = tokio::time::interval(self.config.listener.poll_interval());
        let mut tick_timer = tokio::time::interval(self.config.scheduler.tick_interval());
        let mut heartbeat_timer = tokio::time::interval(std::time::Duration::from_secs(HEARTBEAT_SECS));
        // The first interval fire is immediate; consume it so work starts
        // one period in
        poll_timer.tick().await;
        tick_timer.tick().await;
        heartbeat_timer.tick().await;

        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

        loop {
            tokio::select! {
                _ = poll_timer.tick() => {
                    if self.config.listener.enabled {
                        self.poll_watchers().await;
                    }
                }
                _ = tick_timer.tick() => {
                    if self.config.scheduler.enabled {
                        self.tick_scheduler().await;
                    }
                }
                _ = heartbeat_timer.tick() => {
                    self.heartbeat();
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("SIGINT received, shutting down");
                    break;
                }
                _ = sigterm.recv() => {
                    info!("SIGTERM received, shutting down");
                    break;
                }
            }
        }

        self.shutdown();
        Ok(())
    }

    /// One watcher pass: poll each watcher, persist its cursor, route
    /// its events. Poll failures are logged and swallowed; the next tick
    /// retries.
    pub async fn poll_watchers(&mut self) {
        for watcher in &self.watchers {
            let cursor = match self.cursors.load(watcher.id()) {
                Ok(cursor) => cursor,
                Err(e) => {
                    error!(watcher = watcher.id(), error = %e, "Cursor load failed");
                    continue;
                }
            };

            let poll = match watcher.poll(&cursor).await {
                Ok(poll) => poll,
                Err(e) => {
                    warn!(watcher = watcher.id(), error = %e, "Watcher poll failed");
                    continue;
                }
            };
            self.counters.polls += 1;

            // Persist the cursor before acting on the events, so a crash
            // mid-routing cannot replay them
            if let Err(e) = self.cursors.store(poll.cursor) {
                error!(watcher = watcher.id(), error = %e, "Cursor store failed, dropping events");
                continue;
            }

            for event in &poll.events {
                self.counters.events += 1;
                self.event_router.handle(event).await;
            }
        }
    }

    /// One scheduler pass
    pub async fn tick_scheduler(&mut self) {
        let stats = self.scheduler.tick().await;
        self.counters.ticks += 1;
        self.counters.executions += stats.dispatched as u64;
        debug!(?stats, "Scheduler tick");
    }

    fn heartbeat(&self) {
        info!("{}", self.counters.heartbeat_line(self.scheduler.pending()));
    }

    fn shutdown(&self) {
        self.ledger.flush();
        info!("{}", self.counters.heartbeat_line(self.scheduler.pending()));
        info!("adjutant daemon stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ListenerConfig, SchedulerConfig};
    use crate::dispatch::TaskRunner;
    use crate::watchers::build_watchers;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use taskstore::TaskStore;
    use tempfile::tempdir;

    struct NullRunner {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl TaskRunner for NullRunner {
        async fn run_task(&self, _input: &str) -> eyre::Result<String> {
            *self.calls.lock().unwrap() += 1;
            Ok("ok".to_string())
        }
    }

    fn runtime_with_empty_sources(dir: &tempfile::TempDir) -> DaemonRuntime {
        let config = Config {
            listener: ListenerConfig {
                state_path: dir.path().join("cursors.json"),
                maildir: dir.path().join("maildir"),
                calendar_path: dir.path().join("events.ics"),
                messages_path: dir.path().join("inbox.jsonl"),
                notifications_dir: dir.path().join("spool"),
                // No upstream watcher: tempdir is not a repo
                watchers: vec![
                    "mail".to_string(),
                    "calendar".to_string(),
                    "messages".to_string(),
                    "notifications".to_string(),
                ],
                ..Default::default()
            },
            scheduler: SchedulerConfig {
                tasks_path: dir.path().join("tasks.json"),
                ..Default::default()
            },
            ..Default::default()
        };

        let store = Arc::new(TaskStore::new(config.scheduler.tasks_path.clone()));
        let runner: Arc<dyn TaskRunner> = Arc::new(NullRunner {
            calls: Mutex::new(0),
        });
        let watchers = build_watchers(&config.listener);
        let event_router = EventRouter::new(None, store.clone(), runner.clone());
        let scheduler = SchedulerTick::new(config.scheduler.clone(), store, runner);

        DaemonRuntime::new(config, watchers, event_router, scheduler, Arc::new(TokenLedger::new()))
    }

    #[tokio::test]
    async fn test_two_ticks_on_empty_sources() {
        let dir = tempdir().unwrap();
        let mut runtime = runtime_with_empty_sources(&dir);

        runtime.poll_watchers().await;
        runtime.tick_scheduler().await;
        runtime.poll_watchers().await;
        runtime.tick_scheduler().await;

        let counters = runtime.counters();
        assert_eq!(counters.polls, 8); // 4 watchers x 2 passes
        assert_eq!(counters.events, 0);
        assert_eq!(counters.ticks, 2);
        assert_eq!(counters.executions, 0);
    }

    #[tokio::test]
    async fn test_events_flow_to_router() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("maildir").join("new")).unwrap();
        std::fs::write(
            dir.path().join("maildir").join("new").join("m1"),
            "Subject: URGENT: disk full\n\nbody\n",
        )
        .unwrap();

        let mut runtime = runtime_with_empty_sources(&dir);
        runtime.poll_watchers().await;
        assert_eq!(runtime.counters().events, 1);

        // Same mail again: cursor dedups it
        runtime.poll_watchers().await;
        assert_eq!(runtime.counters().events, 1);
    }

    #[test]
    fn test_heartbeat_line_format() {
        let counters = RuntimeCounters {
            polls: 12,
            events: 3,
            ticks: 6,
            executions: 2,
        };
        assert_eq!(
            counters.heartbeat_line(4),
            "heartbeat: polls=12 events=3 ticks=6 executions=2 pending=4"
        );
    }
}
