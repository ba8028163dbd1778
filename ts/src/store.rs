//! JSON-document task store with atomic write-through
//!
//! The whole task collection is one JSON document. Mutations load the
//! document, apply the change, and write the document back through a
//! sibling temp file + rename, so readers observe either the old or the
//! new version and never a torn write.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::task::{ScheduledTask, TaskStatus};

/// Errors from the persistent stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Task {id} is {status}, expected {expected}")]
    WrongStatus {
        id: String,
        status: TaskStatus,
        expected: TaskStatus,
    },
}

/// Write `bytes` to `path` atomically via a temp sibling + rename
///
/// The parent directory is created if missing.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;

    Ok(())
}

/// Persistent scheduled-task collection
pub struct TaskStore {
    path: PathBuf,
}

impl TaskStore {
    /// Create a store backed by the given file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        debug!(?path, "TaskStore::new");
        Self { path }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all tasks; an absent file is an empty store
    pub fn load(&self) -> Result<Vec<ScheduledTask>, StoreError> {
        if !self.path.exists() {
            debug!(path = ?self.path, "TaskStore::load: no file yet");
            return Ok(vec![]);
        }

        let content = fs::read_to_string(&self.path)?;
        let tasks: Vec<ScheduledTask> = serde_json::from_str(&content)?;
        debug!(count = tasks.len(), "TaskStore::load");
        Ok(tasks)
    }

    fn save(&self, tasks: &[ScheduledTask]) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(tasks)?;
        write_atomic(&self.path, &bytes)?;
        debug!(count = tasks.len(), path = ?self.path, "TaskStore::save");
        Ok(())
    }

    /// Add a task to the store
    pub fn add(&self, task: ScheduledTask) -> Result<(), StoreError> {
        let mut tasks = self.load()?;
        info!(id = %task.id, task = %task.task_string, "Task enqueued");
        tasks.push(task);
        self.save(&tasks)
    }

    /// Get a task by id
    pub fn get(&self, id: &str) -> Result<ScheduledTask, StoreError> {
        self.load()?
            .into_iter()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Remove a task by id; returns whether it existed
    pub fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let mut tasks = self.load()?;
        let before = tasks.len();
        tasks.retain(|t| t.id != id);
        let removed = tasks.len() != before;
        if removed {
            self.save(&tasks)?;
        }
        Ok(removed)
    }

    /// Tasks ready to dispatch at `now` (pending, next_run_at <= now)
    pub fn due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledTask>, StoreError> {
        Ok(self.load()?.into_iter().filter(|t| t.is_due(now)).collect())
    }

    /// Count of pending tasks
    pub fn pending_count(&self) -> Result<usize, StoreError> {
        Ok(self
            .load()?
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .count())
    }

    /// Transition a pending task to running
    ///
    /// Fails with `WrongStatus` if the task is not pending, which is how
    /// double dispatch of a running task is prevented.
    pub fn mark_running(&self, id: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.transition(id, |task| {
            if task.status != TaskStatus::Pending {
                return Err(StoreError::WrongStatus {
                    id: task.id.clone(),
                    status: task.status,
                    expected: TaskStatus::Pending,
                });
            }
            task.status = TaskStatus::Running;
            task.last_run_at = Some(now);
            Ok(())
        })
    }

    /// Record a successful run
    ///
    /// Recurring tasks return to pending with a recomputed `next_run_at`;
    /// one-shot tasks become completed.
    pub fn mark_completed(&self, id: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.transition(id, |task| {
            task.error = None;
            match task.schedule.next_run_after(now) {
                Some(next) => {
                    task.status = TaskStatus::Pending;
                    task.next_run_at = next;
                }
                None => task.status = TaskStatus::Completed,
            }
            Ok(())
        })
    }

    /// Record a failed run
    ///
    /// The error message is kept; recurring tasks stay scheduled.
    pub fn mark_failed(&self, id: &str, now: DateTime<Utc>, error: impl Into<String>) -> Result<(), StoreError> {
        let error = error.into();
        self.transition(id, |task| {
            task.error = Some(error.clone());
            match task.schedule.next_run_after(now) {
                Some(next) => {
                    task.status = TaskStatus::Pending;
                    task.next_run_at = next;
                }
                None => task.status = TaskStatus::Failed,
            }
            Ok(())
        })
    }

    /// Promote stale running tasks back to pending
    ///
    /// Crash recovery: a task left running longer than `max_age_secs` was
    /// orphaned by a dead daemon and may be dispatched again.
    pub fn recover_stale_running(&self, now: DateTime<Utc>, max_age_secs: u64) -> Result<usize, StoreError> {
        let mut tasks = self.load()?;
        let cutoff = now - chrono::Duration::seconds(max_age_secs as i64);

        let mut recovered = 0;
        for task in &mut tasks {
            if task.status == TaskStatus::Running && task.last_run_at.map(|t| t < cutoff).unwrap_or(true) {
                warn!(id = %task.id, "Recovering stale running task");
                task.status = TaskStatus::Pending;
                recovered += 1;
            }
        }

        if recovered > 0 {
            self.save(&tasks)?;
        }
        Ok(recovered)
    }

    fn transition<F>(&self, id: &str, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut ScheduledTask) -> Result<(), StoreError>,
    {
        let mut tasks = self.load()?;
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        apply(task)?;
        debug!(id, status = %task.status, "Task transition");
        self.save(&tasks)
    }
}
