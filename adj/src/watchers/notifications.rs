//! Notifications watcher - consumes a JSON spool directory
//!
//! Other processes drop one JSON file per notification into the spool;
//! file names are the event ids. Files are left in place, the seen set
//! keeps them from firing twice.

use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
use eyre::Result;
use serde_json::json;
use tracing::debug;

use taskstore::WatcherCursor;

use super::{Poll, Watcher};
use crate::events::EventRecord;

pub struct NotificationsWatcher {
    spool: PathBuf,
}

impl NotificationsWatcher {
    pub fn new(spool: PathBuf) -> Self {
        Self { spool }
    }
}

#[async_trait]
impl Watcher for NotificationsWatcher {
    fn id(&self) -> &'static str {
        "notifications"
    }

    async fn poll(&self, cursor: &WatcherCursor) -> Result<Poll> {
        if !self.spool.is_dir() {
            debug!(path = ?self.spool, "No notification spool, nothing to poll");
            return Ok(Poll::unchanged(cursor.clone()));
        }

        let mut names: Vec<String> = fs::read_dir(&self.spool)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().map(|e| e == "json").unwrap_or(false))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();

        let mut cursor = cursor.clone();
        let mut events = Vec::new();
        for name in names {
            if cursor.has_seen(&name) {
                continue;
            }

            let content = fs::read_to_string(self.spool.join(&name)).unwrap_or_default();
            let payload = serde_json::from_str(&content).unwrap_or_else(|_| json!({ "text": content.trim() }));
            events.push(EventRecord::new(self.id(), name.clone(), payload));
            cursor.note_seen(name);
        }

        debug!(count = events.len(), "Notifications poll");
        Ok(Poll { events, cursor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_spool_is_empty_poll() {
        let dir = tempdir().unwrap();
        let watcher = NotificationsWatcher::new(dir.path().join("spool"));

        let poll = watcher.poll(&WatcherCursor::empty("notifications")).await.unwrap();
        assert!(poll.events.is_empty());
    }

    #[tokio::test]
    async fn test_json_files_become_events() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.json"), r#"{"app": "ci", "body": "build failed"}"#).unwrap();
        fs::write(dir.path().join("ignore.txt"), "not a notification").unwrap();
        let watcher = NotificationsWatcher::new(dir.path().to_path_buf());

        let poll = watcher.poll(&WatcherCursor::empty("notifications")).await.unwrap();
        assert_eq!(poll.events.len(), 1);
        assert_eq!(poll.events[0].event_id, "a.json");
        assert_eq!(poll.events[0].payload["app"], "ci");
    }

    #[tokio::test]
    async fn test_seen_files_not_reemitted() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.json"), r#"{"x": 1}"#).unwrap();
        let watcher = NotificationsWatcher::new(dir.path().to_path_buf());

        let first = watcher.poll(&WatcherCursor::empty("notifications")).await.unwrap();
        assert_eq!(first.events.len(), 1);

        let second = watcher.poll(&first.cursor).await.unwrap();
        assert!(second.events.is_empty());
    }
}
