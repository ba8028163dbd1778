//! Messages watcher - tails a JSONL inbox
//!
//! Each line of the inbox file is one message. The cursor position is
//! the last consumed line number, the moral equivalent of a last-seen
//! ROWID, so restarts resume exactly where the previous daemon stopped.

use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
use eyre::Result;
use serde_json::json;
use tracing::debug;

use taskstore::WatcherCursor;

use super::{Poll, Watcher};
use crate::events::EventRecord;

pub struct MessagesWatcher {
    inbox: PathBuf,
}

impl MessagesWatcher {
    pub fn new(inbox: PathBuf) -> Self {
        Self { inbox }
    }
}

#[async_trait]
impl Watcher for MessagesWatcher {
    fn id(&self) -> &'static str {
        "messages"
    }

    async fn poll(&self, cursor: &WatcherCursor) -> Result<Poll> {
        if !self.inbox.is_file() {
            debug!(path = ?self.inbox, "No message inbox, nothing to poll");
            return Ok(Poll::unchanged(cursor.clone()));
        }

        let last_row: usize = cursor
            .position
            .as_deref()
            .and_then(|p| p.parse().ok())
            .unwrap_or(0);

        let content = fs::read_to_string(&self.inbox)?;
        let mut cursor = cursor.clone();
        let mut events = Vec::new();
        let mut row = 0usize;

        for line in content.lines() {
            row += 1;
            if row <= last_row {
                continue;
            }
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let event_id = format!("row-{row}");
            if cursor.has_seen(&event_id) {
                continue;
            }

            let payload = serde_json::from_str(line).unwrap_or_else(|_| json!({ "text": line }));
            events.push(EventRecord::new(self.id(), event_id.clone(), payload));
            cursor.note_seen(event_id);
        }

        cursor.position = Some(row.to_string());
        debug!(count = events.len(), row, "Messages poll");
        Ok(Poll { events, cursor })
    }
}
