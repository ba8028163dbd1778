//! Mail watcher - scans a Maildir for new messages
//!
//! Watches `new/` under the configured Maildir root. Message filenames
//! are unique by construction, which makes them natural event ids.

use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
use eyre::Result;
use serde_json::json;
use tracing::debug;

use taskstore::WatcherCursor;

use super::{Poll, Watcher};
use crate::events::EventRecord;

pub struct MailWatcher {
    maildir: PathBuf,
}

impl MailWatcher {
    pub fn new(maildir: PathBuf) -> Self {
        Self { maildir }
    }

    /// Pull Subject/From out of an RFC 822 header block
    fn parse_headers(content: &str) -> (Option<String>, Option<String>) {
        let mut subject = None;
        let mut from = None;
        for line in content.lines() {
            // Headers end at the first blank line
            if line.is_empty() {
                break;
            }
            if let Some(value) = line.strip_prefix("Subject:") {
                subject = Some(value.trim().to_string());
            } else if let Some(value) = line.strip_prefix("From:") {
                from = Some(value.trim().to_string());
            }
        }
        (subject, from)
    }
}

#[async_trait]
impl Watcher for MailWatcher {
    fn id(&self) -> &'static str {
        "mail"
    }

    async fn poll(&self, cursor: &WatcherCursor) -> Result<Poll> {
        let new_dir = self.maildir.join("new");
        if !new_dir.is_dir() {
            debug!(path = ?new_dir, "No maildir, nothing to poll");
            return Ok(Poll::unchanged(cursor.clone()));
        }

        let mut names: Vec<String> = fs::read_dir(&new_dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        // Maildir filenames start with a timestamp; sorting approximates
        // arrival order
        names.sort();

        let mut cursor = cursor.clone();
        let mut events = Vec::new();
        for name in names {
            if cursor.has_seen(&name) {
                continue;
            }

            let content = fs::read_to_string(new_dir.join(&name)).unwrap_or_default();
            let (subject, from) = Self::parse_headers(&content);
            events.push(EventRecord::new(
                self.id(),
                name.clone(),
                json!({
                    "subject": subject,
                    "from": from,
                    "file": name,
                }),
            ));
            cursor.note_seen(name);
        }

        debug!(count = events.len(), "Mail poll");
        Ok(Poll { events, cursor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_mail(dir: &std::path::Path, name: &str, subject: &str) {
        fs::create_dir_all(dir.join("new")).unwrap();
        fs::write(
            dir.join("new").join(name),
            format!("From: alice@example.com\nSubject: {subject}\n\nBody here\n"),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_missing_maildir_is_empty_poll() {
        let dir = tempdir().unwrap();
        let watcher = MailWatcher::new(dir.path().join("nope"));

        let poll = watcher.poll(&WatcherCursor::empty("mail")).await.unwrap();
        assert!(poll.events.is_empty());
    }

    #[tokio::test]
    async fn test_new_mail_emits_event_once() {
        let dir = tempdir().unwrap();
        write_mail(dir.path(), "1700000001.a.host", "Invoice attached");
        let watcher = MailWatcher::new(dir.path().to_path_buf());

        let poll = watcher.poll(&WatcherCursor::empty("mail")).await.unwrap();
        assert_eq!(poll.events.len(), 1);
        assert_eq!(poll.events[0].event_id, "1700000001.a.host");
        assert_eq!(poll.events[0].payload["subject"], "Invoice attached");

        // Re-poll with the updated cursor: nothing new
        let again = watcher.poll(&poll.cursor).await.unwrap();
        assert!(again.events.is_empty());
    }

    #[tokio::test]
    async fn test_events_in_filename_order() {
        let dir = tempdir().unwrap();
        write_mail(dir.path(), "1700000002.b.host", "second");
        write_mail(dir.path(), "1700000001.a.host", "first");
        let watcher = MailWatcher::new(dir.path().to_path_buf());

        let poll = watcher.poll(&WatcherCursor::empty("mail")).await.unwrap();
        let subjects: Vec<&str> = poll
            .events
            .iter()
            .map(|e| e.payload["subject"].as_str().unwrap())
            .collect();
        assert_eq!(subjects, vec!["first", "second"]);
    }

    #[test]
    fn test_header_parsing_stops_at_body() {
        let content = "From: bob\nSubject: real\n\nSubject: fake in body\n";
        let (subject, from) = MailWatcher::parse_headers(content);
        assert_eq!(subject.as_deref(), Some("real"));
        assert_eq!(from.as_deref(), Some("bob"));
    }
}
