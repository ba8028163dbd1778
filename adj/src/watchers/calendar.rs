//! Calendar watcher - ICS events entering their lead window
//!
//! Scans a single ICS file and fires once per event when its start time
//! falls inside [now, now + lead]. Only the fields the router cares
//! about are parsed: UID, DTSTART, SUMMARY.

use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use eyre::Result;
use serde_json::json;
use tracing::debug;

use taskstore::WatcherCursor;

use super::{Poll, Watcher};
use crate::events::EventRecord;

pub struct CalendarWatcher {
    path: PathBuf,
    lead_minutes: i64,
}

/// One parsed VEVENT
#[derive(Debug, Clone)]
struct VEvent {
    uid: String,
    start: DateTime<Utc>,
    summary: String,
}

impl CalendarWatcher {
    pub fn new(path: PathBuf, lead_minutes: i64) -> Self {
        Self { path, lead_minutes }
    }

    fn parse_events(content: &str) -> Vec<VEvent> {
        let mut events = Vec::new();
        let mut uid = None;
        let mut start = None;
        let mut summary = None;
        let mut in_event = false;

        for line in content.lines() {
            let line = line.trim_end();
            match line {
                "BEGIN:VEVENT" => {
                    in_event = true;
                    uid = None;
                    start = None;
                    summary = None;
                }
                "END:VEVENT" => {
                    if let (true, Some(uid), Some(start)) = (in_event, uid.take(), start.take()) {
                        events.push(VEvent {
                            uid,
                            start,
                            summary: summary.take().unwrap_or_default(),
                        });
                    }
                    in_event = false;
                }
                _ if in_event => {
                    if let Some(value) = line.strip_prefix("UID:") {
                        uid = Some(value.trim().to_string());
                    } else if let Some(value) = line.strip_prefix("SUMMARY:") {
                        summary = Some(value.trim().to_string());
                    } else if line.starts_with("DTSTART") {
                        // DTSTART may carry parameters: DTSTART;TZID=...:...
                        if let Some(value) = line.split(':').nth(1) {
                            start = parse_dtstart(value.trim());
                        }
                    }
                }
                _ => {}
            }
        }
        events
    }
}

/// Parse the basic ICS date-time forms: 20260301T090000Z and local
/// 20260301T090000 (treated as UTC, close enough for a lead window)
fn parse_dtstart(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim_end_matches('Z');
    NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S")
        .ok()
        .map(|naive| naive.and_utc())
}

#[async_trait]
impl Watcher for CalendarWatcher {
    fn id(&self) -> &'static str {
        "calendar"
    }

    async fn poll(&self, cursor: &WatcherCursor) -> Result<Poll> {
        if !self.path.is_file() {
            debug!(path = ?self.path, "No calendar file, nothing to poll");
            return Ok(Poll::unchanged(cursor.clone()));
        }

        let content = fs::read_to_string(&self.path)?;
        let now = Utc::now();
        let window_end = now + Duration::minutes(self.lead_minutes);

        let mut cursor = cursor.clone();
        let mut events = Vec::new();
        for vevent in Self::parse_events(&content) {
            if vevent.start < now || vevent.start > window_end {
                continue;
            }

            let event_id = format!("{}:{}", vevent.uid, vevent.start.timestamp());
            if cursor.has_seen(&event_id) {
                continue;
            }

            let minutes_until = (vevent.start - now).num_minutes();
            events.push(EventRecord::new(
                self.id(),
                event_id.clone(),
                json!({
                    "summary": vevent.summary,
                    "starts_at": vevent.start.to_rfc3339(),
                    "minutes_until": minutes_until,
                    "alert": format!("{} starting soon", vevent.summary),
                }),
            ));
            cursor.note_seen(event_id);
        }

        debug!(count = events.len(), "Calendar poll");
        Ok(Poll { events, cursor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ics(start: DateTime<Utc>) -> String {
        format!(
            "BEGIN:VCALENDAR\nBEGIN:VEVENT\nUID:evt-1\nDTSTART:{}\nSUMMARY:Standup\nEND:VEVENT\nEND:VCALENDAR\n",
            start.format("%Y%m%dT%H%M%SZ")
        )
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_poll() {
        let dir = tempdir().unwrap();
        let watcher = CalendarWatcher::new(dir.path().join("nope.ics"), 15);

        let poll = watcher.poll(&WatcherCursor::empty("calendar")).await.unwrap();
        assert!(poll.events.is_empty());
    }

    #[tokio::test]
    async fn test_event_in_lead_window_fires_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.ics");
        fs::write(&path, ics(Utc::now() + Duration::minutes(10))).unwrap();
        let watcher = CalendarWatcher::new(path, 15);

        let poll = watcher.poll(&WatcherCursor::empty("calendar")).await.unwrap();
        assert_eq!(poll.events.len(), 1);
        assert_eq!(poll.events[0].payload["summary"], "Standup");

        let again = watcher.poll(&poll.cursor).await.unwrap();
        assert!(again.events.is_empty());
    }

    #[tokio::test]
    async fn test_event_outside_window_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.ics");
        fs::write(&path, ics(Utc::now() + Duration::hours(3))).unwrap();
        let watcher = CalendarWatcher::new(path, 15);

        let poll = watcher.poll(&WatcherCursor::empty("calendar")).await.unwrap();
        assert!(poll.events.is_empty());
    }

    #[tokio::test]
    async fn test_past_event_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.ics");
        fs::write(&path, ics(Utc::now() - Duration::minutes(5))).unwrap();
        let watcher = CalendarWatcher::new(path, 15);

        let poll = watcher.poll(&WatcherCursor::empty("calendar")).await.unwrap();
        assert!(poll.events.is_empty());
    }

    #[test]
    fn test_parse_dtstart_with_tzid_parameter() {
        let content = "BEGIN:VEVENT\nUID:x\nDTSTART;TZID=Europe/London:20260301T090000\nSUMMARY:S\nEND:VEVENT\n";
        let events = CalendarWatcher::parse_events(content);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].start.to_rfc3339(), "2026-03-01T09:00:00+00:00");
    }

    #[test]
    fn test_event_without_uid_skipped() {
        let content = "BEGIN:VEVENT\nDTSTART:20260301T090000Z\nSUMMARY:S\nEND:VEVENT\n";
        assert!(CalendarWatcher::parse_events(content).is_empty());
    }
}
