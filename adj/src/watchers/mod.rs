//! Watchers - periodic pollers of external sources
//!
//! Each watcher owns exactly one cursor. A poll reads the cursor, looks
//! at its source, and returns the events whose ids the cursor has not
//! seen, plus the updated cursor; the daemon writes the cursor back
//! atomically before the events are routed. Within one watcher, events
//! come out in source order.

mod calendar;
mod mail;
mod messages;
mod notifications;
mod upstream;

pub use calendar::CalendarWatcher;
pub use mail::MailWatcher;
pub use messages::MessagesWatcher;
pub use notifications::NotificationsWatcher;
pub use upstream::UpstreamWatcher;

use async_trait::async_trait;
use eyre::Result;
use tracing::warn;

use taskstore::WatcherCursor;

use crate::config::ListenerConfig;
use crate::events::EventRecord;

/// One poll's worth of output
#[derive(Debug)]
pub struct Poll {
    /// New events, in source order
    pub events: Vec<EventRecord>,
    /// The cursor to persist before routing the events
    pub cursor: WatcherCursor,
}

impl Poll {
    /// A poll that found nothing; the cursor is returned unchanged
    pub fn unchanged(cursor: WatcherCursor) -> Self {
        Self {
            events: Vec::new(),
            cursor,
        }
    }
}

/// A pollable external source
#[async_trait]
pub trait Watcher: Send + Sync {
    /// Stable id; also the cursor key
    fn id(&self) -> &'static str;

    /// Poll the source against the given cursor
    async fn poll(&self, cursor: &WatcherCursor) -> Result<Poll>;
}

/// Build the watcher set named in the listener config
pub fn build_watchers(config: &ListenerConfig) -> Vec<Box<dyn Watcher>> {
    let mut watchers: Vec<Box<dyn Watcher>> = Vec::new();
    for id in &config.watchers {
        match id.as_str() {
            "mail" => watchers.push(Box::new(MailWatcher::new(config.maildir.clone()))),
            "calendar" => watchers.push(Box::new(CalendarWatcher::new(
                config.calendar_path.clone(),
                config.calendar_lead_minutes,
            ))),
            "messages" => watchers.push(Box::new(MessagesWatcher::new(config.messages_path.clone()))),
            "notifications" => {
                watchers.push(Box::new(NotificationsWatcher::new(config.notifications_dir.clone())))
            }
            "upstream" => watchers.push(Box::new(UpstreamWatcher::new(
                config.repo_path.clone(),
                config.upstream_remote.clone(),
                config.upstream_branch.clone(),
            ))),
            other => warn!(watcher = other, "Unknown watcher id in config, skipping"),
        }
    }
    watchers
}
