//! Per-watcher cursor persistence
//!
//! Each watcher owns exactly one cursor: an opaque position string plus a
//! bounded list of recently seen event ids. The pair is what makes event
//! handling at-most-once across daemon restarts.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::store::{StoreError, write_atomic};

/// Upper bound on remembered event ids per watcher
const MAX_SEEN: usize = 2048;

/// Opaque per-watcher state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherCursor {
    /// The owning watcher's id
    pub watcher_id: String,

    /// Watcher-defined position marker (mail UID, line number, commit SHA)
    #[serde(default)]
    pub position: Option<String>,

    /// Recently seen event ids, oldest first
    #[serde(default)]
    pub seen: Vec<String>,

    /// Last write time
    pub updated_at: DateTime<Utc>,
}

impl WatcherCursor {
    /// A fresh cursor for a watcher that has never polled
    pub fn empty(watcher_id: impl Into<String>) -> Self {
        Self {
            watcher_id: watcher_id.into(),
            position: None,
            seen: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Whether an event id has already been processed
    pub fn has_seen(&self, event_id: &str) -> bool {
        self.seen.iter().any(|s| s == event_id)
    }

    /// Remember an event id, evicting the oldest past the bound
    pub fn note_seen(&mut self, event_id: impl Into<String>) {
        let event_id = event_id.into();
        if self.has_seen(&event_id) {
            return;
        }
        self.seen.push(event_id);
        if self.seen.len() > MAX_SEEN {
            let excess = self.seen.len() - MAX_SEEN;
            self.seen.drain(..excess);
        }
    }
}

/// Persistent cursor collection, one JSON document keyed by watcher id
///
/// Reads and writes are sequenced by the daemon's single tick loop, so a
/// plain load-modify-save cycle per watcher is race-free; the save itself
/// is atomic so a crash mid-write cannot tear the document.
pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    /// Create a cursor store backed by the given file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_all(&self) -> Result<BTreeMap<String, WatcherCursor>, StoreError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Load one watcher's cursor, empty if never written
    pub fn load(&self, watcher_id: &str) -> Result<WatcherCursor, StoreError> {
        let all = self.load_all()?;
        Ok(all
            .get(watcher_id)
            .cloned()
            .unwrap_or_else(|| WatcherCursor::empty(watcher_id)))
    }

    /// Write one watcher's cursor back, atomically
    pub fn store(&self, mut cursor: WatcherCursor) -> Result<(), StoreError> {
        cursor.updated_at = Utc::now();
        let mut all = self.load_all()?;
        debug!(watcher_id = %cursor.watcher_id, position = ?cursor.position, "CursorStore::store");
        all.insert(cursor.watcher_id.clone(), cursor);

        let bytes = serde_json::to_vec_pretty(&all)?;
        write_atomic(&self.path, &bytes)
    }
}
