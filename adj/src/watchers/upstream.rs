//! Upstream watcher - source-control events
//!
//! Fetches the configured remote and compares the branch head SHA to the
//! cursor. A changed head becomes one event carrying the old and new
//! SHAs; the first poll just records the baseline.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use eyre::{Result, eyre};
use serde_json::json;
use tokio::process::Command;
use tracing::{debug, warn};

use taskstore::WatcherCursor;

use super::{Poll, Watcher};
use crate::events::EventRecord;

pub struct UpstreamWatcher {
    repo_path: PathBuf,
    remote: String,
    branch: String,
}

impl UpstreamWatcher {
    pub fn new(repo_path: PathBuf, remote: String, branch: String) -> Self {
        Self {
            repo_path,
            remote,
            branch,
        }
    }

    /// Current SHA of the watched branch
    async fn head_sha(&self) -> Result<String> {
        let output = Command::new("git")
            .arg("rev-parse")
            .arg(&self.branch)
            .current_dir(&self.repo_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(eyre!("git rev-parse failed: {}", stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Fetch the remote; a failed fetch is logged, not fatal, since the
    /// local ref can still be checked
    async fn fetch_remote(&self) {
        let result = Command::new("git")
            .arg("fetch")
            .arg(&self.remote)
            .arg(&self.branch)
            .current_dir(&self.repo_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        match result {
            Ok(output) if !output.status.success() => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!(stderr = %stderr.trim(), "git fetch failed");
            }
            Err(e) => warn!(error = %e, "git fetch could not run"),
            _ => {}
        }
    }
}

#[async_trait]
impl Watcher for UpstreamWatcher {
    fn id(&self) -> &'static str {
        "upstream"
    }

    async fn poll(&self, cursor: &WatcherCursor) -> Result<Poll> {
        self.fetch_remote().await;
        let current = self.head_sha().await?;

        let mut cursor = cursor.clone();
        let Some(last) = cursor.position.clone() else {
            debug!(sha = %current, "Baseline upstream SHA");
            cursor.position = Some(current);
            return Ok(Poll {
                events: vec![],
                cursor,
            });
        };

        if last == current {
            debug!(sha = %current, "Upstream unchanged");
            return Ok(Poll::unchanged(cursor));
        }

        let event_id = current.clone();
        let mut events = Vec::new();
        if !cursor.has_seen(&event_id) {
            events.push(EventRecord::new(
                self.id(),
                event_id.clone(),
                json!({
                    "old_sha": last,
                    "new_sha": current,
                    "branch": self.branch,
                }),
            ));
            cursor.note_seen(event_id);
        }
        cursor.position = Some(current);
        Ok(Poll { events, cursor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_poll_outside_a_repo_errors() {
        let dir = tempdir().unwrap();
        let watcher = UpstreamWatcher::new(dir.path().to_path_buf(), "origin".to_string(), "main".to_string());

        // The daemon swallows this; the watcher just reports it
        let result = watcher.poll(&WatcherCursor::empty("upstream")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_change_detection_against_stored_position() {
        // Drive the SHA-comparison logic without git: a cursor with a
        // stale position against a fabricated current SHA
        let mut cursor = WatcherCursor::empty("upstream");
        cursor.position = Some("aaaa".to_string());

        // The comparison path itself is exercised through poll() only in
        // a real repo; here the invariant worth pinning is the dedup key
        assert!(!cursor.has_seen("bbbb"));
        cursor.note_seen("bbbb");
        assert!(cursor.has_seen("bbbb"));
    }
}
