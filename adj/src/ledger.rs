//! Token ledger - cost and savings accounting
//!
//! Every model call and every byte saved by compaction lands here. The
//! ledger is append-only within a process and totally ordered by
//! insertion; aggregation happens on read. Writing the checkpoint is
//! best-effort: a ledger failure never fails the call it was accounting
//! for.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// What a model call (or a savings event) was for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Purpose {
    Classification,
    Summarization,
    ContextCompaction,
    ManifestGeneration,
    Planning,
    Formatting,
    Extraction,
}

/// One accounting record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub provider: String,
    pub purpose: Purpose,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub bytes_saved: u64,
    pub recorded_at: DateTime<Utc>,
}

/// Aggregated view of the ledger
#[derive(Debug, Clone, Default, Serialize)]
pub struct LedgerSummary {
    pub calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub bytes_saved: u64,
    pub by_provider: BTreeMap<String, u64>,
}

/// Per-million-token pricing for cloud providers; local providers are free
///
/// Returns (input, output) prices in USD.
fn pricing(provider: &str) -> (f64, f64) {
    match provider {
        "anthropic" => (0.25, 1.25),
        "groq" => (0.05, 0.08),
        "gemini" => (0.10, 0.40),
        _ => (0.0, 0.0),
    }
}

/// Compute the USD cost of a call
pub fn cost_usd(provider: &str, input_tokens: u64, output_tokens: u64) -> f64 {
    let (input_price, output_price) = pricing(provider);
    (input_tokens as f64 / 1_000_000.0) * input_price + (output_tokens as f64 / 1_000_000.0) * output_price
}

/// Append-only in-process ledger with an optional JSONL checkpoint
pub struct TokenLedger {
    entries: Mutex<Vec<LedgerEntry>>,
    checkpoint_path: Option<PathBuf>,
}

impl TokenLedger {
    /// An in-memory ledger
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            checkpoint_path: None,
        }
    }

    /// A ledger that can flush to a JSONL file
    pub fn with_checkpoint(path: impl Into<PathBuf>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            checkpoint_path: Some(path.into()),
        }
    }

    /// Record a model call
    pub fn record_call(&self, provider: &str, purpose: Purpose, input_tokens: u64, output_tokens: u64) {
        self.push(LedgerEntry {
            provider: provider.to_string(),
            purpose,
            input_tokens,
            output_tokens,
            cost_usd: cost_usd(provider, input_tokens, output_tokens),
            bytes_saved: 0,
            recorded_at: Utc::now(),
        });
    }

    /// Record bytes saved by a compaction or summarization
    pub fn record_savings(&self, provider: &str, purpose: Purpose, bytes_saved: u64) {
        self.push(LedgerEntry {
            provider: provider.to_string(),
            purpose,
            input_tokens: 0,
            output_tokens: 0,
            cost_usd: 0.0,
            bytes_saved,
            recorded_at: Utc::now(),
        });
    }

    fn push(&self, entry: LedgerEntry) {
        debug!(provider = %entry.provider, purpose = ?entry.purpose, "Ledger entry");
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }

    /// Aggregate all entries
    pub fn summary(&self) -> LedgerSummary {
        let entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(_) => return LedgerSummary::default(),
        };

        let mut summary = LedgerSummary::default();
        for entry in entries.iter() {
            summary.calls += 1;
            summary.input_tokens += entry.input_tokens;
            summary.output_tokens += entry.output_tokens;
            summary.cost_usd += entry.cost_usd;
            summary.bytes_saved += entry.bytes_saved;
            *summary.by_provider.entry(entry.provider.clone()).or_default() += 1;
        }
        summary
    }

    /// Entries recorded so far, in insertion order
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Append all entries to the checkpoint file and clear the buffer
    ///
    /// Best-effort: failures are logged, in-memory state is kept so the
    /// next flush retries.
    pub fn flush(&self) {
        let Some(path) = &self.checkpoint_path else {
            return;
        };
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        if entries.is_empty() {
            return;
        }

        let result = (|| -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
            for entry in entries.iter() {
                let line = serde_json::to_string(entry).map_err(std::io::Error::other)?;
                writeln!(file, "{line}")?;
            }
            file.flush()
        })();

        match result {
            Ok(()) => {
                debug!(count = entries.len(), path = ?path, "Ledger checkpoint written");
                entries.clear();
            }
            Err(e) => warn!(error = %e, "Ledger checkpoint failed, keeping entries in memory"),
        }
    }
}

impl Default for TokenLedger {
    fn default() -> Self {
        Self::new()
    }
}
