//! Result summarizer - compresses oversized tool outputs
//!
//! Runs on every tool result before it re-enters a model context. Small
//! results pass untouched, mid-sized ones get a pure-string light
//! compression, and large ones get tool-aware model summarization. An
//! output is only ever replaced by something strictly shorter.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::SummarizeConfig;
use crate::exec::ShellResult;
use crate::ledger::{Purpose, TokenLedger};
use crate::model::ModelFabric;

/// Tools whose output is always compact enough to pass through
const PASS_THROUGH_TOOLS: &[&str] = &["list_capabilities", "write", "store_credential", "get_credential"];

/// Block size kept when light compression truncates one line
const MAX_LINE: usize = 500;

/// Token budget for a stdout/content summary
const SUMMARY_TOKENS: u32 = 256;

/// The summarizer
pub struct ResultSummarizer {
    config: SummarizeConfig,
    fabric: Option<Arc<ModelFabric>>,
    ledger: Arc<TokenLedger>,
}

impl ResultSummarizer {
    pub fn new(config: SummarizeConfig, fabric: Option<Arc<ModelFabric>>, ledger: Arc<TokenLedger>) -> Self {
        Self { config, fabric, ledger }
    }

    /// Process one tool result
    ///
    /// Error results and known-compact tools are critical context and
    /// pass through verbatim.
    pub async fn summarize_result(&self, tool: &str, content: &str, is_error: bool) -> String {
        if is_error || PASS_THROUGH_TOOLS.contains(&tool) {
            return content.to_string();
        }

        let original_len = content.len();
        if original_len <= self.config.skip_threshold {
            return content.to_string();
        }

        if original_len <= self.config.summarize_threshold {
            let compressed = light_compress(content);
            if compressed.len() < original_len {
                self.ledger
                    .record_savings("native", Purpose::Summarization, (original_len - compressed.len()) as u64);
            }
            return compressed;
        }

        let summarized = match self.model_summarize(tool, content).await {
            Some(summary) => summary,
            None => return content.to_string(),
        };

        let labeled = format!("[Summarized: {} \u{2192} {} chars]\n{}", original_len, summarized.len(), summarized);
        if labeled.len() >= original_len {
            debug!(tool, "Summary not shorter than input, keeping original");
            return content.to_string();
        }

        let provider = match &self.fabric {
            Some(fabric) => fabric.provider_name().await.unwrap_or("native"),
            None => "native",
        };
        self.ledger
            .record_savings(provider, Purpose::Summarization, (original_len - labeled.len()) as u64);
        labeled
    }

    async fn model_summarize(&self, tool: &str, content: &str) -> Option<String> {
        let fabric = self.fabric.as_ref()?;

        let result = match tool {
            "bash" => self.summarize_shell(fabric, content).await,
            "read" | "read_file" => self.summarize_file_read(fabric, content).await,
            _ => {
                let context = format!("output of the {tool} tool");
                fabric.summarize(content, &context, SUMMARY_TOKENS).await
            }
        };

        match result {
            Ok(summary) => Some(summary),
            Err(e) => {
                warn!(tool, error = %e, "Model summarization failed, keeping original");
                None
            }
        }
    }

    /// Shell results are structured: everything except stdout is kept
    /// verbatim, since exit codes and stderr are the parts that matter.
    async fn summarize_shell(&self, fabric: &ModelFabric, content: &str) -> Result<String, crate::model::ModelError> {
        let Ok(mut shell) = serde_json::from_str::<ShellResult>(content) else {
            return fabric.summarize(content, "shell output", SUMMARY_TOKENS).await;
        };

        let context = format!("stdout of `{}`", shell.command);
        shell.stdout = fabric.summarize(&shell.stdout, &context, SUMMARY_TOKENS).await?;
        Ok(serde_json::to_string_pretty(&shell)?)
    }

    async fn summarize_file_read(
        &self,
        fabric: &ModelFabric,
        content: &str,
    ) -> Result<String, crate::model::ModelError> {
        let Ok(read) = serde_json::from_str::<FileReadResult>(content) else {
            return fabric.summarize(content, "file contents", SUMMARY_TOKENS).await;
        };

        let extension = read.path.rsplit('.').next().unwrap_or("");
        let context = format!(
            "contents of {} (.{} file, {} lines{})",
            read.path,
            extension,
            read.lines,
            if read.truncated { ", truncated" } else { "" }
        );
        let summary = fabric.summarize(&read.content, &context, SUMMARY_TOKENS).await?;
        Ok(format!(
            "{} ({} lines{})\n{}",
            read.path,
            read.lines,
            if read.truncated { ", truncated" } else { "" },
            summary
        ))
    }
}

/// Structured file-read payload, when the read tool produced one
#[derive(Debug, Deserialize)]
struct FileReadResult {
    path: String,
    #[serde(default)]
    lines: usize,
    #[serde(default)]
    truncated: bool,
    content: String,
}

/// Pure-string light compression; idempotent
///
/// Collapses runs of three or more blank lines to two, collapses runs of
/// internal spaces to one, trims trailing whitespace, and truncates any
/// line longer than 500 chars to 497 plus an ellipsis.
pub fn light_compress(content: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut blank_run = 0usize;

    for line in content.lines() {
        let mut line = line.trim_end().to_string();

        while line.contains("  ") {
            line = line.replace("  ", " ");
        }

        if line.len() > MAX_LINE {
            let mut cut = MAX_LINE - 3;
            while cut > 0 && !line.is_char_boundary(cut) {
                cut -= 1;
            }
            line.truncate(cut);
            line.push_str("...");
        }

        if line.is_empty() {
            blank_run += 1;
            if blank_run > 2 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        lines.push(line);
    }

    lines.join("\n")
}
