//! Context compactor - keeps transcripts inside the token budget
//!
//! Runs between agent iterations. The first two messages (system prompt
//! and initial request) and the last four (the current iteration pair)
//! are never touched; the middle is compacted block by block. When the
//! small model is unavailable the fallback is head/tail truncation.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::ContextConfig;
use crate::ledger::{Purpose, TokenLedger};
use crate::model::ModelFabric;
use crate::transcript::{ContentBlock, Message, MessageContent, estimate_tokens};

/// Messages preserved at the head of the transcript
const KEEP_HEAD: usize = 2;

/// Messages preserved at the tail of the transcript
const KEEP_TAIL: usize = 4;

/// Tool results above this length are compacted
const TOOL_RESULT_LIMIT: usize = 200;

/// Assistant text above this length is compacted
const ASSISTANT_TEXT_LIMIT: usize = 300;

/// Head kept by the truncation fallback
const TRUNCATE_HEAD: usize = 150;

/// Tail kept by the truncation fallback
const TRUNCATE_TAIL: usize = 100;

/// Token budget for one block summary
const BLOCK_SUMMARY_TOKENS: u32 = 128;

/// The compactor
pub struct ContextCompactor {
    config: ContextConfig,
    fabric: Option<Arc<ModelFabric>>,
    ledger: Arc<TokenLedger>,
}

impl ContextCompactor {
    pub fn new(config: ContextConfig, fabric: Option<Arc<ModelFabric>>, ledger: Arc<TokenLedger>) -> Self {
        Self { config, fabric, ledger }
    }

    /// Whether the transcript has crossed the compaction trigger
    pub fn needs_compaction(&self, messages: &[Message]) -> bool {
        let ceiling = (self.config.max_tokens as f64 * self.config.compact_threshold) as usize;
        estimate_tokens(messages) > ceiling
    }

    /// Compact the middle of a transcript
    ///
    /// The first [`KEEP_HEAD`] and last [`KEEP_TAIL`] messages are
    /// returned exactly as given.
    pub async fn compact(&self, messages: Vec<Message>) -> Vec<Message> {
        if messages.len() <= KEEP_HEAD + KEEP_TAIL {
            return messages;
        }

        let before = estimate_tokens(&messages) * 4;
        let model_available = match &self.fabric {
            Some(fabric) => fabric.is_available().await,
            None => false,
        };

        let tail_start = messages.len() - KEEP_TAIL;
        let mut compacted = Vec::with_capacity(messages.len());
        for (index, message) in messages.into_iter().enumerate() {
            if index < KEEP_HEAD || index >= tail_start {
                compacted.push(message);
            } else {
                compacted.push(self.compact_message(message, model_available).await);
            }
        }

        let after = estimate_tokens(&compacted) * 4;
        if after < before {
            let provider = match &self.fabric {
                Some(fabric) => fabric.provider_name().await.unwrap_or("native"),
                None => "native",
            };
            self.ledger
                .record_savings(provider, Purpose::ContextCompaction, (before - after) as u64);
            debug!(before, after, "Context compacted");
        }
        compacted
    }

    async fn compact_message(&self, message: Message, model_available: bool) -> Message {
        let Message { role, content } = message;
        match (role, content) {
            (crate::transcript::Role::User, MessageContent::Blocks(blocks)) => {
                let mut out = Vec::with_capacity(blocks.len());
                for block in blocks {
                    out.push(self.compact_block(block, model_available).await);
                }
                Message {
                    role,
                    content: MessageContent::Blocks(out),
                }
            }
            (crate::transcript::Role::Assistant, content) => {
                self.compact_assistant(Message { role, content }, model_available).await
            }
            (role, content) => Message { role, content },
        }
    }

    async fn compact_block(&self, block: ContentBlock, model_available: bool) -> ContentBlock {
        let ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
            compacted_from,
        } = block
        else {
            return block;
        };

        // Errors are critical context; already-compacted blocks stay put
        if is_error || compacted_from.is_some() || content.len() <= TOOL_RESULT_LIMIT {
            return ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
                compacted_from,
            };
        }

        let replacement = self
            .shrink(&content, "tool result from a prior iteration", model_available)
            .await;
        ContentBlock::ToolResult {
            compacted_from: Some(tool_use_id.clone()),
            tool_use_id,
            content: replacement,
            is_error,
        }
    }

    async fn compact_assistant(&self, message: Message, model_available: bool) -> Message {
        match message.content {
            MessageContent::Text(text) if text.len() > ASSISTANT_TEXT_LIMIT => {
                let replacement = self.shrink(&text, "reasoning from a prior iteration", model_available).await;
                Message {
                    role: message.role,
                    content: MessageContent::Text(replacement),
                }
            }
            MessageContent::Blocks(blocks) => {
                let mut out = Vec::with_capacity(blocks.len());
                for block in blocks {
                    match block {
                        ContentBlock::Text { text } if text.len() > ASSISTANT_TEXT_LIMIT => {
                            let replacement =
                                self.shrink(&text, "reasoning from a prior iteration", model_available).await;
                            out.push(ContentBlock::Text { text: replacement });
                        }
                        other => out.push(other),
                    }
                }
                Message {
                    role: message.role,
                    content: MessageContent::Blocks(out),
                }
            }
            content => Message {
                role: message.role,
                content,
            },
        }
    }

    /// Summarize a block, or head/tail truncate it without a model
    async fn shrink(&self, text: &str, context: &str, model_available: bool) -> String {
        if model_available {
            if let Some(fabric) = &self.fabric {
                match fabric.summarize(text, context, BLOCK_SUMMARY_TOKENS).await {
                    Ok(summary) if summary.len() < text.len() => return summary,
                    Ok(_) => return text.to_string(),
                    Err(e) => {
                        warn!(error = %e, "Block summarization failed, truncating");
                    }
                }
            }
        }
        head_tail_truncate(text)
    }
}

/// Keep the first 150 and last 100 characters with an elision notice
fn head_tail_truncate(text: &str) -> String {
    if text.len() <= TRUNCATE_HEAD + TRUNCATE_TAIL {
        return text.to_string();
    }
    let mut head_end = TRUNCATE_HEAD;
    while head_end > 0 && !text.is_char_boundary(head_end) {
        head_end -= 1;
    }
    let mut tail_start = text.len() - TRUNCATE_TAIL;
    while tail_start < text.len() && !text.is_char_boundary(tail_start) {
        tail_start += 1;
    }
    format!(
        "{}\n[... {} chars elided ...]\n{}",
        &text[..head_end],
        tail_start - head_end,
        &text[tail_start..]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::testing::fake_fabric;

    fn compactor(fabric: Option<Arc<ModelFabric>>) -> ContextCompactor {
        ContextCompactor::new(ContextConfig::default(), fabric, Arc::new(TokenLedger::new()))
    }

    fn transcript() -> Vec<Message> {
        vec![
            Message::user("system prompt stand-in"),
            Message::user("initial request"),
            Message::assistant("a".repeat(1000)),
            Message::user_blocks(vec![ContentBlock::tool_result("t1", "b".repeat(1000), false)]),
            Message::assistant("tail 1"),
            Message::user("tail 2"),
            Message::assistant("tail 3"),
            Message::user("tail 4"),
        ]
    }

    #[test]
    fn test_needs_compaction_threshold() {
        let compactor = compactor(None);

        let small = vec![Message::user("short")];
        assert!(!compactor.needs_compaction(&small));

        // 80,000 * 0.5 = 40,000 tokens -> 160,000 chars
        let big = vec![Message::user("x".repeat(170_000))];
        assert!(compactor.needs_compaction(&big));
    }

    #[tokio::test]
    async fn test_short_transcript_unchanged() {
        let compactor = compactor(None);
        let messages = vec![
            Message::user("a"),
            Message::user("b"),
            Message::assistant("c".repeat(5000)),
        ];
        let out = compactor.compact(messages.clone()).await;
        assert_eq!(out, messages);
    }

    #[tokio::test]
    async fn test_head_and_tail_preserved() {
        let compactor = compactor(None);
        let messages = transcript();
        let out = compactor.compact(messages.clone()).await;

        assert_eq!(out.len(), messages.len());
        assert_eq!(&out[..2], &messages[..2]);
        assert_eq!(&out[messages.len() - 4..], &messages[messages.len() - 4..]);
    }

    #[tokio::test]
    async fn test_truncation_fallback_without_model() {
        let compactor = compactor(None);
        let out = compactor.compact(transcript()).await;

        // Middle assistant text was head/tail truncated
        let MessageContent::Text(text) = &out[2].content else {
            panic!("expected text");
        };
        assert!(text.len() < 1000);
        assert!(text.contains("elided"));
    }

    #[tokio::test]
    async fn test_tool_result_tagged_and_not_recompacted() {
        let (fabric, _) = fake_fabric(vec![
            Ok("summary one".to_string()),
            Ok("summary two".to_string()),
            Ok("summary three".to_string()),
        ]);
        let compactor = compactor(Some(Arc::new(fabric)));

        // Reply one lands on the middle assistant text, reply two on the
        // tool result block
        let once = compactor.compact(transcript()).await;
        let MessageContent::Blocks(blocks) = &once[3].content else {
            panic!("expected blocks");
        };
        let ContentBlock::ToolResult {
            content,
            compacted_from,
            ..
        } = &blocks[0]
        else {
            panic!("expected tool result");
        };
        assert_eq!(content, "summary two");
        assert_eq!(compacted_from.as_deref(), Some("t1"));

        // Second pass: the tagged block is skipped
        let twice = compactor.compact(once.clone()).await;
        let MessageContent::Blocks(blocks) = &twice[3].content else {
            panic!("expected blocks");
        };
        let ContentBlock::ToolResult { content, .. } = &blocks[0] else {
            panic!("expected tool result");
        };
        assert_eq!(content, "summary two");
    }

    #[tokio::test]
    async fn test_error_tool_results_untouched() {
        let compactor = compactor(None);
        let mut messages = transcript();
        messages[3] = Message::user_blocks(vec![ContentBlock::tool_result("t9", "e".repeat(1000), true)]);

        let out = compactor.compact(messages.clone()).await;
        assert_eq!(out[3], messages[3]);
    }

    #[test]
    fn test_head_tail_truncate_short_input() {
        assert_eq!(head_tail_truncate("short"), "short");
    }

    #[test]
    fn test_head_tail_truncate_shape() {
        let text = "h".repeat(150) + &"m".repeat(500) + &"t".repeat(100);
        let out = head_tail_truncate(&text);
        assert!(out.starts_with(&"h".repeat(150)));
        assert!(out.ends_with(&"t".repeat(100)));
        assert!(out.contains("500 chars elided"));
    }
}
