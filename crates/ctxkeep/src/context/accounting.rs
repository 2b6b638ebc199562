//! Token accounting shared by every strategy.
//!
//! [`TokenAccounting`] pairs a [`TokenCounter`] with a token budget and knows
//! what each kind of content block costs. Strategies embed one and expose it
//! through [`ContextManager::accounting`](super::ContextManager::accounting).

use crate::content::{ContentBlock, Turn};
use crate::tokens::TokenCounter;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Default token budget for a conversation.
pub const DEFAULT_TOKEN_BUDGET: usize = 120_000;

/// Flat charge for a tool call whose input can't be serialized.
pub const UNSERIALIZABLE_INPUT_PENALTY: usize = 100;

/// Flat charge per image. Real image costs range from ~85 to 1700+ tokens
/// depending on size and detail.
pub const IMAGE_TOKENS: usize = 1000;

/// Token counter plus budget.
#[derive(Clone)]
pub struct TokenAccounting {
    counter: Arc<dyn TokenCounter>,
    token_budget: usize,
}

impl TokenAccounting {
    /// Accounting with the default budget of [`DEFAULT_TOKEN_BUDGET`].
    pub fn new(counter: Arc<dyn TokenCounter>) -> Self {
        Self {
            counter,
            token_budget: DEFAULT_TOKEN_BUDGET,
        }
    }

    pub fn with_token_budget(mut self, token_budget: usize) -> Self {
        self.token_budget = token_budget;
        self
    }

    pub fn token_budget(&self) -> usize {
        self.token_budget
    }

    pub fn counter(&self) -> &Arc<dyn TokenCounter> {
        &self.counter
    }

    /// Total estimated tokens for a conversation.
    ///
    /// Thinking blocks only count in the last turn: older thinking is never
    /// resent to the model.
    pub fn count_tokens(&self, turns: &[Turn]) -> usize {
        let last = turns.len().saturating_sub(1);
        turns
            .iter()
            .enumerate()
            .map(|(i, turn)| {
                turn.iter()
                    .map(|block| self.block_cost(block, i == last))
                    .sum::<usize>()
            })
            .sum()
    }

    /// Estimated tokens for one block. `in_last_turn` says whether the block
    /// belongs to the final turn of the conversation being counted.
    pub fn block_cost(&self, block: &ContentBlock, in_last_turn: bool) -> usize {
        match block {
            ContentBlock::TextPrompt { text } | ContentBlock::TextResult { text } => {
                self.counter.count_tokens(text)
            }
            ContentBlock::ToolResult { call_id, output, .. } => match output.serialized() {
                Ok(text) => self.counter.count_tokens(&text),
                Err(e) => {
                    warn!("Could not serialize output of tool result {call_id} for token counting: {e}");
                    UNSERIALIZABLE_INPUT_PENALTY
                }
            },
            ContentBlock::ToolCall { id, name, input } => match serde_json::to_string(input) {
                Ok(json) => self.counter.count_tokens(&json),
                Err(e) => {
                    warn!("Could not serialize input of tool call {name} ({id}) for token counting: {e}");
                    UNSERIALIZABLE_INPUT_PENALTY
                }
            },
            ContentBlock::Image { .. } => IMAGE_TOKENS,
            ContentBlock::RedactedThinking { .. } => 0,
            ContentBlock::Thinking { text, .. } => {
                if in_last_turn {
                    self.counter.count_tokens(text)
                } else {
                    0
                }
            }
            ContentBlock::Unknown => {
                warn!("Unhandled block type for token counting: {}", block.kind());
                0
            }
        }
    }
}

impl fmt::Debug for TokenAccounting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAccounting")
            .field("token_budget", &self.token_budget)
            .finish_non_exhaustive()
    }
}
