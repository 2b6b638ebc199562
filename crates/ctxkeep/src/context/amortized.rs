//! Amortized forgetting: keep the head and the recent tail, drop the middle.
//!
//! Truncation halves the retained window each time it fires, so a growing
//! conversation is cut only once every `max_size / 2` appends or so. That
//! keeps the prompt prefix stable between cuts and lets provider-side prompt
//! caching do its job. No model call and no compression: forgotten turns are
//! simply gone.

use super::{ContextManager, TokenAccounting, window::RetentionWindow};
use crate::content::{Conversation, Turn};
use crate::tokens::TokenCounter;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct AmortizedForgetting {
    accounting: TokenAccounting,
    window: RetentionWindow,
}

impl AmortizedForgetting {
    pub fn new(counter: Arc<dyn TokenCounter>, window: RetentionWindow) -> Self {
        Self {
            accounting: TokenAccounting::new(counter),
            window,
        }
    }

    pub fn with_token_budget(mut self, token_budget: usize) -> Self {
        self.accounting = self.accounting.with_token_budget(token_budget);
        self
    }

    pub fn window(&self) -> RetentionWindow {
        self.window
    }
}

impl ContextManager for AmortizedForgetting {
    fn name(&self) -> &'static str {
        "amortized_forgetting"
    }

    fn accounting(&self) -> &TokenAccounting {
        &self.accounting
    }

    fn should_truncate(&self, turns: &[Turn]) -> bool {
        self.window.exceeded_by(turns.len()) || self.count_tokens(turns) > self.token_budget()
    }

    fn apply_truncation(&self, mut turns: Conversation) -> Conversation {
        let len = turns.len();
        let target_size = self.window.target_size(len);
        let head = self.window.keep_first().min(len);

        if target_size <= head {
            warn!(
                "Not enough room for recent events: keep_first ({head}) fills the target size ({target_size}). Keeping only the first {head} events"
            );
            turns.truncate(head);
            return turns;
        }

        let from_tail = target_size - head;
        let tail_start = len - from_tail;
        if tail_start <= head {
            return turns;
        }

        info!(
            "Amortized forgetting: keeping {head} head + {from_tail} tail events, forgetting {} middle events (indices {head}-{})",
            tail_start - head,
            tail_start - 1,
        );
        turns.drain(head..tail_start);
        turns
    }
}
