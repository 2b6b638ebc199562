//! Context management: token accounting and truncation strategies.
//!
//! A conversation grows without bound; the model's input doesn't. This module
//! decides which turns to keep once a conversation outgrows its budget:
//!
//! 1. **[`amortized`]**: [`AmortizedForgetting`] keeps a fixed head and the
//!    most recent tail and silently drops the middle. No LLM call.
//!
//! 2. **[`summarizing`]**: [`LlmSummarizing`] keeps the same head and tail
//!    and replaces the middle with a summary turn produced by one model call.
//!    Successive passes fold the previous summary into the new one.
//!
//! 3. **[`pipeline`]**: [`Pipeline`] chains strategies, running each one only
//!    until the pipeline's own budget is met. Put cheap strategies first.
//!
//! Every strategy implements [`ContextManager`], which supplies token
//! accounting and the eviction policy. Callers drive it through
//! [`ContextManagerExt::apply_truncation_if_needed`], which checks the
//! trigger, applies the policy, and logs the result. That driver is
//! blanket-implemented and cannot be overridden.

pub mod accounting;
pub mod amortized;
pub mod config;
pub mod pipeline;
pub mod summarizing;
pub mod window;

pub use accounting::{DEFAULT_TOKEN_BUDGET, TokenAccounting};
pub use amortized::AmortizedForgetting;
pub use config::StrategyConfig;
pub use pipeline::Pipeline;
pub use summarizing::{LlmSummarizing, SUMMARY_MARKER};
pub use window::RetentionWindow;

use crate::content::{Conversation, Turn};
use tracing::info;

/// A truncation strategy.
///
/// Implementors provide [`accounting`](Self::accounting) and the eviction
/// policy in [`apply_truncation`](Self::apply_truncation); everything else
/// has a default. Strategies hold no per-conversation state, so one instance
/// can serve many histories.
pub trait ContextManager: Send + Sync {
    /// Short strategy name for log lines.
    fn name(&self) -> &'static str;

    /// Token counter and budget used by this strategy.
    fn accounting(&self) -> &TokenAccounting;

    fn token_budget(&self) -> usize {
        self.accounting().token_budget()
    }

    fn count_tokens(&self, turns: &[Turn]) -> usize {
        self.accounting().count_tokens(turns)
    }

    /// Whether `turns` needs truncating. Defaults to "over the token budget";
    /// strategies may add further triggers.
    fn should_truncate(&self, turns: &[Turn]) -> bool {
        self.count_tokens(turns) > self.token_budget()
    }

    /// The eviction policy. Must return `turns` unchanged when there is
    /// nothing to remove, and never more turns than it received.
    ///
    /// Don't call this directly: go through
    /// [`apply_truncation_if_needed`](ContextManagerExt::apply_truncation_if_needed).
    /// Only [`Pipeline`] invokes members, and it does so through the driver too.
    fn apply_truncation(&self, turns: Conversation) -> Conversation;
}

/// The truncation driver, implemented for every [`ContextManager`].
pub trait ContextManagerExt: ContextManager {
    /// Truncate `turns` if [`should_truncate`](ContextManager::should_truncate)
    /// says so, otherwise hand them back untouched.
    fn apply_truncation_if_needed(&self, turns: Conversation) -> Conversation;
}

impl<M: ContextManager + ?Sized> ContextManagerExt for M {
    fn apply_truncation_if_needed(&self, turns: Conversation) -> Conversation {
        if !self.should_truncate(&turns) {
            return turns;
        }

        let turns_before = turns.len();
        let tokens_before = self.count_tokens(&turns);
        info!(
            "Context over limit: {turns_before} turns, ~{tokens_before} tokens (budget {}). Applying {}",
            self.token_budget(),
            self.name(),
        );

        let truncated = self.apply_truncation(turns);

        let tokens_after = self.count_tokens(&truncated);
        info!(
            "Truncation saved ~{} tokens. New count: {tokens_after} tokens in {} turns",
            tokens_before.saturating_sub(tokens_after),
            truncated.len(),
        );
        truncated
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Test doubles shared by the strategy tests.

    use super::*;
    use crate::content::ContentBlock;
    use crate::tokens::TokenCounter;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// One token per byte.
    pub fn byte_counter() -> Arc<dyn TokenCounter> {
        Arc::new(|text: &str| text.len())
    }

    /// `count` single-prompt turns: "Message 0", "Message 1", ...
    pub fn numbered_turns(count: usize) -> Conversation {
        (0..count)
            .map(|i| vec![ContentBlock::prompt(format!("Message {i}"))])
            .collect()
    }

    /// A strategy that keeps the first `len * factor` turns and counts calls.
    pub struct ShrinkBy {
        accounting: TokenAccounting,
        factor: f64,
        pub calls: AtomicUsize,
    }

    impl ShrinkBy {
        pub fn new(factor: f64, token_budget: usize) -> Self {
            Self {
                accounting: TokenAccounting::new(byte_counter()).with_token_budget(token_budget),
                factor,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ContextManager for ShrinkBy {
        fn name(&self) -> &'static str {
            "shrink_by"
        }

        fn accounting(&self) -> &TokenAccounting {
            &self.accounting
        }

        fn apply_truncation(&self, mut turns: Conversation) -> Conversation {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if turns.len() > 1 {
                let keep = ((turns.len() as f64 * self.factor) as usize).max(1);
                turns.truncate(keep);
            }
            turns
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn driver_is_identity_under_budget() {
        let strategy = ShrinkBy::new(0.5, 10_000);
        let turns = numbered_turns(10);
        let result = strategy.apply_truncation_if_needed(turns.clone());
        assert_eq!(result, turns);
        assert_eq!(strategy.calls(), 0);
    }

    #[test]
    fn driver_applies_policy_over_budget() {
        let strategy = ShrinkBy::new(0.5, 10);
        let result = strategy.apply_truncation_if_needed(numbered_turns(10));
        assert_eq!(result.len(), 5);
        assert_eq!(strategy.calls(), 1);
    }

    #[test]
    fn driver_works_through_trait_objects() {
        let strategy: std::sync::Arc<dyn ContextManager> =
            std::sync::Arc::new(ShrinkBy::new(0.5, 10));
        assert_eq!(strategy.apply_truncation_if_needed(numbered_turns(4)).len(), 2);
    }

    #[test]
    fn default_trigger_is_token_budget() {
        let strategy = ShrinkBy::new(0.5, 9);
        // "Message 0" is exactly 9 bytes.
        assert!(!strategy.should_truncate(&numbered_turns(1)));
        assert!(strategy.should_truncate(&numbered_turns(2)));
    }
}
