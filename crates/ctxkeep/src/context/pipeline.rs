//! Chain several strategies into one.
//!
//! Each member runs through its own driver, so it only acts when its own
//! trigger fires. The pipeline stops as soon as its own budget is met, which
//! makes ordering matter: put the cheap strategies (plain forgetting) before
//! the expensive ones (model summaries).

use super::{ContextManager, ContextManagerExt, TokenAccounting};
use crate::content::Conversation;
use crate::error::ConfigError;
use crate::tokens::TokenCounter;
use std::sync::Arc;
use tracing::{debug, info};

pub struct Pipeline {
    accounting: TokenAccounting,
    managers: Vec<Arc<dyn ContextManager>>,
}

impl Pipeline {
    /// Fails with [`ConfigError::EmptyPipeline`] if `managers` is empty.
    pub fn new(
        counter: Arc<dyn TokenCounter>,
        managers: Vec<Arc<dyn ContextManager>>,
    ) -> Result<Self, ConfigError> {
        if managers.is_empty() {
            return Err(ConfigError::EmptyPipeline);
        }
        Ok(Self {
            accounting: TokenAccounting::new(counter),
            managers,
        })
    }

    pub fn with_token_budget(mut self, token_budget: usize) -> Self {
        self.accounting = self.accounting.with_token_budget(token_budget);
        self
    }

    pub fn managers(&self) -> &[Arc<dyn ContextManager>] {
        &self.managers
    }
}

impl ContextManager for Pipeline {
    fn name(&self) -> &'static str {
        "pipeline"
    }

    fn accounting(&self) -> &TokenAccounting {
        &self.accounting
    }

    fn apply_truncation(&self, turns: Conversation) -> Conversation {
        let turns_before = turns.len();
        let tokens_before = self.count_tokens(&turns);
        let total = self.managers.len();

        let mut result = turns;
        for (i, manager) in self.managers.iter().enumerate() {
            debug!("Running context manager {}/{total}: {}", i + 1, manager.name());

            let prev_count = result.len();
            result = manager.apply_truncation_if_needed(result);
            if result.len() != prev_count {
                info!(
                    "Context manager {} reduced message count from {prev_count} to {}",
                    manager.name(),
                    result.len()
                );
            }

            if self.count_tokens(&result) <= self.token_budget() {
                debug!(
                    "Token budget satisfied after context manager {}, stopping pipeline early",
                    i + 1
                );
                break;
            }
        }

        info!(
            "Pipeline completed: {turns_before} -> {} messages, {tokens_before} -> {} tokens",
            result.len(),
            self.count_tokens(&result)
        );
        result
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.managers.iter().map(|m| m.name()).collect();
        f.debug_struct("Pipeline")
            .field("token_budget", &self.token_budget())
            .field("managers", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{ShrinkBy, byte_counter, numbered_turns};
    use super::*;
    use crate::logging::{LogLevel, capture};

    #[test]
    fn empty_pipeline_is_rejected() {
        assert!(matches!(
            Pipeline::new(byte_counter(), vec![]),
            Err(ConfigError::EmptyPipeline)
        ));
    }

    #[test]
    fn runs_members_in_order() {
        let first = Arc::new(ShrinkBy::new(0.8, 1));
        let second = Arc::new(ShrinkBy::new(0.5, 1));
        let pipeline = Pipeline::new(byte_counter(), vec![first.clone(), second.clone()])
            .unwrap()
            .with_token_budget(1);

        let (result, logs) = capture(|| pipeline.apply_truncation_if_needed(numbered_turns(10)));

        assert_eq!(result.len(), 4);
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 1);
        assert!(logs.contains(LogLevel::Info, "reduced message count from 10 to 8"));
        assert!(logs.contains(LogLevel::Info, "reduced message count from 8 to 4"));
        assert!(logs.contains(LogLevel::Info, "Pipeline completed: 10 -> 4 messages"));
    }

    #[test]
    fn stops_once_budget_is_met() {
        let first = Arc::new(ShrinkBy::new(0.4, 1));
        let second = Arc::new(ShrinkBy::new(0.5, 1));
        // Four "Message N" turns are 36 bytes.
        let pipeline = Pipeline::new(byte_counter(), vec![first.clone(), second.clone()])
            .unwrap()
            .with_token_budget(40);

        let (result, logs) = capture(|| pipeline.apply_truncation_if_needed(numbered_turns(10)));

        assert_eq!(result.len(), 4);
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 0);
        assert!(logs.contains(LogLevel::Debug, "stopping pipeline early"));
    }

    #[test]
    fn members_keep_their_own_triggers() {
        // The first member's budget is generous, so its driver leaves the input alone.
        let first = Arc::new(ShrinkBy::new(0.1, 10_000));
        let second = Arc::new(ShrinkBy::new(0.5, 1));
        let pipeline = Pipeline::new(byte_counter(), vec![first.clone(), second.clone()])
            .unwrap()
            .with_token_budget(1);

        let result = pipeline.apply_truncation_if_needed(numbered_turns(10));
        assert_eq!(result.len(), 5);
        assert_eq!(first.calls(), 0);
        assert_eq!(second.calls(), 1);
    }

    #[test]
    fn empty_conversation_passes_through() {
        let member = Arc::new(ShrinkBy::new(0.5, 0));
        let pipeline = Pipeline::new(byte_counter(), vec![member.clone()])
            .unwrap()
            .with_token_budget(0);
        assert!(pipeline.apply_truncation(Vec::new()).is_empty());
    }

    #[test]
    fn debug_lists_member_names() {
        let pipeline =
            Pipeline::new(byte_counter(), vec![Arc::new(ShrinkBy::new(0.5, 1))]).unwrap();
        assert!(format!("{pipeline:?}").contains("shrink_by"));
    }
}
