//! Bounded-memory conversation engine for LLM agents.
//!
//! An agent's dialog (user prompts, assistant replies, tool calls and their
//! results) grows without bound, but the model's input is capped by a token
//! budget. `ctxkeep` keeps that dialog usable: it counts tokens, decides when
//! the conversation is too big, and shrinks it with a pluggable strategy while
//! keeping every tool call paired with its result.
//!
//! # Getting started
//!
//! ```
//! use ctxkeep::prelude::*;
//! use std::sync::Arc;
//!
//! let counter: Arc<dyn TokenCounter> = Arc::new(CharRatioCounter::default());
//! let strategy = AmortizedForgetting::new(counter, RetentionWindow::new(10, 1)?);
//! let mut history = MessageHistory::new(Arc::new(strategy));
//!
//! for i in 0..15 {
//!     history.add_user_prompt(format!("question {i}"), vec![]);
//!     history.add_assistant_turn(vec![ContentBlock::result(format!("answer {i}"))])?;
//!     history.truncate();
//! }
//! assert!(history.len() <= 11);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Where to find things
//!
//! - **Conversation data:** [`ContentBlock`](content::ContentBlock) and the
//!   [`Turn`](content::Turn) / [`Conversation`](content::Conversation) aliases
//!   in [`content`].
//!
//! - **Token counting:** the [`TokenCounter`](tokens::TokenCounter) trait
//!   (any `Fn(&str) -> usize` works) and the default
//!   [`CharRatioCounter`](tokens::CharRatioCounter).
//!
//! - **Truncation strategies:** the [`ContextManager`](context::ContextManager)
//!   trait and its driver
//!   [`apply_truncation_if_needed`](context::ContextManagerExt::apply_truncation_if_needed);
//!   [`AmortizedForgetting`](context::AmortizedForgetting),
//!   [`LlmSummarizing`](context::LlmSummarizing) and
//!   [`Pipeline`](context::Pipeline) implement it. Strategies can also be
//!   described in JSON with [`StrategyConfig`](context::StrategyConfig).
//!
//! - **Summaries:** [`ModelCaller`](model::ModelCaller) is the one capability
//!   the engine needs from a model. Wrap a closure with
//!   [`FnModelCaller`](model::FnModelCaller) or a shell command with
//!   [`CommandModelCaller`](model::CommandModelCaller).
//!
//! - **Agent-loop integration:** [`MessageHistory`](history::MessageHistory).
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`content`] | Content blocks, turns, tool outputs |
//! | [`tokens`] | Token counter trait and default estimator |
//! | [`context`] | Strategy trait, driver, strategies, config |
//! | [`history`] | Message history and tool-call integrity filter |
//! | [`model`] | Model-calling capability used for summaries |
//! | [`logging`] | Tracing capture layer and CLI subscriber setup |
//! | [`error`] | Configuration and history errors |

pub mod content;
pub mod context;
pub mod error;
pub mod history;
pub mod logging;
pub mod model;
pub mod prelude;
pub mod tokens;

pub use content::{ContentBlock, Conversation, Turn};
pub use context::{ContextManager, ContextManagerExt};
pub use error::{ConfigError, HistoryError};
pub use history::MessageHistory;
pub use tokens::{CharRatioCounter, TokenCounter};
