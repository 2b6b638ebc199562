//! Convenience re-exports for common `ctxkeep` types.
//!
//! ```
//! use ctxkeep::prelude::*;
//! ```
//!
//! Covers what an agent loop needs to keep a history bounded: content
//! blocks, token counters, the strategies and their trait, the model
//! capability, and [`MessageHistory`]. Strategy internals (accounting,
//! config structs, prompt constants) stay in their modules.

// ── Conversation data ───────────────────────────────────────────────
pub use crate::content::{
    ContentBlock, Conversation, ImageSource, OutputPart, ToolCallParameters, ToolOutput, Turn,
};

// ── Token counting ──────────────────────────────────────────────────
pub use crate::tokens::{CharRatioCounter, TokenCounter};

// ── Context management ──────────────────────────────────────────────
pub use crate::context::{
    AmortizedForgetting, ContextManager, ContextManagerExt, LlmSummarizing, Pipeline,
    RetentionWindow, StrategyConfig,
};

// ── Models ──────────────────────────────────────────────────────────
pub use crate::model::{CommandModelCaller, FnModelCaller, GenerateRequest, ModelCaller};

// ── History and errors ──────────────────────────────────────────────
pub use crate::error::{ConfigError, HistoryError};
pub use crate::history::MessageHistory;
