//! The ordered turns of one conversation.
//!
//! [`MessageHistory`] is what an agent loop talks to: it appends user and
//! assistant turns, hands tool calls out and takes their results back, and
//! asks its injected [`ContextManager`] to shrink the conversation when it
//! gets too big. Every wholesale replacement of the turns (truncation or
//! [`set_turns`](MessageHistory::set_turns)) goes through
//! [`ensure_tool_call_integrity`], so a tool call never survives without its
//! result or the other way round.

use crate::content::{ContentBlock, Conversation, ImageSource, ToolCallParameters, ToolOutput, Turn};
use crate::context::{ContextManager, ContextManagerExt};
use crate::error::HistoryError;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct MessageHistory {
    context_manager: Arc<dyn ContextManager>,
    turns: Conversation,
    last_user_prompt: Option<usize>,
}

impl MessageHistory {
    pub fn new(context_manager: Arc<dyn ContextManager>) -> Self {
        Self {
            context_manager,
            turns: Vec::new(),
            last_user_prompt: None,
        }
    }

    pub fn context_manager(&self) -> &Arc<dyn ContextManager> {
        &self.context_manager
    }

    /// Append a user prompt, preceded by any attached images, and remember
    /// it as the latest prompt for [`rewind_to_last_user_prompt`](Self::rewind_to_last_user_prompt).
    pub fn add_user_prompt(&mut self, prompt: impl Into<String>, images: Vec<ImageSource>) {
        let mut turn: Turn = images.into_iter().map(ContentBlock::image).collect();
        turn.push(ContentBlock::prompt(prompt));
        self.turns.push(turn);
        self.last_user_prompt = Some(self.turns.len() - 1);
    }

    /// Append a user-side turn: prompts, tool results, and images only.
    pub fn add_user_turn(&mut self, blocks: Turn) -> Result<(), HistoryError> {
        if blocks.is_empty() {
            return Err(HistoryError::EmptyTurn);
        }
        if let Some(bad) = blocks.iter().find(|b| !b.is_user_block()) {
            return Err(HistoryError::InvalidUserBlock { kind: bad.kind() });
        }
        self.turns.push(blocks);
        Ok(())
    }

    /// Append an assistant turn. Only the first tool call is kept; any
    /// further calls are dropped with a warning.
    pub fn add_assistant_turn(&mut self, blocks: Turn) -> Result<(), HistoryError> {
        if blocks.is_empty() {
            return Err(HistoryError::EmptyTurn);
        }
        if let Some(bad) = blocks.iter().find(|b| !b.is_assistant_block()) {
            return Err(HistoryError::InvalidAssistantBlock { kind: bad.kind() });
        }

        let mut seen_call = false;
        let turn: Turn = blocks
            .into_iter()
            .filter(|block| {
                if !block.is_tool_call() {
                    return true;
                }
                if seen_call {
                    warn!(
                        "Multiple tool calls in one turn are not supported, dropping {}",
                        block
                    );
                    return false;
                }
                seen_call = true;
                true
            })
            .collect();
        self.turns.push(turn);
        Ok(())
    }

    /// Tool calls in the last turn, waiting for results.
    pub fn pending_tool_calls(&self) -> Vec<ToolCallParameters> {
        let Some(last) = self.turns.last() else {
            return Vec::new();
        };
        last.iter()
            .filter_map(|block| match block {
                ContentBlock::ToolCall { id, name, input } => {
                    Some(ToolCallParameters::new(id.clone(), name.clone(), input.clone()))
                }
                _ => None,
            })
            .collect()
    }

    pub fn add_tool_call_result(
        &mut self,
        call: &ToolCallParameters,
        output: impl Into<ToolOutput>,
    ) -> Result<(), HistoryError> {
        self.add_tool_call_results(std::slice::from_ref(call), vec![output.into()])
    }

    /// Append one turn holding a result for each call, in order.
    pub fn add_tool_call_results(
        &mut self,
        calls: &[ToolCallParameters],
        outputs: Vec<ToolOutput>,
    ) -> Result<(), HistoryError> {
        if calls.len() != outputs.len() {
            return Err(HistoryError::ResultCountMismatch {
                calls: calls.len(),
                results: outputs.len(),
            });
        }
        if calls.is_empty() {
            return Err(HistoryError::EmptyTurn);
        }
        let turn = calls
            .iter()
            .zip(outputs)
            .map(|(call, output)| ContentBlock::ToolResult {
                call_id: call.id.clone(),
                name: call.name.clone(),
                output,
            })
            .collect();
        self.turns.push(turn);
        Ok(())
    }

    /// The conversation as it should be sent to the model.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Text of the last assistant text block in the last turn, if any.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.turns.last()?.iter().rev().find_map(|block| match block {
            ContentBlock::TextResult { text } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn count_tokens(&self) -> usize {
        self.context_manager.count_tokens(&self.turns)
    }

    /// Let the context manager shrink the conversation if it needs to, then
    /// repair tool-call pairing.
    pub fn truncate(&mut self) {
        let truncated = self
            .context_manager
            .apply_truncation_if_needed(self.turns.clone());
        self.replace(truncated);
    }

    /// Replace every turn, dropping unpaired tool calls and results.
    pub fn set_turns(&mut self, turns: Conversation) {
        self.replace(turns);
    }

    /// Swap in `turns` and carry the last-user-prompt marker over.
    ///
    /// Strategies keep the newest turns contiguous, so the marker survives
    /// only if the marked turn and everything after it still end the
    /// conversation. Matching by content alone could land on an older copy
    /// of the same prompt; anything short of a full suffix match clears it.
    fn replace(&mut self, turns: Conversation) {
        let marked = self.last_user_prompt.and_then(|i| {
            let suffix = self.turns.get(i..)?;
            turns
                .ends_with(suffix)
                .then(|| turns.len() - suffix.len())
        });
        let (turns, marked) = retain_paired(turns, marked);
        if self.last_user_prompt.is_some() && marked.is_none() {
            debug!("Last user prompt did not survive replacement, clearing rewind marker");
        }
        self.turns = turns;
        self.last_user_prompt = marked;
    }

    pub fn clear(&mut self) {
        self.turns.clear();
        self.last_user_prompt = None;
    }

    /// Drop the latest prompt added with
    /// [`add_user_prompt`](Self::add_user_prompt) and everything after it.
    /// Does nothing if there is no such prompt.
    pub fn rewind_to_last_user_prompt(&mut self) {
        let Some(index) = self.last_user_prompt.take() else {
            return;
        };
        debug!(
            "Rewinding history from {} turns to {index}",
            self.turns.len()
        );
        self.turns.truncate(index);
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Pretty JSON of the history with every string longer than
    /// `max_str_len` characters cut short and suffixed with `...`.
    pub fn summary(&self, max_str_len: usize) -> String {
        match serde_json::to_value(&self.turns) {
            Ok(mut value) => {
                shorten_strings(&mut value, max_str_len);
                serde_json::to_string_pretty(&value)
                    .unwrap_or_else(|e| format!("[Error serializing summary: {e}]"))
            }
            Err(e) => format!("[Error serializing summary: {e}]"),
        }
    }
}

impl fmt::Display for MessageHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string_pretty(&self.turns) {
            Ok(json) => f.write_str(&json),
            Err(e) => write!(f, "[Error serializing history: {e}]"),
        }
    }
}

impl fmt::Debug for MessageHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageHistory")
            .field("context_manager", &self.context_manager.name())
            .field("turns", &self.turns.len())
            .field("last_user_prompt", &self.last_user_prompt)
            .finish()
    }
}

fn shorten_strings(value: &mut Value, max_len: usize) {
    match value {
        Value::String(s) => {
            if let Some((cut, _)) = s.char_indices().nth(max_len) {
                s.truncate(cut);
                s.push_str("...");
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| shorten_strings(v, max_len)),
        Value::Object(map) => map.values_mut().for_each(|v| shorten_strings(v, max_len)),
        _ => {}
    }
}

/// Drop every tool call without a matching result and every tool result
/// without a matching call. Afterwards each remaining call id has exactly one
/// result and each result exactly one call; later duplicates of either side
/// are dropped.
///
/// - Turns containing tool calls keep their paired calls and results plus
///   all other blocks. They disappear only if nothing is left.
/// - Turns containing tool results (and no calls) keep only paired results,
///   and disappear if none are left.
/// - Every other turn is kept as is.
pub fn ensure_tool_call_integrity(turns: Conversation) -> Conversation {
    retain_paired(turns, None).0
}

/// [`ensure_tool_call_integrity`] that also reports where the turn at
/// `marked` ended up, or `None` if it was dropped.
fn retain_paired(turns: Conversation, marked: Option<usize>) -> (Conversation, Option<usize>) {
    let call_ids: HashSet<&str> = turns
        .iter()
        .flatten()
        .filter_map(ContentBlock::tool_call_id)
        .collect();
    let result_ids: HashSet<&str> = turns
        .iter()
        .flatten()
        .filter_map(ContentBlock::result_call_id)
        .collect();
    let valid: HashSet<String> = call_ids
        .intersection(&result_ids)
        .map(|id| id.to_string())
        .collect();

    let before = turns.len();
    let mut seen_calls: HashSet<String> = HashSet::new();
    let mut seen_results: HashSet<String> = HashSet::new();
    let mut dropped_blocks = 0;
    let mut new_marked = None;
    let mut cleaned = Conversation::with_capacity(before);

    for (index, turn) in turns.into_iter().enumerate() {
        let has_calls = turn.iter().any(ContentBlock::is_tool_call);
        let has_results = turn.iter().any(ContentBlock::is_tool_result);
        let kept: Turn = if !has_calls && !has_results {
            turn
        } else {
            let len = turn.len();
            let kept: Turn = turn
                .into_iter()
                .filter(|block| {
                    if let Some(id) = block.tool_call_id() {
                        valid.contains(id) && seen_calls.insert(id.to_string())
                    } else if let Some(id) = block.result_call_id() {
                        valid.contains(id) && seen_results.insert(id.to_string())
                    } else {
                        has_calls
                    }
                })
                .collect();
            dropped_blocks += len - kept.len();
            if kept.is_empty() {
                continue;
            }
            kept
        };
        if marked == Some(index) {
            new_marked = Some(cleaned.len());
        }
        cleaned.push(kept);
    }

    if dropped_blocks > 0 {
        debug!(
            "Tool-call integrity: dropped {dropped_blocks} unpaired blocks, {} -> {} turns",
            before,
            cleaned.len()
        );
    }
    (cleaned, new_marked)
}
