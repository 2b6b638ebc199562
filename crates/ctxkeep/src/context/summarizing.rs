//! LLM summarization of the forgotten middle.
//!
//! Same head/tail retention as [`AmortizedForgetting`](super::AmortizedForgetting),
//! but the dropped turns are folded into one synthetic summary turn placed
//! right after the head. The summary is anchored: each pass hands the model
//! the previous summary plus the newly forgotten turns, so the history is
//! never re-summarized from scratch.

use super::{ContextManager, TokenAccounting, window::RetentionWindow};
use crate::content::{ContentBlock, Conversation, Turn};
use crate::model::{GenerateRequest, ModelCaller};
use crate::tokens::TokenCounter;
use std::borrow::Cow;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Prefix of the text of every summary turn. Also how a previous summary is
/// recognized on the next pass.
pub const SUMMARY_MARKER: &str = "Conversation Summary: ";

/// Stand-in for "there is no previous summary yet".
pub const NO_PREVIOUS_SUMMARY: &str = "No events summarized";

/// Appended to any event or summary cut at `max_event_length` characters.
pub const TRUNCATION_SUFFIX: &str = "... [truncated]";

pub const DEFAULT_MAX_EVENT_LENGTH: usize = 10_000;
pub const DEFAULT_MAX_SUMMARY_TOKENS: u32 = 4000;

/// Instructions sent ahead of the previous summary and the forgotten events.
const SUMMARIZATION_PROMPT: &str = "\
You keep a running state summary for an interactive agent. Below you will find \
the previous summary (possibly empty) and a numbered list of events the agent \
is about to forget. Merge them into one updated summary that tracks:

USER_CONTEXT: the user's requirements, goals, and clarifications, kept short
COMPLETED: tasks finished so far, with a brief result for each
PENDING: tasks still to do
CURRENT_STATE: variables, data structures, or other state that matters now

For coding work, also track:
CODE_STATE: file paths, function signatures, data structures
TESTS: failing cases, error messages, relevant output
CHANGES: edits made to code or variables
DEPS: dependencies, imports, external calls
VERSION_CONTROL_STATUS: branch, commits, pull request state

Priorities, most important first:
1. Fit the format to the kind of task at hand.
2. Keep the user's requirements and goals.
3. Keep completed and pending work clearly apart.
4. Stay short; every section must earn its place.

Leave out anything that does not matter for the current task.

Example, coding task:
USER_CONTEXT: Fix lossy float formatting in FITS header cards
COMPLETED: Rewrote mod_float() in card.py; full test suite green
PENDING: Open a PR, update the docs
CODE_STATE: card.py mod_float() now uses str(val)
TESTS: test_format() passes
CHANGES: f\"{val:.16G}\" replaced with str(val)
DEPS: unchanged
VERSION_CONTROL_STATUS: branch fix-float-precision, head a1b2c3d

Example, non-coding task:
USER_CONTEXT: One haiku per coin flip, 20 flips in total
COMPLETED: 15 haikus for flips [T,H,T,H,T,H,T,T,H,T,H,T,H,T,H]
PENDING: 5 haikus left
CURRENT_STATE: last flip heads, 15/20 done

";

const CLOSING_INSTRUCTION: &str = "\nNow summarize the events using the rules above.";

/// Keeps head and tail, summarizing everything in between with one model call.
pub struct LlmSummarizing {
    model: Arc<dyn ModelCaller>,
    accounting: TokenAccounting,
    window: RetentionWindow,
    max_event_length: usize,
    max_summary_tokens: u32,
}

impl LlmSummarizing {
    pub fn new(
        model: Arc<dyn ModelCaller>,
        counter: Arc<dyn TokenCounter>,
        window: RetentionWindow,
    ) -> Self {
        Self {
            model,
            accounting: TokenAccounting::new(counter),
            window,
            max_event_length: DEFAULT_MAX_EVENT_LENGTH,
            max_summary_tokens: DEFAULT_MAX_SUMMARY_TOKENS,
        }
    }

    pub fn with_token_budget(mut self, token_budget: usize) -> Self {
        self.accounting = self.accounting.with_token_budget(token_budget);
        self
    }

    /// Character cap applied to the previous summary and to each event.
    pub fn with_max_event_length(mut self, max_event_length: usize) -> Self {
        self.max_event_length = max_event_length;
        self
    }

    /// Output token cap for the summary request.
    pub fn with_max_summary_tokens(mut self, max_summary_tokens: u32) -> Self {
        self.max_summary_tokens = max_summary_tokens;
        self
    }

    pub fn window(&self) -> RetentionWindow {
        self.window
    }

    /// The previous summary if `turn` is a summary turn.
    fn previous_summary(turn: &Turn) -> Option<&str> {
        match turn.as_slice() {
            [ContentBlock::TextPrompt { text }] => text
                .strip_prefix(SUMMARY_MARKER.trim_end())
                .map(|rest| rest.strip_prefix(' ').unwrap_or(rest)),
            _ => None,
        }
    }

    fn truncate_content<'a>(&self, content: &'a str) -> Cow<'a, str> {
        match content.char_indices().nth(self.max_event_length) {
            Some((cut, _)) => {
                let kept = content.get(..cut).unwrap_or(content);
                Cow::Owned(format!("{kept}{TRUNCATION_SUFFIX}"))
            }
            None => Cow::Borrowed(content),
        }
    }

    fn build_prompt(&self, previous: &str, forgotten: &[Turn]) -> String {
        let mut prompt = String::from(SUMMARIZATION_PROMPT);
        let previous = if previous == NO_PREVIOUS_SUMMARY {
            ""
        } else {
            previous
        };
        let _ = write!(
            prompt,
            "<PREVIOUS SUMMARY>\n{}\n</PREVIOUS SUMMARY>\n\n",
            self.truncate_content(previous)
        );
        for (i, turn) in forgotten.iter().enumerate() {
            let event = flatten_turn(turn);
            let _ = write!(
                prompt,
                "<EVENT id={i}>\n{}\n</EVENT>\n",
                self.truncate_content(&event)
            );
        }
        prompt.push_str(CLOSING_INSTRUCTION);
        prompt
    }

    fn summarize(&self, previous: &str, forgotten: &[Turn]) -> String {
        let request = GenerateRequest {
            messages: vec![vec![ContentBlock::prompt(
                self.build_prompt(previous, forgotten),
            )]],
            max_tokens: self.max_summary_tokens,
            thinking_tokens: 0,
        };

        match self.model.generate(&request) {
            Ok(blocks) => {
                let summary: String = blocks
                    .iter()
                    .filter_map(|block| match block {
                        ContentBlock::TextResult { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect();
                info!("Generated summary for {} forgotten events", forgotten.len());
                summary
            }
            Err(e) => {
                error!("Failed to generate summary: {e}");
                format!(
                    "Failed to summarize {} events due to error: {e}",
                    forgotten.len()
                )
            }
        }
    }
}

/// Role-tagged plain-text rendering of one turn for the summary prompt.
fn flatten_turn(turn: &Turn) -> String {
    turn.iter()
        .map(|block| match block {
            ContentBlock::TextPrompt { text } => format!("USER: {text}"),
            ContentBlock::TextResult { text } => format!("ASSISTANT: {text}"),
            other => format!("{}: {other}", other.kind()),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

impl ContextManager for LlmSummarizing {
    fn name(&self) -> &'static str {
        "llm_summarizing"
    }

    fn accounting(&self) -> &TokenAccounting {
        &self.accounting
    }

    fn should_truncate(&self, turns: &[Turn]) -> bool {
        self.window.exceeded_by(turns.len()) || self.count_tokens(turns) > self.token_budget()
    }

    fn apply_truncation(&self, turns: Conversation) -> Conversation {
        let len = turns.len();
        let head = self.window.keep_first().min(len);
        let target_size = self.window.target_size(len);
        let from_tail = target_size.saturating_sub(head + 1);

        let (previous, summary_start) = match turns.get(head).and_then(Self::previous_summary) {
            Some(previous) => (previous, head + 1),
            None => (NO_PREVIOUS_SUMMARY, head),
        };
        let tail_start = len - from_tail;

        if summary_start >= tail_start {
            return turns;
        }
        if from_tail == 0 {
            warn!(
                "No room for recent events: keep_first ({head}) plus the summary fills the target size ({target_size}). Keeping only the head and a summary"
            );
        }

        let forgotten = &turns[summary_start..tail_start];
        let summary = self.summarize(previous, forgotten);

        let mut condensed = Vec::with_capacity(head + 1 + from_tail);
        condensed.extend_from_slice(&turns[..head]);
        condensed.push(vec![ContentBlock::prompt(format!("{SUMMARY_MARKER}{summary}"))]);
        condensed.extend_from_slice(&turns[tail_start..]);

        info!(
            "Condensed {len} turns to {} (kept {head} head + 1 summary + {from_tail} tail)",
            condensed.len()
        );
        condensed
    }
}
