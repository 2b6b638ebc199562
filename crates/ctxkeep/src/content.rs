//! Content blocks: the atomic units a conversation turn is made of.
//!
//! A [`Turn`] is an ordered list of [`ContentBlock`]s produced by one actor
//! in one step, and a [`Conversation`] is the ordered list of turns, oldest
//! first. Blocks are plain data; the only behavior here is serialization and
//! a few accessors used by token accounting and the tool-call integrity
//! filter.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// One atomic step of the dialog. Never empty once appended to a history.
pub type Turn = Vec<ContentBlock>;

/// The full ordered sequence of turns. Index 0 is the oldest.
pub type Conversation = Vec<Turn>;

// ── Images ─────────────────────────────────────────────────────────

/// Source of an image block (Anthropic-style `source` object).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ImageSource {
    /// Encoding of `data`, usually `"base64"`.
    #[serde(rename = "type")]
    pub source_type: String,
    pub media_type: String,
    pub data: String,
}

impl ImageSource {
    pub fn base64(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            source_type: "base64".into(),
            media_type: media_type.into(),
            data: data.into(),
        }
    }
}

// ── Tool output ────────────────────────────────────────────────────

/// A single part of a structured tool output.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputPart {
    Text { text: String },
    Image { source: ImageSource },
}

/// Output of a tool: either plain text or an ordered list of text/image parts.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum ToolOutput {
    Text(String),
    Parts(Vec<OutputPart>),
}

impl ToolOutput {
    /// The text form used for token counting: plain text verbatim, part lists
    /// as compact JSON.
    pub fn serialized(&self) -> Result<Cow<'_, str>, serde_json::Error> {
        match self {
            ToolOutput::Text(text) => Ok(Cow::Borrowed(text)),
            ToolOutput::Parts(parts) => serde_json::to_string(parts).map(Cow::Owned),
        }
    }
}

impl From<String> for ToolOutput {
    fn from(text: String) -> Self {
        ToolOutput::Text(text)
    }
}

impl From<&str> for ToolOutput {
    fn from(text: &str) -> Self {
        ToolOutput::Text(text.to_string())
    }
}

impl fmt::Display for ToolOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolOutput::Text(text) => f.write_str(text),
            ToolOutput::Parts(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str("\n")?;
                    }
                    match part {
                        OutputPart::Text { text } => f.write_str(text)?,
                        OutputPart::Image { source } => write!(f, "[image {}]", source.media_type)?,
                    }
                }
                Ok(())
            }
        }
    }
}

// ── Content blocks ─────────────────────────────────────────────────

/// The tagged union of everything a turn can contain.
///
/// Serialized with an internal `"type"` tag. Any tag this crate does not know
/// deserializes to [`ContentBlock::Unknown`] instead of failing, so a new
/// block kind from upstream can never break token counting or truncation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Text authored by the user.
    TextPrompt { text: String },
    /// Text authored by the assistant.
    TextResult { text: String },
    /// A tool invocation requested by the assistant.
    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// The result of a tool invocation, sent back on the user side.
    ToolResult {
        call_id: String,
        name: String,
        output: ToolOutput,
    },
    Image { source: ImageSource },
    /// Visible extended-thinking text.
    Thinking {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    /// Opaque, provider-encrypted thinking.
    RedactedThinking { data: String },
    #[serde(other)]
    Unknown,
}

impl ContentBlock {
    pub fn prompt(text: impl Into<String>) -> Self {
        ContentBlock::TextPrompt { text: text.into() }
    }

    pub fn result(text: impl Into<String>) -> Self {
        ContentBlock::TextResult { text: text.into() }
    }

    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        ContentBlock::ToolCall {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    pub fn tool_result(
        call_id: impl Into<String>,
        name: impl Into<String>,
        output: impl Into<ToolOutput>,
    ) -> Self {
        ContentBlock::ToolResult {
            call_id: call_id.into(),
            name: name.into(),
            output: output.into(),
        }
    }

    pub fn image(source: ImageSource) -> Self {
        ContentBlock::Image { source }
    }

    pub fn thinking(text: impl Into<String>) -> Self {
        ContentBlock::Thinking {
            text: text.into(),
            signature: None,
        }
    }

    pub fn redacted_thinking(data: impl Into<String>) -> Self {
        ContentBlock::RedactedThinking { data: data.into() }
    }

    /// Stable kind name, used in log lines, errors, and summary prompts.
    pub fn kind(&self) -> &'static str {
        match self {
            ContentBlock::TextPrompt { .. } => "TextPrompt",
            ContentBlock::TextResult { .. } => "TextResult",
            ContentBlock::ToolCall { .. } => "ToolCall",
            ContentBlock::ToolResult { .. } => "ToolResult",
            ContentBlock::Image { .. } => "ImageBlock",
            ContentBlock::Thinking { .. } => "VisibleThinking",
            ContentBlock::RedactedThinking { .. } => "RedactedThinking",
            ContentBlock::Unknown => "Unknown",
        }
    }

    /// Whether this block may appear in a user-side turn.
    pub fn is_user_block(&self) -> bool {
        matches!(
            self,
            ContentBlock::TextPrompt { .. }
                | ContentBlock::ToolResult { .. }
                | ContentBlock::Image { .. }
        )
    }

    /// Whether this block may appear in an assistant turn.
    pub fn is_assistant_block(&self) -> bool {
        matches!(
            self,
            ContentBlock::TextResult { .. }
                | ContentBlock::ToolCall { .. }
                | ContentBlock::Thinking { .. }
                | ContentBlock::RedactedThinking { .. }
        )
    }

    /// The call id if this is a [`ContentBlock::ToolCall`].
    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            ContentBlock::ToolCall { id, .. } => Some(id),
            _ => None,
        }
    }

    /// The referenced call id if this is a [`ContentBlock::ToolResult`].
    pub fn result_call_id(&self) -> Option<&str> {
        match self {
            ContentBlock::ToolResult { call_id, .. } => Some(call_id),
            _ => None,
        }
    }

    pub fn is_tool_call(&self) -> bool {
        matches!(self, ContentBlock::ToolCall { .. })
    }

    pub fn is_tool_result(&self) -> bool {
        matches!(self, ContentBlock::ToolResult { .. })
    }
}

/// Short human-readable rendering. Text kinds print their text verbatim;
/// images never print their payload.
impl fmt::Display for ContentBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentBlock::TextPrompt { text }
            | ContentBlock::TextResult { text }
            | ContentBlock::Thinking { text, .. } => f.write_str(text),
            ContentBlock::ToolCall { id, name, input } => {
                write!(f, "{name}({input}) [id={id}]")
            }
            ContentBlock::ToolResult {
                call_id,
                name,
                output,
            } => write!(f, "{name} [id={call_id}] -> {output}"),
            ContentBlock::Image { source } => write!(
                f,
                "image ({}, {} bytes of {} data)",
                source.media_type,
                source.data.len(),
                source.source_type
            ),
            ContentBlock::RedactedThinking { .. } => f.write_str("[redacted thinking]"),
            ContentBlock::Unknown => f.write_str("[unrecognized block]"),
        }
    }
}

// ── Tool call parameters ───────────────────────────────────────────

/// A tool call awaiting its result, as returned by
/// [`MessageHistory::pending_tool_calls`](crate::history::MessageHistory::pending_tool_calls).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ToolCallParameters {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

impl ToolCallParameters {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}
