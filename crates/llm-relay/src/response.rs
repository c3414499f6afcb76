//! The final, non-streaming view of a response.
//!
//! An [`AggregateResponse`] is built up by an adapter's assembler while
//! events are delivered, and handed to the caller only once the stream
//! has finished cleanly.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::adapter::check_index;
use crate::error::LlmError;
use crate::event::ToolCall;
use crate::usage::Usage;

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum StopReason {
    /// The model finished its turn naturally.
    EndTurn,
    /// The model wants to call one or more tools.
    ToolUse,
    /// Output hit the token limit.
    MaxTokens,
    /// A caller-supplied stop sequence matched.
    StopSequence,
    /// The vendor filtered or refused the output.
    ContentFilter,
    /// A reason this crate does not know about, verbatim.
    Other(String),
}

impl StopReason {
    /// Maps a vendor finish/stop string onto a [`StopReason`].
    pub fn from_vendor(reason: &str) -> Self {
        match reason {
            "stop" | "end_turn" => Self::EndTurn,
            "tool_calls" | "function_call" | "tool_use" => Self::ToolUse,
            "length" | "max_tokens" => Self::MaxTokens,
            "stop_sequence" => Self::StopSequence,
            "content_filter" | "refusal" => Self::ContentFilter,
            other => {
                warn!(reason = other, "Unknown finish reason");
                Self::Other(other.to_owned())
            }
        }
    }
}

/// One choice of a response: its text, reasoning and tool calls.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Choice {
    /// Position of this choice in the response.
    pub index: usize,
    /// Accumulated answer text.
    pub content: String,
    /// Accumulated reasoning text.
    pub reasoning_content: String,
    /// Completed tool calls, in position order.
    pub tool_calls: Vec<ToolCall>,
    /// The last non-empty finish reason the vendor sent.
    pub finish_reason: Option<String>,
}

impl Choice {
    /// Records a finish reason. Empty values never erase an earlier one.
    pub fn set_finish_reason(&mut self, reason: Option<&str>) {
        if let Some(reason) = reason.filter(|r| !r.is_empty()) {
            self.finish_reason = Some(reason.to_owned());
        }
    }

    /// The finish reason mapped onto [`StopReason`].
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.finish_reason.as_deref().map(StopReason::from_vendor)
    }

    /// Returns `true` if the choice ended by requesting tools.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// The complete result of one streamed (or non-streamed) call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AggregateResponse {
    /// Vendor message id, when one was sent.
    pub id: Option<String>,
    /// Model that produced the response, when reported.
    pub model: Option<String>,
    /// Choices, addressable by their index.
    pub choices: Vec<Choice>,
    /// Token usage.
    pub usage: Usage,
}

impl AggregateResponse {
    /// Creates an empty response.
    pub fn new() -> Self {
        Self::default()
    }

    /// The choice at `index`, growing the list to cover it.
    ///
    /// The list never shrinks; gaps are filled with empty choices that
    /// carry their own index.
    ///
    /// # Errors
    ///
    /// [`LlmError::ResponseFormat`] if `index` is above
    /// [`MAX_INDEX`](crate::adapter::MAX_INDEX).
    pub fn choice_mut(&mut self, index: usize) -> Result<&mut Choice, LlmError> {
        let index = check_index(index, "choice")?;
        if self.choices.len() <= index {
            let start = self.choices.len();
            self.choices.extend((start..=index).map(|index| Choice {
                index,
                ..Choice::default()
            }));
        }
        Ok(&mut self.choices[index])
    }

    /// The choice at `index`, if any.
    pub fn choice(&self, index: usize) -> Option<&Choice> {
        self.choices.get(index)
    }

    /// Text of the first choice, or `""`.
    pub fn text(&self) -> &str {
        self.choices.first().map_or("", |c| c.content.as_str())
    }

    /// Records `id` and `model` unless already known.
    pub fn set_identity(&mut self, id: Option<&str>, model: Option<&str>) {
        if self.id.is_none() {
            self.id = id.filter(|s| !s.is_empty()).map(str::to_owned);
        }
        if self.model.is_none() {
            self.model = model.filter(|s| !s.is_empty()).map(str::to_owned);
        }
    }
}
