//! The vendor-neutral event vocabulary.
//!
//! Every adapter reduces its wire format to a sequence of [`Event`]s.
//! An event has exactly one meaningful payload, selected by its
//! [`EventKind`]:
//!
//! | Kind | Payload |
//! |------|---------|
//! | [`Text`](Event::Text) | `content` |
//! | [`Reasoning`](Event::Reasoning) | `reasoning_content` |
//! | [`ToolCall`](Event::ToolCall) | `tool_call` (`id`, `name`, argument fragment) |
//! | [`Done`](Event::Done) | none |
//!
//! Callers receive events through an [`EventHandler`]. Any
//! `FnMut(Event) -> Result<(), LlmError>` closure is a handler; returning
//! an error from it aborts the remaining stream.
//!
//! The `emit_*` helpers are no-ops for empty payloads and for a missing
//! handler, so adapters can call them unconditionally.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LlmError;

/// Precondition failures when constructing an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    /// A tool-call event was built with an empty id.
    #[error("tool call event requires a non-empty id")]
    MissingId,
    /// A tool-call event was built with an empty name.
    #[error("tool call event requires a non-empty name")]
    MissingName,
}

/// A tool invocation, possibly still being assembled.
///
/// `arguments` holds raw JSON text. While a stream is in flight it may
/// be a partial document; [`parse_arguments`](Self::parse_arguments)
/// failing at that point just means "not yet".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned identifier.
    pub id: String,
    /// The name of the tool being called.
    pub name: String,
    /// JSON-object-shaped argument text.
    #[serde(default)]
    pub arguments: String,
}

impl ToolCall {
    /// Creates a tool call from its parts.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Returns `true` once both `id` and `name` are known.
    pub fn has_identity(&self) -> bool {
        !self.id.is_empty() && !self.name.is_empty()
    }

    /// Parses the accumulated arguments. Empty text parses as `{}`.
    pub fn parse_arguments(&self) -> Result<Value, serde_json::Error> {
        if self.arguments.trim().is_empty() {
            return Ok(Value::Object(serde_json::Map::new()));
        }
        serde_json::from_str(&self.arguments)
    }

    /// Returns `true` if the arguments currently form a complete JSON
    /// document.
    pub fn is_complete(&self) -> bool {
        self.parse_arguments().is_ok()
    }
}

/// Discriminant of an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Uninitialized value.
    #[default]
    None,
    /// Ordinary answer text.
    Text,
    /// Reasoning ("thinking") text.
    Reasoning,
    /// A tool-call fragment.
    ToolCall,
    /// End of stream.
    Done,
}

/// One unit of normalized stream output.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    /// Uninitialized value; never emitted by an adapter.
    #[default]
    None,
    /// A fragment of answer text.
    Text {
        /// The text fragment.
        content: String,
    },
    /// A fragment of reasoning text.
    Reasoning {
        /// The reasoning fragment.
        reasoning_content: String,
    },
    /// A tool-call fragment. `arguments` carries only this fragment.
    ToolCall {
        /// The call this fragment belongs to.
        tool_call: ToolCall,
    },
    /// The stream finished successfully.
    Done,
}

impl Event {
    /// Builds a text event.
    pub fn new_text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    /// Builds a reasoning event.
    pub fn new_reasoning(reasoning_content: impl Into<String>) -> Self {
        Self::Reasoning {
            reasoning_content: reasoning_content.into(),
        }
    }

    /// Builds a tool-call event.
    ///
    /// Fails if `id` or `name` is empty: downstream accumulation keys on
    /// both.
    pub fn new_tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Result<Self, EventError> {
        let tool_call = ToolCall::new(id, name, arguments);
        if tool_call.id.is_empty() {
            return Err(EventError::MissingId);
        }
        if tool_call.name.is_empty() {
            return Err(EventError::MissingName);
        }
        Ok(Self::ToolCall { tool_call })
    }

    /// Builds the end-of-stream event.
    pub fn new_done() -> Self {
        Self::Done
    }

    /// Returns this event's kind.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::None => EventKind::None,
            Self::Text { .. } => EventKind::Text,
            Self::Reasoning { .. } => EventKind::Reasoning,
            Self::ToolCall { .. } => EventKind::ToolCall,
            Self::Done => EventKind::Done,
        }
    }

    /// The text payload, or `""` for other kinds.
    pub fn content(&self) -> &str {
        match self {
            Self::Text { content } => content,
            _ => "",
        }
    }

    /// The reasoning payload, or `""` for other kinds.
    pub fn reasoning_content(&self) -> &str {
        match self {
            Self::Reasoning { reasoning_content } => reasoning_content,
            _ => "",
        }
    }

    /// The tool-call payload, if this is a tool-call event.
    pub fn tool_call(&self) -> Option<&ToolCall> {
        match self {
            Self::ToolCall { tool_call } => Some(tool_call),
            _ => None,
        }
    }
}

/// Receives events one at a time, in delivery order.
///
/// Returning an error stops the stream; the pipeline surfaces that error
/// to the caller unchanged.
pub trait EventHandler: Send {
    /// Handles one event.
    fn handle(&mut self, event: Event) -> Result<(), LlmError>;
}

impl<F> EventHandler for F
where
    F: FnMut(Event) -> Result<(), LlmError> + Send,
{
    fn handle(&mut self, event: Event) -> Result<(), LlmError> {
        self(event)
    }
}

/// Delivers a text event unless `text` is empty or there is no handler.
pub fn emit_if_text(
    handler: Option<&mut (dyn EventHandler + '_)>,
    text: &str,
) -> Result<(), LlmError> {
    match handler {
        Some(handler) if !text.is_empty() => handler.handle(Event::new_text(text)),
        _ => Ok(()),
    }
}

/// Delivers a reasoning event unless `reasoning` is empty or there is no
/// handler.
pub fn emit_if_reasoning(
    handler: Option<&mut (dyn EventHandler + '_)>,
    reasoning: &str,
) -> Result<(), LlmError> {
    match handler {
        Some(handler) if !reasoning.is_empty() => {
            handler.handle(Event::new_reasoning(reasoning))
        }
        _ => Ok(()),
    }
}

/// Delivers a tool-call fragment event if there is a handler.
pub fn emit_tool_call(
    handler: Option<&mut (dyn EventHandler + '_)>,
    call: &ToolCall,
    fragment: &str,
) -> Result<(), LlmError> {
    let Some(handler) = handler else {
        return Ok(());
    };
    let event = Event::new_tool_call(call.id.as_str(), call.name.as_str(), fragment)?;
    handler.handle(event)
}

/// Delivers the end-of-stream event if there is a handler.
pub fn emit_done(handler: Option<&mut (dyn EventHandler + '_)>) -> Result<(), LlmError> {
    match handler {
        Some(handler) => handler.handle(Event::new_done()),
        None => Ok(()),
    }
}

/// Merges a fragment into an accumulating call.
///
/// `id` and `name` are overwritten unconditionally and `arguments` is
/// appended. Callers that need set-once identity must gate the call.
pub fn append_tool_call(src: &ToolCall, dst: &mut ToolCall) {
    dst.id.clone_from(&src.id);
    dst.name.clone_from(&src.name);
    dst.arguments.push_str(&src.arguments);
}
