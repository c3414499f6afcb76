//! Indexed content-block stream protocol for the Anthropic Messages API.
//!
//! The stream opens a message, then opens, extends and closes content
//! blocks addressed by index, then closes the message:
//!
//! ```text
//! message_start
//!   content_block_start(0, text)  content_block_delta(0, text_delta)*  content_block_stop(0)
//!   content_block_start(1, tool_use)  content_block_delta(1, input_json_delta)*  content_block_stop(1)
//! message_delta(stop_reason, usage)
//! message_stop
//! ```
//!
//! [`BlockAssembler`] keeps one [`ContentBlock`] slot per index. Tool
//! input is parsed when its block stops; invalid JSON fails the stream
//! with [`LlmError::ToolArguments`], and a delta or stop for an index
//! that was never started fails it with [`LlmError::UnknownBlock`].
//!
//! A body that is not SSE is parsed as one complete `message` (or a
//! top-level `error`) and finalized the same way as `message_stop`.

use llm_relay::adapter::{Assembler, Decoded, FrameDecoder, Progress, Protocol, check_index};
use llm_relay::error::LlmError;
use llm_relay::event::{
    EventHandler, ToolCall, emit_done, emit_if_reasoning, emit_if_text, emit_tool_call,
};
use llm_relay::response::AggregateResponse;
use llm_relay::sse::{Line, RawBody, classify, parse_object};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::convert::{convert_stream_error, merge_usage};
use crate::types::{BlockDelta, ErrorResponse, Response, StreamEvent, WireBlock};

/// The Anthropic-compatible wire protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicProtocol;

impl Protocol for AnthropicProtocol {
    type Frame = AnthropicFrame;
    type Decoder = AnthropicDecoder;
    type Assembler = BlockAssembler;

    fn decoder(&self) -> AnthropicDecoder {
        AnthropicDecoder::default()
    }

    fn assembler(&self) -> BlockAssembler {
        BlockAssembler::default()
    }
}

/// One decoded Anthropic frame.
#[derive(Debug)]
pub struct AnthropicFrame(FrameKind);

#[derive(Debug)]
enum FrameKind {
    Event(StreamEvent),
    Complete(Response),
}

/// Decodes `data:` lines into stream events and raw bodies into
/// complete messages.
#[derive(Debug, Default)]
pub struct AnthropicDecoder {
    raw: RawBody,
}

impl AnthropicDecoder {
    fn complete(value: Value) -> Result<AnthropicFrame, LlmError> {
        let raw = value.to_string();
        if value.get("type").and_then(Value::as_str) == Some("error") {
            let body: ErrorResponse =
                serde_json::from_value(value).map_err(|e| LlmError::ResponseFormat {
                    message: format!("Failed to parse Anthropic error body: {e}"),
                    raw,
                })?;
            return Err(convert_stream_error(body.error));
        }
        let response: Response =
            serde_json::from_value(value).map_err(|e| LlmError::ResponseFormat {
                message: format!("Failed to parse Anthropic response: {e}"),
                raw,
            })?;
        Ok(AnthropicFrame(FrameKind::Complete(response)))
    }
}

impl FrameDecoder for AnthropicDecoder {
    type Frame = AnthropicFrame;

    fn decode_line(&mut self, line: &str) -> Result<Option<Decoded<AnthropicFrame>>, LlmError> {
        match classify(line) {
            Line::Blank | Line::Comment | Line::Field => Ok(None),
            Line::Done => Ok(Some(Decoded::End)),
            Line::Data(payload) => {
                let Some(value) = parse_object(payload) else {
                    debug!(payload, "Skipping malformed data line");
                    return Ok(None);
                };
                let event: StreamEvent =
                    serde_json::from_value(value).map_err(|e| LlmError::ResponseFormat {
                        message: format!("Failed to parse Anthropic stream event: {e}"),
                        raw: payload.to_owned(),
                    })?;
                Ok(Some(Decoded::Frame(AnthropicFrame(FrameKind::Event(event)))))
            }
            Line::Raw(line) => match self.raw.push(line)? {
                Some(value) => Self::complete(value).map(|frame| Some(Decoded::Frame(frame))),
                None => Ok(None),
            },
        }
    }

    fn finish(&mut self) -> Result<Option<Decoded<AnthropicFrame>>, LlmError> {
        if !self.raw.is_empty() {
            debug!(raw = %self.raw.take(), "Discarding incomplete response body");
        }
        Ok(None)
    }
}

/// One content block of a message.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ContentBlock {
    /// Answer text.
    Text(String),
    /// A tool invocation.
    ToolUse {
        /// The call, with its argument text as streamed.
        call: ToolCall,
        /// Parsed arguments, set once the block stops.
        input: Option<Value>,
    },
    /// Extended thinking.
    Thinking {
        /// The reasoning text.
        thinking: String,
        /// Integrity signature; never emitted as an event.
        signature: String,
    },
    /// Thinking the vendor returned encrypted.
    RedactedThinking {
        /// Opaque payload.
        data: String,
    },
}

impl ContentBlock {
    /// The wire tag of this block kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::ToolUse { .. } => "tool_use",
            Self::Thinking { .. } => "thinking",
            Self::RedactedThinking { .. } => "redacted_thinking",
        }
    }
}

impl From<WireBlock> for ContentBlock {
    fn from(block: WireBlock) -> Self {
        match block {
            WireBlock::Text { text } => Self::Text(text),
            WireBlock::ToolUse { id, name, input } => Self::ToolUse {
                call: ToolCall::new(id, name, ""),
                input,
            },
            WireBlock::Thinking {
                thinking,
                signature,
            } => Self::Thinking {
                thinking,
                signature,
            },
            WireBlock::RedactedThinking { data } => Self::RedactedThinking { data },
        }
    }
}

/// Builds an [`AggregateResponse`] from indexed content blocks.
///
/// The message maps onto a single choice: text blocks concatenate into
/// its content, thinking blocks into its reasoning, and tool-use blocks
/// become its tool calls, all in block-index order.
#[derive(Debug, Default)]
pub struct BlockAssembler {
    response: AggregateResponse,
    blocks: Vec<Option<ContentBlock>>,
    stop_reason: Option<String>,
}

impl BlockAssembler {
    /// The block at `index`, if it was started.
    pub fn block(&self, index: usize) -> Option<&ContentBlock> {
        self.blocks.get(index).and_then(Option::as_ref)
    }

    fn apply_event(
        &mut self,
        event: StreamEvent,
        handler: Option<&mut (dyn EventHandler + '_)>,
    ) -> Result<Progress, LlmError> {
        match event {
            StreamEvent::MessageStart { message } => {
                self.response
                    .set_identity(message.id.as_deref(), message.model.as_deref());
                if let Some(usage) = &message.usage {
                    merge_usage(usage, &mut self.response.usage);
                }
            }
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => start_block(&mut self.blocks, index, content_block.into(), handler)?,
            StreamEvent::ContentBlockDelta { index, delta } => {
                apply_delta(&mut self.blocks, index, delta, handler)?;
            }
            StreamEvent::ContentBlockStop { index } => stop_block(&mut self.blocks, index)?,
            StreamEvent::MessageDelta { delta, usage } => {
                if let Some(reason) = delta.stop_reason.filter(|r| !r.is_empty()) {
                    self.stop_reason = Some(reason);
                }
                if let Some(usage) = &usage {
                    merge_usage(usage, &mut self.response.usage);
                }
            }
            StreamEvent::MessageStop => return Ok(Progress::Finished),
            StreamEvent::Ping => {}
            StreamEvent::Error { error } => return Err(convert_stream_error(error)),
        }
        Ok(Progress::Continue)
    }

    fn apply_complete(
        &mut self,
        response: Response,
        mut handler: Option<&mut (dyn EventHandler + '_)>,
    ) -> Result<(), LlmError> {
        self.response
            .set_identity(response.id.as_deref(), response.model.as_deref());
        if let Some(usage) = &response.usage {
            merge_usage(usage, &mut self.response.usage);
        }

        for (index, block) in response.content.into_iter().enumerate() {
            start_block(&mut self.blocks, index, block.into(), handler.as_deref_mut())?;
            stop_block(&mut self.blocks, index)?;
            if let Some(ContentBlock::ToolUse { call, .. }) = self.block(index) {
                emit_tool_call(handler.as_deref_mut(), call, &call.arguments)?;
            }
        }
        self.stop_reason = response.stop_reason.filter(|r| !r.is_empty());
        Ok(())
    }
}

/// Opens a block at `index`, growing the slot list. Initial text or
/// thinking carried by the start frame is emitted.
fn start_block(
    blocks: &mut Vec<Option<ContentBlock>>,
    index: usize,
    block: ContentBlock,
    handler: Option<&mut (dyn EventHandler + '_)>,
) -> Result<(), LlmError> {
    let index = check_index(index, "content block")?;
    if blocks.len() <= index {
        blocks.resize_with(index + 1, || None);
    }
    if let Some(previous) = &blocks[index] {
        warn!(index, kind = previous.kind(), "Content block started twice; replacing");
    }
    match &block {
        ContentBlock::Text(text) => emit_if_text(handler, text)?,
        ContentBlock::Thinking { thinking, .. } => emit_if_reasoning(handler, thinking)?,
        ContentBlock::ToolUse { .. } | ContentBlock::RedactedThinking { .. } => {}
    }
    blocks[index] = Some(block);
    Ok(())
}

fn block_mut(
    blocks: &mut [Option<ContentBlock>],
    index: usize,
) -> Result<&mut ContentBlock, LlmError> {
    blocks
        .get_mut(index)
        .and_then(Option::as_mut)
        .ok_or(LlmError::UnknownBlock { index })
}

fn apply_delta(
    blocks: &mut [Option<ContentBlock>],
    index: usize,
    delta: BlockDelta,
    handler: Option<&mut (dyn EventHandler + '_)>,
) -> Result<(), LlmError> {
    match (block_mut(blocks, index)?, delta) {
        (ContentBlock::Text(text), BlockDelta::TextDelta { text: piece }) => {
            text.push_str(&piece);
            emit_if_text(handler, &piece)
        }
        (ContentBlock::ToolUse { call, .. }, BlockDelta::InputJsonDelta { partial_json }) => {
            if partial_json.is_empty() {
                return Ok(());
            }
            call.arguments.push_str(&partial_json);
            emit_tool_call(handler, call, &partial_json)
        }
        (
            ContentBlock::Thinking { thinking, .. },
            BlockDelta::ThinkingDelta { thinking: piece },
        ) => {
            thinking.push_str(&piece);
            emit_if_reasoning(handler, &piece)
        }
        (
            ContentBlock::Thinking { signature, .. },
            BlockDelta::SignatureDelta { signature: piece },
        ) => {
            signature.push_str(&piece);
            Ok(())
        }
        (block, delta) => Err(LlmError::ResponseFormat {
            message: format!(
                "{} cannot extend {} block at index {index}",
                delta.kind(),
                block.kind()
            ),
            raw: String::new(),
        }),
    }
}

fn stop_block(blocks: &mut [Option<ContentBlock>], index: usize) -> Result<(), LlmError> {
    match block_mut(blocks, index)? {
        ContentBlock::ToolUse { call, input } => finalize_tool(call, input),
        ContentBlock::Text(_)
        | ContentBlock::Thinking { .. }
        | ContentBlock::RedactedThinking { .. } => Ok(()),
    }
}

/// Parses a tool-use block's argument text into its structured input.
///
/// A block that streamed no argument text keeps the input from its
/// start frame, or `{}`. Safe to call more than once.
fn finalize_tool(call: &mut ToolCall, input: &mut Option<Value>) -> Result<(), LlmError> {
    if call.arguments.trim().is_empty() {
        let start = input.take().unwrap_or_else(|| Value::Object(Map::new()));
        call.arguments = start.to_string();
    }
    match call.parse_arguments() {
        Ok(value) => {
            *input = Some(value);
            Ok(())
        }
        Err(e) => Err(LlmError::ToolArguments {
            id: call.id.clone(),
            name: call.name.clone(),
            message: e.to_string(),
            raw: call.arguments.clone(),
        }),
    }
}

impl Assembler for BlockAssembler {
    type Frame = AnthropicFrame;

    fn apply(
        &mut self,
        frame: AnthropicFrame,
        handler: Option<&mut (dyn EventHandler + '_)>,
    ) -> Result<Progress, LlmError> {
        match frame.0 {
            FrameKind::Event(event) => self.apply_event(event, handler),
            FrameKind::Complete(response) => {
                self.apply_complete(response, handler)?;
                Ok(Progress::Finished)
            }
        }
    }

    fn finish(
        self,
        handler: Option<&mut (dyn EventHandler + '_)>,
    ) -> Result<AggregateResponse, LlmError> {
        let Self {
            mut response,
            blocks,
            stop_reason,
        } = self;

        let choice = response.choice_mut(0)?;
        for (index, block) in blocks.into_iter().enumerate() {
            match block {
                None => debug!(index, "No content block at index"),
                Some(ContentBlock::Text(text)) => choice.content.push_str(&text),
                Some(ContentBlock::Thinking { thinking, .. }) => {
                    choice.reasoning_content.push_str(&thinking);
                }
                Some(ContentBlock::RedactedThinking { .. }) => {}
                Some(ContentBlock::ToolUse {
                    mut call,
                    mut input,
                }) => {
                    finalize_tool(&mut call, &mut input)?;
                    choice.tool_calls.push(call);
                }
            }
        }
        choice.set_finish_reason(stop_reason.as_deref());

        emit_done(handler)?;
        Ok(response)
    }
}
