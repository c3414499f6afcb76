//! Delta/object-merge stream protocol for the `OpenAI` Chat Completions
//! API.
//!
//! Each `data:` frame carries deltas for one or more choices, addressed
//! by index. [`DeltaAssembler`] merges them into an
//! [`AggregateResponse`]:
//!
//! - the choice list grows to cover the largest index seen;
//! - text and reasoning deltas are concatenated;
//! - tool calls arrive either as indexed `tool_calls` deltas or as one
//!   evolving legacy `function_call`, never both (the first seen wins);
//! - the last non-empty `finish_reason` sticks.
//!
//! Reasoning sent in `reasoning_content` (or its alias `reasoning`) is
//! taken as-is. A choice that never sends either has its content run
//! through a [`ReasoningSplitter`] to pull out inline `<think>` markup.
//!
//! A body that is not SSE at all is parsed as one complete
//! `chat.completion` document and applied through the same assembler.

use llm_relay::accumulator::{ToolCallAccumulator, ToolCallDelta};
use llm_relay::adapter::{Assembler, Decoded, FrameDecoder, Progress, Protocol};
use llm_relay::error::LlmError;
use llm_relay::event::{
    EventHandler, ToolCall, emit_done, emit_if_reasoning, emit_if_text, emit_tool_call,
};
use llm_relay::response::{AggregateResponse, Choice};
use llm_relay::splitter::{ReasoningSplitter, SplitterState, split_content};
use llm_relay::sse::{Line, RawBody, classify, parse_object};
use serde_json::Value;
use tracing::{debug, warn};

use crate::convert::{convert_stream_error, convert_usage};
use crate::types::{
    ErrorResponse, Response, ResponseMessage, StreamChoice, StreamChunk, StreamDelta,
    StreamFunctionCall,
};

/// The `OpenAI`-compatible wire protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiProtocol;

impl Protocol for OpenAiProtocol {
    type Frame = OpenAiFrame;
    type Decoder = OpenAiDecoder;
    type Assembler = DeltaAssembler;

    fn decoder(&self) -> OpenAiDecoder {
        OpenAiDecoder::default()
    }

    fn assembler(&self) -> DeltaAssembler {
        DeltaAssembler::default()
    }
}

/// One decoded `OpenAI` frame.
#[derive(Debug)]
pub struct OpenAiFrame(FrameKind);

#[derive(Debug)]
enum FrameKind {
    Chunk(StreamChunk),
    Complete(Response),
}

/// Decodes `data:` lines into chunks and raw bodies into complete
/// responses.
#[derive(Debug, Default)]
pub struct OpenAiDecoder {
    raw: RawBody,
}

impl OpenAiDecoder {
    fn complete(value: Value) -> Result<OpenAiFrame, LlmError> {
        if value.get("error").is_some() {
            let raw = value.to_string();
            let body: ErrorResponse =
                serde_json::from_value(value).map_err(|e| LlmError::ResponseFormat {
                    message: format!("Failed to parse OpenAI error body: {e}"),
                    raw,
                })?;
            return Err(convert_stream_error(body.error));
        }
        let raw = value.to_string();
        let response: Response =
            serde_json::from_value(value).map_err(|e| LlmError::ResponseFormat {
                message: format!("Failed to parse OpenAI response: {e}"),
                raw,
            })?;
        Ok(OpenAiFrame(FrameKind::Complete(response)))
    }
}

impl FrameDecoder for OpenAiDecoder {
    type Frame = OpenAiFrame;

    fn decode_line(&mut self, line: &str) -> Result<Option<Decoded<OpenAiFrame>>, LlmError> {
        match classify(line) {
            Line::Blank | Line::Comment | Line::Field => Ok(None),
            Line::Done => Ok(Some(Decoded::End)),
            Line::Data(payload) => {
                let Some(value) = parse_object(payload) else {
                    debug!(payload, "Skipping malformed data line");
                    return Ok(None);
                };
                let chunk: StreamChunk =
                    serde_json::from_value(value).map_err(|e| LlmError::ResponseFormat {
                        message: format!("Failed to parse OpenAI stream chunk: {e}"),
                        raw: payload.to_owned(),
                    })?;
                Ok(Some(Decoded::Frame(OpenAiFrame(FrameKind::Chunk(chunk)))))
            }
            Line::Raw(line) => match self.raw.push(line)? {
                Some(value) => Self::complete(value).map(|frame| Some(Decoded::Frame(frame))),
                None => Ok(None),
            },
        }
    }

    fn finish(&mut self) -> Result<Option<Decoded<OpenAiFrame>>, LlmError> {
        if !self.raw.is_empty() {
            debug!(raw = %self.raw.take(), "Discarding incomplete response body");
        }
        Ok(None)
    }
}

/// How a choice reports tool calls; fixed by the first delta that
/// carries one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToolMode {
    ToolCalls,
    FunctionCall,
}

/// Per-choice assembly state.
#[derive(Debug, Default)]
struct ChoiceState {
    splitter: ReasoningSplitter,
    explicit_reasoning: bool,
    tools: ToolCallAccumulator,
    function_call: Option<ToolCall>,
    mode: Option<ToolMode>,
    /// Argument bytes already emitted, per tool-call position.
    streamed: Vec<usize>,
    function_call_streamed: usize,
}

/// Merges `OpenAI` frames into an [`AggregateResponse`].
#[derive(Debug, Default)]
pub struct DeltaAssembler {
    response: AggregateResponse,
    states: Vec<ChoiceState>,
}

impl DeltaAssembler {
    /// The choice at `index` and its state, growing both lists.
    fn slot(&mut self, index: usize) -> Result<(&mut Choice, &mut ChoiceState), LlmError> {
        let out = self.response.choice_mut(index)?;
        if self.states.len() <= index {
            self.states.resize_with(index + 1, ChoiceState::default);
        }
        Ok((out, &mut self.states[index]))
    }

    fn apply_chunk(
        &mut self,
        chunk: StreamChunk,
        mut handler: Option<&mut (dyn EventHandler + '_)>,
    ) -> Result<(), LlmError> {
        if let Some(error) = chunk.error {
            return Err(convert_stream_error(error));
        }
        self.response
            .set_identity(chunk.id.as_deref(), chunk.model.as_deref());

        for choice in chunk.choices {
            self.apply_choice(choice, handler.as_deref_mut())?;
        }
        if let Some(usage) = &chunk.usage {
            self.response.usage = convert_usage(usage);
        }
        Ok(())
    }

    fn apply_choice(
        &mut self,
        choice: StreamChoice,
        mut handler: Option<&mut (dyn EventHandler + '_)>,
    ) -> Result<(), LlmError> {
        let index = choice.index;
        let (out, state) = self.slot(index)?;
        let delta = choice.delta.unwrap_or_default();
        let StreamDelta {
            content,
            reasoning_content,
            reasoning,
            tool_calls,
            function_call,
        } = delta;

        let explicit = reasoning_content
            .filter(|r| !r.is_empty())
            .or_else(|| reasoning.filter(|r| !r.is_empty()));
        if let Some(reasoning) = explicit {
            if !state.explicit_reasoning {
                state.explicit_reasoning = true;
                let (text, held) = state.splitter.flush();
                append(out, &text, &held, handler.as_deref_mut())?;
            }
            out.reasoning_content.push_str(&reasoning);
            emit_if_reasoning(handler.as_deref_mut(), &reasoning)?;
        }

        if let Some(content) = content.or(choice.text).filter(|c| !c.is_empty()) {
            if state.explicit_reasoning {
                out.content.push_str(&content);
                emit_if_text(handler.as_deref_mut(), &content)?;
            } else {
                let text_first = state.splitter.state() == SplitterState::Text;
                let (text, reasoning) = state.splitter.split(&content);
                if text_first {
                    append(out, &text, &reasoning, handler.as_deref_mut())?;
                } else {
                    append(out, "", &reasoning, handler.as_deref_mut())?;
                    append(out, &text, "", handler.as_deref_mut())?;
                }
            }
        }

        if let Some(tool_calls) = tool_calls {
            if state.mode == Some(ToolMode::FunctionCall) {
                warn!(index, "Ignoring tool_calls delta on a function_call choice");
            } else {
                state.mode = Some(ToolMode::ToolCalls);
                for tc in tool_calls {
                    let function = tc.function.unwrap_or_default();
                    let position = state.tools.apply(ToolCallDelta {
                        index: tc.index,
                        id: tc.id,
                        name: function.name,
                        arguments: function.arguments.unwrap_or_default(),
                    })?;
                    emit_pending_arguments(state, position, handler.as_deref_mut())?;
                }
            }
        }

        if let Some(function_call) = function_call {
            if state.mode == Some(ToolMode::ToolCalls) {
                warn!(index, "Ignoring function_call delta on a tool_calls choice");
            } else {
                state.mode = Some(ToolMode::FunctionCall);
                apply_function_call(state, index, function_call, handler.as_deref_mut())?;
            }
        }

        out.set_finish_reason(choice.finish_reason.as_deref());
        Ok(())
    }

    fn apply_complete(
        &mut self,
        response: Response,
        mut handler: Option<&mut (dyn EventHandler + '_)>,
    ) -> Result<(), LlmError> {
        self.response
            .set_identity(response.id.as_deref(), response.model.as_deref());
        if let Some(usage) = &response.usage {
            self.response.usage = convert_usage(usage);
        }

        for choice in response.choices {
            let index = choice.index;
            let (out, state) = self.slot(index)?;
            let ResponseMessage {
                content,
                reasoning_content,
                reasoning,
                tool_calls,
                function_call,
            } = choice.message.unwrap_or_default();
            let content = content.or(choice.text).unwrap_or_default();

            let explicit = reasoning_content
                .filter(|r| !r.is_empty())
                .or_else(|| reasoning.filter(|r| !r.is_empty()));
            let (reasoning, text) = match explicit {
                Some(reasoning) => {
                    state.explicit_reasoning = true;
                    (reasoning, content)
                }
                None => split_content(&content),
            };
            append(out, "", &reasoning, handler.as_deref_mut())?;
            append(out, &text, "", handler.as_deref_mut())?;

            if let Some(tool_calls) = tool_calls {
                state.mode = Some(ToolMode::ToolCalls);
                for (position, tc) in tool_calls.into_iter().enumerate() {
                    let position = state.tools.apply(ToolCallDelta {
                        index: Some(position),
                        id: Some(tc.id),
                        name: Some(tc.function.name),
                        arguments: tc.function.arguments,
                    })?;
                    emit_pending_arguments(state, position, handler.as_deref_mut())?;
                }
            } else if let Some(fc) = function_call {
                state.mode = Some(ToolMode::FunctionCall);
                let delta = StreamFunctionCall {
                    name: Some(fc.name),
                    arguments: Some(fc.arguments),
                };
                apply_function_call(state, index, delta, handler.as_deref_mut())?;
            }

            out.set_finish_reason(choice.finish_reason.as_deref());
        }
        Ok(())
    }
}

/// Appends text and reasoning to a choice and emits them, text first.
fn append(
    out: &mut Choice,
    text: &str,
    reasoning: &str,
    mut handler: Option<&mut (dyn EventHandler + '_)>,
) -> Result<(), LlmError> {
    out.content.push_str(text);
    out.reasoning_content.push_str(reasoning);
    emit_if_text(handler.as_deref_mut(), text)?;
    emit_if_reasoning(handler, reasoning)
}

/// Emits the argument text of the call at `position` that no event has
/// carried yet. Nothing is emitted until the call has an id and a name;
/// fragments that arrived earlier go out with the first event.
fn emit_pending_arguments(
    state: &mut ChoiceState,
    position: usize,
    handler: Option<&mut (dyn EventHandler + '_)>,
) -> Result<(), LlmError> {
    let Some(call) = state.tools.get(position).filter(|c| c.has_identity()) else {
        return Ok(());
    };
    if state.streamed.len() <= position {
        state.streamed.resize(position + 1, 0);
    }
    let sent = &mut state.streamed[position];
    emit_tool_call(handler, call, &call.arguments[*sent..])?;
    *sent = call.arguments.len();
    Ok(())
}

/// Merges a legacy `function_call` delta. The call has no vendor id, so
/// one is derived from its name and choice index.
fn apply_function_call(
    state: &mut ChoiceState,
    index: usize,
    delta: StreamFunctionCall,
    handler: Option<&mut (dyn EventHandler + '_)>,
) -> Result<(), LlmError> {
    let call = state.function_call.get_or_insert_with(ToolCall::default);
    if call.name.is_empty() {
        if let Some(name) = delta.name.filter(|n| !n.is_empty()) {
            call.id = format!("call_{name}_{index}");
            call.name = name;
        }
    }
    call.arguments
        .push_str(delta.arguments.as_deref().unwrap_or_default());
    if call.has_identity() {
        emit_tool_call(handler, call, &call.arguments[state.function_call_streamed..])?;
        state.function_call_streamed = call.arguments.len();
    }
    Ok(())
}

impl Assembler for DeltaAssembler {
    type Frame = OpenAiFrame;

    fn apply(
        &mut self,
        frame: OpenAiFrame,
        handler: Option<&mut (dyn EventHandler + '_)>,
    ) -> Result<Progress, LlmError> {
        match frame.0 {
            FrameKind::Chunk(chunk) => {
                self.apply_chunk(chunk, handler)?;
                Ok(Progress::Continue)
            }
            FrameKind::Complete(response) => {
                self.apply_complete(response, handler)?;
                Ok(Progress::Finished)
            }
        }
    }

    fn finish(
        self,
        mut handler: Option<&mut (dyn EventHandler + '_)>,
    ) -> Result<AggregateResponse, LlmError> {
        let Self {
            mut response,
            states,
        } = self;

        for (index, mut state) in states.into_iter().enumerate() {
            let out = response.choice_mut(index)?;
            let (text, reasoning) = state.splitter.flush();
            append(out, &text, &reasoning, handler.as_deref_mut())?;

            let mut calls = state.tools.finish();
            if let Some(call) = state.function_call.filter(ToolCall::has_identity) {
                calls.push(call);
            }
            for call in calls.iter().filter(|c| !c.is_complete()) {
                warn!(id = %call.id, name = %call.name, "Tool call arguments are not valid JSON");
            }
            out.tool_calls = calls;
        }

        emit_done(handler)?;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use llm_relay::adapter::collect_lines;
    use llm_relay::event::Event;
    use llm_relay::test_helpers::EventLog;
    use serde_json::json;

    use super::*;

    fn data(value: &Value) -> String {
        format!("data: {value}")
    }

    fn run(lines: &[String]) -> (Result<AggregateResponse, LlmError>, EventLog) {
        let mut log = EventLog::default();
        let result = collect_lines(&OpenAiProtocol, lines, Some(&mut log));
        (result, log)
    }

    fn content(index: usize, text: &str) -> String {
        data(&json!({"choices":[{"index":index,"delta":{"content":text}}]}))
    }

    #[test]
    fn test_text_deltas_concatenate() {
        let lines = [content(0, "Hel"), content(0, "lo"), "data: [DONE]".into()];
        let (resp, log) = run(&lines);
        let resp = resp.unwrap();
        assert_eq!(resp.text(), "Hello");
        assert_eq!(
            log.events,
            vec![Event::new_text("Hel"), Event::new_text("lo"), Event::new_done()]
        );
    }

    #[test]
    fn test_choices_grow_to_largest_index() {
        let lines = [content(2, "c"), content(0, "a"), content(1, "b")];
        let (resp, _) = run(&lines);
        let resp = resp.unwrap();
        assert_eq!(resp.choices.len(), 3);
        for (i, text) in ["a", "b", "c"].iter().enumerate() {
            assert_eq!(resp.choice(i).unwrap().index, i);
            assert_eq!(&resp.choice(i).unwrap().content, text);
        }
    }

    #[test]
    fn test_tool_call_fragments_reassemble() {
        let lines = [
            data(&json!({"choices":[{"index":0,"delta":{"tool_calls":[
                {"index":0,"id":"1","function":{"name":"f","arguments":"{\"a\":"}}
            ]}}]})),
            data(&json!({"choices":[{"index":0,"delta":{"tool_calls":[
                {"index":0,"function":{"arguments":"1}"}}
            ]}}]})),
            data(&json!({"choices":[{"index":0,"delta":{},"finish_reason":"tool_calls"}]})),
            "data: [DONE]".into(),
        ];
        let (resp, log) = run(&lines);
        let resp = resp.unwrap();

        let choice = resp.choice(0).unwrap();
        assert_eq!(choice.tool_calls.len(), 1);
        assert_eq!(choice.tool_calls[0].arguments, "{\"a\":1}");
        assert_eq!(choice.tool_calls[0].parse_arguments().unwrap(), json!({"a": 1}));
        assert_eq!(choice.finish_reason.as_deref(), Some("tool_calls"));

        let fragments: Vec<&str> = log.tool_calls().iter().map(|c| c.arguments.as_str()).collect();
        assert_eq!(fragments, vec!["{\"a\":", "1}"]);
        assert!(log.tool_calls().iter().all(|c| c.id == "1" && c.name == "f"));
    }

    #[test]
    fn test_sparse_tool_indices_drop_noise() {
        let lines = [data(&json!({"choices":[{"delta":{"tool_calls":[
            {"index":1,"id":"call_b","function":{"name":"g","arguments":"{}"}}
        ]}}]}))];
        let (resp, _) = run(&lines);
        let calls = &resp.unwrap().choices[0].tool_calls;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_b");
    }

    #[test]
    fn test_finish_reason_is_sticky() {
        let lines = [
            data(&json!({"choices":[{"index":0,"delta":{"content":"x"},"finish_reason":"stop"}]})),
            data(&json!({"choices":[{"index":0,"delta":{},"finish_reason":""}]})),
            data(&json!({"choices":[{"index":0,"delta":{},"finish_reason":null}]})),
        ];
        let (resp, _) = run(&lines);
        assert_eq!(resp.unwrap().choices[0].finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_inline_thinking_is_split() {
        let lines = [
            content(0, "Hello <think>step one"),
            content(0, " and two</think> world"),
        ];
        let (resp, log) = run(&lines);
        let resp = resp.unwrap();
        assert_eq!(resp.choices[0].content, "Hello  world");
        assert_eq!(resp.choices[0].reasoning_content, "step one and two");
        assert_eq!(log.reasoning(), "step one and two");
        assert_eq!(log.texts(), "Hello  world");
    }

    #[test]
    fn test_explicit_reasoning_bypasses_splitter() {
        let lines = [
            data(&json!({"choices":[{"delta":{"reasoning_content":"plan"}}]})),
            content(0, "<think>literal</think>"),
        ];
        let (resp, _) = run(&lines);
        let choice = &resp.unwrap().choices[0];
        assert_eq!(choice.reasoning_content, "plan");
        assert_eq!(choice.content, "<think>literal</think>");
    }

    #[test]
    fn test_reasoning_alias() {
        let lines = [data(&json!({"choices":[{"delta":{"reasoning":"hmm"}}]}))];
        let (resp, log) = run(&lines);
        assert_eq!(resp.unwrap().choices[0].reasoning_content, "hmm");
        assert_eq!(log.events[0], Event::new_reasoning("hmm"));
    }

    #[test]
    fn test_legacy_text_choice() {
        let lines = [
            data(&json!({"choices":[{"index":0,"text":"once "}]})),
            data(&json!({"choices":[{"index":0,"text":"upon","finish_reason":"length"}]})),
        ];
        let (resp, _) = run(&lines);
        let resp = resp.unwrap();
        assert_eq!(resp.text(), "once upon");
        assert_eq!(resp.choices[0].finish_reason.as_deref(), Some("length"));
    }

    #[test]
    fn test_legacy_function_call() {
        let lines = [
            data(&json!({"choices":[{"delta":{"function_call":{"name":"lookup","arguments":"{\"q\""}}}]})),
            data(&json!({"choices":[{"delta":{"function_call":{"arguments":":\"rust\"}"}}}]})),
            data(&json!({"choices":[{"delta":{"tool_calls":[
                {"index":0,"id":"x","function":{"name":"other","arguments":"{}"}}
            ]}}]})),
        ];
        let (resp, log) = run(&lines);
        let calls = &resp.unwrap().choices[0].tool_calls;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_lookup_0");
        assert_eq!(calls[0].name, "lookup");
        assert_eq!(calls[0].parse_arguments().unwrap(), json!({"q": "rust"}));
        assert_eq!(log.tool_calls().len(), 2);
    }

    #[test]
    fn test_arguments_before_name_are_streamed_once_identified() {
        let lines = [
            data(&json!({"choices":[{"index":0,"delta":{"tool_calls":[
                {"index":0,"id":"c1","function":{"arguments":"{\"a\":"}}
            ]}}]})),
            data(&json!({"choices":[{"index":0,"delta":{"tool_calls":[
                {"index":0,"function":{"name":"f","arguments":"1}"}}
            ]}}]})),
            data(&json!({"choices":[{"index":0,"delta":{"tool_calls":[
                {"index":0,"function":{"arguments":""}}
            ]}}]})),
        ];
        let (resp, log) = run(&lines);
        let resp = resp.unwrap();
        assert_eq!(resp.choices[0].tool_calls[0].arguments, "{\"a\":1}");

        let streamed: String = log.tool_calls().iter().map(|c| c.arguments.as_str()).collect();
        assert_eq!(streamed, "{\"a\":1}");
        assert_eq!(log.tool_calls()[0], &ToolCall::new("c1", "f", "{\"a\":1}"));
    }

    #[test]
    fn test_function_call_arguments_before_name_are_not_lost() {
        let lines = [
            data(&json!({"choices":[{"delta":{"function_call":{"arguments":"{\"q\""}}}]})),
            data(&json!({"choices":[{"delta":{"function_call":{"name":"lookup","arguments":":1"}}}]})),
            data(&json!({"choices":[{"delta":{"function_call":{"arguments":"}"}}}]})),
        ];
        let (resp, log) = run(&lines);
        let call = &resp.unwrap().choices[0].tool_calls[0];
        assert_eq!(call.arguments, "{\"q\":1}");

        let streamed: Vec<&str> = log.tool_calls().iter().map(|c| c.arguments.as_str()).collect();
        assert_eq!(streamed, vec!["{\"q\":1", "}"]);
    }

    #[test]
    fn test_huge_choice_index_is_rejected() {
        let lines = [data(&json!({"choices":[{"index":u64::MAX,"delta":{"content":"x"}}]}))];
        let (resp, log) = run(&lines);
        assert!(matches!(resp, Err(LlmError::ResponseFormat { .. })));
        assert!(log.events.is_empty());
    }

    #[test]
    fn test_huge_tool_call_index_is_rejected() {
        let lines = [data(&json!({"choices":[{"index":0,"delta":{"tool_calls":[
            {"index":u64::MAX,"id":"c1","function":{"name":"f","arguments":"{}"}}
        ]}}]}))];
        let (resp, _) = run(&lines);
        assert!(matches!(resp, Err(LlmError::ResponseFormat { .. })));
    }

    #[test]
    fn test_usage_and_identity() {
        let lines = [
            data(&json!({"id":"chatcmpl-1","model":"gpt-4o","choices":[{"delta":{"content":"hi"}}]})),
            data(&json!({"id":"chatcmpl-1","choices":[],"usage":{"prompt_tokens":9,"completion_tokens":1}})),
        ];
        let (resp, _) = run(&lines);
        let resp = resp.unwrap();
        assert_eq!(resp.id.as_deref(), Some("chatcmpl-1"));
        assert_eq!(resp.model.as_deref(), Some("gpt-4o"));
        assert_eq!(resp.usage.input_tokens, 9);
        assert_eq!(resp.usage.output_tokens, 1);
    }

    #[test]
    fn test_frames_after_done_are_ignored() {
        let lines = [content(0, "a"), "data: [DONE]".into(), content(0, "b")];
        let (resp, log) = run(&lines);
        assert_eq!(resp.unwrap().text(), "a");
        assert_eq!(log.done_count(), 1);
    }

    #[test]
    fn test_noise_lines_are_skipped() {
        let lines = [
            ": keep-alive".to_owned(),
            String::new(),
            "event: message".into(),
            "data: not json".into(),
            "data: [1,2]".into(),
            content(0, "ok"),
        ];
        let (resp, _) = run(&lines);
        assert_eq!(resp.unwrap().text(), "ok");
    }

    #[test]
    fn test_wrong_shape_is_decode_error() {
        let lines = [data(&json!({"choices":"nope"}))];
        let (resp, _) = run(&lines);
        assert!(matches!(resp, Err(LlmError::ResponseFormat { .. })));
    }

    #[test]
    fn test_error_frame_aborts() {
        let lines = [
            content(0, "partial"),
            data(&json!({"error":{"message":"The server had an error","type":"server_error"}})),
            content(0, "more"),
        ];
        let (resp, log) = run(&lines);
        let err = resp.unwrap_err();
        assert!(matches!(
            err,
            LlmError::Provider { ref message, .. } if message == "The server had an error"
        ));
        assert_eq!(log.done_count(), 0);
    }

    #[test]
    fn test_non_streaming_body() {
        let body = json!({
            "id": "chatcmpl-9",
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {
                    "content": "<think> check units </think> 42",
                    "tool_calls": [{"id":"call_1","function":{"name":"calc","arguments":"{\"x\":1}"}}]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 3, "completion_tokens": 4}
        });
        let pretty = serde_json::to_string_pretty(&body).unwrap();
        let lines: Vec<&str> = pretty.lines().collect();

        let mut log = EventLog::default();
        let resp = collect_lines(&OpenAiProtocol, &lines, Some(&mut log)).unwrap();
        let choice = &resp.choices[0];
        assert_eq!(choice.reasoning_content, "check units");
        assert_eq!(choice.content, "42");
        assert_eq!(choice.tool_calls, vec![ToolCall::new("call_1", "calc", "{\"x\":1}")]);
        assert_eq!(resp.usage.output_tokens, 4);
        assert_eq!(log.done_count(), 1);
    }

    #[test]
    fn test_non_streaming_error_body() {
        let lines = [r#"{"error":{"message":"quota exceeded","type":"insufficient_quota"}}"#];
        let err = collect_lines(&OpenAiProtocol, lines, None).unwrap_err();
        assert!(matches!(
            err,
            LlmError::Provider { ref code, .. } if code == "insufficient_quota"
        ));
    }

    #[test]
    fn test_handler_error_stops_assembly() {
        let mut handler = |_: Event| -> Result<(), LlmError> { Err(LlmError::Cancelled) };
        let result = collect_lines(&OpenAiProtocol, [content(0, "a")], Some(&mut handler));
        assert!(matches!(result, Err(LlmError::Cancelled)));
    }
}
