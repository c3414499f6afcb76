//! `OpenAI` Chat Completions wire types.
//!
//! These types mirror the vendor's JSON and are not part of the public
//! API. Every field is optional or defaulted: compatible backends omit
//! freely, and a missing field must never fail a frame.

use serde::Deserialize;
use serde_json::Value;

// ── Streaming types ────────────────────────────────────────────────

/// A single SSE chunk from the streaming API.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct StreamChunk {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
    #[serde(default)]
    pub usage: Option<ResponseUsage>,
    #[serde(default)]
    pub error: Option<ErrorDetail>,
}

/// A choice within a streaming chunk.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct StreamChoice {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub delta: Option<StreamDelta>,
    /// Legacy completions put the text here instead of in `delta`.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Delta content within a streaming chunk.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct StreamDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<StreamToolCall>>,
    #[serde(default)]
    pub function_call: Option<StreamFunctionCall>,
}

/// Tool call delta in a streaming chunk.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct StreamToolCall {
    #[serde(default)]
    pub index: Option<usize>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<StreamFunctionCall>,
}

/// Function call delta in a streaming chunk.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct StreamFunctionCall {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

// ── Response types ─────────────────────────────────────────────────

/// Top-level non-streaming response from `POST /chat/completions`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct Response {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<ResponseUsage>,
}

/// A single choice in the response.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct Choice {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub message: Option<ResponseMessage>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Message within a response choice.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallResponse>>,
    #[serde(default)]
    pub function_call: Option<FunctionCallResponse>,
}

/// Tool call in a response.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ToolCallResponse {
    #[serde(default)]
    pub id: String,
    pub function: FunctionCallResponse,
}

/// Function call details in a response.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct FunctionCallResponse {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

/// Token usage, sent on the final chunk or the complete response.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ResponseUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub completion_tokens_details: Option<CompletionTokensDetails>,
    #[serde(default)]
    pub prompt_tokens_details: Option<PromptTokensDetails>,
}

/// Detailed breakdown of completion tokens.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct CompletionTokensDetails {
    #[serde(default)]
    pub reasoning_tokens: Option<u64>,
}

/// Detailed breakdown of prompt tokens.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct PromptTokensDetails {
    #[serde(default)]
    pub cached_tokens: Option<u64>,
}

// ── Error types ────────────────────────────────────────────────────

/// Error body, either as an HTTP response or inside the stream.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: ErrorDetail,
}

/// Error detail within an error response.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorDetail {
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    /// A string on `OpenAI`, a number on some compatible servers.
    #[serde(default)]
    pub code: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_chunk_minimal() {
        let chunk: StreamChunk = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(chunk.choices.is_empty());
        assert!(chunk.usage.is_none());
        assert!(chunk.error.is_none());
    }

    #[test]
    fn test_stream_choice_null_delta() {
        let chunk: StreamChunk =
            serde_json::from_str(r#"{"choices":[{"index":1,"delta":null,"finish_reason":"stop"}]}"#)
                .unwrap();
        assert_eq!(chunk.choices[0].index, 1);
        assert!(chunk.choices[0].delta.is_none());
        assert_eq!(chunk.choices[0].finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_stream_delta_reasoning_fields() {
        let delta: StreamDelta =
            serde_json::from_str(r#"{"reasoning":"hmm","reasoning_content":"think"}"#).unwrap();
        assert_eq!(delta.reasoning.as_deref(), Some("hmm"));
        assert_eq!(delta.reasoning_content.as_deref(), Some("think"));
    }

    #[test]
    fn test_stream_tool_call_without_index() {
        let tc: StreamToolCall =
            serde_json::from_str(r#"{"function":{"arguments":"{}"}}"#).unwrap();
        assert!(tc.index.is_none());
        assert!(tc.id.is_none());
        assert_eq!(tc.function.unwrap().arguments.as_deref(), Some("{}"));
    }

    #[test]
    fn test_usage_details() {
        let usage: ResponseUsage = serde_json::from_str(
            r#"{"prompt_tokens":10,"completion_tokens":5,
                "completion_tokens_details":{"reasoning_tokens":3},
                "prompt_tokens_details":{"cached_tokens":4}}"#,
        )
        .unwrap();
        assert_eq!(usage.completion_tokens_details.unwrap().reasoning_tokens, Some(3));
        assert_eq!(usage.prompt_tokens_details.unwrap().cached_tokens, Some(4));
    }

    #[test]
    fn test_error_detail_numeric_code() {
        let err: ErrorResponse =
            serde_json::from_str(r#"{"error":{"message":"boom","code":500}}"#).unwrap();
        assert_eq!(err.error.message, "boom");
        assert_eq!(err.error.code, Some(serde_json::json!(500)));
    }
}
