//! Conversions from Anthropic wire types to `llm-relay` types.

use llm_relay::error::LlmError;
use llm_relay::usage::Usage;

use crate::types::{ErrorDetail, ErrorResponse, WireUsage};

/// Merge Anthropic usage into core `Usage`.
///
/// Counts arrive split across `message_start` and `message_delta`, so
/// only the fields present in `usage` overwrite.
pub(crate) fn merge_usage(usage: &WireUsage, into: &mut Usage) {
    if let Some(input) = usage.input_tokens {
        into.input_tokens = input;
    }
    if let Some(output) = usage.output_tokens {
        into.output_tokens = output;
    }
    if usage.cache_read_input_tokens.is_some() {
        into.cache_read_tokens = usage.cache_read_input_tokens;
    }
    if usage.cache_creation_input_tokens.is_some() {
        into.cache_write_tokens = usage.cache_creation_input_tokens;
    }
}

/// Convert an `error` event or error body into an `LlmError`.
pub(crate) fn convert_stream_error(detail: ErrorDetail) -> LlmError {
    let code = detail.kind.unwrap_or_else(|| "error".into());
    let retryable = matches!(
        code.as_str(),
        "overloaded_error" | "rate_limit_error" | "api_error"
    );
    LlmError::Provider {
        code,
        message: detail.message,
        retryable,
    }
}

/// Convert an HTTP status + optional error body into an `LlmError`.
pub(crate) fn convert_error(status: http::StatusCode, body: &str) -> LlmError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map_or_else(|_| body.to_string(), |e| e.error.message);

    if status == http::StatusCode::UNAUTHORIZED || status == http::StatusCode::FORBIDDEN {
        return LlmError::Auth(message);
    }

    if status == http::StatusCode::BAD_REQUEST {
        return LlmError::InvalidRequest(message);
    }

    // 529 is Anthropic's "overloaded" status.
    let retryable = matches!(status.as_u16(), 429 | 500 | 502 | 503 | 529);

    LlmError::Http {
        status: Some(status),
        message,
        retryable,
    }
}
