//! Conversions from `OpenAI` wire types to `llm-relay` types.

use llm_relay::error::LlmError;
use llm_relay::usage::Usage;
use serde_json::Value;

use crate::types::{ErrorDetail, ErrorResponse, ResponseUsage};

/// Convert `OpenAI` `ResponseUsage` to core `Usage`.
pub(crate) fn convert_usage(usage: &ResponseUsage) -> Usage {
    Usage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
        reasoning_tokens: usage
            .completion_tokens_details
            .as_ref()
            .and_then(|d| d.reasoning_tokens),
        cache_read_tokens: usage
            .prompt_tokens_details
            .as_ref()
            .and_then(|d| d.cached_tokens),
        cache_write_tokens: None,
    }
}

/// Convert an error frame from inside the stream into an `LlmError`.
pub(crate) fn convert_stream_error(detail: ErrorDetail) -> LlmError {
    let code = detail
        .kind
        .or_else(|| match detail.code {
            Some(Value::String(code)) => Some(code),
            Some(Value::Number(code)) => Some(code.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| "error".into());
    let retryable = matches!(
        code.as_str(),
        "server_error" | "rate_limit_exceeded" | "overloaded" | "500" | "502" | "503"
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

    let retryable = matches!(status.as_u16(), 429 | 500 | 502 | 503);

    LlmError::Http {
        status: Some(status),
        message,
        retryable,
    }
}
