//! Unified error type for stream normalization.
//!
//! Every adapter and the pipeline map their failures into [`LlmError`],
//! giving callers a single type to match against regardless of which
//! vendor protocol produced the stream. The variants line up with the
//! stages a stream passes through:
//!
//! | Stage | Variants |
//! |-------|----------|
//! | Connecting | [`Http`](LlmError::Http), [`Auth`](LlmError::Auth), [`InvalidRequest`](LlmError::InvalidRequest), [`Timeout`](LlmError::Timeout), [`RetryExhausted`](LlmError::RetryExhausted) |
//! | Decoding frames | [`ResponseFormat`](LlmError::ResponseFormat) |
//! | Assembling content | [`ToolArguments`](LlmError::ToolArguments), [`UnknownBlock`](LlmError::UnknownBlock), [`Event`](LlmError::Event) |
//! | Vendor error frame | [`Provider`](LlmError::Provider) |
//! | Caller gave up | [`Cancelled`](LlmError::Cancelled) |
//!
//! Only a pre-stream rate limit is ever retried, and only by
//! [`Pipeline`](crate::pipeline::Pipeline). Once the first frame has
//! been read, every error is terminal.

use crate::event::EventError;

/// The unified error type returned by every stream operation.
///
/// Variants are `#[non_exhaustive]`; always include a wildcard arm.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum LlmError {
    /// An HTTP-level failure (transport error, unexpected status code).
    ///
    /// `status` is `None` when no response was received or the body
    /// broke while being read.
    #[error("HTTP error (status={status:?}): {message}")]
    Http {
        /// The HTTP status code, if one was received.
        status: Option<http::StatusCode>,
        /// A human-readable description of the failure.
        message: String,
        /// Whether the request may succeed if sent again.
        retryable: bool,
    },

    /// The API key or token was rejected.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The request was rejected as malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The vendor sent an explicit error frame.
    #[error("Provider error ({code}): {message}")]
    Provider {
        /// Vendor error type (e.g. `"overloaded_error"`).
        code: String,
        /// The vendor's message, verbatim.
        message: String,
        /// Whether the vendor considers the condition transient.
        retryable: bool,
    },

    /// A frame did not match any known shape.
    #[error("Response format error: {message}")]
    ResponseFormat {
        /// What went wrong during decoding.
        message: String,
        /// The offending frame, for diagnostics.
        raw: String,
    },

    /// A tool call's accumulated arguments are not valid JSON at
    /// finalization.
    #[error("Invalid arguments for tool call {id} ({name}): {message}")]
    ToolArguments {
        /// Provider-assigned call id.
        id: String,
        /// Tool name.
        name: String,
        /// The JSON parser's complaint.
        message: String,
        /// The accumulated argument text.
        raw: String,
    },

    /// A delta or stop referenced a content block that was never started.
    #[error("Content block {index} referenced before it was started")]
    UnknownBlock {
        /// The block index named by the frame.
        index: usize,
    },

    /// An event could not be constructed.
    #[error(transparent)]
    Event(#[from] EventError),

    /// The pre-stream retry budget ran out.
    #[error("Retry exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted {
        /// How many connection attempts were made.
        attempts: u32,
        /// The error from the final attempt.
        #[source]
        last_error: Box<LlmError>,
    },

    /// The transport exceeded its deadline.
    #[error("Operation timed out after {elapsed_ms}ms")]
    Timeout {
        /// Milliseconds elapsed before the timeout fired.
        elapsed_ms: u64,
    },

    /// The caller cancelled the stream.
    #[error("Stream cancelled by caller")]
    Cancelled,
}

impl LlmError {
    /// Returns `true` if the error is transient and a fresh request may
    /// succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { retryable, .. } | Self::Provider { retryable, .. } => *retryable,
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` for an HTTP 429 response.
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            Self::Http {
                status: Some(http::StatusCode::TOO_MANY_REQUESTS),
                ..
            }
        )
    }

    /// Returns `true` if the caller cancelled the stream.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        Self::ResponseFormat {
            message: err.to_string(),
            raw: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_http() {
        let err = LlmError::Http {
            status: Some(http::StatusCode::TOO_MANY_REQUESTS),
            message: "rate limited".into(),
            retryable: true,
        };
        let display = format!("{err}");
        assert!(display.contains("429"));
        assert!(display.contains("rate limited"));
    }

    #[test]
    fn test_error_display_provider_keeps_message_verbatim() {
        let err = LlmError::Provider {
            code: "overloaded_error".into(),
            message: "Overloaded: try again later".into(),
            retryable: true,
        };
        let display = format!("{err}");
        assert!(display.contains("overloaded_error"));
        assert!(display.contains("Overloaded: try again later"));
    }

    #[test]
    fn test_error_display_tool_arguments() {
        let err = LlmError::ToolArguments {
            id: "toolu_1".into(),
            name: "search".into(),
            message: "EOF while parsing".into(),
            raw: "{\"q\":".into(),
        };
        let display = format!("{err}");
        assert!(display.contains("toolu_1"));
        assert!(display.contains("search"));
    }

    #[test]
    fn test_error_display_unknown_block() {
        let err = LlmError::UnknownBlock { index: 4 };
        assert!(format!("{err}").contains('4'));
    }

    #[test]
    fn test_event_error_is_transparent() {
        let err: LlmError = EventError::MissingName.into();
        assert_eq!(format!("{err}"), format!("{}", EventError::MissingName));
    }

    #[test]
    fn test_rate_limited_only_for_429() {
        let limited = LlmError::Http {
            status: Some(http::StatusCode::TOO_MANY_REQUESTS),
            message: String::new(),
            retryable: true,
        };
        let unavailable = LlmError::Http {
            status: Some(http::StatusCode::SERVICE_UNAVAILABLE),
            message: String::new(),
            retryable: true,
        };
        assert!(limited.is_rate_limited());
        assert!(!unavailable.is_rate_limited());
        assert!(unavailable.is_retryable());
    }

    #[test]
    fn test_cancelled_is_distinct() {
        assert!(LlmError::Cancelled.is_cancelled());
        assert!(!LlmError::Cancelled.is_retryable());
        let decode = LlmError::ResponseFormat {
            message: "bad".into(),
            raw: "{}".into(),
        };
        assert!(!decode.is_cancelled());
    }

    #[test]
    fn test_retry_exhausted_source_chain() {
        use std::error::Error;
        let err = LlmError::RetryExhausted {
            attempts: 4,
            last_error: Box::new(LlmError::Auth("expired".into())),
        };
        let source = err.source().expect("RetryExhausted should have a source");
        assert!(format!("{source}").contains("expired"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LlmError>();
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: LlmError = json_err.into();
        assert!(matches!(err, LlmError::ResponseFormat { .. }));
    }
}
