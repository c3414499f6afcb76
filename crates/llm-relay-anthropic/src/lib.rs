//! Anthropic-compatible content-block stream adapter for `llm-relay`.
//!
//! Implements [`Protocol`](llm_relay::Protocol) for the Messages API
//! event stream ([`AnthropicProtocol`]) and a reqwest-backed
//! [`AnthropicProvider`] that opens the stream and runs it through a
//! [`Pipeline`](llm_relay::Pipeline).
//!
//! Text, tool-use, thinking, and redacted-thinking blocks are assembled
//! by index into [`ContentBlock`]s. Tool input is validated when its
//! block closes. A backend that answers with one complete `message`
//! document instead of an event stream is handled by the same parser.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use llm_relay::{LlmError, collect_lines};
//! use llm_relay_anthropic::AnthropicProtocol;
//!
//! # fn example() -> Result<(), LlmError> {
//! let lines = [
//!     r#"data: {"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
//!     r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#,
//!     r#"data: {"type":"content_block_stop","index":0}"#,
//!     r#"data: {"type":"message_stop"}"#,
//! ];
//! let response = collect_lines(&AnthropicProtocol, lines, None)?;
//! assert_eq!(response.text(), "Hi");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod config;
mod convert;
mod provider;
mod stream;
mod types;

pub use config::AnthropicConfig;
pub use provider::AnthropicProvider;
pub use stream::{
    AnthropicDecoder, AnthropicFrame, AnthropicProtocol, BlockAssembler, ContentBlock,
};
