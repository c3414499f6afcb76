//! `OpenAI`-compatible delta stream adapter for `llm-relay`.
//!
//! Implements [`Protocol`](llm_relay::Protocol) for the Chat Completions
//! wire format ([`OpenAiProtocol`]) and a reqwest-backed
//! [`OpenAiProvider`] that opens the stream and runs it through a
//! [`Pipeline`](llm_relay::Pipeline).
//!
//! Handles indexed and unindexed tool-call deltas, the legacy
//! `function_call` and `text` shapes, dedicated reasoning fields with an
//! inline `<think>` fallback, in-stream error frames, and servers that
//! answer a streaming request with one complete JSON document.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use llm_relay::{LlmError, collect_lines};
//! use llm_relay_openai::OpenAiProtocol;
//!
//! # fn example() -> Result<(), LlmError> {
//! let lines = [
//!     r#"data: {"choices":[{"index":0,"delta":{"content":"Hi"}}]}"#,
//!     "data: [DONE]",
//! ];
//! let response = collect_lines(&OpenAiProtocol, lines, None)?;
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

pub use config::OpenAiConfig;
pub use provider::OpenAiProvider;
pub use stream::{DeltaAssembler, OpenAiDecoder, OpenAiFrame, OpenAiProtocol};
