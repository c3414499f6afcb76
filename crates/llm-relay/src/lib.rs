//! # llm-relay
//!
//! Vendor-neutral streaming normalization for large language model
//! responses.
//!
//! Every backend streams the same logical things (answer text, reasoning
//! text, tool calls, completion) in its own wire format. This crate
//! defines the shared [`Event`] vocabulary those formats are reduced to,
//! the primitives adapters use to reassemble fragments, and the
//! [`Pipeline`] that runs a stream with cancellation and in-order
//! delivery. Concrete wire protocols live in sibling crates and
//! implement [`Protocol`].
//!
//! # Adapter crates
//!
//! | Crate | Wire shape |
//! |-------|------------|
//! | `llm-relay-openai` | Delta/object-merge SSE (`OpenAI`-compatible) |
//! | `llm-relay-anthropic` | Indexed content blocks (Anthropic-compatible) |
//!
//! # Architecture
//!
//! ```text
//!  bytes ──► LineDecoder ──► FrameDecoder ──► [channel] ──► Assembler ──► EventHandler
//!            (sse)           (producer task)                (consumer)  └► AggregateResponse
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use llm_relay::{Event, LlmError, Pipeline, Protocol, pipeline::ByteStream};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example<P: Protocol>(protocol: P, body: ByteStream) -> Result<(), LlmError> {
//! let mut on_event = |event: Event| -> Result<(), LlmError> {
//!     print!("{}", event.content());
//!     Ok(())
//! };
//! let response = Pipeline::new(protocol)
//!     .run_source(body, Some(&mut on_event), &CancellationToken::new())
//!     .await?;
//! println!("\n{} choices", response.choices.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`event`] | Events, tool calls, and the [`EventHandler`] callback |
//! | [`splitter`] | Separating inline `<think>` markup from text |
//! | [`accumulator`] | Reassembling tool calls from fragments |
//! | [`response`] | The final [`AggregateResponse`] |
//! | [`sse`] | Byte-to-line framing and line classification |
//! | [`adapter`] | The [`Protocol`] contract and a synchronous driver |
//! | [`pipeline`] | Background decoding, delivery, retry, cancellation |
//! | [`error`] | Unified [`LlmError`] |
//! | [`usage`] | Token counts |

#![warn(missing_docs)]

pub mod accumulator;
pub mod adapter;
pub mod error;
pub mod event;
pub mod pipeline;
pub mod response;
pub mod splitter;
pub mod sse;
pub mod usage;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_helpers;

pub use accumulator::{ToolCallAccumulator, ToolCallDelta};
pub use adapter::{Assembler, Decoded, FrameDecoder, Progress, Protocol, collect_lines};
pub use error::LlmError;
pub use event::{Event, EventError, EventHandler, EventKind, ToolCall};
pub use pipeline::{Pipeline, PipelineState, RetryPolicy, Transport};
pub use response::{AggregateResponse, Choice, StopReason};
pub use splitter::{ReasoningSplitter, SplitterState, split_content};
pub use usage::Usage;
