//! Token usage reported by a stream.
//!
//! Vendors report usage at different points: `OpenAI` in a final chunk,
//! Anthropic split across `message_start` (input) and `message_delta`
//! (output). Adapters fold whatever arrives into one [`Usage`].

use serde::{Deserialize, Serialize};

/// Token counts for a single request/response pair.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt.
    pub input_tokens: u64,
    /// Tokens produced by the model's response.
    pub output_tokens: u64,
    /// Tokens used for chain-of-thought reasoning, if reported.
    pub reasoning_tokens: Option<u64>,
    /// Tokens served from the provider's prompt cache.
    pub cache_read_tokens: Option<u64>,
    /// Tokens written into the provider's prompt cache.
    pub cache_write_tokens: Option<u64>,
}
