//! Connection settings for [`OpenAiProvider`](crate::OpenAiProvider).
//!
//! The provider forwards the caller's request body untouched apart from
//! `stream` and `stream_options`, so this holds only what the body
//! cannot carry: credentials, endpoint, transport, and the retry budget.

use std::time::Duration;

use llm_relay::pipeline::RetryPolicy;

/// Where and how to reach a Chat Completions endpoint.
///
/// `model` is a fallback: it is written into a request body only when
/// the body has no `model` of its own.
///
/// ```rust
/// use llm_relay_openai::OpenAiConfig;
///
/// // A local OpenAI-compatible server that ignores the key.
/// let config = OpenAiConfig {
///     base_url: "http://localhost:8000/v1".into(),
///     model: "qwen3-8b".into(),
///     ..Default::default()
/// };
/// assert!(config.api_key.is_empty());
/// ```
#[derive(Clone)]
pub struct OpenAiConfig {
    /// Sent as a bearer token.
    pub api_key: String,
    /// Fallback `model` for bodies that name none.
    pub model: String,
    /// Endpoint root; `/chat/completions` is appended.
    pub base_url: String,
    /// Sent as `OpenAI-Organization` when set.
    pub organization: Option<String>,
    /// Request timeout. `None` uses reqwest's default.
    pub timeout: Option<Duration>,
    /// Pre-configured HTTP client for connection pooling across providers.
    /// When `None`, a new client is created.
    pub client: Option<reqwest::Client>,
    /// Retry budget for requests rate-limited before streaming starts.
    pub retry: RetryPolicy,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("organization", &self.organization)
            .field("timeout", &self.timeout)
            .field("client", &self.client.as_ref().map(|_| "..."))
            .field("retry", &self.retry)
            .finish()
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gpt-4o".into(),
            base_url: "https://api.openai.com/v1".into(),
            organization: None,
            timeout: None,
            client: None,
            retry: RetryPolicy::default(),
        }
    }
}
