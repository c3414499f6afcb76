//! Connection settings for [`AnthropicProvider`](crate::AnthropicProvider).
//!
//! The request body is the caller's. The provider only sets `stream`
//! and fills `model` and `max_tokens` when the body leaves them out.

use std::time::Duration;

use llm_relay::pipeline::RetryPolicy;

/// Where and how to reach a Messages API endpoint, plus the fallbacks
/// for required body fields.
///
/// ```rust
/// use llm_relay_anthropic::AnthropicConfig;
///
/// let config = AnthropicConfig {
///     api_key: "sk-ant-...".into(),
///     max_tokens: 1024,
///     ..Default::default()
/// };
/// assert_eq!(config.api_version, "2023-06-01");
/// ```
#[derive(Clone)]
pub struct AnthropicConfig {
    /// Sent as `x-api-key`.
    pub api_key: String,
    /// Fallback `model` for bodies that name none.
    pub model: String,
    /// Endpoint root; `/v1/messages` is appended.
    pub base_url: String,
    /// Fallback `max_tokens` for bodies that name none.
    pub max_tokens: u32,
    /// Sent as `anthropic-version`.
    pub api_version: String,
    /// Request timeout. `None` uses reqwest's default.
    pub timeout: Option<Duration>,
    /// Pre-configured HTTP client for connection pooling across providers.
    /// When `None`, a new client is created.
    pub client: Option<reqwest::Client>,
    /// Retry budget for requests rate-limited before streaming starts.
    pub retry: RetryPolicy,
}

impl std::fmt::Debug for AnthropicConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicConfig")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("max_tokens", &self.max_tokens)
            .field("api_version", &self.api_version)
            .field("timeout", &self.timeout)
            .field("client", &self.client.as_ref().map(|_| "..."))
            .field("retry", &self.retry)
            .finish()
    }
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "claude-sonnet-4-20250514".into(),
            base_url: "https://api.anthropic.com".into(),
            max_tokens: 4096,
            api_version: "2023-06-01".into(),
            timeout: None,
            client: None,
            retry: RetryPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AnthropicConfig::default();
        assert_eq!(config.model, "claude-sonnet-4-20250514");
        assert_eq!(config.base_url, "https://api.anthropic.com");
        assert_eq!(config.max_tokens, 4096);
        assert_eq!(config.api_version, "2023-06-01");
        assert!(config.api_key.is_empty());
        assert!(config.timeout.is_none());
        assert!(config.client.is_none());
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = AnthropicConfig {
            api_key: "sk-ant-super-secret".into(),
            ..Default::default()
        };
        let debug_output = format!("{config:?}");
        assert!(!debug_output.contains("sk-ant-super-secret"));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[test]
    fn test_fallbacks_override_independently() {
        let config = AnthropicConfig {
            max_tokens: 1024,
            retry: RetryPolicy::none(),
            ..Default::default()
        };
        assert_eq!(config.model, "claude-sonnet-4-20250514");
        assert_eq!(config.max_tokens, 1024);
        assert_eq!(config.retry.max_retries, 0);
        assert_eq!(config.base_url, "https://api.anthropic.com");
    }
}
