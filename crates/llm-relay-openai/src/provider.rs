//! HTTP transport for the `OpenAI` Chat Completions API.

use futures::StreamExt;
use llm_relay::error::LlmError;
use llm_relay::event::EventHandler;
use llm_relay::pipeline::{ByteStream, Pipeline, Transport};
use llm_relay::response::AggregateResponse;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::config::OpenAiConfig;
use crate::convert;
use crate::stream::OpenAiProtocol;

/// Streams chat completions from an `OpenAI`-compatible endpoint.
///
/// The request body is passed through as JSON; the provider only fills
/// in `model` when absent and sets the streaming flags.
///
/// # Example
///
/// ```rust,no_run
/// use llm_relay::{Event, LlmError};
/// use llm_relay_openai::{OpenAiConfig, OpenAiProvider};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), LlmError> {
/// let provider = OpenAiProvider::new(OpenAiConfig {
///     api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
///     ..Default::default()
/// })?;
///
/// let body = serde_json::json!({
///     "messages": [{"role": "user", "content": "Hello!"}],
/// });
/// let mut on_event = |event: Event| -> Result<(), LlmError> {
///     print!("{}", event.content());
///     Ok(())
/// };
/// let response = provider
///     .stream_chat(&body, Some(&mut on_event), &CancellationToken::new())
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct OpenAiProvider {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiProvider {
    /// Create a new `OpenAI` provider from configuration.
    ///
    /// If `config.client` is `Some`, that client is reused for connection
    /// pooling. Otherwise a new client is built with the configured timeout.
    pub fn new(config: OpenAiConfig) -> Result<Self, LlmError> {
        let client = match config.client.clone() {
            Some(client) => client,
            None => {
                let mut builder = reqwest::Client::builder();
                if let Some(timeout) = config.timeout {
                    builder = builder.timeout(timeout);
                }
                builder.build().map_err(|e| LlmError::Http {
                    status: None,
                    message: format!("Failed to build HTTP client: {e}"),
                    retryable: false,
                })?
            }
        };
        Ok(Self { config, client })
    }

    /// Streams one chat completion, delivering events to `handler` as
    /// they are decoded.
    #[instrument(skip_all, fields(model = %self.config.model))]
    pub async fn stream_chat(
        &self,
        body: &Value,
        handler: Option<&mut (dyn EventHandler + '_)>,
        cancel: &CancellationToken,
    ) -> Result<AggregateResponse, LlmError> {
        let request = ChatRequest {
            provider: self,
            body: self.request_body(body, true)?,
        };
        Pipeline::new(OpenAiProtocol)
            .with_retry(self.config.retry)
            .run(&request, handler, cancel)
            .await
    }

    /// Requests a complete, non-streamed chat completion.
    ///
    /// The body is parsed by the same assembler as a stream.
    #[instrument(skip_all, fields(model = %self.config.model))]
    pub async fn generate(
        &self,
        body: &Value,
        cancel: &CancellationToken,
    ) -> Result<AggregateResponse, LlmError> {
        let request = ChatRequest {
            provider: self,
            body: self.request_body(body, false)?,
        };
        Pipeline::new(OpenAiProtocol)
            .with_retry(self.config.retry)
            .run(&request, None, cancel)
            .await
    }

    /// Build the default headers for `OpenAI` API requests.
    fn default_headers(&self) -> Result<HeaderMap, LlmError> {
        let mut headers = HeaderMap::new();

        let auth_value = format!("Bearer {}", self.config.api_key);
        headers.insert(
            "authorization",
            HeaderValue::from_str(&auth_value)
                .map_err(|_| LlmError::Auth("API key contains invalid header characters".into()))?,
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        if let Some(org) = &self.config.organization {
            headers.insert(
                "openai-organization",
                HeaderValue::from_str(org).map_err(|_| {
                    LlmError::InvalidRequest(
                        "Organization ID contains invalid header characters".into(),
                    )
                })?,
            );
        }

        Ok(headers)
    }

    /// Build the full URL for the chat completions endpoint.
    fn completions_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        format!("{base}/chat/completions")
    }

    /// Copies the caller's body and sets the fields this provider owns.
    fn request_body(&self, body: &Value, stream: bool) -> Result<Value, LlmError> {
        let Value::Object(fields) = body else {
            return Err(LlmError::InvalidRequest(
                "request body must be a JSON object".into(),
            ));
        };
        let mut fields = fields.clone();
        fields
            .entry("model")
            .or_insert_with(|| Value::String(self.config.model.clone()));
        fields.insert("stream".into(), Value::Bool(stream));
        if stream {
            fields
                .entry("stream_options")
                .or_insert_with(|| json!({"include_usage": true}));
        } else {
            fields.remove("stream_options");
        }
        Ok(Value::Object(fields))
    }

    /// Send a request to the `OpenAI` API and return the raw response.
    async fn send_request(&self, body: &Value) -> Result<reqwest::Response, LlmError> {
        let response = self
            .client
            .post(self.completions_url())
            .headers(self.default_headers()?)
            .json(body)
            .send()
            .await
            .map_err(|e| self.convert_send_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let http_status = http::StatusCode::from_u16(status.as_u16())
                .unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR);
            return Err(convert::convert_error(http_status, &body));
        }

        Ok(response)
    }

    fn convert_send_error(&self, e: &reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout {
                elapsed_ms: self
                    .config
                    .timeout
                    .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            }
        } else {
            LlmError::Http {
                status: e.status().map(|s| {
                    http::StatusCode::from_u16(s.as_u16())
                        .unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR)
                }),
                message: e.to_string(),
                retryable: e.is_connect(),
            }
        }
    }
}

/// One prepared request; each [`open`](Transport::open) sends it again.
struct ChatRequest<'a> {
    provider: &'a OpenAiProvider,
    body: Value,
}

impl Transport for ChatRequest<'_> {
    async fn open(&self) -> Result<ByteStream, LlmError> {
        let response = self.provider.send_request(&self.body).await?;
        Ok(byte_stream(response))
    }
}

/// Adapts a reqwest body into the pipeline's byte stream.
fn byte_stream(response: reqwest::Response) -> ByteStream {
    Box::pin(response.bytes_stream().map(|chunk| {
        chunk.map_err(|e| LlmError::Http {
            status: None,
            message: format!("Stream read error: {e}"),
            retryable: true,
        })
    }))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn provider(config: OpenAiConfig) -> OpenAiProvider {
        OpenAiProvider::new(config).unwrap()
    }

    #[test]
    fn test_completions_url() {
        let provider = provider(OpenAiConfig {
            base_url: "https://api.openai.com/v1".into(),
            ..Default::default()
        });
        assert_eq!(
            provider.completions_url(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_completions_url_trailing_slash() {
        let provider = provider(OpenAiConfig {
            base_url: "https://proxy.example.com/v1/".into(),
            ..Default::default()
        });
        assert_eq!(
            provider.completions_url(),
            "https://proxy.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_default_headers() {
        let provider = provider(OpenAiConfig {
            api_key: "sk-test123".into(),
            ..Default::default()
        });
        let headers = provider.default_headers().unwrap();

        assert_eq!(headers.get("authorization").unwrap(), "Bearer sk-test123");
        assert_eq!(headers.get("content-type").unwrap(), "application/json");
    }

    #[test]
    fn test_default_headers_with_org() {
        let provider = provider(OpenAiConfig {
            api_key: "sk-test123".into(),
            organization: Some("org-abc".into()),
            ..Default::default()
        });
        let headers = provider.default_headers().unwrap();

        assert_eq!(headers.get("openai-organization").unwrap(), "org-abc");
    }

    #[test]
    fn test_default_headers_invalid_key() {
        let provider = provider(OpenAiConfig {
            api_key: "invalid\nkey".into(),
            ..Default::default()
        });
        let err = provider.default_headers().unwrap_err();
        assert!(matches!(err, LlmError::Auth(_)));
    }

    #[test]
    fn test_request_body_streaming_flags() {
        let provider = provider(OpenAiConfig::default());
        let body = provider
            .request_body(&json!({"messages": []}), true)
            .unwrap();
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);
    }

    #[test]
    fn test_request_body_keeps_caller_model() {
        let provider = provider(OpenAiConfig::default());
        let body = provider
            .request_body(&json!({"model": "gpt-4o-mini", "stream_options": {}}), false)
            .unwrap();
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["stream"], false);
        assert!(body.get("stream_options").is_none());
    }

    #[test]
    fn test_request_body_must_be_object() {
        let provider = provider(OpenAiConfig::default());
        let err = provider.request_body(&json!([1, 2]), true).unwrap_err();
        assert!(matches!(err, LlmError::InvalidRequest(_)));
    }

    #[test]
    fn test_new_with_custom_client() {
        let custom_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap();

        let provider = provider(OpenAiConfig {
            client: Some(custom_client),
            ..Default::default()
        });
        assert_eq!(provider.config.model, "gpt-4o");
    }
}
