//! HTTP transport for the Anthropic Messages API.

use futures::StreamExt;
use llm_relay::error::LlmError;
use llm_relay::event::EventHandler;
use llm_relay::pipeline::{ByteStream, Pipeline, Transport};
use llm_relay::response::AggregateResponse;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::config::AnthropicConfig;
use crate::convert;
use crate::stream::AnthropicProtocol;

/// Streams messages from an Anthropic-compatible endpoint.
///
/// The request body is passed through as JSON; the provider only fills
/// in `model` and `max_tokens` when absent and sets `stream`.
///
/// # Example
///
/// ```rust,no_run
/// use llm_relay::{Event, LlmError};
/// use llm_relay_anthropic::{AnthropicConfig, AnthropicProvider};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), LlmError> {
/// let provider = AnthropicProvider::new(AnthropicConfig {
///     api_key: std::env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
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
pub struct AnthropicProvider {
    config: AnthropicConfig,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider from configuration.
    ///
    /// If `config.client` is `Some`, that client is reused for connection
    /// pooling. Otherwise a new client is built with the configured timeout.
    pub fn new(config: AnthropicConfig) -> Result<Self, LlmError> {
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

    /// Streams one message, delivering events to `handler` as they are
    /// decoded.
    #[instrument(skip_all, fields(model = %self.config.model))]
    pub async fn stream_chat(
        &self,
        body: &Value,
        handler: Option<&mut (dyn EventHandler + '_)>,
        cancel: &CancellationToken,
    ) -> Result<AggregateResponse, LlmError> {
        let request = MessagesRequest {
            provider: self,
            body: self.request_body(body, true)?,
        };
        Pipeline::new(AnthropicProtocol)
            .with_retry(self.config.retry)
            .run(&request, handler, cancel)
            .await
    }

    /// Requests a complete, non-streamed message.
    #[instrument(skip_all, fields(model = %self.config.model))]
    pub async fn generate(
        &self,
        body: &Value,
        cancel: &CancellationToken,
    ) -> Result<AggregateResponse, LlmError> {
        let request = MessagesRequest {
            provider: self,
            body: self.request_body(body, false)?,
        };
        Pipeline::new(AnthropicProtocol)
            .with_retry(self.config.retry)
            .run(&request, None, cancel)
            .await
    }

    /// Build the default headers for Anthropic API requests.
    fn default_headers(&self) -> Result<HeaderMap, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.config.api_key)
                .map_err(|_| LlmError::Auth("API key contains invalid header characters".into()))?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_str(&self.config.api_version).map_err(|_| {
                LlmError::InvalidRequest("API version contains invalid header characters".into())
            })?,
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// Build the full URL for the messages endpoint.
    fn messages_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        format!("{base}/v1/messages")
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
        fields
            .entry("max_tokens")
            .or_insert_with(|| Value::from(self.config.max_tokens));
        fields.insert("stream".into(), Value::Bool(stream));
        Ok(Value::Object(fields))
    }

    /// Send a request to the Anthropic Messages API and return the raw
    /// response after validating the HTTP status.
    async fn send_request(&self, body: &Value) -> Result<reqwest::Response, LlmError> {
        let response = self
            .client
            .post(self.messages_url())
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
struct MessagesRequest<'a> {
    provider: &'a AnthropicProvider,
    body: Value,
}

impl Transport for MessagesRequest<'_> {
    async fn open(&self) -> Result<ByteStream, LlmError> {
        let response = self.provider.send_request(&self.body).await?;
        Ok(Box::pin(response.bytes_stream().map(|chunk| {
            chunk.map_err(|e| LlmError::Http {
                status: None,
                message: format!("Stream read error: {e}"),
                retryable: true,
            })
        })))
    }
}
