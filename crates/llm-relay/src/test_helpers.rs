//! Pre-built helpers for testing adapters and pipelines.
//!
//! Available when the `test-utils` feature is enabled, allowing the
//! vendor crates to reuse these utilities in their own test suites.
//! Also compiled during `#[cfg(test)]` for this crate's own tests.
//! Provides in-memory byte sources, a scripted [`Transport`], and an
//! event-recording handler.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::StreamExt;

use crate::error::LlmError;
use crate::event::{Event, EventHandler, ToolCall};
use crate::pipeline::{ByteStream, Transport};

/// Formats JSON payloads as an SSE body: one `data:` event per payload,
/// followed by the `[DONE]` terminator.
pub fn sse_body(payloads: &[&str]) -> String {
    let mut body: String = payloads
        .iter()
        .map(|payload| format!("data: {payload}\n\n"))
        .collect();
    body.push_str("data: [DONE]\n\n");
    body
}

/// A body that yields `chunks` in order, then ends.
pub fn byte_source<I, S>(chunks: I) -> ByteStream
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let chunks: Vec<Result<Bytes, LlmError>> = chunks
        .into_iter()
        .map(|chunk| Ok(Bytes::from(chunk.into())))
        .collect();
    Box::pin(futures::stream::iter(chunks))
}

/// Splits `body` into chunks of `size` bytes, ignoring character
/// boundaries, to exercise reassembly.
pub fn chunked_source(body: &str, size: usize) -> ByteStream {
    let chunks: Vec<Result<Bytes, LlmError>> = body
        .as_bytes()
        .chunks(size.max(1))
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect();
    Box::pin(futures::stream::iter(chunks))
}

/// A body that yields `chunks` and then never ends.
///
/// The returned flag flips to `true` once the stream is dropped, so
/// tests can check the pipeline released it.
pub fn pending_source<I, S>(chunks: I) -> (ByteStream, Arc<AtomicBool>)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    let dropped = Arc::new(AtomicBool::new(false));
    let flag = DropFlag(Arc::clone(&dropped));
    let stream = byte_source(chunks)
        .chain(futures::stream::pending())
        .map(move |item| {
            let _keep = &flag;
            item
        });
    (Box::pin(stream), dropped)
}

/// One scripted outcome of [`ScriptedTransport::open`].
#[derive(Debug, Clone)]
pub enum Reply {
    /// HTTP 429.
    RateLimited,
    /// Any other non-success status.
    Status(http::StatusCode),
    /// A successful body delivered as these chunks.
    Body(Vec<String>),
}

/// A [`Transport`] that replays a fixed script of replies.
///
/// # Panics
///
/// [`open`](Transport::open) panics once the script is exhausted.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    attempts: AtomicU32,
}

impl ScriptedTransport {
    /// Creates a transport that answers with `replies` in order.
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            attempts: AtomicU32::new(0),
        }
    }

    /// How many times [`open`](Transport::open) was called.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Transport for ScriptedTransport {
    async fn open(&self) -> Result<ByteStream, LlmError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedTransport: no replies remaining");
        match reply {
            Reply::RateLimited => Err(LlmError::Http {
                status: Some(http::StatusCode::TOO_MANY_REQUESTS),
                message: "rate limited".into(),
                retryable: true,
            }),
            Reply::Status(status) => Err(LlmError::Http {
                status: Some(status),
                message: format!("status {status}"),
                retryable: status.is_server_error(),
            }),
            Reply::Body(chunks) => Ok(byte_source(chunks)),
        }
    }
}

/// An [`EventHandler`] that records every event.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    /// Events in delivery order.
    pub events: Vec<Event>,
}

impl EventLog {
    /// Concatenated text payloads.
    pub fn texts(&self) -> String {
        self.events.iter().map(Event::content).collect()
    }

    /// Concatenated reasoning payloads.
    pub fn reasoning(&self) -> String {
        self.events.iter().map(Event::reasoning_content).collect()
    }

    /// Tool-call fragments in delivery order.
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.events.iter().filter_map(Event::tool_call).collect()
    }

    /// Number of `Done` events seen.
    pub fn done_count(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, Event::Done))
            .count()
    }
}

impl EventHandler for EventLog {
    fn handle(&mut self, event: Event) -> Result<(), LlmError> {
        self.events.push(event);
        Ok(())
    }
}

/// Installs a test subscriber honouring `RUST_LOG`. Safe to call from
/// every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_body_format() {
        let body = sse_body(&["{\"a\":1}"]);
        assert_eq!(body, "data: {\"a\":1}\n\ndata: [DONE]\n\n");
    }

    #[tokio::test]
    async fn test_chunked_source_preserves_bytes() {
        let chunks: Vec<_> = chunked_source("héllo", 2).collect().await;
        let bytes: Vec<u8> = chunks
            .into_iter()
            .flat_map(|c| c.unwrap().to_vec())
            .collect();
        assert_eq!(String::from_utf8(bytes).unwrap(), "héllo");
    }

    #[tokio::test]
    async fn test_scripted_transport_counts_attempts() {
        let transport = ScriptedTransport::new([Reply::RateLimited, Reply::Body(vec![])]);
        assert!(matches!(transport.open().await, Err(err) if err.is_rate_limited()));
        assert!(transport.open().await.is_ok());
        assert_eq!(transport.attempts(), 2);
    }

    #[test]
    fn test_event_log_accessors() {
        let mut log = EventLog::default();
        log.handle(Event::new_text("a")).unwrap();
        log.handle(Event::new_reasoning("r")).unwrap();
        log.handle(Event::new_done()).unwrap();
        assert_eq!(log.texts(), "a");
        assert_eq!(log.reasoning(), "r");
        assert_eq!(log.done_count(), 1);
        init_tracing();
    }
}
