//! The streaming harness: connect, decode in the background, deliver in
//! order.
//!
//! A [`Pipeline`] drives one call through
//!
//! ```text
//! Idle -> Connected -> Streaming -> Completed | Failed | Cancelled
//! ```
//!
//! Connecting retries only on a rate limit (HTTP 429) reported before
//! any byte was read, with a fixed backoff from [`RetryPolicy`]. Once
//! connected, a spawned producer task splits the body into lines and
//! decodes frames; it hands each frame over a single-slot channel, so
//! a slow handler backpressures decoding instead of buffering events.
//! The calling task applies frames to the assembler and invokes the
//! handler in arrival order.
//!
//! Cancellation is observed on both sides. The producer runs under a
//! child of the caller's token which is also cancelled when the
//! pipeline returns (or its future is dropped), so the body is always
//! released.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::adapter::{Assembler, Decoded, FrameDecoder, Progress, Protocol};
use crate::error::LlmError;
use crate::event::EventHandler;
use crate::response::AggregateResponse;
use crate::sse::LineDecoder;

/// A response body as a stream of byte chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, LlmError>> + Send>>;

/// Opens a response body.
///
/// Implementations send the request and return the body once the
/// status is known. A rate limit must surface as an
/// [`LlmError::Http`] with status 429 so the pipeline can retry it.
pub trait Transport: Send + Sync {
    /// Sends the request and returns the body stream.
    fn open(&self) -> impl Future<Output = Result<ByteStream, LlmError>> + Send;
}

/// Pre-stream retry budget for rate-limited requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }
}

/// Where a [`Pipeline`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    /// Not started.
    #[default]
    Idle,
    /// The body is open; no frame read yet.
    Connected,
    /// At least one frame has been read.
    Streaming,
    /// Finished with a response.
    Completed,
    /// Finished with an error.
    Failed,
    /// The caller cancelled.
    Cancelled,
}

impl PipelineState {
    /// Returns `true` for `Completed`, `Failed` and `Cancelled`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

type Item<F> = Result<Decoded<F>, LlmError>;

/// Runs one streamed call for a [`Protocol`].
///
/// A pipeline is single-use: it reaches a terminal state exactly once
/// and refuses to run again.
#[derive(Debug)]
pub struct Pipeline<P> {
    protocol: P,
    retry: RetryPolicy,
    state: PipelineState,
}

impl<P: Protocol> Pipeline<P> {
    /// Creates an idle pipeline with the default [`RetryPolicy`].
    pub fn new(protocol: P) -> Self {
        Self {
            protocol,
            retry: RetryPolicy::default(),
            state: PipelineState::Idle,
        }
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Opens the body through `transport` and streams it.
    ///
    /// Returns the finished response, or the first error. Partial
    /// content is never returned.
    pub async fn run<T: Transport>(
        &mut self,
        transport: &T,
        handler: Option<&mut (dyn EventHandler + '_)>,
        cancel: &CancellationToken,
    ) -> Result<AggregateResponse, LlmError> {
        self.ensure_idle()?;
        let result = match connect(transport, self.retry, cancel).await {
            Ok(source) => self.stream(source, handler, cancel).await,
            Err(err) => Err(err),
        };
        self.settle(result)
    }

    /// Streams an already-open body.
    pub async fn run_source(
        &mut self,
        source: ByteStream,
        handler: Option<&mut (dyn EventHandler + '_)>,
        cancel: &CancellationToken,
    ) -> Result<AggregateResponse, LlmError> {
        self.ensure_idle()?;
        let result = self.stream(source, handler, cancel).await;
        self.settle(result)
    }

    fn ensure_idle(&self) -> Result<(), LlmError> {
        if self.state == PipelineState::Idle {
            Ok(())
        } else {
            Err(LlmError::InvalidRequest(format!(
                "pipeline already ran (state {:?})",
                self.state
            )))
        }
    }

    fn transition(&mut self, next: PipelineState) {
        debug!(from = ?self.state, to = ?next, "Pipeline state change");
        self.state = next;
    }

    fn settle(
        &mut self,
        result: Result<AggregateResponse, LlmError>,
    ) -> Result<AggregateResponse, LlmError> {
        let next = match &result {
            Ok(_) => PipelineState::Completed,
            Err(err) if err.is_cancelled() => PipelineState::Cancelled,
            Err(_) => PipelineState::Failed,
        };
        self.transition(next);
        result
    }

    async fn stream(
        &mut self,
        source: ByteStream,
        handler: Option<&mut (dyn EventHandler + '_)>,
        cancel: &CancellationToken,
    ) -> Result<AggregateResponse, LlmError> {
        self.transition(PipelineState::Connected);

        let producer_token = cancel.child_token();
        let guard = producer_token.clone().drop_guard();
        let (tx, rx) = mpsc::channel(1);
        let producer = tokio::spawn(produce(
            self.protocol.decoder(),
            source,
            tx,
            producer_token,
        ));

        let result = self.consume(rx, handler, cancel).await;

        drop(guard);
        if let Err(err) = producer.await {
            warn!(error = %err, "Stream producer task failed");
        }
        result
    }

    async fn consume(
        &mut self,
        mut rx: mpsc::Receiver<Item<P::Frame>>,
        mut handler: Option<&mut (dyn EventHandler + '_)>,
        cancel: &CancellationToken,
    ) -> Result<AggregateResponse, LlmError> {
        let mut assembler = self.protocol.assembler();
        loop {
            let item = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(LlmError::Cancelled),
                item = rx.recv() => item,
            };
            let frame = match item {
                None | Some(Ok(Decoded::End)) => break,
                Some(Err(err)) => return Err(err),
                Some(Ok(Decoded::Frame(frame))) => frame,
            };
            if self.state == PipelineState::Connected {
                self.transition(PipelineState::Streaming);
            }
            if assembler.apply(frame, handler.as_deref_mut())? == Progress::Finished {
                break;
            }
        }
        if cancel.is_cancelled() {
            return Err(LlmError::Cancelled);
        }
        assembler.finish(handler)
    }
}

async fn connect<T: Transport>(
    transport: &T,
    retry: RetryPolicy,
    cancel: &CancellationToken,
) -> Result<ByteStream, LlmError> {
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(LlmError::Cancelled),
            opened = transport.open() => opened,
        };
        match opened {
            Ok(source) => return Ok(source),
            Err(err) if err.is_rate_limited() => {
                if attempts > retry.max_retries {
                    return Err(LlmError::RetryExhausted {
                        attempts,
                        last_error: Box::new(err),
                    });
                }
                warn!(
                    attempt = attempts,
                    backoff_ms = u64::try_from(retry.backoff.as_millis()).unwrap_or(u64::MAX),
                    "Rate limited before streaming, retrying"
                );
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(LlmError::Cancelled),
                    () = tokio::time::sleep(retry.backoff) => {}
                }
            }
            Err(err) => return Err(err),
        }
    }
}

async fn produce<D: FrameDecoder>(
    mut decoder: D,
    mut source: ByteStream,
    tx: mpsc::Sender<Item<D::Frame>>,
    cancel: CancellationToken,
) {
    if let Err(err) = pump(&mut decoder, &mut source, &tx, &cancel).await {
        send(&tx, Err(err), &cancel).await;
    }
}

async fn pump<D: FrameDecoder>(
    decoder: &mut D,
    source: &mut ByteStream,
    tx: &mpsc::Sender<Item<D::Frame>>,
    cancel: &CancellationToken,
) -> Result<(), LlmError> {
    let mut lines = LineDecoder::new();
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            next = source.next() => next,
        };
        let Some(chunk) = next else {
            break;
        };
        for line in lines.push(&chunk?)? {
            if !forward(decoder.decode_line(&line)?, tx, cancel).await {
                return Ok(());
            }
        }
    }

    if let Some(line) = lines.finish() {
        if !forward(decoder.decode_line(&line)?, tx, cancel).await {
            return Ok(());
        }
    }
    forward(decoder.finish()?, tx, cancel).await;
    Ok(())
}

/// Hands one decoded item to the consumer. Returns `false` once reading
/// should stop.
async fn forward<F>(
    decoded: Option<Decoded<F>>,
    tx: &mpsc::Sender<Item<F>>,
    cancel: &CancellationToken,
) -> bool {
    match decoded {
        None => true,
        Some(Decoded::End) => {
            send(tx, Ok(Decoded::End), cancel).await;
            false
        }
        Some(frame) => send(tx, Ok(frame), cancel).await,
    }
}

async fn send<F>(tx: &mpsc::Sender<Item<F>>, item: Item<F>, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        sent = tx.send(item) => sent.is_ok(),
    }
}
