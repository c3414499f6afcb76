//! Line framing for Server-Sent Events bodies.
//!
//! Bytes arrive in arbitrary network chunks. [`LineDecoder`] turns them
//! into complete UTF-8 lines, [`classify`] says what each line is, and
//! [`RawBody`] collects lines that are not SSE at all into one JSON
//! document (the non-streaming fallback).

use serde_json::Value;
use tracing::debug;

use crate::error::LlmError;

/// Maximum size for buffers before we abort the stream.
const MAX_BUF: usize = 16 * 1024 * 1024; // 16 MiB

/// The payload that ends an SSE stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Splits a byte stream into lines.
///
/// Multi-byte UTF-8 sequences split across chunks are reassembled;
/// permanently invalid bytes are dropped. Both `\n` and `\r\n` endings
/// are accepted.
#[derive(Debug, Default)]
pub struct LineDecoder {
    pending: Vec<u8>,
    buffer: String,
}

impl LineDecoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns every line it completed.
    ///
    /// Fails once an unterminated line grows past 16 MiB.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>, LlmError> {
        self.pending.extend_from_slice(bytes);
        if self.pending.len() > MAX_BUF || self.buffer.len() > MAX_BUF {
            self.pending.clear();
            self.buffer.clear();
            return Err(LlmError::ResponseFormat {
                message: "SSE stream buffer exceeded 16 MiB".into(),
                raw: String::new(),
            });
        }
        self.drain_utf8();

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.buffer[start..].find('\n') {
            let end = start + pos;
            let line = &self.buffer[start..end];
            lines.push(line.strip_suffix('\r').unwrap_or(line).to_owned());
            start = end + 1;
        }
        self.buffer.drain(..start);
        Ok(lines)
    }

    /// Returns the trailing unterminated line, if any.
    pub fn finish(&mut self) -> Option<String> {
        self.drain_utf8();
        self.pending.clear();
        let mut line = std::mem::take(&mut self.buffer);
        if line.ends_with('\r') {
            line.pop();
        }
        (!line.is_empty()).then_some(line)
    }

    fn drain_utf8(&mut self) {
        while !self.pending.is_empty() {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    self.pending.clear();
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    if let Ok(valid) = std::str::from_utf8(&self.pending[..valid_up_to]) {
                        self.buffer.push_str(valid);
                    }
                    match e.error_len() {
                        // Skip past permanently invalid bytes
                        Some(len) => {
                            self.pending.drain(..valid_up_to + len);
                        }
                        // Incomplete sequence; wait for the next chunk
                        None => {
                            self.pending.drain(..valid_up_to);
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// What a single line of an SSE body is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line<'a> {
    /// Empty or whitespace-only; separates events.
    Blank,
    /// `: keep-alive` and similar.
    Comment,
    /// An `event:`, `id:` or `retry:` field.
    Field,
    /// The trimmed payload of a `data:` line.
    Data(&'a str),
    /// `data: [DONE]`.
    Done,
    /// Anything without a recognized prefix.
    Raw(&'a str),
}

/// Classifies one line.
pub fn classify(line: &str) -> Line<'_> {
    if line.trim().is_empty() {
        return Line::Blank;
    }
    if line.starts_with(':') {
        return Line::Comment;
    }
    if let Some(payload) = line.strip_prefix("data:") {
        let payload = payload.trim();
        return if payload == DONE_SENTINEL {
            Line::Done
        } else {
            Line::Data(payload)
        };
    }
    if ["event:", "id:", "retry:"]
        .iter()
        .any(|field| line.starts_with(field))
    {
        return Line::Field;
    }
    Line::Raw(line)
}

/// Parses `text` as a JSON object.
///
/// Returns `None` unless the trimmed text is enclosed in `{}` and is
/// valid JSON.
pub fn parse_object(text: &str) -> Option<Value> {
    let text = text.trim();
    if !(text.starts_with('{') && text.ends_with('}')) {
        return None;
    }
    match serde_json::from_str::<Value>(text) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// Buffers raw (non-SSE) lines until they form one JSON object.
///
/// Pretty-printed bodies span many lines; a compact body is complete
/// after one. Lines that cannot start an object are skipped.
#[derive(Debug, Default)]
pub struct RawBody {
    buf: String,
}

impl RawBody {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a line and returns the document once it is complete.
    pub fn push(&mut self, line: &str) -> Result<Option<Value>, LlmError> {
        let line = line.trim();
        if self.buf.is_empty() && !line.starts_with('{') {
            debug!(line, "Skipping unrecognized line");
            return Ok(None);
        }
        if self.buf.len() + line.len() > MAX_BUF {
            self.buf.clear();
            return Err(LlmError::ResponseFormat {
                message: "response body exceeded 16 MiB".into(),
                raw: String::new(),
            });
        }
        self.buf.push_str(line);
        self.buf.push('\n');

        if !line.ends_with('}') {
            return Ok(None);
        }
        let Some(value) = parse_object(&self.buf) else {
            return Ok(None);
        };
        self.buf.clear();
        Ok(Some(value))
    }

    /// Returns `true` if no partial document is buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Discards and returns whatever is buffered.
    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.buf)
    }
}
