//! The contract every vendor adapter implements.
//!
//! An adapter is split in two halves so the decoding can run on a
//! background task while events are delivered on the caller's:
//!
//! - a [`FrameDecoder`] turns one line of the body into a typed frame.
//!   It owns no response state and runs on the producer side of the
//!   [`Pipeline`](crate::pipeline::Pipeline).
//! - an [`Assembler`] applies frames to an
//!   [`AggregateResponse`], emitting [`Event`](crate::event::Event)s as it
//!   goes. It runs on the consumer side.
//!
//! A [`Protocol`] hands out fresh halves for each call. The same halves
//! back both the live pipeline and [`collect_lines`], so a stream and a
//! recorded transcript are parsed by identical code.

use crate::error::LlmError;
use crate::event::EventHandler;
use crate::response::AggregateResponse;

/// Largest choice, tool-call, or content-block index a frame may name.
pub const MAX_INDEX: usize = 1024;

/// Rejects a wire index above [`MAX_INDEX`]. `what` names the indexed
/// thing in the error message.
pub fn check_index(index: usize, what: &str) -> Result<usize, LlmError> {
    if index > MAX_INDEX {
        return Err(LlmError::ResponseFormat {
            message: format!("{what} index {index} exceeds limit of {MAX_INDEX}"),
            raw: String::new(),
        });
    }
    Ok(index)
}

/// The outcome of decoding one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded<F> {
    /// A frame to hand to the assembler.
    Frame(F),
    /// The stream terminator; nothing after it is read.
    End,
}

/// Turns lines into frames.
pub trait FrameDecoder: Send + 'static {
    /// Decoded frame type.
    type Frame: Send + 'static;

    /// Decodes one line. `Ok(None)` means the line carried nothing
    /// (blank, comment, keep-alive, unparseable noise).
    fn decode_line(&mut self, line: &str) -> Result<Option<Decoded<Self::Frame>>, LlmError>;

    /// Called once the body is exhausted, to release anything still
    /// buffered.
    fn finish(&mut self) -> Result<Option<Decoded<Self::Frame>>, LlmError> {
        Ok(None)
    }
}

/// Whether an assembler wants more frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Keep feeding frames.
    Continue,
    /// The response is complete; stop reading.
    Finished,
}

/// Builds the aggregate response from frames and emits events.
pub trait Assembler: Send {
    /// Frame type this assembler consumes.
    type Frame;

    /// Applies one frame.
    fn apply(
        &mut self,
        frame: Self::Frame,
        handler: Option<&mut (dyn EventHandler + '_)>,
    ) -> Result<Progress, LlmError>;

    /// Finalizes the response and emits the closing
    /// [`Done`](crate::event::Event::Done) event.
    fn finish(
        self,
        handler: Option<&mut (dyn EventHandler + '_)>,
    ) -> Result<AggregateResponse, LlmError>
    where
        Self: Sized;
}

/// A wire protocol family.
pub trait Protocol: Send + Sync {
    /// Frame type shared by the decoder and assembler.
    type Frame: Send + 'static;
    /// Line decoder.
    type Decoder: FrameDecoder<Frame = Self::Frame>;
    /// Response assembler.
    type Assembler: Assembler<Frame = Self::Frame>;

    /// A fresh decoder for one call.
    fn decoder(&self) -> Self::Decoder;

    /// A fresh assembler for one call.
    fn assembler(&self) -> Self::Assembler;
}

/// Runs a protocol over already-split lines, synchronously.
///
/// Stops at the terminator or when the assembler reports the response
/// complete; lines after that are never decoded.
pub fn collect_lines<P, I>(
    protocol: &P,
    lines: I,
    mut handler: Option<&mut (dyn EventHandler + '_)>,
) -> Result<AggregateResponse, LlmError>
where
    P: Protocol,
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut decoder = protocol.decoder();
    let mut assembler = protocol.assembler();

    for line in lines {
        match decoder.decode_line(line.as_ref())? {
            None => {}
            Some(Decoded::End) => return assembler.finish(handler),
            Some(Decoded::Frame(frame)) => {
                if assembler.apply(frame, handler.as_deref_mut())? == Progress::Finished {
                    return assembler.finish(handler);
                }
            }
        }
    }

    if let Some(Decoded::Frame(frame)) = decoder.finish()? {
        assembler.apply(frame, handler.as_deref_mut())?;
    }
    assembler.finish(handler)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::event::{Event, emit_done, emit_if_text};
    use crate::sse::{Line, classify};

    /// Minimal protocol: `data: <text>` lines become text events.
    pub(crate) struct EchoProtocol;

    pub(crate) struct EchoDecoder;

    #[derive(Default)]
    pub(crate) struct EchoAssembler {
        response: AggregateResponse,
    }

    impl FrameDecoder for EchoDecoder {
        type Frame = String;

        fn decode_line(&mut self, line: &str) -> Result<Option<Decoded<String>>, LlmError> {
            match classify(line) {
                Line::Data("boom") => Err(LlmError::ResponseFormat {
                    message: "boom".into(),
                    raw: line.into(),
                }),
                Line::Data(text) => Ok(Some(Decoded::Frame(text.to_owned()))),
                Line::Done => Ok(Some(Decoded::End)),
                _ => Ok(None),
            }
        }
    }

    impl Assembler for EchoAssembler {
        type Frame = String;

        fn apply(
            &mut self,
            frame: String,
            handler: Option<&mut (dyn EventHandler + '_)>,
        ) -> Result<Progress, LlmError> {
            if frame == "stop" {
                return Ok(Progress::Finished);
            }
            self.response.choice_mut(0)?.content.push_str(&frame);
            emit_if_text(handler, &frame)?;
            Ok(Progress::Continue)
        }

        fn finish(
            self,
            handler: Option<&mut (dyn EventHandler + '_)>,
        ) -> Result<AggregateResponse, LlmError> {
            emit_done(handler)?;
            Ok(self.response)
        }
    }

    impl Protocol for EchoProtocol {
        type Frame = String;
        type Decoder = EchoDecoder;
        type Assembler = EchoAssembler;

        fn decoder(&self) -> EchoDecoder {
            EchoDecoder
        }

        fn assembler(&self) -> EchoAssembler {
            EchoAssembler::default()
        }
    }

    #[test]
    fn test_collect_lines_stops_at_terminator() {
        let mut events = Vec::new();
        let mut handler = |event: Event| -> Result<(), LlmError> {
            events.push(event);
            Ok(())
        };
        let lines = ["data: a", "", "data: b", "data: [DONE]", "data: ignored"];
        let resp = collect_lines(&EchoProtocol, lines, Some(&mut handler)).unwrap();

        assert_eq!(resp.text(), "ab");
        assert_eq!(
            events,
            vec![Event::new_text("a"), Event::new_text("b"), Event::new_done()]
        );
    }

    #[test]
    fn test_collect_lines_stops_when_finished() {
        let lines = ["data: a", "data: stop", "data: b"];
        let resp = collect_lines(&EchoProtocol, lines, None).unwrap();
        assert_eq!(resp.text(), "a");
    }

    #[test]
    fn test_collect_lines_without_terminator_finalizes() {
        let resp = collect_lines(&EchoProtocol, ["data: a"], None).unwrap();
        assert_eq!(resp.text(), "a");
    }

    #[test]
    fn test_collect_lines_decode_error_discards_partial() {
        let result = collect_lines(&EchoProtocol, ["data: a", "data: boom"], None);
        assert!(matches!(result, Err(LlmError::ResponseFormat { .. })));
    }

    #[test]
    fn test_handler_error_aborts() {
        let mut calls = 0;
        let mut handler = |_: Event| -> Result<(), LlmError> {
            calls += 1;
            Err(LlmError::Cancelled)
        };
        let result = collect_lines(&EchoProtocol, ["data: a", "data: b"], Some(&mut handler));
        assert!(matches!(result, Err(LlmError::Cancelled)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_check_index_bounds() {
        assert_eq!(check_index(0, "choice").unwrap(), 0);
        assert_eq!(check_index(MAX_INDEX, "choice").unwrap(), MAX_INDEX);
        let err = check_index(usize::MAX, "tool call").unwrap_err();
        assert!(err.to_string().contains("tool call index"));
    }
}
