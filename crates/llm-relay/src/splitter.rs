//! Separating inline `<think>` markup from answer text.
//!
//! Some backends inline their reasoning in the content stream as
//! `<think>...</think>` (or `<thinking>...</thinking>`). The
//! [`ReasoningSplitter`] routes such spans to the reasoning channel
//! while the stream is in flight; [`split_content`] does the same for a
//! complete, non-streamed string.
//!
//! Markers are case-sensitive and take no attributes: `<think id="1">`
//! is ordinary text.
//!
//! Only use the splitter for vendors that do not already deliver
//! reasoning through a dedicated field.
//!
//! # Chunk boundaries
//!
//! A marker pair may straddle chunks, and so may a single marker
//! (`"<thi"` + `"nk>"`). The splitter holds back a chunk tail that could
//! still grow into a marker, so the concatenated output is the same no
//! matter how the input was chunked. Call
//! [`flush`](ReasoningSplitter::flush) when the stream ends to release
//! that tail.

use std::sync::LazyLock;

use regex::Regex;

static OPEN_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(?:think|thinking)>").expect("open marker pattern"));

static CLOSE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</(?:think|thinking)>").expect("close marker pattern"));

// Open and close names are matched independently.
static REASONING_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<(?:think|thinking)>(.*?)</(?:think|thinking)>")
        .expect("reasoning span pattern")
});

const OPEN_LITERALS: [&str; 2] = ["<think>", "<thinking>"];
const CLOSE_LITERALS: [&str; 2] = ["</think>", "</thinking>"];

/// Which channel incoming content is currently routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitterState {
    /// Outside a reasoning span.
    #[default]
    Text,
    /// Inside an unterminated reasoning span.
    Reasoning,
}

/// Stateful splitter for one content stream.
///
/// One instance per stream (per choice, for multi-choice responses);
/// instances share nothing.
#[derive(Debug, Clone, Default)]
pub struct ReasoningSplitter {
    state: SplitterState,
    held: String,
    text_ends_in_word: bool,
    span_follows_word: bool,
    seam: bool,
}

impl ReasoningSplitter {
    /// Creates a splitter in the [`Text`](SplitterState::Text) state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> SplitterState {
        self.state
    }

    /// Splits one chunk into `(text, reasoning)`.
    ///
    /// When a span closes, a single space is injected before the text
    /// that follows if the text on both sides of the span would
    /// otherwise run together.
    pub fn split(&mut self, chunk: &str) -> (String, String) {
        let mut input = std::mem::take(&mut self.held);
        input.push_str(chunk);

        let mut text = String::new();
        let mut reasoning = String::new();
        let mut rest = input.as_str();

        loop {
            match self.state {
                SplitterState::Text => {
                    if let Some(marker) = OPEN_MARKER.find(rest) {
                        self.push_text(&mut text, &rest[..marker.start()]);
                        self.span_follows_word = self.text_ends_in_word;
                        self.state = SplitterState::Reasoning;
                        rest = &rest[marker.end()..];
                    } else {
                        let keep = partial_marker_len(rest, &OPEN_LITERALS);
                        let (emit, hold) = rest.split_at(rest.len() - keep);
                        self.push_text(&mut text, emit);
                        self.held = hold.to_owned();
                        break;
                    }
                }
                SplitterState::Reasoning => {
                    if let Some(marker) = CLOSE_MARKER.find(rest) {
                        reasoning.push_str(&rest[..marker.start()]);
                        self.seam = self.span_follows_word;
                        self.state = SplitterState::Text;
                        rest = &rest[marker.end()..];
                    } else {
                        let keep = partial_marker_len(rest, &CLOSE_LITERALS);
                        let (emit, hold) = rest.split_at(rest.len() - keep);
                        reasoning.push_str(emit);
                        self.held = hold.to_owned();
                        break;
                    }
                }
            }
        }

        (text, reasoning)
    }

    /// Releases any held-back tail as `(text, reasoning)`.
    ///
    /// The tail goes to whichever channel the splitter is in; an
    /// unterminated span stays reasoning.
    pub fn flush(&mut self) -> (String, String) {
        let held = std::mem::take(&mut self.held);
        match self.state {
            SplitterState::Text => {
                let mut text = String::new();
                self.push_text(&mut text, &held);
                (text, String::new())
            }
            SplitterState::Reasoning => (String::new(), held),
        }
    }

    fn push_text(&mut self, out: &mut String, piece: &str) {
        if piece.is_empty() {
            return;
        }
        if self.seam {
            if !piece.starts_with(char::is_whitespace) {
                out.push(' ');
            }
            self.seam = false;
        }
        out.push_str(piece);
        self.text_ends_in_word = !piece.ends_with(char::is_whitespace);
    }
}

/// Splits `chunk` with an optional splitter.
///
/// Without a splitter everything is reasoning and nothing is text, on
/// every call.
pub fn split_or_reasoning(
    splitter: Option<&mut ReasoningSplitter>,
    chunk: &str,
) -> (String, String) {
    match splitter {
        Some(splitter) => splitter.split(chunk),
        None => (String::new(), chunk.to_owned()),
    }
}

/// Extracts the first reasoning span from a complete string.
///
/// Returns `(reasoning, text)`. The input is trimmed, the span's inner
/// text is trimmed, and the text around the span is rejoined with a
/// single newline. Later spans stay in the text untouched. Without a
/// well-formed span the reasoning is empty and the text is returned
/// unchanged.
///
/// The opening and closing tag names need not agree:
/// `<think>a</thinking>` is accepted.
pub fn split_content(full_text: &str) -> (String, String) {
    let trimmed = full_text.trim();
    let Some(captures) = REASONING_SPAN.captures(trimmed) else {
        return (String::new(), full_text.to_owned());
    };
    let Some(span) = captures.get(0) else {
        return (String::new(), full_text.to_owned());
    };

    let reasoning = captures.get(1).map_or("", |m| m.as_str()).trim();
    let before = trimmed[..span.start()].trim();
    let after = trimmed[span.end()..].trim();

    let text = match (before.is_empty(), after.is_empty()) {
        (true, _) => after.to_owned(),
        (false, true) => before.to_owned(),
        (false, false) => format!("{before}\n{after}"),
    };
    (reasoning.to_owned(), text)
}

/// Length of the longest tail of `s` that is a proper prefix of one of
/// `literals`.
fn partial_marker_len(s: &str, literals: &[&str]) -> usize {
    let longest = literals.iter().map(|l| l.len() - 1).max().unwrap_or(0);
    (1..=longest.min(s.len()))
        .rev()
        .find(|&k| {
            let start = s.len() - k;
            s.is_char_boundary(start) && literals.iter().any(|l| l.starts_with(&s[start..]))
        })
        .unwrap_or(0)
}
