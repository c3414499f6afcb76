//! Reassembling tool calls from argument fragments.
//!
//! Delta-style protocols stream a tool call as a first fragment carrying
//! `id`, `name` and (usually) a position index, followed by argument
//! fragments that may or may not repeat the index. The
//! [`ToolCallAccumulator`] merges them into complete [`ToolCall`]s:
//!
//! - A fragment with `id`, `name` and `index` opens the call at that
//!   position, growing the list as needed.
//! - A fragment without an index extends the call that was just opened,
//!   or else the last call in the list.
//! - Argument text is concatenated in arrival order.
//! - `id` and `name`, once set, are never overwritten.
//!
//! Calls that still lack an `id` or `name` when the stream ends are
//! dropped by [`finish`](ToolCallAccumulator::finish).

use tracing::warn;

use crate::adapter::check_index;
use crate::error::LlmError;
use crate::event::ToolCall;

/// One incremental tool-call update as delivered by a vendor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallDelta {
    /// Position of the call, when the vendor sends one.
    pub index: Option<usize>,
    /// Call id; usually only on the first fragment.
    pub id: Option<String>,
    /// Tool name; usually only on the first fragment.
    pub name: Option<String>,
    /// Argument fragment; may be empty.
    pub arguments: String,
}

/// Merges [`ToolCallDelta`]s into [`ToolCall`]s.
///
/// Owned by a single stream; never shared.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: Vec<ToolCall>,
    opened: Option<usize>,
}

impl ToolCallAccumulator {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one delta and returns the position of the call it landed
    /// on.
    ///
    /// # Errors
    ///
    /// [`LlmError::ResponseFormat`] if the position is above
    /// [`MAX_INDEX`](crate::adapter::MAX_INDEX); the list is left as it
    /// was.
    pub fn apply(&mut self, delta: ToolCallDelta) -> Result<usize, LlmError> {
        if let Some(index) = delta.index {
            check_index(index, "tool call")?;
        }
        let has_identity = delta.id.as_deref().is_some_and(|id| !id.is_empty())
            && delta.name.as_deref().is_some_and(|name| !name.is_empty());

        let position = match (delta.index, has_identity) {
            (Some(index), true) => {
                self.opened = Some(index);
                index
            }
            (Some(index), false) => index,
            (None, true) => {
                let position = self.calls.len();
                self.opened = Some(position);
                position
            }
            (None, false) => self
                .opened
                .take()
                .unwrap_or_else(|| self.calls.len().saturating_sub(1)),
        };
        let position = check_index(position, "tool call")?;

        if self.calls.len() <= position {
            self.calls.resize_with(position + 1, ToolCall::default);
        }

        let call = &mut self.calls[position];
        if call.id.is_empty() {
            call.id = delta.id.unwrap_or_default();
        }
        if call.name.is_empty() {
            call.name = delta.name.unwrap_or_default();
        }
        call.arguments.push_str(&delta.arguments);
        Ok(position)
    }

    /// The call at `position`, if any.
    pub fn get(&self, position: usize) -> Option<&ToolCall> {
        self.calls.get(position)
    }

    /// All calls seen so far, including incomplete leading entries.
    pub fn calls(&self) -> &[ToolCall] {
        &self.calls
    }

    /// Returns `true` if no fragment has been applied.
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Consumes the accumulator, dropping calls without an id or name.
    pub fn finish(self) -> Vec<ToolCall> {
        self.calls
            .into_iter()
            .filter(|call| {
                let keep = call.has_identity();
                if !keep && *call != ToolCall::default() {
                    warn!(
                        id = %call.id,
                        name = %call.name,
                        "Discarding tool call without id or name"
                    );
                }
                keep
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn opening(index: Option<usize>, id: &str, name: &str, args: &str) -> ToolCallDelta {
        ToolCallDelta {
            index,
            id: Some(id.into()),
            name: Some(name.into()),
            arguments: args.into(),
        }
    }

    fn fragment(index: Option<usize>, args: &str) -> ToolCallDelta {
        ToolCallDelta {
            index,
            arguments: args.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_indexed_call_lifecycle() {
        let mut acc = ToolCallAccumulator::new();
        assert_eq!(acc.apply(opening(Some(0), "1", "f", "{\"a\":")).unwrap(), 0);
        assert_eq!(acc.apply(fragment(Some(0), "1}")).unwrap(), 0);

        let calls = acc.finish();
        assert_eq!(calls, vec![ToolCall::new("1", "f", "{\"a\":1}")]);
        assert_eq!(calls[0].parse_arguments().unwrap(), serde_json::json!({"a": 1}));
    }

    #[test]
    fn test_identity_is_set_once() {
        let mut acc = ToolCallAccumulator::new();
        acc.apply(opening(Some(0), "call_1", "search", "")).unwrap();
        acc.apply(opening(Some(0), "call_other", "other", "{}")).unwrap();
        assert_eq!(acc.get(0), Some(&ToolCall::new("call_1", "search", "{}")));
    }

    #[test]
    fn test_unindexed_fragment_targets_just_opened_call() {
        let mut acc = ToolCallAccumulator::new();
        acc.apply(opening(Some(1), "b", "g", "")).unwrap();
        acc.apply(opening(Some(0), "a", "f", "")).unwrap();
        assert_eq!(acc.apply(fragment(None, "{\"x\":1}")).unwrap(), 0);
        // Subsequent fragments go to the last call in the list.
        assert_eq!(acc.apply(fragment(None, "")).unwrap(), 1);
        assert_eq!(acc.get(0).unwrap().arguments, "{\"x\":1}");
    }

    #[test]
    fn test_unindexed_opening_appends_new_call() {
        let mut acc = ToolCallAccumulator::new();
        assert_eq!(acc.apply(opening(None, "a", "f", "{")).unwrap(), 0);
        assert_eq!(acc.apply(fragment(None, "}")).unwrap(), 0);
        assert_eq!(acc.apply(opening(None, "b", "g", "{}")).unwrap(), 1);
        let calls = acc.finish();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].arguments, "{}");
        assert_eq!(calls[1].name, "g");
    }

    #[test]
    fn test_sparse_leading_entries_are_discarded() {
        let mut acc = ToolCallAccumulator::new();
        acc.apply(opening(Some(2), "c", "h", "{}")).unwrap();
        assert_eq!(acc.calls().len(), 3);
        let calls = acc.finish();
        assert_eq!(calls, vec![ToolCall::new("c", "h", "{}")]);
    }

    #[test]
    fn test_fragment_before_any_opening_is_noise() {
        let mut acc = ToolCallAccumulator::new();
        assert_eq!(acc.apply(fragment(None, "{\"stray\":true}")).unwrap(), 0);
        assert!(!acc.is_empty());
        assert!(acc.finish().is_empty());
    }

    #[test]
    fn test_list_never_shrinks() {
        let mut acc = ToolCallAccumulator::new();
        acc.apply(opening(Some(3), "d", "k", "")).unwrap();
        acc.apply(fragment(Some(1), "x")).unwrap();
        assert_eq!(acc.calls().len(), 4);
    }

    #[test]
    fn test_huge_index_is_rejected() {
        let mut acc = ToolCallAccumulator::new();
        let err = acc
            .apply(opening(Some(usize::MAX), "a", "f", "{}"))
            .unwrap_err();
        assert!(matches!(err, LlmError::ResponseFormat { .. }));
        assert!(acc.apply(fragment(Some(usize::MAX / 2), "x")).is_err());
        assert!(acc.is_empty());
    }

    proptest! {
        #[test]
        fn prop_arguments_are_concatenated_in_order(
            fragments in prop::collection::vec(".{0,8}", 0..12),
            indexed in any::<bool>(),
        ) {
            let mut acc = ToolCallAccumulator::new();
            acc.apply(opening(Some(0), "id", "name", "")).unwrap();
            for piece in &fragments {
                let index = if indexed { Some(0) } else { None };
                acc.apply(fragment(index, piece)).unwrap();
            }
            let calls = acc.finish();
            prop_assert_eq!(calls.len(), 1);
            prop_assert_eq!(&calls[0].arguments, &fragments.concat());
        }
    }
}
