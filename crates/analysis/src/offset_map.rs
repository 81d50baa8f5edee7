//! Mapping between raw and preprocessed offsets across macro expansions.
//!
//! The preprocessor reports two tagged pairs per expansion — the raw
//! start/end locations and the preprocessed start/end offsets. Sorted by
//! preprocessed offset, they answer the two questions the rest of the
//! engine asks: is a preprocessed offset inside an expansion, and what raw
//! location does a preprocessed offset correspond to.

use std::sync::Arc;

use sqfls_span::Location;
use sqfls_preprocessor::MacroExpansion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairKind {
    Start,
    End,
}

#[derive(Debug, Clone)]
struct OffsetPair {
    raw: Location,
    preprocessed_offset: u32,
    kind: PairKind,
}

/// A raw location recovered from a preprocessed offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedOffset {
    pub raw: Location,
    /// The invocation's raw length when the offset sits inside the
    /// expansion, zero when it sits after one.
    pub length: u32,
}

/// The per-analysis offset map.
#[derive(Debug, Clone, Default)]
pub struct OffsetMap {
    pairs: Vec<OffsetPair>,
    expansions: Vec<MacroExpansion>,
}

impl OffsetMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one reported macro expansion.
    pub fn record(&mut self, expansion: &MacroExpansion) {
        self.pairs.push(OffsetPair {
            raw: expansion.raw_start,
            preprocessed_offset: expansion.preprocessed_start,
            kind: PairKind::Start,
        });
        self.pairs.push(OffsetPair {
            raw: expansion.raw_end,
            preprocessed_offset: expansion.preprocessed_end,
            kind: PairKind::End,
        });
        self.pairs.sort_by_key(|pair| pair.preprocessed_offset);
        self.expansions.push(expansion.clone());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// All recorded expansions, in the order they were reported. Feeds
    /// macro hovers and the expansion path of code-action decisions.
    #[must_use]
    pub fn expansions(&self) -> &[MacroExpansion] {
        &self.expansions
    }

    /// Expansions written in the given file.
    pub fn expansions_in<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a MacroExpansion> {
        self.expansions.iter().filter(move |expansion| expansion.path.as_ref() == path)
    }

    /// Index of the last pair at or before the offset.
    fn pair_at_or_before(&self, offset: u32) -> Option<usize> {
        let following = self.pairs.partition_point(|pair| pair.preprocessed_offset <= offset);
        following.checked_sub(1)
    }

    /// Whether a preprocessed offset lies inside a macro expansion.
    #[must_use]
    pub fn is_in_macro(&self, offset: u32) -> bool {
        let Some(index) = self.pair_at_or_before(offset) else {
            return false;
        };
        let pair = &self.pairs[index];

        pair.kind == PairKind::Start
            && self.pairs.get(index + 1).is_some_and(|next| next.preprocessed_offset > offset)
    }

    /// Decodes a preprocessed offset into a raw location.
    ///
    /// Inside an expansion this is the invocation's raw start together with
    /// its raw length; at or after an end pair it is that end's raw
    /// location with length zero. Offsets before any expansion decode to
    /// `None` — they are identical to raw offsets.
    #[must_use]
    pub fn decode(&self, offset: u32) -> Option<DecodedOffset> {
        let index = self.pair_at_or_before(offset)?;
        let pair = &self.pairs[index];

        match pair.kind {
            PairKind::Start => {
                let end = self.pairs.get(index + 1)?;
                Some(DecodedOffset { raw: pair.raw, length: end.raw.offset.saturating_sub(pair.raw.offset) })
            }
            PairKind::End => Some(DecodedOffset { raw: pair.raw, length: 0 }),
        }
    }
}

/// Convenience constructor for tests and internal callers.
#[must_use]
pub fn expansion(
    name: &str,
    path: &str,
    raw_start: Location,
    raw_end: Location,
    preprocessed_start: u32,
    preprocessed_end: u32,
) -> MacroExpansion {
    MacroExpansion {
        name: name.to_string(),
        path: Arc::from(path),
        raw_start,
        raw_end,
        preprocessed_start,
        preprocessed_end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> OffsetMap {
        let mut map = OffsetMap::new();
        // Raw `MACRO` at offset 10..15 expands into preprocessed 10..40.
        map.record(&expansion(
            "MACRO",
            "a.sqf",
            Location::new(2, 0, 10),
            Location::new(2, 5, 15),
            10,
            40,
        ));
        map
    }

    #[test]
    fn offsets_inside_the_expansion_are_in_macro() {
        let map = map();

        assert!(!map.is_in_macro(9));
        assert!(map.is_in_macro(10));
        assert!(map.is_in_macro(25));
        assert!(map.is_in_macro(39));
        assert!(!map.is_in_macro(40));
        assert!(!map.is_in_macro(100));
    }

    #[test]
    fn decode_inside_returns_start_and_raw_length() {
        let map = map();

        let decoded = map.decode(25).unwrap();
        assert_eq!(decoded.raw.offset, 10);
        assert_eq!(decoded.length, 5);
    }

    #[test]
    fn decode_after_returns_end_with_zero_length() {
        let map = map();

        let decoded = map.decode(60).unwrap();
        assert_eq!(decoded.raw.offset, 15);
        assert_eq!(decoded.length, 0);
    }

    #[test]
    fn decode_before_any_expansion_is_identity() {
        let map = map();

        assert!(map.decode(5).is_none());
    }

    #[test]
    fn empty_map_answers_nothing() {
        let map = OffsetMap::new();

        assert!(!map.is_in_macro(10));
        assert!(map.decode(10).is_none());
    }
}
