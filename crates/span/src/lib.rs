//! Source locations and spans for the SQF language server.
//!
//! Every layer of the engine talks about positions in the same vocabulary:
//! a [`Location`] is a point in some text (line, column, byte offset) and a
//! [`Span`] is a located run of bytes. Offsets may refer either to the raw
//! on-disk text or to the preprocessed text; the analysis layer keeps the two
//! apart via its offset map and [`LineOrigins`].

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

/// A point in a source text.
///
/// Lines are 1-based to match what editors display; columns and offsets are
/// 0-based byte positions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub line: u32,
    pub column: u32,
    pub offset: u32,
}

/// A located run of bytes in a source text.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start: Location,
    pub length: u32,
}

/// Types that occupy a region of source text.
pub trait HasSpan {
    fn span(&self) -> Span;
}

impl Location {
    #[must_use]
    pub const fn new(line: u32, column: u32, offset: u32) -> Self {
        Self { line, column, offset }
    }

    /// The start of a text.
    #[must_use]
    pub const fn zero() -> Self {
        Self { line: 1, column: 0, offset: 0 }
    }
}

impl Span {
    #[must_use]
    pub const fn new(start: Location, length: u32) -> Self {
        Self { start, length }
    }

    /// Offset one past the last byte of the span.
    #[must_use]
    pub const fn end_offset(&self) -> u32 {
        self.start.offset + self.length
    }

    /// Whether the given offset lies within the span.
    #[must_use]
    pub const fn contains_offset(&self, offset: u32) -> bool {
        offset >= self.start.offset && offset < self.end_offset()
    }
}

impl HasSpan for Span {
    fn span(&self) -> Span {
        *self
    }
}

/// Attribution of preprocessed output lines back to the file and line they
/// were produced from.
///
/// The preprocessor splices included files into its output and keeps macro
/// replacements on the line of their invocation, so a per-line map is enough
/// to re-attribute tokens. Columns and offsets inside a macro replacement
/// diverge from the raw text; those are handled separately by the offset map.
#[derive(Debug, Clone, Default)]
pub struct LineOrigins {
    origins: Vec<(Arc<str>, u32)>,
}

impl LineOrigins {
    #[must_use]
    pub fn new() -> Self {
        Self { origins: Vec::new() }
    }

    /// An identity map: every line of the output comes from the same path,
    /// numbered 1..=line_count. Used when no preprocessing took place.
    #[must_use]
    pub fn uniform(path: &str, line_count: u32) -> Self {
        let path: Arc<str> = Arc::from(path);
        Self { origins: (1..=line_count).map(|line| (Arc::clone(&path), line)).collect() }
    }

    pub fn push(&mut self, path: Arc<str>, line: u32) {
        self.origins.push((path, line));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.origins.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    /// The source path and line for a 1-based output line.
    ///
    /// Output lines beyond the recorded range are attributed to the last
    /// recorded origin, which covers text ending without a trailing newline.
    #[must_use]
    pub fn origin_of(&self, output_line: u32) -> Option<(Arc<str>, u32)> {
        if self.origins.is_empty() {
            return None;
        }

        let index = (output_line.max(1) as usize - 1).min(self.origins.len() - 1);
        let (path, line) = &self.origins[index];

        Some((Arc::clone(path), *line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_contains_offset() {
        let span = Span::new(Location::new(1, 4, 4), 3);

        assert!(!span.contains_offset(3));
        assert!(span.contains_offset(4));
        assert!(span.contains_offset(6));
        assert!(!span.contains_offset(7));
    }

    #[test]
    fn uniform_origins_attribute_every_line() {
        let origins = LineOrigins::uniform("init.sqf", 3);

        let (path, line) = origins.origin_of(2).unwrap();
        assert_eq!(path.as_ref(), "init.sqf");
        assert_eq!(line, 2);

        // Past-the-end lines stick to the last origin.
        let (_, line) = origins.origin_of(9).unwrap();
        assert_eq!(line, 3);
    }

    #[test]
    fn spliced_origins() {
        let mut origins = LineOrigins::new();
        origins.push(Arc::from("a.sqf"), 1);
        origins.push(Arc::from("inc.hpp"), 1);
        origins.push(Arc::from("inc.hpp"), 2);
        origins.push(Arc::from("a.sqf"), 2);

        let (path, line) = origins.origin_of(3).unwrap();
        assert_eq!(path.as_ref(), "inc.hpp");
        assert_eq!(line, 2);

        let (path, line) = origins.origin_of(4).unwrap();
        assert_eq!(path.as_ref(), "a.sqf");
        assert_eq!(line, 2);
    }
}
