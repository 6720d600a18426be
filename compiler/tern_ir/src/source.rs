//! Line tables for resolving spans to human-readable locations.

use crate::Span;

/// A resolved source location: 1-based line and column plus the byte
/// length of the resolved range.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SourceLoc {
    pub line: u32,
    pub col: u32,
    pub length: u32,
}

/// Maps byte offsets (and through them, IR instruction indices) back to
/// line/column positions in one source unit.
///
/// Built once per source text; resolution is a binary search over line
/// start offsets. Per-function IR keeps one [`Span`] per instruction, so
/// `instruction index -> SourceLoc` is `resolve(code.span_of(idx))`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceMap {
    line_starts: Vec<u32>,
    len: u32,
}

impl SourceMap {
    /// Build a line table from source text.
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0u32];
        for (idx, byte) in text.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(idx as u32 + 1);
            }
        }
        SourceMap {
            line_starts,
            len: text.len() as u32,
        }
    }

    /// Rebuild a map from a previously serialized line table.
    pub fn from_parts(line_starts: Vec<u32>, len: u32) -> Self {
        SourceMap { line_starts, len }
    }

    /// The line start table (for serialization).
    pub fn line_starts(&self) -> &[u32] {
        &self.line_starts
    }

    /// Total length of the source unit in bytes.
    pub fn source_len(&self) -> u32 {
        self.len
    }

    /// Resolve a span to a 1-based line/column location.
    pub fn resolve(&self, span: Span) -> SourceLoc {
        let offset = span.start.min(self.len);
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx - 1,
        };
        SourceLoc {
            line: line_idx as u32 + 1,
            col: offset - self.line_starts[line_idx] + 1,
            length: span.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_first_line() {
        let map = SourceMap::new("let x = 1;\nlet y = 2;\n");
        let loc = map.resolve(Span::new(4, 5));
        assert_eq!(loc, SourceLoc { line: 1, col: 5, length: 1 });
    }

    #[test]
    fn test_resolve_second_line() {
        let map = SourceMap::new("let x = 1;\nlet y = 2;\n");
        let loc = map.resolve(Span::new(15, 16));
        assert_eq!(loc.line, 2);
        assert_eq!(loc.col, 5);
    }

    #[test]
    fn test_resolve_line_start() {
        let map = SourceMap::new("a\nb\nc");
        assert_eq!(map.resolve(Span::point(2)).line, 2);
        assert_eq!(map.resolve(Span::point(2)).col, 1);
    }

    #[test]
    fn test_resolve_clamps_past_end() {
        let map = SourceMap::new("ab");
        let loc = map.resolve(Span::point(100));
        assert_eq!(loc.line, 1);
    }
}
