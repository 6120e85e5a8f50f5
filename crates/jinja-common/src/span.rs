use serde::Serialize;

/// Byte-offset span into source text. Start is inclusive, end is exclusive.
///
/// All positions in the analysis engine are tracked as byte offsets into the
/// original source string. Line/character information is computed on demand
/// via [`LineIndex`] when a range has to leave through the LSP transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    /// Create a new span from byte offsets.
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end, "span start ({start}) must be <= end ({end})");
        Self { start, end }
    }

    /// A zero-length span at the given offset.
    pub fn empty(at: u32) -> Self {
        Self { start: at, end: at }
    }

    /// Length of the span in bytes.
    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    /// Whether the span is empty (zero-length).
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether the span contains the given offset. A zero-length span
    /// contains only its own position.
    pub fn contains(&self, offset: u32) -> bool {
        (self.start <= offset && offset < self.end) || (self.is_empty() && self.start == offset)
    }

    /// Merge two spans into one that covers both.
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// Maps between byte offsets and (line, character) positions.
///
/// Lines are 0-based; characters are UTF-16 code units from the start of the
/// line, which is what the LSP transport expects. Line starts are
/// pre-computed once per document; lookups binary-search them.
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte offset of the start of each line. The first entry is always 0.
    line_starts: Vec<u32>,
    /// The source text, kept for UTF-16 measurement within a line.
    source: String,
}

impl LineIndex {
    /// Build a line index by scanning the source text for newline characters.
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0u32];
        for (i, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push((i + 1) as u32);
            }
        }
        Self {
            line_starts,
            source: source.to_string(),
        }
    }

    /// Convert a byte offset to a 0-based (line, UTF-16 character) pair.
    ///
    /// Offsets past the end of the source clamp to the last position.
    pub fn position(&self, offset: u32) -> (u32, u32) {
        let offset = (offset as usize).min(self.source.len());
        let line_idx = self
            .line_starts
            .partition_point(|&start| start as usize <= offset)
            .saturating_sub(1);
        let line_start = self.line_starts[line_idx] as usize;
        let character = self.source[line_start..offset].encode_utf16().count() as u32;
        (line_idx as u32, character)
    }

    /// Convert a 0-based (line, UTF-16 character) pair to a byte offset.
    ///
    /// Out-of-bounds lines clamp to the end of the source; out-of-bounds
    /// characters clamp to the end of the line.
    pub fn offset(&self, line: u32, character: u32) -> usize {
        let line = line as usize;
        if line >= self.line_starts.len() {
            return self.source.len();
        }
        let line_start = self.line_starts[line] as usize;
        let line_end = self
            .line_starts
            .get(line + 1)
            .map(|&s| (s as usize).saturating_sub(1))
            .unwrap_or(self.source.len());
        let line_text = &self.source[line_start..line_end];

        let mut utf16_offset = 0u32;
        for (byte_idx, ch) in line_text.char_indices() {
            if utf16_offset >= character {
                return line_start + byte_idx;
            }
            utf16_offset += ch.len_utf16() as u32;
        }
        line_end
    }

    /// Compute the UTF-16 length of a byte range in the source.
    pub fn utf16_len(&self, span: Span) -> u32 {
        let start = (span.start as usize).min(self.source.len());
        let end = (span.end as usize).min(self.source.len());
        if start >= end {
            return 0;
        }
        self.source[start..end].encode_utf16().count() as u32
    }

    /// Return the number of lines in the source.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_new_and_len() {
        let span = Span::new(5, 10);
        assert_eq!(span.start, 5);
        assert_eq!(span.end, 10);
        assert_eq!(span.len(), 5);
        assert!(!span.is_empty());
    }

    #[test]
    fn span_contains() {
        let span = Span::new(3, 6);
        assert!(!span.contains(2));
        assert!(span.contains(3));
        assert!(span.contains(5));
        assert!(!span.contains(6));

        let empty = Span::empty(4);
        assert!(empty.contains(4));
        assert!(!empty.contains(5));
    }

    #[test]
    fn span_merge() {
        let a = Span::new(5, 10);
        let b = Span::new(8, 15);
        assert_eq!(a.merge(b), Span::new(5, 15));
    }

    #[test]
    fn line_index_single_line() {
        let idx = LineIndex::new("hello");
        assert_eq!(idx.position(0), (0, 0));
        assert_eq!(idx.position(4), (0, 4));
        assert_eq!(idx.position(100), (0, 5));
    }

    #[test]
    fn line_index_multiple_lines() {
        let src = "hello\nworld\nfoo";
        let idx = LineIndex::new(src);
        assert_eq!(idx.position(0), (0, 0));
        assert_eq!(idx.position(6), (1, 0));
        assert_eq!(idx.position(12), (2, 0));
        assert_eq!(idx.position(13), (2, 1));
        assert_eq!(idx.line_count(), 3);
    }

    #[test]
    fn line_index_roundtrip() {
        let src = "{% if x %}\n  {{ y }}\n{% endif %}\n";
        let idx = LineIndex::new(src);
        for offset in 0..src.len() as u32 {
            let (line, character) = idx.position(offset);
            assert_eq!(
                idx.offset(line, character),
                offset as usize,
                "roundtrip failed at offset {offset}"
            );
        }
    }

    #[test]
    fn line_index_multibyte() {
        // 'é' is 2 bytes in UTF-8 but 1 UTF-16 code unit.
        let src = "café\n{{ x }}";
        let idx = LineIndex::new(src);
        let (line, character) = idx.position(3);
        assert_eq!((line, character), (0, 3));
        assert_eq!(idx.position(6), (1, 0));
        assert_eq!(idx.utf16_len(Span::new(0, 5)), 4);
    }

    #[test]
    fn line_index_out_of_bounds_position() {
        let idx = LineIndex::new("abc");
        assert_eq!(idx.offset(5, 0), 3);
        assert_eq!(idx.offset(0, 99), 3);
    }
}
