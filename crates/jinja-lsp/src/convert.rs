//! Conversions between analysis spans and LSP positions/ranges.

use jinja_common::span::{LineIndex, Span};
use tower_lsp::lsp_types::{Position, Range};

/// Convert a byte offset to an LSP position.
pub fn position(line_index: &LineIndex, offset: u32) -> Position {
    let (line, character) = line_index.position(offset);
    Position { line, character }
}

/// Convert a byte span to an LSP range.
pub fn range(line_index: &LineIndex, span: Span) -> Range {
    Range {
        start: position(line_index, span.start),
        end: position(line_index, span.end),
    }
}

/// Convert an LSP position back to a byte offset.
pub fn offset(line_index: &LineIndex, position: &Position) -> u32 {
    line_index.offset(position.line, position.character) as u32
}
