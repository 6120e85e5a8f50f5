use std::fmt;

use serde::Serialize;

use jinja_common::span::Span;

/// A lexer error with location information.
///
/// Errors are collected during lexing rather than aborting immediately;
/// the lexer always produces a best-effort token stream alongside them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LexError {
    pub kind: LexErrorKind,
    pub span: Span,
}

impl LexError {
    /// Create a new lexer error.
    pub fn new(kind: LexErrorKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// The specific kind of lexer error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LexErrorKind {
    /// A byte that fits no token at the current position.
    UnexpectedCharacter(char),
    /// A string literal was not closed before end of input.
    UnterminatedString,
    /// A `{# ... #}` comment was not closed before end of input.
    UnterminatedComment,
    /// A string ended in a bare backslash.
    MissingEscapedCharacter,
    /// An unrecognized `\X` escape inside a string.
    InvalidEscapedCharacter(char),
}

impl fmt::Display for LexErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedCharacter(c) => write!(f, "Unexpected character: {c}"),
            Self::UnterminatedString => write!(f, "Unterminated string literal"),
            Self::UnterminatedComment => write!(f, "Missing end of comment tag"),
            Self::MissingEscapedCharacter => write!(f, "Missing escaped character"),
            Self::InvalidEscapedCharacter(c) => write!(f, "Invalid escaped character: {c}"),
        }
    }
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for LexError {}
