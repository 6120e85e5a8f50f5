// Jinja lexer -- segmented tokenizer for Jinja templates.

mod cursor;
pub mod error;

use cursor::Cursor;
use error::{LexError, LexErrorKind};
use jinja_common::span::Span;
use jinja_common::token::{Token, TokenKind};

/// Preprocessing options applied while lexing.
///
/// These mirror the template engine's whitespace-handling switches:
/// `trim_blocks` drops the single newline after a `%}`/`#}`, and
/// `lstrip_blocks` strips leading spaces/tabs from a line that only
/// introduces a `{%`/`{#` tag.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexerOptions {
    pub trim_blocks: bool,
    pub lstrip_blocks: bool,
}

/// Which markup region the lexer is currently inside.
#[derive(Debug, Clone, Copy, PartialEq)]
enum MarkupKind {
    /// `{% ... %}`
    Statement,
    /// `{{ ... }}`
    Expression,
}

/// Trimming owed to the next `Text` token by the preceding closer.
#[derive(Debug, Clone, Copy, PartialEq)]
enum PendingTrim {
    None,
    /// Drop one leading newline (`trim_blocks`).
    Newline,
    /// Drop all leading whitespace (`-` marker).
    Full,
}

/// The template lexer. Converts source text into a token stream plus a
/// list of recoverable errors.
///
/// The lexer is a segmented DFA: it alternates between text mode (a single
/// `Text` token running up to the next `{%`, `{{`, or `{#`) and markup
/// mode (inside statements, expressions, and comments). It never fails;
/// unterminated constructs produce a best-effort token and an error record.
pub struct Lexer<'src> {
    cursor: Cursor<'src>,
    source: &'src str,
    options: LexerOptions,
    tokens: Vec<Token>,
    errors: Vec<LexError>,
    /// Open-`{` depth inside an expression, so `}}` is refused as a closer
    /// while a dict literal is still open.
    curly_depth: u32,
    pending_trim: PendingTrim,
}

impl<'src> Lexer<'src> {
    /// Create a new lexer for the given source text.
    pub fn new(source: &'src str, options: LexerOptions) -> Self {
        Self {
            cursor: Cursor::new(source),
            source,
            options,
            tokens: Vec::new(),
            errors: Vec::new(),
            curly_depth: 0,
            pending_trim: PendingTrim::None,
        }
    }

    /// Tokenize the entire source, returning the token stream and the
    /// recoverable errors encountered along the way.
    pub fn tokenize(source: &str, options: &LexerOptions) -> (Vec<Token>, Vec<LexError>) {
        Lexer::new(source, *options).run()
    }

    fn run(mut self) -> (Vec<Token>, Vec<LexError>) {
        loop {
            self.lex_text();
            if self.cursor.is_eof() {
                break;
            }
            if self.cursor.starts_with("{#") {
                self.lex_comment();
            } else if self.cursor.starts_with("{%") {
                self.lex_markup(MarkupKind::Statement);
            } else {
                self.lex_markup(MarkupKind::Expression);
            }
        }
        (self.tokens, self.errors)
    }

    fn push(&mut self, kind: TokenKind, value: impl Into<String>, start: u32, end: u32) {
        self.tokens.push(Token::new(kind, value, start, end));
    }

    fn error(&mut self, kind: LexErrorKind, span: Span) {
        self.errors.push(LexError::new(kind, span));
    }

    // ── Text mode ──────────────────────────────────────────────────────

    /// Emit one `Text` token running up to the next markup opener or end
    /// of input. Whitespace control trims the token's value; its span
    /// always covers the raw region.
    fn lex_text(&mut self) {
        let start = self.cursor.pos();
        while !self.cursor.is_eof() {
            if self.cursor.starts_with("{%")
                || self.cursor.starts_with("{{")
                || self.cursor.starts_with("{#")
            {
                break;
            }
            self.cursor.advance();
        }
        let end = self.cursor.pos();
        let pending = std::mem::replace(&mut self.pending_trim, PendingTrim::None);
        if end == start {
            return;
        }

        let mut value = self.cursor.slice(start, end).to_string();

        match pending {
            PendingTrim::Full => {
                value = value.trim_start().to_string();
            }
            PendingTrim::Newline => {
                if let Some(rest) = value.strip_prefix("\r\n").or_else(|| value.strip_prefix('\n'))
                {
                    value = rest.to_string();
                }
            }
            PendingTrim::None => {}
        }

        if self.cursor.is_eof() {
            // The file's final newline is not template output.
            if value.ends_with('\n') {
                value.pop();
                if value.ends_with('\r') {
                    value.pop();
                }
            }
        } else {
            let remaining = &self.source[end as usize..];
            let marker = remaining.chars().nth(2);
            let block_opener = remaining.starts_with("{%") || remaining.starts_with("{#");
            if marker == Some('-') {
                value = value.trim_end().to_string();
            } else if self.options.lstrip_blocks && block_opener && marker != Some('+') {
                self.lstrip_tail(start, &mut value);
            }
        }

        self.push(TokenKind::Text, value, start, end);
    }

    /// Drop trailing spaces/tabs from `value` when they are the entire
    /// content of the line introducing the upcoming block tag.
    fn lstrip_tail(&self, text_start: u32, value: &mut String) {
        let cut = match value.rfind('\n') {
            Some(i) => i + 1,
            None => {
                // No newline inside the token: only strip if the token
                // itself begins at a line start.
                let at_line_start =
                    text_start == 0 || self.source.as_bytes()[text_start as usize - 1] == b'\n';
                if !at_line_start {
                    return;
                }
                0
            }
        };
        if value[cut..].chars().all(|c| c == ' ' || c == '\t') {
            value.truncate(cut);
        }
    }

    // ── Comment mode ───────────────────────────────────────────────────

    /// Lex a `{# ... #}` comment. The token spans the delimiters; its
    /// value is the inner payload (whitespace-control markers excluded).
    fn lex_comment(&mut self) {
        let start = self.cursor.pos();
        self.cursor.advance_n(2); // {#
        if matches!(self.cursor.peek(), Some('-') | Some('+')) {
            self.cursor.advance();
        }
        let inner_start = self.cursor.pos();

        let mut terminated = false;
        while !self.cursor.is_eof() {
            if self.cursor.starts_with("#}") {
                terminated = true;
                break;
            }
            self.cursor.advance();
        }
        let mut inner_end = self.cursor.pos();
        let mut closer_marker = None;
        if terminated {
            let inner = self.cursor.slice(inner_start, inner_end);
            if inner.ends_with('-') || inner.ends_with('+') {
                closer_marker = inner.chars().last();
                inner_end -= 1;
            }
            self.cursor.advance_n(2); // #}
        } else {
            let at = self.cursor.pos();
            self.error(LexErrorKind::UnterminatedComment, Span::empty(at));
        }

        let end = self.cursor.pos();
        let value = self.cursor.slice(inner_start, inner_end).to_string();
        self.push(TokenKind::Comment, value, start, end);

        self.pending_trim = if closer_marker == Some('-') {
            PendingTrim::Full
        } else if terminated && self.options.trim_blocks && closer_marker != Some('+') {
            PendingTrim::Newline
        } else {
            PendingTrim::None
        };
    }

    // ── Markup mode ────────────────────────────────────────────────────

    /// Lex one `{% ... %}` or `{{ ... }}` region, opener and closer
    /// included. Whitespace between markup tokens is discarded. Reaching
    /// end of input simply returns; the parser reports what is missing.
    fn lex_markup(&mut self, kind: MarkupKind) {
        let start = self.cursor.pos();
        self.cursor.advance_n(2);
        if matches!(self.cursor.peek(), Some('-') | Some('+')) {
            self.cursor.advance();
        }
        let open_kind = match kind {
            MarkupKind::Statement => TokenKind::OpenStatement,
            MarkupKind::Expression => TokenKind::OpenExpression,
        };
        let open_value = self.cursor.slice(start, self.cursor.pos()).to_string();
        self.push(open_kind, open_value, start, self.cursor.pos());

        self.curly_depth = 0;
        loop {
            self.cursor
                .eat_while(|c| c == ' ' || c == '\t' || c == '\r' || c == '\n');
            if self.cursor.is_eof() {
                return;
            }
            if self.try_closer(kind) {
                return;
            }
            self.lex_markup_token();
        }
    }

    /// Try to consume the closing delimiter for the current markup kind.
    /// Returns true when a closer was emitted.
    fn try_closer(&mut self, kind: MarkupKind) -> bool {
        let (plain, close_kind): (&str, TokenKind) = match kind {
            MarkupKind::Statement => ("%}", TokenKind::CloseStatement),
            MarkupKind::Expression => ("}}", TokenKind::CloseExpression),
        };
        if kind == MarkupKind::Expression && self.curly_depth > 0 {
            return false;
        }

        let marker = if self.cursor.starts_with(plain) {
            None
        } else if self.cursor.peek() == Some('-') && self.cursor.starts_with(&format!("-{plain}")) {
            Some('-')
        } else if self.cursor.peek() == Some('+') && self.cursor.starts_with(&format!("+{plain}")) {
            Some('+')
        } else {
            return false;
        };

        let start = self.cursor.pos();
        self.cursor
            .advance_n(if marker.is_some() { 3 } else { 2 });
        let value = self.cursor.slice(start, self.cursor.pos()).to_string();
        self.push(close_kind, value, start, self.cursor.pos());

        self.pending_trim = if marker == Some('-') {
            PendingTrim::Full
        } else if kind == MarkupKind::Statement && self.options.trim_blocks && marker != Some('+') {
            PendingTrim::Newline
        } else {
            PendingTrim::None
        };
        true
    }

    /// Lex a single token inside a markup region.
    fn lex_markup_token(&mut self) {
        let start = self.cursor.pos();
        let c = match self.cursor.peek() {
            Some(c) => c,
            None => return,
        };

        match c {
            '(' => self.single(TokenKind::OpenParen, start),
            ')' => self.single(TokenKind::CloseParen, start),
            '[' => self.single(TokenKind::OpenSquareBracket, start),
            ']' => self.single(TokenKind::CloseSquareBracket, start),
            '{' => {
                self.curly_depth += 1;
                self.single(TokenKind::OpenCurlyBracket, start);
            }
            '}' => {
                self.curly_depth = self.curly_depth.saturating_sub(1);
                self.single(TokenKind::CloseCurlyBracket, start);
            }
            ',' => self.single(TokenKind::Comma, start),
            '.' => self.single(TokenKind::Dot, start),
            ':' => self.single(TokenKind::Colon, start),
            '|' => self.single(TokenKind::Pipe, start),
            '=' => {
                if self.cursor.peek_next() == Some('=') {
                    self.double(TokenKind::ComparisonBinaryOperator, start);
                } else {
                    self.single(TokenKind::Equals, start);
                }
            }
            '!' => {
                if self.cursor.peek_next() == Some('=') {
                    self.double(TokenKind::ComparisonBinaryOperator, start);
                } else {
                    self.unexpected(c);
                }
            }
            '<' | '>' => {
                if self.cursor.peek_next() == Some('=') {
                    self.double(TokenKind::ComparisonBinaryOperator, start);
                } else {
                    self.single(TokenKind::ComparisonBinaryOperator, start);
                }
            }
            '*' => {
                if self.cursor.peek_next() == Some('*') {
                    self.double(TokenKind::PowerBinaryOperator, start);
                } else {
                    self.single(TokenKind::MultiplicativeBinaryOperator, start);
                }
            }
            '/' => {
                if self.cursor.peek_next() == Some('/') {
                    self.double(TokenKind::MultiplicativeBinaryOperator, start);
                } else {
                    self.single(TokenKind::MultiplicativeBinaryOperator, start);
                }
            }
            '%' => self.single(TokenKind::MultiplicativeBinaryOperator, start),
            '~' => self.single(TokenKind::AdditiveBinaryOperator, start),
            '+' | '-' => {
                let next_is_digit = self
                    .cursor
                    .peek_next()
                    .map(|n| n.is_ascii_digit())
                    .unwrap_or(false);
                if next_is_digit && !self.previous_ends_operand() {
                    self.lex_number(start);
                } else {
                    self.single(TokenKind::AdditiveBinaryOperator, start);
                }
            }
            '0'..='9' => self.lex_number(start),
            '"' | '\'' => self.lex_string(start),
            c if is_ident_char(c) => {
                self.cursor.eat_while(is_ident_char);
                let value = self.cursor.slice(start, self.cursor.pos()).to_string();
                self.push(TokenKind::Identifier, value, start, self.cursor.pos());
            }
            _ => self.unexpected(c),
        }
    }

    /// Whether the most recently emitted token completes an operand, so a
    /// `+`/`-` after it must be a binary operator.
    fn previous_ends_operand(&self) -> bool {
        self.tokens
            .last()
            .map(|t| t.kind.ends_operand())
            .unwrap_or(false)
    }

    fn single(&mut self, kind: TokenKind, start: u32) {
        self.cursor.advance();
        let value = self.cursor.slice(start, self.cursor.pos()).to_string();
        self.push(kind, value, start, self.cursor.pos());
    }

    fn double(&mut self, kind: TokenKind, start: u32) {
        self.cursor.advance_n(2);
        let value = self.cursor.slice(start, self.cursor.pos()).to_string();
        self.push(kind, value, start, self.cursor.pos());
    }

    fn unexpected(&mut self, c: char) {
        let at = self.cursor.pos();
        self.error(LexErrorKind::UnexpectedCharacter(c), Span::empty(at));
        self.cursor.advance();
    }

    /// Lex a numeric literal: digits, optionally a fraction. The cursor
    /// may sit on a sign that binds to the number.
    fn lex_number(&mut self, start: u32) {
        if matches!(self.cursor.peek(), Some('+') | Some('-')) {
            self.cursor.advance();
        }
        self.cursor.eat_while(|c| c.is_ascii_digit());
        if self.cursor.peek() == Some('.')
            && self
                .cursor
                .peek_next()
                .map(|c| c.is_ascii_digit())
                .unwrap_or(false)
        {
            self.cursor.advance();
            self.cursor.eat_while(|c| c.is_ascii_digit());
        }
        let value = self.cursor.slice(start, self.cursor.pos()).to_string();
        self.push(TokenKind::NumericLiteral, value, start, self.cursor.pos());
    }

    /// Lex a string literal. The token's span covers the quotes; its value
    /// is the decoded content.
    fn lex_string(&mut self, start: u32) {
        let quote = match self.cursor.advance() {
            Some(q) => q,
            None => return,
        };
        let mut value = String::new();

        loop {
            let c = match self.cursor.peek() {
                Some(c) => c,
                None => {
                    let at = self.cursor.pos();
                    self.error(LexErrorKind::UnterminatedString, Span::empty(at));
                    break;
                }
            };
            if c == quote {
                self.cursor.advance();
                break;
            }
            if c == '\\' {
                let backslash_at = self.cursor.pos();
                self.cursor.advance();
                match self.cursor.peek() {
                    None => {
                        let at = self.cursor.pos();
                        self.error(LexErrorKind::MissingEscapedCharacter, Span::empty(at));
                        break;
                    }
                    Some(esc) => {
                        self.cursor.advance();
                        match esc {
                            'n' => value.push('\n'),
                            't' => value.push('\t'),
                            'r' => value.push('\r'),
                            'b' => value.push('\u{0008}'),
                            'f' => value.push('\u{000C}'),
                            'v' => value.push('\u{000B}'),
                            '\'' => value.push('\''),
                            '"' => value.push('"'),
                            '\\' => value.push('\\'),
                            other => {
                                self.error(
                                    LexErrorKind::InvalidEscapedCharacter(other),
                                    Span::new(backslash_at, self.cursor.pos()),
                                );
                            }
                        }
                    }
                }
            } else {
                self.cursor.advance();
                value.push(c);
            }
        }

        self.push(TokenKind::StringLiteral, value, start, self.cursor.pos());
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let (tokens, _) = Lexer::tokenize(source, &LexerOptions::default());
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn plain_text_is_one_token() {
        let (tokens, errors) = Lexer::tokenize("hello world", &LexerOptions::default());
        assert!(errors.is_empty());
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Text);
        assert_eq!(tokens[0].value, "hello world");
    }

    #[test]
    fn expression_tokens() {
        assert_eq!(
            kinds("{{ user.name }}"),
            vec![
                TokenKind::OpenExpression,
                TokenKind::Identifier,
                TokenKind::Dot,
                TokenKind::Identifier,
                TokenKind::CloseExpression,
            ]
        );
    }

    #[test]
    fn sign_binds_to_number_after_opener() {
        let (tokens, _) = Lexer::tokenize("{{ -3 }}", &LexerOptions::default());
        assert_eq!(tokens[1].kind, TokenKind::NumericLiteral);
        assert_eq!(tokens[1].value, "-3");
    }

    #[test]
    fn sign_is_binary_after_operand() {
        let (tokens, _) = Lexer::tokenize("{{ x -3 }}", &LexerOptions::default());
        assert_eq!(tokens[2].kind, TokenKind::AdditiveBinaryOperator);
        assert_eq!(tokens[3].kind, TokenKind::NumericLiteral);
        assert_eq!(tokens[3].value, "3");
    }

    #[test]
    fn nested_dict_refuses_early_close() {
        // The inner `}}` closes two dict braces, not the expression.
        let (tokens, errors) =
            Lexer::tokenize("{{ {1: {2: 3}} }}", &LexerOptions::default());
        assert!(errors.is_empty());
        assert_eq!(tokens.last().unwrap().kind, TokenKind::CloseExpression);
        let curly_closes = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::CloseCurlyBracket)
            .count();
        assert_eq!(curly_closes, 2);
    }

    #[test]
    fn unterminated_comment_reports_error() {
        let (tokens, errors) = Lexer::tokenize("{# never closed", &LexerOptions::default());
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Comment);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "Missing end of comment tag");
        assert_eq!(errors[0].span, Span::empty(15));
    }

    #[test]
    fn string_escapes_are_decoded() {
        let (tokens, errors) =
            Lexer::tokenize(r#"{{ "a\tb\\c" }}"#, &LexerOptions::default());
        assert!(errors.is_empty());
        assert_eq!(tokens[1].kind, TokenKind::StringLiteral);
        assert_eq!(tokens[1].value, "a\tb\\c");
    }

    #[test]
    fn invalid_escape_is_dropped_with_error() {
        let (tokens, errors) = Lexer::tokenize(r#"{{ "a\qb" }}"#, &LexerOptions::default());
        assert_eq!(tokens[1].value, "ab");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "Invalid escaped character: q");
        assert_eq!(errors[0].span, Span::new(5, 7));
    }

    #[test]
    fn unterminated_string_keeps_partial_value() {
        let (tokens, errors) = Lexer::tokenize(r#"{{ "abc"#, &LexerOptions::default());
        assert_eq!(tokens[1].kind, TokenKind::StringLiteral);
        assert_eq!(tokens[1].value, "abc");
        assert_eq!(errors[0].to_string(), "Unterminated string literal");
    }

    #[test]
    fn unexpected_character_recovers() {
        let (tokens, errors) = Lexer::tokenize("{{ a ; b }}", &LexerOptions::default());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "Unexpected character: ;");
        assert!(errors[0].span.is_empty());
        // Both identifiers survive around the bad byte.
        let idents = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Identifier)
            .count();
        assert_eq!(idents, 2);
    }

    #[test]
    fn minus_marker_trims_adjacent_text() {
        let (tokens, _) = Lexer::tokenize("a   {%- if x -%}   b", &LexerOptions::default());
        assert_eq!(tokens[0].kind, TokenKind::Text);
        assert_eq!(tokens[0].value, "a");
        let last = tokens.last().unwrap();
        assert_eq!(last.kind, TokenKind::Text);
        assert_eq!(last.value, "b");
        // Spans still cover the raw source.
        assert_eq!(tokens[0].span, Span::new(0, 4));
    }

    #[test]
    fn trim_blocks_drops_newline_after_statement() {
        let options = LexerOptions {
            trim_blocks: true,
            lstrip_blocks: false,
        };
        let (tokens, _) = Lexer::tokenize("{% if x %}\nbody{% endif %}", &options);
        let text = tokens.iter().find(|t| t.kind == TokenKind::Text).unwrap();
        assert_eq!(text.value, "body");
    }

    #[test]
    fn lstrip_blocks_strips_indentation_before_tag() {
        let options = LexerOptions {
            trim_blocks: false,
            lstrip_blocks: true,
        };
        let (tokens, _) = Lexer::tokenize("x\n    {% if y %}", &options);
        assert_eq!(tokens[0].value, "x\n");
    }

    #[test]
    fn final_newline_dropped_from_last_text() {
        let (tokens, _) = Lexer::tokenize("{{ x }}\n", &LexerOptions::default());
        let last = tokens.last().unwrap();
        assert_eq!(last.kind, TokenKind::Text);
        assert_eq!(last.value, "");
        assert_eq!(last.span, Span::new(7, 8));
    }
}
