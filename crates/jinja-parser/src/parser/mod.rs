//! Error-tolerant recursive-descent parser for Jinja templates.
//!
//! The parser consumes a token stream and builds a [`SyntaxTree`] keeping
//! every token, including trivia and recovery markers. It never fails:
//! missing tokens become `Missing` nodes, tokens that fit nowhere become
//! `Unexpected` nodes, and both are collected in the tree's recovery list
//! for the diagnostics layer. Nothing above the parser uses errors for
//! control flow.

pub(crate) mod expressions;
pub(crate) mod statements;

use jinja_common::token::{Token, TokenKind};

use crate::tree::{NodeId, NodeKind, Slot, SyntaxTree};

pub(crate) struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    source: &'a str,
    pub(crate) tree: SyntaxTree,
    /// Token index where the last `expression` recovery fired; a repeat at
    /// the same index forces the cursor forward so parsing always ends.
    last_expr_missing: Option<usize>,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(tokens: &'a [Token], source: &'a str) -> Self {
        Self {
            tokens,
            pos: 0,
            source,
            tree: SyntaxTree::new(),
            last_expr_missing: None,
        }
    }

    pub(crate) fn into_tree(self) -> SyntaxTree {
        self.tree
    }

    // ── Lookahead ──────────────────────────────────────────────────────

    pub(crate) fn current(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    pub(crate) fn current_kind(&self) -> Option<TokenKind> {
        self.current().map(|t| t.kind)
    }

    pub(crate) fn current_value(&self) -> Option<&str> {
        self.current().map(|t| t.value.as_str())
    }

    pub(crate) fn peek(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n)
    }

    pub(crate) fn at(&self, kind: TokenKind) -> bool {
        self.current_kind() == Some(kind)
    }

    pub(crate) fn at_ident(&self, value: &str) -> bool {
        self.current()
            .map(|t| t.kind == TokenKind::Identifier && t.value == value)
            .unwrap_or(false)
    }

    pub(crate) fn peek_ident_is(&self, n: usize, value: &str) -> bool {
        self.peek(n)
            .map(|t| t.kind == TokenKind::Identifier && t.value == value)
            .unwrap_or(false)
    }

    pub(crate) fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Whether the cursor sits where an expression region ends: end of
    /// input or a markup closer.
    pub(crate) fn at_expression_end(&self) -> bool {
        matches!(
            self.current_kind(),
            None | Some(TokenKind::CloseStatement) | Some(TokenKind::CloseExpression)
        )
    }

    /// Byte offset a recovery node should point at: the next token's
    /// start, or the end of the source once tokens ran out.
    pub(crate) fn cursor_offset(&self) -> u32 {
        match self.current() {
            Some(tok) => tok.span.start,
            None => self.source.len() as u32,
        }
    }

    // ── Consumption ────────────────────────────────────────────────────

    /// Drop the current token without putting it in the tree. Only the
    /// `raw` body does this; the span is re-covered by a synthesized leaf.
    pub(crate) fn skip_token(&mut self) {
        self.pos += 1;
    }

    /// Consume the current token into a detached `Token` leaf.
    ///
    /// Callers check the token is there first; if it is not, a zero-width
    /// `Missing` leaf stands in so construction continues.
    pub(crate) fn take_token(&mut self) -> NodeId {
        match self.tokens.get(self.pos) {
            Some(tok) => {
                let tok = tok.clone();
                self.pos += 1;
                self.tree.push(NodeKind::Token(tok))
            }
            None => {
                let offset = self.cursor_offset();
                self.tree.push(NodeKind::Missing {
                    expected: "token".into(),
                    offset,
                })
            }
        }
    }

    /// Consume the current token and attach it under `parent`.
    pub(crate) fn advance_into(&mut self, parent: NodeId, slot: Option<Slot>) -> NodeId {
        let id = self.take_token();
        self.tree.add_child(parent, id, slot);
        id
    }

    // ── Recovery primitives ────────────────────────────────────────────

    /// Record a `Missing` recovery point and attach it under `parent`.
    pub(crate) fn missing(
        &mut self,
        parent: NodeId,
        expected: impl Into<String>,
        slot: Option<Slot>,
    ) -> NodeId {
        let id = self.missing_detached(expected);
        self.tree.add_child(parent, id, slot);
        id
    }

    /// Record a `Missing` recovery point without attaching it.
    pub(crate) fn missing_detached(&mut self, expected: impl Into<String>) -> NodeId {
        let offset = self.cursor_offset();
        self.tree.push(NodeKind::Missing {
            expected: expected.into(),
            offset,
        })
    }

    /// If the next token is of `kind`, consume it into `parent`; otherwise
    /// record a `Missing` node there and leave the cursor alone.
    pub(crate) fn expect(
        &mut self,
        parent: NodeId,
        kind: TokenKind,
        slot: Option<Slot>,
        expected: &str,
    ) -> bool {
        if self.at(kind) {
            self.advance_into(parent, slot);
            true
        } else {
            self.missing(parent, expected, None);
            false
        }
    }

    /// Like [`Parser::expect`], additionally checking the identifier's
    /// value.
    pub(crate) fn expect_identifier(
        &mut self,
        parent: NodeId,
        value: &str,
        slot: Option<Slot>,
        expected: &str,
    ) -> bool {
        if self.at_ident(value) {
            self.advance_into(parent, slot);
            true
        } else {
            self.missing(parent, expected, None);
            false
        }
    }

    /// Advance until a token of `kind` is consumed (or input runs out),
    /// attaching everything passed over to `parent`.
    pub(crate) fn eat_until(&mut self, parent: NodeId, kind: TokenKind) {
        while !self.at_end() {
            if self.at(kind) {
                self.advance_into(parent, Some(Slot::CloseToken));
                return;
            }
            self.advance_into(parent, None);
        }
    }

    /// Expect `{% <name> %}` and bind the three tokens to the closer slots.
    ///
    /// When the closer is not there at all, a single `Missing` node names
    /// the whole tag.
    pub(crate) fn expect_closer_statement(&mut self, node: NodeId, name: &str) {
        if self.at(TokenKind::OpenStatement) && self.peek_ident_is(1, name) {
            self.advance_into(node, Some(Slot::CloserOpenToken));
            self.advance_into(node, Some(Slot::CloserIdentifier));
            self.expect(
                node,
                TokenKind::CloseStatement,
                Some(Slot::CloserCloseToken),
                "'%}'",
            );
        } else {
            self.missing(node, format!("'{{% {name} %}}'"), None);
        }
    }

    /// Wrap the current token in an `Unexpected` recovery node under
    /// `parent` and advance past it.
    pub(crate) fn unexpected_here(&mut self, parent: NodeId, message: String) -> Option<NodeId> {
        let tok = self.current()?.clone();
        self.pos += 1;
        let node = self.tree.push(NodeKind::Unexpected {
            token: tok.clone(),
            message,
        });
        self.tree.add_child(parent, node, None);
        let leaf = self.tree.push(NodeKind::Token(tok));
        self.tree.add_child(node, leaf, None);
        Some(node)
    }

    /// Detached variant of [`unexpected_here`] for expression recovery.
    pub(crate) fn unexpected_detached(&mut self, message: String) -> Option<NodeId> {
        let tok = self.current()?.clone();
        self.pos += 1;
        let node = self.tree.push(NodeKind::Unexpected {
            token: tok.clone(),
            message,
        });
        let leaf = self.tree.push(NodeKind::Token(tok));
        self.tree.add_child(node, leaf, None);
        Some(node)
    }

    /// The raw source slice for a byte range (used by `raw` bodies).
    pub(crate) fn source_slice(&self, start: u32, end: u32) -> &'a str {
        &self.source[start as usize..end as usize]
    }

    pub(crate) fn expr_missing_guard(&mut self) -> ExprMissingGuard {
        if self.last_expr_missing == Some(self.pos) && !self.at_end() {
            ExprMissingGuard::AdvanceCursor
        } else {
            self.last_expr_missing = Some(self.pos);
            ExprMissingGuard::EmitMissing
        }
    }
}

/// What `parse_primary` should do when it cannot start an expression.
pub(crate) enum ExprMissingGuard {
    EmitMissing,
    AdvanceCursor,
}

/// Parse a whole token stream into a `Program` tree.
pub(crate) fn parse_program(p: &mut Parser) {
    statements::parse_body(p, SyntaxTree::ROOT, &[], Slot::Body);
}
