//! Concrete syntax tree for Jinja templates.
//!
//! The tree is an arena of [`Node`]s addressed by [`NodeId`]. Every token
//! consumed by the parser lives in the tree as a leaf node, so the tree
//! carries enough source detail to drive all editor features from one
//! shared representation. Parent links are arena indices; the tree is
//! built bottom-up and never cyclic.
//!
//! Besides the ordered child list, every node exposes *named slots*: the
//! addressable parts a consumer needs (`Slot::Test` on an `If`,
//! `Slot::CloserIdentifier` on any closed statement, ...). List-shaped
//! parts (bodies, arguments, imported names) repeat the same slot once
//! per element, in source order.

use jinja_common::span::Span;
use jinja_common::token::{Token, TokenKind};

/// Index of a node in its [`SyntaxTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

/// The variant tag of a tree node.
///
/// Leaves carry their payload here (`Token`, `Missing`, `Unexpected`);
/// interior variants address their parts through slots.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Program,

    // ── Statements ─────────────────────────────────────────────────────
    If,
    For,
    Break,
    Continue,
    SetStatement,
    Macro,
    Block,
    Raw,
    Include,
    Import,
    FromImport,
    Extends,
    CallStatement,
    FilterStatement,
    Comment,

    // ── Expressions ────────────────────────────────────────────────────
    Identifier,
    IntegerLiteral,
    FloatLiteral,
    StringLiteral,
    ArrayLiteral,
    TupleLiteral,
    ObjectLiteral,
    MemberExpression,
    CallExpression,
    BinaryExpression,
    UnaryExpression,
    FilterExpression,
    TestExpression,
    SelectExpression,
    Ternary,
    SliceExpression,
    KeywordArgumentExpression,
    SpreadExpression,

    // ── Leaves ─────────────────────────────────────────────────────────
    /// A leaf wrapping one lexed token.
    Token(Token),
    /// A recovery point where the parser synthesized what it expected.
    Missing { expected: String, offset: u32 },
    /// A recovery point wrapping a token the parser could not place.
    Unexpected { token: Token, message: String },
}

impl NodeKind {
    /// Whether this node is a recovery node.
    pub fn is_recovery(&self) -> bool {
        matches!(self, NodeKind::Missing { .. } | NodeKind::Unexpected { .. })
    }
}

/// Named slots addressing the parts of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// The `{%`/`{{` opening a statement or output.
    OpenToken,
    /// The `%}`/`}}` closing the opening tag.
    CloseToken,
    /// The statement keyword token (`if`, `for`, `macro`, ...).
    Keyword,
    /// `{%` of the closing tag.
    CloserOpenToken,
    /// `endif`/`endfor`/... of the closing tag.
    CloserIdentifier,
    /// `%}` of the closing tag.
    CloserCloseToken,
    /// Repeated block name in `{% endblock name %}`.
    CloserName,

    /// Statement/body member. Repeated.
    Body,
    /// `else`/`elif` branch member. Repeated.
    Alternate,

    /// Condition of `if`/`elif`, a select/ternary, or a loop filter.
    Test,
    /// `else` value of a ternary.
    Else,

    /// Loop variable of a `for`.
    LoopVariable,
    /// Iterable of a `for`.
    Iterable,
    /// `if` filter condition of a `for`.
    Condition,

    /// Declared name (macro, block, import alias target).
    Name,
    /// Macro argument. Repeated.
    Arg,
    /// `scoped` modifier token of a block.
    Scoped,
    /// `required` modifier token of a block.
    Required,

    /// Assignment target of a `set`.
    Assignee,
    /// Assigned value of an inline `set`.
    Value,

    /// Callee expression of a `call` statement.
    Call,
    /// Caller argument of a `call` statement. Repeated.
    CallerArg,
    /// Filter of a `filter` statement or filter expression.
    Filter,

    /// Source string of include/import/from/extends.
    Source,
    /// `with`/`without` token of a context modifier.
    Context,
    /// `as` keyword token of an import.
    AsToken,
    /// Imported name. Repeated.
    ImportName,
    /// Alias of the preceding imported name. Repeated.
    ImportAlias,

    /// Object of a member expression.
    Object,
    /// Property of a member expression (identifier, expression, or slice).
    Property,
    /// Callee of a call expression.
    Callee,
    /// Call argument. Repeated.
    Argument,
    /// Left operand of a binary expression.
    Left,
    /// Operator token.
    Operator,
    /// Right operand of a binary expression.
    Right,
    /// Operand of unary/filter/test/select/ternary/spread expressions.
    Operand,

    /// Array/tuple element. Repeated.
    Item,
    /// Object literal key. Repeated.
    Key,
    /// Object literal value (paired with `Key` by position). Repeated.
    EntryValue,

    /// Slice bounds.
    Start,
    Stop,
    Step,
}

/// One node of the tree.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    /// Children in source order.
    pub children: Vec<NodeId>,
    /// Named slots in insertion order; list slots repeat.
    pub slots: Vec<(Slot, NodeId)>,
}

/// The arena holding a document's entire syntax tree.
///
/// Node 0 is always the `Program` root. Recovery nodes are additionally
/// listed in `recovery`, in the order the parser emitted them.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    nodes: Vec<Node>,
    pub recovery: Vec<NodeId>,
}

impl SyntaxTree {
    pub const ROOT: NodeId = NodeId(0);

    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Program,
                parent: None,
                children: Vec::new(),
                slots: Vec::new(),
            }],
            recovery: Vec::new(),
        }
    }

    /// Allocate a new unattached node and return its id.
    ///
    /// Recovery kinds are recorded in the recovery list as a side effect.
    pub fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        if kind.is_recovery() {
            self.recovery.push(id);
        }
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
            slots: Vec::new(),
        });
        id
    }

    /// Attach `child` under `parent`, keeping the child list ordered by
    /// span start, and record the slot name when given.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId, slot: Option<Slot>) {
        let child_start = self.span(child).start;
        let pos = {
            let children = &self.nodes[parent.0 as usize].children;
            match children.last() {
                Some(&last) if self.span(last).start > child_start => {
                    let mut i = children.len();
                    while i > 0 && self.span(children[i - 1]).start > child_start {
                        i -= 1;
                    }
                    i
                }
                _ => children.len(),
            }
        };
        self.nodes[child.0 as usize].parent = Some(parent);
        self.nodes[parent.0 as usize].children.insert(pos, child);
        if let Some(slot) = slot {
            self.nodes[parent.0 as usize].slots.push((slot, child));
        }
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0 as usize].kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0 as usize].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0 as usize].children
    }

    /// First child stored under the given slot.
    pub fn slot(&self, id: NodeId, slot: Slot) -> Option<NodeId> {
        self.nodes[id.0 as usize]
            .slots
            .iter()
            .find(|(s, _)| *s == slot)
            .map(|(_, n)| *n)
    }

    /// All children stored under the given slot, in insertion order.
    pub fn slot_all(&self, id: NodeId, slot: Slot) -> Vec<NodeId> {
        self.nodes[id.0 as usize]
            .slots
            .iter()
            .filter(|(s, _)| *s == slot)
            .map(|(_, n)| *n)
            .collect()
    }

    /// The slot sequence of a node, in insertion order.
    pub fn slots(&self, id: NodeId) -> &[(Slot, NodeId)] {
        &self.nodes[id.0 as usize].slots
    }

    /// The token payload of a `Token` leaf.
    pub fn token(&self, id: NodeId) -> Option<&Token> {
        match &self.nodes[id.0 as usize].kind {
            NodeKind::Token(tok) => Some(tok),
            _ => None,
        }
    }

    /// The identifier text of an `Identifier` node or identifier token leaf.
    pub fn ident_value(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0 as usize].kind {
            NodeKind::Token(tok) if tok.kind == TokenKind::Identifier => Some(&tok.value),
            NodeKind::Identifier => self.nodes[id.0 as usize]
                .children
                .iter()
                .find_map(|&child| match &self.nodes[child.0 as usize].kind {
                    NodeKind::Token(tok) if tok.kind == TokenKind::Identifier => {
                        Some(tok.value.as_str())
                    }
                    _ => None,
                }),
            _ => None,
        }
    }

    /// The token leaf holding an `Identifier` node's name, for ranges.
    pub fn ident_token(&self, id: NodeId) -> Option<NodeId> {
        match &self.nodes[id.0 as usize].kind {
            NodeKind::Token(tok) if tok.kind == TokenKind::Identifier => Some(id),
            NodeKind::Identifier => self.nodes[id.0 as usize]
                .children
                .iter()
                .copied()
                .find(|&child| {
                    matches!(&self.nodes[child.0 as usize].kind,
                        NodeKind::Token(tok) if tok.kind == TokenKind::Identifier)
                }),
            _ => None,
        }
    }

    /// The source span covered by a node (leaves inclusive).
    ///
    /// A `Missing` node has a zero-width span at its recorded offset; an
    /// interior node covers all of its leaves.
    pub fn span(&self, id: NodeId) -> Span {
        let node = &self.nodes[id.0 as usize];
        match &node.kind {
            NodeKind::Token(tok) => tok.span,
            NodeKind::Missing { offset, .. } => Span::empty(*offset),
            NodeKind::Unexpected { token, .. } => {
                let mut span = token.span;
                for &child in &node.children {
                    span = span.merge(self.span(child));
                }
                span
            }
            _ => {
                let mut span: Option<Span> = None;
                for &child in &node.children {
                    let child_span = self.span(child);
                    span = Some(match span {
                        Some(s) => s.merge(child_span),
                        None => child_span,
                    });
                }
                span.unwrap_or(Span::empty(0))
            }
        }
    }

    /// Total number of nodes in the arena.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over all node ids in allocation order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    /// The `Token` leaf whose span contains the given byte offset.
    /// Tokens never overlap, so the first hit is the answer.
    pub fn token_at(&self, offset: u32) -> Option<NodeId> {
        self.ids().find(|&id| {
            matches!(&self.nodes[id.0 as usize].kind,
                NodeKind::Token(tok) if tok.span.contains(offset))
        })
    }

    /// Walk the parent chain from `id` upward (excluding `id` itself).
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            current: self.parent(id),
        }
    }
}

impl Default for SyntaxTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over a node's ancestors, nearest first.
pub struct Ancestors<'t> {
    tree: &'t SyntaxTree,
    current: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.current?;
        self.current = self.tree.parent(id);
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(kind: TokenKind, value: &str, start: u32) -> NodeKind {
        NodeKind::Token(Token::new(kind, value, start, start + value.len() as u32))
    }

    #[test]
    fn root_is_program() {
        let tree = SyntaxTree::new();
        assert_eq!(*tree.kind(SyntaxTree::ROOT), NodeKind::Program);
        assert_eq!(tree.parent(SyntaxTree::ROOT), None);
    }

    #[test]
    fn add_child_sets_parent() {
        let mut tree = SyntaxTree::new();
        let leaf = tree.push(token(TokenKind::Text, "hi", 0));
        tree.add_child(SyntaxTree::ROOT, leaf, Some(Slot::Body));
        assert_eq!(tree.parent(leaf), Some(SyntaxTree::ROOT));
        assert_eq!(tree.children(SyntaxTree::ROOT), &[leaf]);
        assert_eq!(tree.slot(SyntaxTree::ROOT, Slot::Body), Some(leaf));
    }

    #[test]
    fn add_child_keeps_source_order() {
        let mut tree = SyntaxTree::new();
        let expr = tree.push(NodeKind::Identifier);
        let ident = tree.push(token(TokenKind::Identifier, "x", 5));
        tree.add_child(expr, ident, None);
        // Attach a paren that *precedes* the identifier after the fact.
        let open = tree.push(token(TokenKind::OpenParen, "(", 4));
        let close = tree.push(token(TokenKind::CloseParen, ")", 6));
        tree.add_child(expr, close, None);
        tree.add_child(expr, open, None);
        let starts: Vec<u32> = tree
            .children(expr)
            .iter()
            .map(|&c| tree.span(c).start)
            .collect();
        assert_eq!(starts, vec![4, 5, 6]);
    }

    #[test]
    fn span_covers_leaves() {
        let mut tree = SyntaxTree::new();
        let expr = tree.push(NodeKind::BinaryExpression);
        for (value, start) in [("1", 0), ("+", 2), ("2", 4)] {
            let leaf = tree.push(token(TokenKind::NumericLiteral, value, start));
            tree.add_child(expr, leaf, None);
        }
        assert_eq!(tree.span(expr), Span::new(0, 5));
    }

    #[test]
    fn missing_nodes_join_recovery_list() {
        let mut tree = SyntaxTree::new();
        let missing = tree.push(NodeKind::Missing {
            expected: "expression".into(),
            offset: 6,
        });
        assert_eq!(tree.recovery, vec![missing]);
        assert_eq!(tree.span(missing), Span::empty(6));
    }

    #[test]
    fn slot_all_returns_repeats_in_order() {
        let mut tree = SyntaxTree::new();
        let a = tree.push(token(TokenKind::Text, "a", 0));
        let b = tree.push(token(TokenKind::Text, "b", 1));
        tree.add_child(SyntaxTree::ROOT, a, Some(Slot::Body));
        tree.add_child(SyntaxTree::ROOT, b, Some(Slot::Body));
        assert_eq!(tree.slot_all(SyntaxTree::ROOT, Slot::Body), vec![a, b]);
    }

    #[test]
    fn token_at_finds_containing_leaf() {
        let mut tree = SyntaxTree::new();
        let a = tree.push(token(TokenKind::Identifier, "abc", 0));
        let b = tree.push(token(TokenKind::Identifier, "def", 4));
        tree.add_child(SyntaxTree::ROOT, a, None);
        tree.add_child(SyntaxTree::ROOT, b, None);
        assert_eq!(tree.token_at(1), Some(a));
        assert_eq!(tree.token_at(4), Some(b));
        assert_eq!(tree.token_at(20), None);
    }

    #[test]
    fn ancestors_walk_to_root() {
        let mut tree = SyntaxTree::new();
        let stmt = tree.push(NodeKind::If);
        tree.add_child(SyntaxTree::ROOT, stmt, Some(Slot::Body));
        let leaf = tree.push(token(TokenKind::Identifier, "x", 0));
        tree.add_child(stmt, leaf, Some(Slot::Test));
        let chain: Vec<NodeId> = tree.ancestors(leaf).collect();
        assert_eq!(chain, vec![stmt, SyntaxTree::ROOT]);
    }
}
