//! Error-tolerant parser for Jinja templates.
//!
//! Turns a token stream into a concrete syntax tree that keeps every
//! token. Parse anomalies never abort; they become recovery nodes inside
//! the tree, which the diagnostics layer renders as `Expected ...`
//! messages.

mod parser;
pub mod tree;

use jinja_common::token::Token;
use jinja_lexer::error::LexError;
use jinja_lexer::{Lexer, LexerOptions};

pub use tree::{Ancestors, Node, NodeId, NodeKind, Slot, SyntaxTree};

/// Parse a token stream into a syntax tree.
///
/// `source` is only consulted for raw-body spans and end-of-input
/// offsets; the tokens drive everything else.
pub fn parse(tokens: &[Token], source: &str) -> SyntaxTree {
    let mut p = parser::Parser::new(tokens, source);
    parser::parse_program(&mut p);
    p.into_tree()
}

/// The combined output of lexing and parsing one document.
pub struct ParseResult {
    pub tokens: Vec<Token>,
    pub lex_errors: Vec<LexError>,
    pub tree: SyntaxTree,
}

/// Lex and parse a whole document in one step.
pub fn parse_source(source: &str, options: &LexerOptions) -> ParseResult {
    let (tokens, lex_errors) = Lexer::tokenize(source, options);
    let tree = parse(&tokens, source);
    ParseResult {
        tokens,
        lex_errors,
        tree,
    }
}

/// Render a tree as indented text, one node per line. Test helper.
pub fn debug_tree(tree: &SyntaxTree) -> String {
    fn walk(tree: &SyntaxTree, id: NodeId, depth: usize, out: &mut String) {
        let indent = "  ".repeat(depth);
        match tree.kind(id) {
            NodeKind::Token(tok) => {
                out.push_str(&format!("{indent}{:?} {:?}\n", tok.kind, tok.value));
            }
            NodeKind::Missing { expected, offset } => {
                out.push_str(&format!("{indent}Missing({expected}) @{offset}\n"));
            }
            NodeKind::Unexpected { message, .. } => {
                out.push_str(&format!("{indent}Unexpected({message})\n"));
                for &child in tree.children(id) {
                    walk(tree, child, depth + 1, out);
                }
            }
            kind => {
                out.push_str(&format!("{indent}{kind:?}\n"));
                for &child in tree.children(id) {
                    walk(tree, child, depth + 1, out);
                }
            }
        }
    }
    let mut out = String::new();
    walk(tree, SyntaxTree::ROOT, 0, &mut out);
    out
}
