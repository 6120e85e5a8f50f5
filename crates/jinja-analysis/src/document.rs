//! Per-document state: source text, tokens, tree, symbols, and the
//! resolved import list. Rebuilt wholesale on every change.

use std::cell::RefCell;

use rustc_hash::FxHashMap;

use jinja_common::span::LineIndex;
use jinja_common::token::Token;
use jinja_lexer::error::LexError;
use jinja_lexer::LexerOptions;
use jinja_parser::{parse_source, NodeId, NodeKind, SyntaxTree};

use crate::host::Uri;
use crate::symbols::SymbolTable;
use crate::types::ty::TypeInfo;

/// One analyzed template.
pub struct Document {
    pub uri: Uri,
    pub version: i32,
    pub source: String,
    pub line_index: LineIndex,
    pub tokens: Vec<Token>,
    pub lex_errors: Vec<LexError>,
    pub tree: SyntaxTree,
    pub symbols: SymbolTable,
    /// Each import statement with the URI it resolved to, if any.
    pub imports: Vec<(NodeId, Option<Uri>)>,
    /// Whether the editor has this document open (as opposed to being
    /// loaded only because something imports it).
    pub open: bool,
    /// Memoized expression types; cleared whenever the tree changes.
    pub(crate) type_cache: RefCell<FxHashMap<NodeId, Option<TypeInfo>>>,
}

impl Document {
    /// Lex, parse, and symbolize a document. Import resolution is the
    /// workspace's job and fills `imports` afterwards.
    pub fn new(uri: Uri, source: String, version: i32, open: bool) -> Self {
        let result = parse_source(&source, &LexerOptions::default());
        let symbols = SymbolTable::collect(&result.tree);
        let line_index = LineIndex::new(&source);
        Self {
            uri,
            version,
            source,
            line_index,
            tokens: result.tokens,
            lex_errors: result.lex_errors,
            tree: result.tree,
            symbols,
            imports: Vec::new(),
            open,
            type_cache: RefCell::new(FxHashMap::default()),
        }
    }

    /// The import statement nodes in source order.
    pub fn import_statement_nodes(&self) -> Vec<NodeId> {
        self.tree
            .ids()
            .filter(|&id| {
                matches!(
                    self.tree.kind(id),
                    NodeKind::Include | NodeKind::Import | NodeKind::FromImport | NodeKind::Extends
                )
            })
            .collect()
    }

    /// The resolved target of an import statement.
    pub fn resolved_import(&self, stmt: NodeId) -> Option<&Uri> {
        self.imports
            .iter()
            .find(|(node, _)| *node == stmt)
            .and_then(|(_, target)| target.as_ref())
    }

    /// Drop all memoized types.
    pub fn clear_type_cache(&self) {
        self.type_cache.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_document_analyzes_source() {
        let doc = Document::new(
            Uri::new("file:///t/a.jinja"),
            "{% macro hello() %}{% endmacro %}".to_string(),
            1,
            true,
        );
        assert!(doc.lex_errors.is_empty());
        assert!(doc.tree.recovery.is_empty());
        assert!(!doc.symbols.all_of_kind(crate::symbols::SymbolKind::Macro).is_empty());
    }

    #[test]
    fn import_statements_enumerated_in_order() {
        let doc = Document::new(
            Uri::new("file:///t/a.jinja"),
            "{% extends \"base.jinja\" %}{% include \"x.jinja\" %}".to_string(),
            1,
            true,
        );
        let nodes = doc.import_statement_nodes();
        assert_eq!(nodes.len(), 2);
        assert!(matches!(doc.tree.kind(nodes[0]), NodeKind::Extends));
        assert!(matches!(doc.tree.kind(nodes[1]), NodeKind::Include));
    }
}
