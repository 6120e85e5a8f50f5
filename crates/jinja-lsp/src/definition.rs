//! Go-to-definition: macros and variables across imports, blocks through
//! the extends chain, and import sources to their target documents.

use jinja_analysis::host::Uri;
use jinja_analysis::symbols::{self, LookupOptions, SymbolKind};
use jinja_analysis::Workspace;
use jinja_common::span::Span;
use jinja_common::token::TokenKind;
use jinja_parser::{NodeId, NodeKind, Slot, SyntaxTree};

/// The definition site for the token at `offset`.
pub fn find_definition(workspace: &Workspace, uri: &Uri, offset: u32) -> Option<(Uri, Span)> {
    let doc = workspace.document(uri)?;
    let tree = &doc.tree;
    let token_id = tree.token_at(offset)?;
    let token = tree.token(token_id)?;

    match token.kind {
        // Import source literals jump to the imported document.
        TokenKind::StringLiteral => {
            let literal = tree.parent(token_id)?;
            let stmt = tree.parent(literal)?;
            if slot_of(tree, stmt, literal) != Some(Slot::Source) {
                return None;
            }
            let target = doc.resolved_import(stmt)?;
            Some((target.clone(), Span::empty(0)))
        }
        TokenKind::Identifier => {
            let ident_node = tree.parent(token_id)?;
            if !matches!(tree.kind(ident_node), NodeKind::Identifier) {
                return None;
            }
            let name = token.value.clone();
            let owner = tree.parent(ident_node)?;
            let slot = slot_of(tree, owner, ident_node);

            // A block name jumps to the ancestor block it overrides.
            if matches!(tree.kind(owner), NodeKind::Block)
                && matches!(slot, Some(Slot::Name | Slot::CloserName))
            {
                let found = symbols::find_symbol(
                    workspace,
                    uri,
                    SyntaxTree::ROOT,
                    &name,
                    Some(SymbolKind::Block),
                    &LookupOptions {
                        check_current: false,
                        follow_imports: false,
                        follow_includes: false,
                        ..LookupOptions::default()
                    },
                )?;
                return definition_site(workspace, found);
            }

            let found = symbols::find_symbol(
                workspace,
                uri,
                ident_node,
                &name,
                None,
                &LookupOptions::default(),
            )?;
            definition_site(workspace, found)
        }
        _ => None,
    }
}

fn definition_site(
    workspace: &Workspace,
    found: symbols::FoundSymbol,
) -> Option<(Uri, Span)> {
    let doc = workspace.document(&found.uri)?;
    let span = match found.symbol.identifier {
        Some(identifier) => doc.tree.span(identifier),
        None => doc.tree.span(found.symbol.node),
    };
    Some((found.uri, span))
}

fn slot_of(tree: &SyntaxTree, parent: NodeId, child: NodeId) -> Option<Slot> {
    tree.slots(parent)
        .iter()
        .find(|(_, id)| *id == child)
        .map(|(slot, _)| *slot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jinja_analysis::host::MemoryHost;

    #[test]
    fn local_macro_definition() {
        let host = MemoryHost::new();
        let mut ws = Workspace::new();
        let uri = Uri::new("file:///t/main.jinja");
        let source = "{% macro greet() %}{% endmacro %}{{ greet() }}";
        ws.open_document(uri.clone(), source.to_string(), 1, &host);

        let (target, span) =
            find_definition(&ws, &uri, source.rfind("greet").unwrap() as u32).unwrap();
        assert_eq!(target, uri);
        assert_eq!(span.start, source.find("greet").unwrap() as u32);
    }

    #[test]
    fn cross_document_macro_definition() {
        let mut host = MemoryHost::new();
        host.insert(
            "file:///t/lib.jinja",
            "{% macro example(x, y) %}{% endmacro %}",
        );
        let mut ws = Workspace::new();
        let main = Uri::new("file:///t/main.jinja");
        let source = "{% from \"lib.jinja\" import example %}{{ example(1, 2) }}";
        ws.open_document(main.clone(), source.to_string(), 1, &host);

        let (target, span) =
            find_definition(&ws, &main, source.rfind("example").unwrap() as u32).unwrap();
        assert_eq!(target, Uri::new("file:///t/lib.jinja"));
        // The range covers the macro name token.
        assert_eq!(span, Span::new(9, 16));
    }

    #[test]
    fn import_source_jumps_to_document() {
        let mut host = MemoryHost::new();
        host.insert("file:///t/lib.jinja", "");
        let mut ws = Workspace::new();
        let main = Uri::new("file:///t/main.jinja");
        let source = "{% include \"lib.jinja\" %}";
        ws.open_document(main.clone(), source.to_string(), 1, &host);

        let (target, _) =
            find_definition(&ws, &main, source.find("lib").unwrap() as u32).unwrap();
        assert_eq!(target, Uri::new("file:///t/lib.jinja"));
    }

    #[test]
    fn block_name_jumps_to_parent_template() {
        let mut host = MemoryHost::new();
        host.insert(
            "file:///t/base.jinja",
            "{% block content %}{% endblock %}",
        );
        let mut ws = Workspace::new();
        let child = Uri::new("file:///t/child.jinja");
        let source = "{% extends \"base.jinja\" %}{% block content %}{% endblock %}";
        ws.open_document(child.clone(), source.to_string(), 1, &host);

        let (target, span) =
            find_definition(&ws, &child, source.rfind("content").unwrap() as u32).unwrap();
        assert_eq!(target, Uri::new("file:///t/base.jinja"));
        assert_eq!(span.start, "{% block ".len() as u32);
    }

    #[test]
    fn unknown_identifier_has_no_definition() {
        let host = MemoryHost::new();
        let mut ws = Workspace::new();
        let uri = Uri::new("file:///t/main.jinja");
        let source = "{{ mystery }}";
        ws.open_document(uri.clone(), source.to_string(), 1, &host);
        assert!(find_definition(&ws, &uri, 3).is_none());
    }
}
