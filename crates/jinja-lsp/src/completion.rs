//! Completion, dispatched by cursor context: statement keywords after
//! `{%`, filters after `|`, tests after `is`, properties after `.`,
//! import paths inside import string literals, block names in `block`,
//! and visible symbols everywhere else.

use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, Documentation, MarkupContent, MarkupKind,
};

use jinja_analysis::host::{ReadUri, Uri};
use jinja_analysis::imports::path_completion_entries;
use jinja_analysis::symbols::{self, SymbolKind};
use jinja_analysis::types::builtins::{CONSTANT_IDENTIFIERS, STATEMENT_KEYWORDS};
use jinja_analysis::types::infer;
use jinja_analysis::types::ty::{render_signature, TypeInfo};
use jinja_analysis::Workspace;
use jinja_common::token::{Token, TokenKind};
use jinja_parser::{NodeId, NodeKind, Slot, SyntaxTree};

/// Compute completion items at a byte offset.
pub fn completions(
    workspace: &Workspace,
    uri: &Uri,
    offset: u32,
    host: &dyn ReadUri,
) -> Vec<CompletionItem> {
    let Some(doc) = workspace.document(uri) else {
        return Vec::new();
    };
    let tree = &doc.tree;

    // Context comes from the flat token stream around the cursor.
    let current = token_index_before(&doc.tokens, offset);
    let Some(current) = current else {
        return symbol_items(workspace, uri, SyntaxTree::ROOT);
    };
    let token = &doc.tokens[current];
    let previous = current.checked_sub(1).map(|i| &doc.tokens[i]);

    // Inside an import source string: path completion.
    if token.kind == TokenKind::StringLiteral && offset > token.span.start {
        if let Some(partial) = import_partial(workspace, doc, token, offset) {
            return path_items(workspace, uri, &partial, host);
        }
    }

    let after = |kind: TokenKind| {
        token.kind == kind
            || (token.kind == TokenKind::Identifier
                && previous.map(|t| t.kind) == Some(kind))
    };

    if after(TokenKind::Pipe) {
        return filter_items(workspace);
    }
    if is_ident(token, "is") || (token.kind == TokenKind::Identifier && previous.map_or(false, |t| is_ident(t, "is"))) {
        return test_items(workspace);
    }
    if after(TokenKind::Dot) {
        let dot_offset = if token.kind == TokenKind::Dot {
            token.span.start
        } else {
            previous.map(|t| t.span.start).unwrap_or(token.span.start)
        };
        return property_items(workspace, uri, tree, dot_offset);
    }
    if after(TokenKind::OpenStatement) {
        return keyword_items();
    }
    if previous.map_or(false, |t| is_ident(t, "block")) {
        return block_items(workspace, uri);
    }

    let anchor = tree
        .token_at(offset.saturating_sub(1))
        .map(|t| tree.parent(t).unwrap_or(SyntaxTree::ROOT))
        .unwrap_or(SyntaxTree::ROOT);
    symbol_items(workspace, uri, anchor)
}

fn is_ident(token: &Token, value: &str) -> bool {
    token.kind == TokenKind::Identifier && token.value == value
}

/// Index of the token containing `offset` or the nearest one before it.
fn token_index_before(tokens: &[Token], offset: u32) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (index, token) in tokens.iter().enumerate() {
        if token.span.start < offset && offset <= token.span.end {
            return Some(index);
        }
        if token.span.end <= offset {
            best = Some(index);
        }
    }
    best
}

/// The typed part of an import source string before the cursor, when the
/// literal is an import's source.
fn import_partial(
    _workspace: &Workspace,
    doc: &jinja_analysis::Document,
    token: &Token,
    offset: u32,
) -> Option<String> {
    let tree = &doc.tree;
    let token_id = tree.token_at(token.span.start)?;
    let literal = tree.parent(token_id)?;
    let stmt = tree.parent(literal)?;
    let is_source = tree
        .slots(stmt)
        .iter()
        .any(|(slot, id)| *slot == Slot::Source && *id == literal);
    if !is_source
        || !matches!(
            tree.kind(stmt),
            NodeKind::Include | NodeKind::Import | NodeKind::FromImport | NodeKind::Extends
        )
    {
        return None;
    }
    let content_start = token.span.start + 1; // after the opening quote
    let end = offset.clamp(content_start, token.span.end);
    Some(doc.source[content_start as usize..end as usize].to_string())
}

fn path_items(
    workspace: &Workspace,
    uri: &Uri,
    partial: &str,
    host: &dyn ReadUri,
) -> Vec<CompletionItem> {
    path_completion_entries(partial, uri, &workspace.roots, &workspace.settings, host)
        .into_iter()
        .map(|entry| CompletionItem {
            label: if entry.is_dir {
                format!("{}/", entry.name)
            } else {
                entry.name.clone()
            },
            insert_text: Some(if entry.is_dir {
                format!("{}/", entry.name)
            } else {
                entry.name
            }),
            kind: Some(if entry.is_dir {
                CompletionItemKind::FOLDER
            } else {
                CompletionItemKind::FILE
            }),
            ..CompletionItem::default()
        })
        .collect()
}

fn callable_item(name: String, info: &TypeInfo) -> CompletionItem {
    CompletionItem {
        label: name,
        kind: Some(CompletionItemKind::FUNCTION),
        detail: info.signature.as_ref().map(render_signature),
        documentation: info.documentation.as_ref().map(|docs| {
            Documentation::MarkupContent(MarkupContent {
                kind: MarkupKind::Markdown,
                value: docs.clone(),
            })
        }),
        ..CompletionItem::default()
    }
}

fn filter_items(workspace: &Workspace) -> Vec<CompletionItem> {
    workspace
        .filter_names()
        .into_iter()
        .map(|(name, info)| callable_item(name, &info))
        .collect()
}

fn test_items(workspace: &Workspace) -> Vec<CompletionItem> {
    workspace
        .test_names()
        .into_iter()
        .map(|(name, info)| callable_item(name, &info))
        .collect()
}

fn keyword_items() -> Vec<CompletionItem> {
    STATEMENT_KEYWORDS
        .iter()
        .map(|keyword| CompletionItem {
            label: keyword.to_string(),
            kind: Some(CompletionItemKind::KEYWORD),
            ..CompletionItem::default()
        })
        .collect()
}

/// Properties of the object left of a `.`, from its inferred type.
fn property_items(
    workspace: &Workspace,
    uri: &Uri,
    tree: &SyntaxTree,
    dot_offset: u32,
) -> Vec<CompletionItem> {
    let Some(dot_token) = tree.token_at(dot_offset) else {
        return Vec::new();
    };
    let Some(member) = tree.parent(dot_token) else {
        return Vec::new();
    };
    if !matches!(tree.kind(member), NodeKind::MemberExpression) {
        return Vec::new();
    }
    let Some(object) = tree.slot(member, Slot::Object) else {
        return Vec::new();
    };
    let Some(object_type) = infer::infer_type(workspace, uri, object) else {
        return Vec::new();
    };
    let Some(properties) = object_type.properties else {
        return Vec::new();
    };

    properties
        .iter()
        .filter(|(name, _)| !name.chars().all(|c| c.is_ascii_digit()))
        .map(|(name, ty)| {
            let resolved = jinja_analysis::types::builtins::resolve_type(ty);
            let callable = resolved.as_ref().map(TypeInfo::is_callable).unwrap_or(false);
            CompletionItem {
                label: name.clone(),
                kind: Some(if callable {
                    CompletionItemKind::METHOD
                } else {
                    CompletionItemKind::PROPERTY
                }),
                detail: resolved.as_ref().map(|info| info.display_name()),
                documentation: resolved
                    .as_ref()
                    .and_then(|info| info.documentation.clone())
                    .map(Documentation::String),
                ..CompletionItem::default()
            }
        })
        .collect()
}

/// Block names available through the extends chain.
fn block_items(workspace: &Workspace, uri: &Uri) -> Vec<CompletionItem> {
    let mut items = Vec::new();
    let Some(doc) = workspace.document(uri) else {
        return items;
    };
    for (stmt, target) in &doc.imports {
        if !matches!(doc.tree.kind(*stmt), NodeKind::Extends) {
            continue;
        }
        let Some(target) = target else { continue };
        let Some(parent_doc) = workspace.document(target) else {
            continue;
        };
        for symbol in parent_doc.symbols.all_of_kind(SymbolKind::Block) {
            items.push(CompletionItem {
                label: symbol.name.clone(),
                kind: Some(CompletionItemKind::MODULE),
                ..CompletionItem::default()
            });
        }
    }
    items
}

/// Visible document symbols, special symbols, and user globals.
fn symbol_items(workspace: &Workspace, uri: &Uri, anchor: NodeId) -> Vec<CompletionItem> {
    let mut items = Vec::new();
    let Some(doc) = workspace.document(uri) else {
        return items;
    };

    for found in symbols::visible_symbols(workspace, uri, anchor) {
        let kind = match found.symbol.kind {
            SymbolKind::Macro => CompletionItemKind::FUNCTION,
            SymbolKind::Block => CompletionItemKind::MODULE,
            SymbolKind::Variable => CompletionItemKind::VARIABLE,
        };
        let detail = infer::symbol_type(workspace, &found)
            .map(|info| info.display_name());
        items.push(CompletionItem {
            label: found.symbol.name.clone(),
            kind: Some(kind),
            detail,
            ..CompletionItem::default()
        });
    }

    for (name, info) in infer::visible_special_symbols(&doc.tree, anchor) {
        if CONSTANT_IDENTIFIERS.contains(&name) {
            continue;
        }
        if items.iter().any(|item| item.label == name) {
            continue;
        }
        items.push(CompletionItem {
            label: name.to_string(),
            kind: Some(if info.is_callable() {
                CompletionItemKind::FUNCTION
            } else {
                CompletionItemKind::VARIABLE
            }),
            detail: Some(info.display_name()),
            documentation: info.documentation.clone().map(Documentation::String),
            ..CompletionItem::default()
        });
    }

    for (name, info) in workspace.globals.visible(uri) {
        if CONSTANT_IDENTIFIERS.contains(&name) || items.iter().any(|item| item.label == name) {
            continue;
        }
        items.push(CompletionItem {
            label: name.to_string(),
            kind: Some(CompletionItemKind::VARIABLE),
            detail: Some(info.display_name()),
            ..CompletionItem::default()
        });
    }

    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use jinja_analysis::host::MemoryHost;

    fn complete(source: &str, cursor: u32) -> Vec<CompletionItem> {
        let host = MemoryHost::new();
        let mut ws = Workspace::new();
        let uri = Uri::new("file:///t/main.jinja");
        ws.open_document(uri.clone(), source.to_string(), 1, &host);
        completions(&ws, &uri, cursor, &host)
    }

    #[test]
    fn filters_after_pipe_prefix_u() {
        // Cursor right after the `u` in `{{ x | u }}`.
        let source = "{{ x | u }}";
        let items = complete(source, 8);
        let with_u: Vec<&CompletionItem> = items
            .iter()
            .filter(|item| item.label.starts_with('u'))
            .collect();
        let labels: Vec<&str> = with_u.iter().map(|i| i.label.as_str()).collect();
        for expected in ["unique", "upper", "urlencode", "urlize"] {
            assert!(labels.contains(&expected), "missing {expected}: {labels:?}");
        }
        for item in &with_u {
            assert_eq!(item.kind, Some(CompletionItemKind::FUNCTION));
            assert!(item.documentation.is_some(), "{} needs docs", item.label);
        }
    }

    #[test]
    fn statement_keywords_after_open() {
        let source = "{% ";
        let items = complete(source, 3);
        let labels: Vec<&str> = items.iter().map(|i| i.label.as_str()).collect();
        assert!(labels.contains(&"if"));
        assert!(labels.contains(&"endfor"));
        assert!(labels.contains(&"extends"));
    }

    #[test]
    fn tests_after_is() {
        let source = "{{ x is d }}";
        let items = complete(source, 9);
        let labels: Vec<&str> = items.iter().map(|i| i.label.as_str()).collect();
        assert!(labels.contains(&"defined"));
        assert!(labels.contains(&"divisibleby"));
    }

    #[test]
    fn properties_after_dot() {
        let source = "{% set d = {'alpha': 1, 'beta': 2} %}{{ d. }}";
        let cursor = source.rfind('.').unwrap() as u32 + 1;
        let items = complete(source, cursor);
        let labels: Vec<&str> = items.iter().map(|i| i.label.as_str()).collect();
        assert!(labels.contains(&"alpha"), "got {labels:?}");
        assert!(labels.contains(&"beta"), "got {labels:?}");
    }

    #[test]
    fn symbols_elsewhere_without_constants() {
        let source = "{% set my_var = 1 %}{{ m }}";
        let cursor = source.rfind("m }}").unwrap() as u32 + 1;
        let items = complete(source, cursor);
        let labels: Vec<&str> = items.iter().map(|i| i.label.as_str()).collect();
        assert!(labels.contains(&"my_var"), "got {labels:?}");
        assert!(labels.contains(&"range"));
        assert!(!labels.contains(&"true"));
        assert!(!labels.contains(&"None"));
    }

    #[test]
    fn import_paths_inside_string() {
        let mut host = MemoryHost::new();
        host.insert("file:///t/lib.jinja", "");
        host.insert("file:///t/parts/a.jinja", "");
        let mut ws = Workspace::new();
        let uri = Uri::new("file:///t/main.jinja");
        let source = "{% include \"\" %}";
        ws.open_document(uri.clone(), source.to_string(), 1, &host);
        // Cursor between the quotes.
        let items = completions(&ws, &uri, 12, &host);
        let labels: Vec<&str> = items.iter().map(|i| i.label.as_str()).collect();
        assert!(labels.contains(&"lib.jinja"), "got {labels:?}");
        assert!(labels.contains(&"parts/"), "got {labels:?}");
    }
}
