//! Hover: type and signature information for the identifier under the
//! cursor.

use jinja_analysis::host::Uri;
use jinja_analysis::symbols::{self, LookupOptions, SymbolKind};
use jinja_analysis::types::infer;
use jinja_analysis::types::ty::{render_signature, TypeInfo};
use jinja_analysis::Workspace;
use jinja_common::span::Span;
use jinja_common::token::TokenKind;
use jinja_parser::{NodeId, NodeKind, Slot, SyntaxTree};

/// Hover content (markdown) and the range it applies to.
pub fn hover(workspace: &Workspace, uri: &Uri, offset: u32) -> Option<(String, Span)> {
    let doc = workspace.document(uri)?;
    let tree = &doc.tree;
    let token_id = tree.token_at(offset)?;
    let token = tree.token(token_id)?;
    if token.kind != TokenKind::Identifier {
        return None;
    }
    let span = token.span;
    let name = token.value.clone();
    let ident_node = tree.parent(token_id)?;
    if !matches!(tree.kind(ident_node), NodeKind::Identifier) {
        return None;
    }

    let owner = tree.parent(ident_node);
    let slot = owner.and_then(|o| slot_of(tree, o, ident_node));
    if let Some(owner) = owner {
        match (tree.kind(owner), slot) {
            (NodeKind::FilterExpression | NodeKind::FilterStatement, Some(Slot::Filter)) => {
                return Some((callable_markdown(&name, &workspace.filter_type(&name)?), span));
            }
            (NodeKind::TestExpression, Some(Slot::Test)) => {
                return Some((callable_markdown(&name, &workspace.test_type(&name)?), span));
            }
            (NodeKind::CallExpression, Some(Slot::Callee)) => {
                if let Some(grand) = tree.parent(owner) {
                    match (tree.kind(grand), slot_of(tree, grand, owner)) {
                        (NodeKind::FilterExpression | NodeKind::FilterStatement, Some(Slot::Filter)) => {
                            return Some((
                                callable_markdown(&name, &workspace.filter_type(&name)?),
                                span,
                            ));
                        }
                        (NodeKind::TestExpression, Some(Slot::Test)) => {
                            return Some((
                                callable_markdown(&name, &workspace.test_type(&name)?),
                                span,
                            ));
                        }
                        _ => {}
                    }
                }
            }
            (NodeKind::Block, Some(Slot::Name | Slot::CloserName)) => {
                return Some((block_markdown(workspace, uri, &name), span));
            }
            _ => {}
        }
    }

    let info = infer::infer_type(workspace, uri, ident_node)?;
    if info.is_callable() {
        return Some((callable_markdown(&name, &info), span));
    }

    let mut line = format!("{name}: {}", info.display_name());
    if let Some(literal) = &info.literal_value {
        line.push_str(&format!(" = {literal}"));
    }
    let mut text = format!("```jinja\n{line}\n```");
    if let Some(docs) = &info.documentation {
        text.push_str("\n\n");
        text.push_str(docs);
    }
    Some((text, span))
}

fn callable_markdown(name: &str, info: &TypeInfo) -> String {
    let mut text = match &info.signature {
        Some(signature) => format!("```jinja\n{name}{}\n```", render_signature(signature)),
        None => format!("```jinja\n{name}\n```"),
    };
    if let Some(docs) = &info.documentation {
        text.push_str("\n\n");
        text.push_str(docs);
    }
    text
}

fn block_markdown(workspace: &Workspace, uri: &Uri, name: &str) -> String {
    let mut text = format!("```jinja\nblock {name}\n```");
    let overridden = symbols::find_symbol(
        workspace,
        uri,
        SyntaxTree::ROOT,
        name,
        Some(SymbolKind::Block),
        &LookupOptions {
            check_current: false,
            follow_imports: false,
            follow_includes: false,
            ..LookupOptions::default()
        },
    );
    if let Some(found) = overridden {
        text.push_str(&format!("\n\nOverrides the block in {}", found.uri));
    }
    text
}

fn slot_of(tree: &SyntaxTree, parent: NodeId, child: NodeId) -> Option<Slot> {
    tree.slots(parent)
        .iter()
        .find(|(_, id)| *id == child)
        .map(|(slot, _)| *slot)
}
