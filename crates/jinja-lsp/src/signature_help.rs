//! Signature help: parameter info while the cursor sits inside call
//! parentheses. The active parameter counts the commas typed so far;
//! a `name=` keyword argument jumps to the matching parameter.

use tower_lsp::lsp_types::{
    Documentation, ParameterInformation, ParameterLabel, SignatureHelp, SignatureInformation,
};

use jinja_analysis::host::Uri;
use jinja_analysis::types::infer;
use jinja_analysis::types::ty::{render_signature, Signature, TypeOrRef};
use jinja_analysis::Workspace;
use jinja_common::token::TokenKind;
use jinja_parser::{NodeId, NodeKind, Slot, SyntaxTree};

/// Compute signature help at a byte offset.
pub fn signature_help(workspace: &Workspace, uri: &Uri, offset: u32) -> Option<SignatureHelp> {
    let doc = workspace.document(uri)?;
    let tree = &doc.tree;

    let (call, open_paren_end) = enclosing_call(tree, offset)?;
    let callee = tree.slot(call, Slot::Callee)?;
    let callee_name = tree.ident_value(callee).unwrap_or_default().to_string();
    let callee_type = infer::infer_type(workspace, uri, callee)?;
    let signature = callee_type.signature?;

    let mut active = commas_before(tree, call, open_paren_end, offset);
    if let Some(named) = keyword_argument_at(tree, call, offset) {
        if let Some(index) = signature
            .arguments
            .iter()
            .position(|arg| arg.name == named)
        {
            active = index as u32;
        }
    }
    let parameter_count = parameter_labels(&signature).len() as u32;
    if parameter_count > 0 {
        active = active.min(parameter_count - 1);
    }

    let label = format!("{callee_name}{}", render_signature(&signature));
    let parameters: Vec<ParameterInformation> = parameter_labels(&signature)
        .into_iter()
        .map(|label| ParameterInformation {
            label: ParameterLabel::Simple(label),
            documentation: None,
        })
        .collect();

    Some(SignatureHelp {
        signatures: vec![SignatureInformation {
            label,
            documentation: callee_type
                .documentation
                .clone()
                .map(Documentation::String),
            parameters: Some(parameters),
            active_parameter: Some(active),
        }],
        active_signature: Some(0),
        active_parameter: Some(active),
    })
}

/// The innermost call whose parentheses contain `offset`, plus the byte
/// just after its `(`.
fn enclosing_call(tree: &SyntaxTree, offset: u32) -> Option<(NodeId, u32)> {
    let mut best: Option<(NodeId, u32)> = None;
    for id in tree.ids() {
        if !matches!(tree.kind(id), NodeKind::CallExpression) {
            continue;
        }
        let Some(open) = paren_token(tree, id, TokenKind::OpenParen) else {
            continue;
        };
        let close_end = paren_token(tree, id, TokenKind::CloseParen)
            .map(|span| span.start)
            .unwrap_or_else(|| tree.span(id).end.max(open.end));
        if open.end <= offset && offset <= close_end {
            match best {
                Some((_, best_open)) if best_open >= open.end => {}
                _ => best = Some((id, open.end)),
            }
        }
    }
    best
}

fn paren_token(
    tree: &SyntaxTree,
    call: NodeId,
    kind: TokenKind,
) -> Option<jinja_common::span::Span> {
    tree.children(call).iter().find_map(|&child| {
        tree.token(child)
            .filter(|token| token.kind == kind)
            .map(|token| token.span)
    })
}

/// Commas directly inside the call before the cursor.
fn commas_before(tree: &SyntaxTree, call: NodeId, open_end: u32, offset: u32) -> u32 {
    tree.children(call)
        .iter()
        .filter(|&&child| {
            tree.token(child)
                .map(|token| {
                    token.kind == TokenKind::Comma
                        && token.span.start >= open_end
                        && token.span.end <= offset
                })
                .unwrap_or(false)
        })
        .count() as u32
}

/// The name before `=` when the cursor sits in a keyword argument.
fn keyword_argument_at(tree: &SyntaxTree, call: NodeId, offset: u32) -> Option<String> {
    for argument in tree.slot_all(call, Slot::Argument) {
        if !matches!(tree.kind(argument), NodeKind::KeywordArgumentExpression) {
            continue;
        }
        let span = tree.span(argument);
        if span.start <= offset && offset <= span.end {
            let key = tree.slot(argument, Slot::Key)?;
            return tree.ident_value(key).map(str::to_string);
        }
    }
    None
}

/// Parameter labels in declaration order, `*args`/`**kwargs` included.
fn parameter_labels(signature: &Signature) -> Vec<String> {
    let mut labels: Vec<String> = signature
        .arguments
        .iter()
        .map(|arg| {
            let mut label = arg.name.clone();
            if let Some(ty) = arg.argument_type.as_ref().and_then(TypeOrRef::referred_name) {
                label.push_str(": ");
                label.push_str(ty);
            }
            if let Some(default) = &arg.default {
                label.push_str(" = ");
                label.push_str(default);
            }
            label
        })
        .collect();
    if let Some(varargs) = &signature.varargs_name {
        labels.push(format!("*{varargs}"));
    }
    if let Some(kwargs) = &signature.kwargs_name {
        labels.push(format!("**{kwargs}"));
    }
    labels
}
