//! Quick fixes: insert the literal token a recovery diagnostic expected.

use std::collections::HashMap;

use tower_lsp::lsp_types::{
    CodeAction, CodeActionKind, CodeActionOrCommand, Diagnostic, Range, TextEdit, Url,
    WorkspaceEdit,
};

/// Offer an `Add <tok>` fix for every diagnostic that names a concrete
/// missing token (message `Expected '<tok>'`).
pub fn quick_fixes(
    uri: &Url,
    diagnostics: &[Diagnostic],
    range: Range,
) -> Vec<CodeActionOrCommand> {
    let mut actions = Vec::new();
    for diagnostic in diagnostics {
        let Some(token) = expected_token(&diagnostic.message) else {
            continue;
        };
        if !ranges_overlap(&diagnostic.range, &range) {
            continue;
        }
        let mut changes = HashMap::new();
        changes.insert(
            uri.clone(),
            vec![TextEdit {
                range: Range {
                    start: diagnostic.range.end,
                    end: diagnostic.range.end,
                },
                new_text: token.to_string(),
            }],
        );
        actions.push(CodeActionOrCommand::CodeAction(CodeAction {
            title: format!("Add {token}"),
            kind: Some(CodeActionKind::QUICKFIX),
            diagnostics: Some(vec![diagnostic.clone()]),
            edit: Some(WorkspaceEdit {
                changes: Some(changes),
                ..WorkspaceEdit::default()
            }),
            ..CodeAction::default()
        }));
    }
    actions
}

/// The quoted token of an `Expected '<tok>'` message.
fn expected_token(message: &str) -> Option<&str> {
    message
        .strip_prefix("Expected '")
        .and_then(|rest| rest.strip_suffix('\''))
}

fn ranges_overlap(a: &Range, b: &Range) -> bool {
    if b == &Range::default() {
        return true;
    }
    a.start <= b.end && b.start <= a.end
}
