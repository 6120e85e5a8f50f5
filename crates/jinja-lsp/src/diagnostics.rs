//! Diagnostics: lexer errors, parser recovery points, and unresolved
//! imports, converted to LSP diagnostics.

use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity};

use jinja_analysis::workspace::import_views;
use jinja_analysis::Document;
use jinja_common::span::Span;
use jinja_parser::NodeKind;

use crate::convert;

const SOURCE: &str = "jinja-ls";

/// All diagnostics for one document.
pub fn collect(doc: &Document) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    for error in &doc.lex_errors {
        diagnostics.push(error_diagnostic(
            doc,
            error.span,
            error.to_string(),
            DiagnosticSeverity::ERROR,
        ));
    }

    for &node in &doc.tree.recovery {
        match doc.tree.kind(node) {
            NodeKind::Missing { expected, offset } => {
                diagnostics.push(error_diagnostic(
                    doc,
                    Span::empty(*offset),
                    format!("Expected {expected}"),
                    DiagnosticSeverity::ERROR,
                ));
            }
            NodeKind::Unexpected { token, message } => {
                diagnostics.push(error_diagnostic(
                    doc,
                    token.span,
                    message.clone(),
                    DiagnosticSeverity::ERROR,
                ));
            }
            _ => {}
        }
    }

    for import in import_views(doc) {
        if import.target.is_none() {
            let span = doc.tree.span(import.literal);
            diagnostics.push(error_diagnostic(
                doc,
                span,
                format!(
                    "Couldn't find '{}', maybe add to Jinja LS import URIs?",
                    import.source
                ),
                DiagnosticSeverity::WARNING,
            ));
        }
    }

    diagnostics
}

fn error_diagnostic(
    doc: &Document,
    span: Span,
    message: String,
    severity: DiagnosticSeverity,
) -> Diagnostic {
    Diagnostic {
        range: convert::range(&doc.line_index, span),
        severity: Some(severity),
        source: Some(SOURCE.to_string()),
        message,
        ..Diagnostic::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jinja_analysis::host::{MemoryHost, Uri};
    use jinja_analysis::Workspace;

    fn diagnostics_for(source: &str) -> Vec<Diagnostic> {
        let host = MemoryHost::new();
        let mut ws = Workspace::new();
        let uri = Uri::new("file:///t/main.jinja");
        ws.open_document(uri.clone(), source.to_string(), 1, &host);
        collect(ws.document(&uri).unwrap())
    }

    #[test]
    fn clean_document_has_no_diagnostics() {
        assert!(diagnostics_for("{% if x %}hi{% endif %}").is_empty());
    }

    #[test]
    fn missing_expression_diagnostic() {
        let diagnostics = diagnostics_for("{% if %}{% endif %}");
        assert_eq!(diagnostics.len(), 1);
        let diagnostic = &diagnostics[0];
        assert_eq!(diagnostic.message, "Expected expression");
        assert_eq!(diagnostic.severity, Some(DiagnosticSeverity::ERROR));
        // Zero-width range at byte 6.
        assert_eq!(diagnostic.range.start, diagnostic.range.end);
        assert_eq!(diagnostic.range.start.character, 6);
    }

    #[test]
    fn unresolved_import_warnings() {
        let diagnostics = diagnostics_for("{% include \"\" %}{% include \"somewhere/\" %}");
        let messages: Vec<&str> = diagnostics.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Couldn't find '', maybe add to Jinja LS import URIs?",
                "Couldn't find 'somewhere/', maybe add to Jinja LS import URIs?",
            ]
        );
        assert!(diagnostics
            .iter()
            .all(|d| d.severity == Some(DiagnosticSeverity::WARNING)));
    }

    #[test]
    fn lexer_error_diagnostic() {
        let diagnostics = diagnostics_for("{# never closed");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].message, "Missing end of comment tag");
    }
}
