//! Semantic tokens: classify every tree token and emit the sorted delta
//! encoding the transport requires.

use tower_lsp::lsp_types::{
    SemanticToken, SemanticTokenModifier, SemanticTokenType, SemanticTokensLegend,
};

use jinja_analysis::Document;
use jinja_common::token::TokenKind;
use jinja_parser::{NodeId, NodeKind, Slot, SyntaxTree};

/// Registered token types, in legend order.
pub fn token_types() -> Vec<SemanticTokenType> {
    vec![
        SemanticTokenType::FUNCTION,       // 0
        SemanticTokenType::PARAMETER,      // 1
        SemanticTokenType::METHOD,         // 2
        SemanticTokenType::MACRO,          // 3
        SemanticTokenType::COMMENT,        // 4
        SemanticTokenType::STRING,         // 5
        SemanticTokenType::NUMBER,         // 6
        SemanticTokenType::OPERATOR,       // 7
        SemanticTokenType::KEYWORD,        // 8
        SemanticTokenType::VARIABLE,       // 9
        SemanticTokenType::PROPERTY,       // 10
        SemanticTokenType::new("text"),    // 11
    ]
}

/// Registered token modifiers, in legend order.
pub fn token_modifiers() -> Vec<SemanticTokenModifier> {
    vec![
        SemanticTokenModifier::DEFINITION,      // bit 0
        SemanticTokenModifier::MODIFICATION,    // bit 1
        SemanticTokenModifier::DEFAULT_LIBRARY, // bit 2
        SemanticTokenModifier::READONLY,        // bit 3
    ]
}

pub fn legend() -> SemanticTokensLegend {
    SemanticTokensLegend {
        token_types: token_types(),
        token_modifiers: token_modifiers(),
    }
}

const FUNCTION: u32 = 0;
const COMMENT: u32 = 4;
const STRING: u32 = 5;
const NUMBER: u32 = 6;
const OPERATOR: u32 = 7;
const KEYWORD: u32 = 8;
const VARIABLE: u32 = 9;
const PROPERTY: u32 = 10;
const TEXT: u32 = 11;

const MOD_DEFINITION: u32 = 1 << 0;
const MOD_DEFAULT_LIBRARY: u32 = 1 << 2;

/// Produce the document's full semantic-token stream.
pub fn full(doc: &Document) -> Vec<SemanticToken> {
    let mut raw: Vec<(NodeId, u32, u32)> = Vec::new();
    collect(&doc.tree, SyntaxTree::ROOT, &mut raw);

    let mut result = Vec::new();
    let mut prev_line = 0u32;
    let mut prev_start = 0u32;
    for (token_id, token_type, modifiers) in raw {
        let Some(token) = doc.tree.token(token_id) else {
            continue;
        };
        let (line, character) = doc.line_index.position(token.span.start);
        let length = doc.line_index.utf16_len(token.span);
        if length == 0 {
            continue;
        }
        let delta_line = line - prev_line;
        let delta_start = if delta_line == 0 {
            character - prev_start
        } else {
            character
        };
        result.push(SemanticToken {
            delta_line,
            delta_start,
            length,
            token_type,
            token_modifiers_bitset: modifiers,
        });
        prev_line = line;
        prev_start = character;
    }
    result
}

/// Walk the tree in source order collecting `(token, type, modifiers)`.
fn collect(tree: &SyntaxTree, node: NodeId, out: &mut Vec<(NodeId, u32, u32)>) {
    for &child in tree.children(node) {
        match tree.kind(child) {
            NodeKind::Token(token) => {
                if let Some((token_type, modifiers)) = classify(tree, node, child, token.kind) {
                    out.push((child, token_type, modifiers));
                }
            }
            _ => collect(tree, child, out),
        }
    }
}

/// Classify one token leaf by its kind and tree context.
fn classify(
    tree: &SyntaxTree,
    parent: NodeId,
    token_id: NodeId,
    kind: TokenKind,
) -> Option<(u32, u32)> {
    match kind {
        TokenKind::Comment => Some((COMMENT, 0)),
        TokenKind::StringLiteral => Some((STRING, 0)),
        TokenKind::NumericLiteral => Some((NUMBER, 0)),
        TokenKind::AdditiveBinaryOperator
        | TokenKind::MultiplicativeBinaryOperator
        | TokenKind::PowerBinaryOperator
        | TokenKind::ComparisonBinaryOperator
        | TokenKind::UnaryOperator
        | TokenKind::Pipe
        | TokenKind::Equals => Some((OPERATOR, 0)),
        TokenKind::Text => {
            // Only a raw body's synthesized text is highlighted.
            matches!(tree.kind(parent), NodeKind::Raw).then_some((TEXT, 0))
        }
        TokenKind::Identifier => Some(classify_identifier(tree, parent, token_id)),
        _ => None,
    }
}

fn classify_identifier(tree: &SyntaxTree, parent: NodeId, token_id: NodeId) -> (u32, u32) {
    // Identifier tokens that are not part of an `Identifier` expression
    // are statement syntax: if/for/in/else/endif/and/or/is...
    if !matches!(tree.kind(parent), NodeKind::Identifier) {
        return (KEYWORD, MOD_DEFAULT_LIBRARY);
    }

    let ident_node = parent;
    let Some(owner) = tree.parent(ident_node) else {
        return (VARIABLE, 0);
    };
    let slot = slot_of(tree, owner, ident_node);

    match (tree.kind(owner), slot) {
        (NodeKind::Macro, Some(Slot::Name)) => (FUNCTION, MOD_DEFINITION),
        (NodeKind::Block, Some(Slot::Name | Slot::CloserName)) => (FUNCTION, MOD_DEFINITION),
        (NodeKind::CallExpression, Some(Slot::Callee)) => {
            // A callee in filter/test position is a library function.
            match tree.parent(owner).map(|g| (g, tree.kind(g))) {
                Some((grand, NodeKind::FilterExpression | NodeKind::TestExpression))
                    if slot_of(tree, grand, owner) == Some(Slot::Filter)
                        || slot_of(tree, grand, owner) == Some(Slot::Test) =>
                {
                    (FUNCTION, MOD_DEFAULT_LIBRARY)
                }
                _ => (FUNCTION, 0),
            }
        }
        (NodeKind::FilterExpression | NodeKind::FilterStatement, Some(Slot::Filter)) => {
            (FUNCTION, MOD_DEFAULT_LIBRARY)
        }
        (NodeKind::TestExpression, Some(Slot::Test)) => (FUNCTION, MOD_DEFAULT_LIBRARY),
        (NodeKind::MemberExpression, Some(Slot::Property)) => (PROPERTY, 0),
        _ => (VARIABLE, 0),
    }
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
    use jinja_analysis::host::{MemoryHost, Uri};
    use jinja_analysis::Workspace;

    fn tokens_of(source: &str) -> Vec<(String, u32, u32)> {
        let host = MemoryHost::new();
        let mut ws = Workspace::new();
        let uri = Uri::new("file:///t/main.jinja");
        ws.open_document(uri.clone(), source.to_string(), 1, &host);
        let doc = ws.document(&uri).unwrap();

        // Decode the delta encoding back into (text, type, modifiers).
        let mut out = Vec::new();
        let mut line = 0u32;
        let mut character = 0u32;
        for token in full(doc) {
            line += token.delta_line;
            if token.delta_line > 0 {
                character = token.delta_start;
            } else {
                character += token.delta_start;
            }
            let offset = doc.line_index.offset(line, character);
            let text: String = source[offset..]
                .chars()
                .take(token.length as usize)
                .collect();
            out.push((text, token.token_type, token.token_modifiers_bitset));
        }
        out
    }

    #[test]
    fn macro_definition_classification() {
        let tokens = tokens_of("{% macro example(x, y) %}hi{% endmacro %}");
        let find = |needle: &str| {
            tokens
                .iter()
                .find(|(text, _, _)| text == needle)
                .unwrap_or_else(|| panic!("token {needle} missing"))
        };
        // Keywords carry the default-library modifier.
        assert_eq!(find("macro").1, KEYWORD);
        assert_ne!(find("macro").2 & MOD_DEFAULT_LIBRARY, 0);
        assert_eq!(find("endmacro").1, KEYWORD);
        // The macro name is a function, its params variables.
        assert_eq!(find("example").1, FUNCTION);
        assert_eq!(find("x").1, VARIABLE);
        assert_eq!(find("y").1, VARIABLE);
    }

    #[test]
    fn literals_operators_and_filters() {
        let tokens = tokens_of("{{ 1 + name | upper }}");
        let find = |needle: &str| tokens.iter().find(|(t, _, _)| t == needle).unwrap();
        assert_eq!(find("1").1, NUMBER);
        assert_eq!(find("+").1, OPERATOR);
        assert_eq!(find("name").1, VARIABLE);
        assert_eq!(find("|").1, OPERATOR);
        assert_eq!(find("upper").1, FUNCTION);
        assert_ne!(find("upper").2 & MOD_DEFAULT_LIBRARY, 0);
    }

    #[test]
    fn property_access_and_comments() {
        let tokens = tokens_of("{# note #}{{ user.name }}");
        let comment = &tokens[0];
        assert_eq!(comment.1, COMMENT);
        let find = |needle: &str| tokens.iter().find(|(t, _, _)| t == needle).unwrap();
        assert_eq!(find("user").1, VARIABLE);
        assert_eq!(find("name").1, PROPERTY);
    }

    #[test]
    fn deltas_are_monotonic() {
        let source = "{% if a %}\n{{ b }}\n{% endif %}";
        let host = MemoryHost::new();
        let mut ws = Workspace::new();
        let uri = Uri::new("file:///t/main.jinja");
        ws.open_document(uri.clone(), source.to_string(), 1, &host);
        let doc = ws.document(&uri).unwrap();
        for token in full(doc) {
            if token.delta_line == 0 {
                // Same line: starts must move right (or stay, never back).
                // delta_start is unsigned so this is structural; check
                // lengths are non-zero instead.
                assert!(token.length > 0);
            }
        }
    }
}
