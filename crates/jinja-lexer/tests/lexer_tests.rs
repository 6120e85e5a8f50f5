//! Lexer integration tests over whole templates.

use insta::assert_snapshot;
use jinja_common::token::TokenKind;
use jinja_lexer::{Lexer, LexerOptions};

/// Render a token stream as one line per token for snapshotting.
fn dump(source: &str) -> String {
    let (tokens, errors) = Lexer::tokenize(source, &LexerOptions::default());
    let mut out = String::new();
    for tok in &tokens {
        out.push_str(&format!(
            "{:?} {:?} {}..{}\n",
            tok.kind, tok.value, tok.span.start, tok.span.end
        ));
    }
    for err in &errors {
        out.push_str(&format!("error: {} {}..{}\n", err, err.span.start, err.span.end));
    }
    out
}

#[test]
fn macro_definition_token_stream() {
    assert_snapshot!(dump("{% macro example(x, y) %}hi{% endmacro %}"), @r#"
    OpenStatement "{%" 0..2
    Identifier "macro" 3..8
    Identifier "example" 9..16
    OpenParen "(" 16..17
    Identifier "x" 17..18
    Comma "," 18..19
    Identifier "y" 20..21
    CloseParen ")" 21..22
    CloseStatement "%}" 23..25
    Text "hi" 25..27
    OpenStatement "{%" 27..29
    Identifier "endmacro" 30..38
    CloseStatement "%}" 39..41
    "#);
}

#[test]
fn every_source_byte_is_covered_between_tokens() {
    // Tokens must tile the source in order: each token starts where
    // lexing after the previous one resumed, spans never overlap.
    let sources = [
        "{% macro example(x, y) %}hi{% endmacro %}",
        "a{{ b }}c{# d #}e",
        "{% if x == 1 %}{{ 'yes' }}{% else %}{{ \"no\" }}{% endif %}",
        "{{ [1, 2.5, -3] }}",
    ];
    for source in sources {
        let (tokens, errors) = Lexer::tokenize(source, &LexerOptions::default());
        assert!(errors.is_empty(), "{source}: {errors:?}");
        let mut prev_end = 0;
        for tok in &tokens {
            assert!(
                tok.span.start >= prev_end,
                "{source}: token {:?} overlaps previous",
                tok
            );
            prev_end = tok.span.end;
        }
        assert_eq!(prev_end, source.len() as u32, "{source}: trailing bytes unlexed");
    }
}

#[test]
fn no_errors_means_no_error_kind_tokens() {
    let sources = ["{{ x | upper }}", "{% for a in b %}{% endfor %}", "plain"];
    for source in sources {
        let (tokens, errors) = Lexer::tokenize(source, &LexerOptions::default());
        assert!(errors.is_empty());
        assert!(tokens.iter().all(|t| t.kind != TokenKind::Error));
    }
}

#[test]
fn comparison_and_power_operators() {
    let (tokens, _) = Lexer::tokenize("{{ a <= b ** 2 != c }}", &LexerOptions::default());
    let ops: Vec<(TokenKind, &str)> = tokens
        .iter()
        .filter(|t| {
            matches!(
                t.kind,
                TokenKind::ComparisonBinaryOperator | TokenKind::PowerBinaryOperator
            )
        })
        .map(|t| (t.kind, t.value.as_str()))
        .collect();
    assert_eq!(
        ops,
        vec![
            (TokenKind::ComparisonBinaryOperator, "<="),
            (TokenKind::PowerBinaryOperator, "**"),
            (TokenKind::ComparisonBinaryOperator, "!="),
        ]
    );
}

#[test]
fn tilde_is_additive_concat() {
    let (tokens, _) = Lexer::tokenize("{{ a ~ b }}", &LexerOptions::default());
    assert_eq!(tokens[2].kind, TokenKind::AdditiveBinaryOperator);
    assert_eq!(tokens[2].value, "~");
}

#[test]
fn float_and_int_literals() {
    let (tokens, _) = Lexer::tokenize("{{ 3.14 + 2 + 5. }}", &LexerOptions::default());
    let numbers: Vec<&str> = tokens
        .iter()
        .filter(|t| t.kind == TokenKind::NumericLiteral)
        .map(|t| t.value.as_str())
        .collect();
    // `5.` keeps the dot unconsumed: no digit follows it.
    assert_eq!(numbers, vec!["3.14", "2", "5"]);
}

#[test]
fn whitespace_control_plus_preserves() {
    let (tokens, _) = Lexer::tokenize("a  {%+ if x +%}  b", &LexerOptions::default());
    assert_eq!(tokens[0].value, "a  ");
    assert_eq!(tokens.last().unwrap().value, "  b");
}

#[test]
fn comment_value_is_inner_payload() {
    let (tokens, errors) =
        Lexer::tokenize("{# jinja-ls: globals g.json #}", &LexerOptions::default());
    assert!(errors.is_empty());
    assert_eq!(tokens[0].kind, TokenKind::Comment);
    assert_eq!(tokens[0].value, " jinja-ls: globals g.json ");
    assert_eq!(tokens[0].span.start, 0);
    assert_eq!(tokens[0].span.end, 30);
}

#[test]
fn markup_at_eof_stops_cleanly() {
    // Statement never closed: tokens up to EOF, no panic, no close token.
    let (tokens, _) = Lexer::tokenize("{% if x", &LexerOptions::default());
    assert_eq!(tokens[0].kind, TokenKind::OpenStatement);
    assert!(tokens.iter().all(|t| t.kind != TokenKind::CloseStatement));
}
