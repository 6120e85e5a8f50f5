//! Parser integration tests: tree shapes, recovery behavior, and the
//! structural invariants every parse must uphold.

use insta::assert_snapshot;
use jinja_common::token::TokenKind;
use jinja_lexer::LexerOptions;
use jinja_parser::{debug_tree, parse_source, NodeId, NodeKind, Slot, SyntaxTree};

fn parse(source: &str) -> SyntaxTree {
    parse_source(source, &LexerOptions::default()).tree
}

/// The expression of the first `{{ ... }}` output in the program body.
fn first_output(tree: &SyntaxTree) -> NodeId {
    tree.slot(SyntaxTree::ROOT, Slot::Body)
        .expect("program has a body entry")
}

// ── Shapes ─────────────────────────────────────────────────────────────

#[test]
fn if_statement_shape() {
    assert_snapshot!(debug_tree(&parse("{% if x %}hi{% endif %}")), @r#"
    Program
      If
        OpenStatement "{%"
        Identifier "if"
        Identifier
          Identifier "x"
        CloseStatement "%}"
        Text "hi"
        OpenStatement "{%"
        Identifier "endif"
        CloseStatement "%}"
    "#);
}

#[test]
fn multiplication_binds_tighter_than_addition() {
    let tree = parse("{{ a + b * c }}");
    let expr = first_output(&tree);
    assert_eq!(*tree.kind(expr), NodeKind::BinaryExpression);
    let op = tree.slot(expr, Slot::Operator).unwrap();
    assert_eq!(tree.token(op).unwrap().value, "+");
    let right = tree.slot(expr, Slot::Right).unwrap();
    assert_eq!(*tree.kind(right), NodeKind::BinaryExpression);
    let inner_op = tree.slot(right, Slot::Operator).unwrap();
    assert_eq!(tree.token(inner_op).unwrap().value, "*");
}

#[test]
fn filter_binds_tighter_than_math() {
    // `2 * x | abs` is `2 * (x | abs)`.
    let tree = parse("{{ 2 * x | abs }}");
    let expr = first_output(&tree);
    assert_eq!(*tree.kind(expr), NodeKind::BinaryExpression);
    let right = tree.slot(expr, Slot::Right).unwrap();
    assert_eq!(*tree.kind(right), NodeKind::FilterExpression);
}

#[test]
fn ternary_and_select() {
    let tree = parse("{{ a if b else c }}");
    let expr = first_output(&tree);
    assert_eq!(*tree.kind(expr), NodeKind::Ternary);
    assert!(tree.slot(expr, Slot::Test).is_some());
    assert!(tree.slot(expr, Slot::Else).is_some());

    let tree = parse("{{ a if b }}");
    let expr = first_output(&tree);
    assert_eq!(*tree.kind(expr), NodeKind::SelectExpression);
}

#[test]
fn not_in_is_one_comparison() {
    let tree = parse("{{ a not in b }}");
    let expr = first_output(&tree);
    assert_eq!(*tree.kind(expr), NodeKind::BinaryExpression);
    let op = tree.slot(expr, Slot::Operator).unwrap();
    assert_eq!(tree.token(op).unwrap().value, "not");
    assert!(tree.recovery.is_empty());
}

#[test]
fn chained_filters_nest_leftward() {
    let tree = parse("{{ x | upper | join(',') }}");
    let expr = first_output(&tree);
    assert_eq!(*tree.kind(expr), NodeKind::FilterExpression);
    let inner = tree.slot(expr, Slot::Operand).unwrap();
    assert_eq!(*tree.kind(inner), NodeKind::FilterExpression);
    let outer_filter = tree.slot(expr, Slot::Filter).unwrap();
    assert_eq!(*tree.kind(outer_filter), NodeKind::CallExpression);
}

#[test]
fn test_expression_with_argument() {
    let tree = parse("{{ x is divisibleby(3) }}");
    let expr = first_output(&tree);
    assert_eq!(*tree.kind(expr), NodeKind::TestExpression);
    let test = tree.slot(expr, Slot::Test).unwrap();
    assert_eq!(*tree.kind(test), NodeKind::CallExpression);
}

#[test]
fn slice_subscript() {
    let tree = parse("{{ x[1:2:3] }}");
    let expr = first_output(&tree);
    assert_eq!(*tree.kind(expr), NodeKind::MemberExpression);
    let prop = tree.slot(expr, Slot::Property).unwrap();
    assert_eq!(*tree.kind(prop), NodeKind::SliceExpression);
    assert!(tree.slot(prop, Slot::Start).is_some());
    assert!(tree.slot(prop, Slot::Stop).is_some());
    assert!(tree.slot(prop, Slot::Step).is_some());
}

#[test]
fn group_collapses_tuple_stays() {
    let tree = parse("{{ (a) }}");
    let expr = first_output(&tree);
    assert_eq!(*tree.kind(expr), NodeKind::Identifier);

    let tree = parse("{{ (a, b) }}");
    let expr = first_output(&tree);
    assert_eq!(*tree.kind(expr), NodeKind::TupleLiteral);
    assert_eq!(tree.slot_all(expr, Slot::Item).len(), 2);
}

#[test]
fn object_literal_pairs() {
    let tree = parse("{{ {'a': 1, 'b': 2} }}");
    let expr = first_output(&tree);
    assert_eq!(*tree.kind(expr), NodeKind::ObjectLiteral);
    assert_eq!(tree.slot_all(expr, Slot::Key).len(), 2);
    assert_eq!(tree.slot_all(expr, Slot::EntryValue).len(), 2);
}

#[test]
fn macro_arguments() {
    let tree = parse("{% macro m(a, b=1, *args, **kwargs) %}{% endmacro %}");
    let node = tree.slot(SyntaxTree::ROOT, Slot::Body).unwrap();
    assert_eq!(*tree.kind(node), NodeKind::Macro);
    let args = tree.slot_all(node, Slot::Arg);
    assert_eq!(args.len(), 4);
    assert_eq!(*tree.kind(args[0]), NodeKind::Identifier);
    assert_eq!(*tree.kind(args[1]), NodeKind::KeywordArgumentExpression);
    assert_eq!(*tree.kind(args[2]), NodeKind::SpreadExpression);
    assert_eq!(*tree.kind(args[3]), NodeKind::SpreadExpression);
    assert!(tree.recovery.is_empty());
}

#[test]
fn for_loop_with_tuple_and_else() {
    let tree = parse("{% for k, v in items %}x{% else %}y{% endfor %}");
    let node = tree.slot(SyntaxTree::ROOT, Slot::Body).unwrap();
    assert_eq!(*tree.kind(node), NodeKind::For);
    let var = tree.slot(node, Slot::LoopVariable).unwrap();
    assert_eq!(*tree.kind(var), NodeKind::TupleLiteral);
    assert_eq!(tree.slot_all(node, Slot::Alternate).len(), 1);
    assert!(tree.recovery.is_empty());
}

#[test]
fn elif_nests_in_alternate() {
    let tree = parse("{% if a %}1{% elif b %}2{% else %}3{% endif %}");
    let outer = tree.slot(SyntaxTree::ROOT, Slot::Body).unwrap();
    assert_eq!(*tree.kind(outer), NodeKind::If);
    let alt = tree.slot(outer, Slot::Alternate).unwrap();
    assert_eq!(*tree.kind(alt), NodeKind::If);
    // The nested `If` owns the shared closer.
    assert!(tree.slot(alt, Slot::CloserIdentifier).is_some());
    assert!(tree.slot(outer, Slot::CloserIdentifier).is_none());
}

#[test]
fn raw_body_is_one_text_span() {
    let tree = parse("{% raw %}{{ x }}{% endraw %}");
    let node = tree.slot(SyntaxTree::ROOT, Slot::Body).unwrap();
    assert_eq!(*tree.kind(node), NodeKind::Raw);
    let body = tree.slot(node, Slot::Body).unwrap();
    let tok = tree.token(body).unwrap();
    assert_eq!(tok.kind, TokenKind::Text);
    assert_eq!(tok.value, "{{ x }}");
    assert!(tree.slot(node, Slot::CloserIdentifier).is_some());
}

#[test]
fn set_inline_and_block_forms() {
    let tree = parse("{% set x = 3 %}");
    let node = tree.slot(SyntaxTree::ROOT, Slot::Body).unwrap();
    assert_eq!(*tree.kind(node), NodeKind::SetStatement);
    assert!(tree.slot(node, Slot::Value).is_some());

    let tree = parse("{% set x %}body{% endset %}");
    let node = tree.slot(SyntaxTree::ROOT, Slot::Body).unwrap();
    assert!(tree.slot(node, Slot::Value).is_none());
    assert_eq!(tree.slot_all(node, Slot::Body).len(), 1);
    assert!(tree.slot(node, Slot::CloserIdentifier).is_some());
}

#[test]
fn from_import_names_and_aliases() {
    let tree = parse("{% from \"lib.jinja\" import example, other as alias %}");
    let node = tree.slot(SyntaxTree::ROOT, Slot::Body).unwrap();
    assert_eq!(*tree.kind(node), NodeKind::FromImport);
    let names = tree.slot_all(node, Slot::ImportName);
    assert_eq!(names.len(), 2);
    assert_eq!(tree.ident_value(names[0]), Some("example"));
    assert_eq!(tree.ident_value(names[1]), Some("other"));
    let aliases = tree.slot_all(node, Slot::ImportAlias);
    assert_eq!(aliases.len(), 1);
    assert_eq!(tree.ident_value(aliases[0]), Some("alias"));
    assert!(tree.recovery.is_empty());
}

// ── Recovery ───────────────────────────────────────────────────────────

#[test]
fn empty_if_test_recovers_with_bound_closer() {
    let tree = parse("{% if %}{% endif %}");
    assert_eq!(tree.recovery.len(), 1);
    match tree.kind(tree.recovery[0]) {
        NodeKind::Missing { expected, offset } => {
            assert_eq!(expected, "expression");
            assert_eq!(*offset, 6);
        }
        other => panic!("expected a missing node, got {other:?}"),
    }
    let node = tree.slot(SyntaxTree::ROOT, Slot::Body).unwrap();
    assert_eq!(*tree.kind(node), NodeKind::If);
    assert!(tree.slot_all(node, Slot::Body).is_empty());
    assert!(tree.slot_all(node, Slot::Alternate).is_empty());
    assert!(tree.slot(node, Slot::CloserOpenToken).is_some());
    assert!(tree.slot(node, Slot::CloserIdentifier).is_some());
    assert!(tree.slot(node, Slot::CloserCloseToken).is_some());
}

#[test]
fn unknown_statement_is_flagged_and_skipped() {
    let tree = parse("{% bogus x y %}after");
    let messages: Vec<String> = tree
        .recovery
        .iter()
        .filter_map(|&id| match tree.kind(id) {
            NodeKind::Unexpected { message, .. } => Some(message.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(messages, vec!["Unexpected statement 'bogus'".to_string()]);
    // Parsing resumes after the statement.
    let last = tree.slot_all(SyntaxTree::ROOT, Slot::Body);
    let text = last.last().and_then(|&id| tree.token(id)).unwrap();
    assert_eq!(text.value, "after");
}

#[test]
fn block_closer_name_mismatch() {
    let tree = parse("{% block a %}{% endblock b %}");
    let messages: Vec<&str> = tree
        .recovery
        .iter()
        .filter_map(|&id| match tree.kind(id) {
            NodeKind::Unexpected { message, .. } => Some(message.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(messages, vec!["Expected 'a', got 'b' instead"]);
}

#[test]
fn from_import_bad_entry_position() {
    let tree = parse("{% from \"x\" import a as b, \"\" as c %}");
    let missing: Vec<(String, u32)> = tree
        .recovery
        .iter()
        .filter_map(|&id| match tree.kind(id) {
            NodeKind::Missing { expected, offset } => Some((expected.clone(), *offset)),
            _ => None,
        })
        .collect();
    // The missing identifier is reported at the second item.
    assert_eq!(missing, vec![("identifier to import".to_string(), 27)]);
}

#[test]
fn missing_statement_name() {
    let tree = parse("{% %}");
    let expected: Vec<&str> = tree
        .recovery
        .iter()
        .filter_map(|&id| match tree.kind(id) {
            NodeKind::Missing { expected, .. } => Some(expected.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(expected, vec!["statement name"]);
}

#[test]
fn unclosed_statement_reports_whole_closer() {
    let tree = parse("{% if x %}body");
    let expected: Vec<&str> = tree
        .recovery
        .iter()
        .filter_map(|&id| match tree.kind(id) {
            NodeKind::Missing { expected, .. } => Some(expected.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(expected, vec!["'{% endif %}'"]);
}

// ── Invariants ─────────────────────────────────────────────────────────

const INVARIANT_SOURCES: &[&str] = &[
    "",
    "plain text only",
    "{% macro example(x, y) %}hi{% endmacro %}",
    "{% if %}{% endif %}",
    "{{ }}",
    "{{ a + }}",
    "{% for in %}{% endfor %}",
    "{% if a %}{% for b in c %}{{ d }}{% endfor %}",
    "{{ x | | }}",
    "{% block %}{% endblock %}",
    "{% set = 3 %}",
    "{{ ( }}",
    "{{ {1: } }}",
    "{% raw %}{% if {{ junk %}{% endraw %}",
    "{% from import as %}",
    "{{ x[::] }}",
    "{{ -1 ** 2 }}",
    "}} stray closers %} here",
];

#[test]
fn every_node_but_program_has_a_parent() {
    for source in INVARIANT_SOURCES {
        let tree = parse(source);
        for id in tree.ids() {
            if id == SyntaxTree::ROOT {
                assert!(tree.parent(id).is_none());
            } else {
                assert!(
                    tree.parent(id).is_some(),
                    "{source:?}: node {id:?} ({:?}) is orphaned",
                    tree.kind(id)
                );
            }
        }
    }
}

#[test]
fn missing_offsets_stay_in_bounds() {
    for source in INVARIANT_SOURCES {
        let tree = parse(source);
        for &id in &tree.recovery {
            if let NodeKind::Missing { offset, .. } = tree.kind(id) {
                assert!(
                    *offset as usize <= source.len(),
                    "{source:?}: offset {offset} out of bounds"
                );
            }
        }
    }
}

#[test]
fn flattened_tokens_are_in_source_order() {
    fn collect(tree: &SyntaxTree, id: NodeId, starts: &mut Vec<u32>) {
        if let NodeKind::Token(tok) = tree.kind(id) {
            starts.push(tok.span.start);
        }
        for &child in tree.children(id) {
            collect(tree, child, starts);
        }
    }
    for source in INVARIANT_SOURCES {
        let tree = parse(source);
        let mut starts = Vec::new();
        collect(&tree, SyntaxTree::ROOT, &mut starts);
        let mut sorted = starts.clone();
        sorted.sort_unstable();
        assert_eq!(starts, sorted, "{source:?}: tokens out of order");
    }
}

#[test]
fn parser_terminates_on_junk() {
    // A grab bag of hostile inputs; reaching the assertion at all is the
    // point, the tree just has to exist.
    let junk = [
        "{%{%{%{%",
        "{{{{{{{{",
        "{% if if if if %}",
        "{{ ((((( }}",
        "{% for for for %}{% endfor %}",
        "{# {# {#",
        "{{ a.b.c.d.e.f.g.h(1)(2)(3)[4][5] | f | g is h }}",
    ];
    for source in junk {
        let tree = parse(source);
        assert!(tree.len() >= 1);
    }
}
