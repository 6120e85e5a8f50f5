//! Statement parsing: the `{% ... %}` forms, `{{ ... }}` outputs, text,
//! and comments, dispatched by the keyword following `{%`.

use jinja_common::token::{Token, TokenKind};

use crate::tree::{NodeId, NodeKind, Slot};

use super::expressions;
use super::Parser;

/// Parse body members into `parent` under `slot` until one of the
/// terminator keywords opens (`{% endif %}` etc.), which is left for the
/// caller to consume. Returns the terminator seen, or `None` at end of
/// input.
pub(crate) fn parse_body(
    p: &mut Parser,
    parent: NodeId,
    terminators: &[&str],
    slot: Slot,
) -> Option<String> {
    loop {
        let kind = p.current_kind()?;
        match kind {
            TokenKind::Text => {
                p.advance_into(parent, Some(slot));
            }
            TokenKind::Comment => {
                let node = p.tree.push(NodeKind::Comment);
                p.tree.add_child(parent, node, Some(slot));
                p.advance_into(node, None);
            }
            TokenKind::OpenExpression => parse_output(p, parent, slot),
            TokenKind::OpenStatement => {
                if let Some(name) = p.peek(1).filter(|t| t.kind == TokenKind::Identifier) {
                    if terminators.contains(&name.value.as_str()) {
                        return Some(name.value.clone());
                    }
                }
                parse_statement(p, parent, slot);
            }
            _ => {
                let message = format!(
                    "Unexpected token '{}'",
                    p.current_value().unwrap_or_default()
                );
                if p.unexpected_here(parent, message).is_none() {
                    return None;
                }
            }
        }
    }
}

/// `{{ expr }}`: the delimiters sit beside the expression in the body.
fn parse_output(p: &mut Parser, parent: NodeId, slot: Slot) {
    p.advance_into(parent, None); // {{
    let expr = expressions::parse_expression(p);
    p.tree.add_child(parent, expr, Some(slot));
    p.expect(parent, TokenKind::CloseExpression, None, "'}}'");
}

/// Dispatch a `{%`-opened statement by its keyword.
pub(crate) fn parse_statement(p: &mut Parser, parent: NodeId, slot: Slot) {
    let name = p
        .peek(1)
        .filter(|t| t.kind == TokenKind::Identifier)
        .cloned();
    let Some(name_tok) = name else {
        // `{%` with no statement name at all.
        p.advance_into(parent, None); // {%
        let expected = if p.at_end() { "statement" } else { "statement name" };
        p.missing(parent, expected, None);
        p.eat_until(parent, TokenKind::CloseStatement);
        return;
    };

    let keyword = name_tok.value.clone();
    match keyword.as_str() {
        "if" => parse_if(p, parent, slot),
        "for" => parse_for(p, parent, slot),
        "macro" => parse_macro(p, parent, slot),
        "block" => parse_block(p, parent, slot),
        "set" => parse_set(p, parent, slot),
        "call" => parse_call_statement(p, parent, slot),
        "filter" => parse_filter_statement(p, parent, slot),
        "raw" => parse_raw(p, parent, slot),
        "include" => parse_include(p, parent, slot),
        "import" => parse_import(p, parent, slot),
        "from" => parse_from_import(p, parent, slot),
        "extends" => parse_extends(p, parent, slot),
        "break" => parse_leaf_statement(p, parent, slot, NodeKind::Break),
        "continue" => parse_leaf_statement(p, parent, slot, NodeKind::Continue),
        _ => parse_unknown_statement(p, parent, slot, name_tok),
    }
}

/// Create a statement node under `parent` and consume `{% keyword`.
fn begin_statement(p: &mut Parser, parent: NodeId, slot: Slot, kind: NodeKind) -> NodeId {
    let node = p.tree.push(kind);
    p.tree.add_child(parent, node, Some(slot));
    p.advance_into(node, Some(Slot::OpenToken)); // {%
    p.advance_into(node, Some(Slot::Keyword)); // keyword
    node
}

fn parse_unknown_statement(p: &mut Parser, parent: NodeId, slot: Slot, name_tok: Token) {
    let message = format!("Unexpected statement '{}'", name_tok.value);
    let node = p.tree.push(NodeKind::Unexpected {
        token: name_tok,
        message,
    });
    p.tree.add_child(parent, node, Some(slot));
    p.advance_into(node, None); // {%
    p.advance_into(node, None); // the unknown keyword
    p.eat_until(node, TokenKind::CloseStatement);
}

fn parse_leaf_statement(p: &mut Parser, parent: NodeId, slot: Slot, kind: NodeKind) {
    let node = begin_statement(p, parent, slot, kind);
    p.expect(node, TokenKind::CloseStatement, Some(Slot::CloseToken), "'%}'");
}

// ── Control flow ───────────────────────────────────────────────────────

fn parse_if(p: &mut Parser, parent: NodeId, slot: Slot) {
    let node = begin_statement(p, parent, slot, NodeKind::If);
    let test = expressions::parse_expression(p);
    p.tree.add_child(node, test, Some(Slot::Test));
    p.expect(node, TokenKind::CloseStatement, Some(Slot::CloseToken), "'%}'");

    match parse_body(p, node, &["endif", "elif", "else"], Slot::Body).as_deref() {
        Some("elif") => {
            // `elif` recurses as a nested `If` in the alternate; the
            // nested statement owns the shared `endif`.
            parse_if(p, node, Slot::Alternate);
        }
        Some("else") => {
            p.advance_into(node, None); // {%
            p.advance_into(node, None); // else
            p.expect(node, TokenKind::CloseStatement, None, "'%}'");
            parse_body(p, node, &["endif"], Slot::Alternate);
            p.expect_closer_statement(node, "endif");
        }
        _ => p.expect_closer_statement(node, "endif"),
    }
}

fn parse_for(p: &mut Parser, parent: NodeId, slot: Slot) {
    let node = begin_statement(p, parent, slot, NodeKind::For);
    parse_loop_variable(p, node);
    p.expect_identifier(node, "in", None, "'in' keyword following loop variable");
    let iterable = expressions::parse_expression(p);
    p.tree.add_child(node, iterable, Some(Slot::Iterable));
    if p.at_ident("if") {
        p.advance_into(node, None);
        let condition = expressions::parse_expression(p);
        p.tree.add_child(node, condition, Some(Slot::Condition));
    }
    if p.at_ident("recursive") {
        p.advance_into(node, None);
    }
    p.expect(node, TokenKind::CloseStatement, Some(Slot::CloseToken), "'%}'");

    if let Some("else") = parse_body(p, node, &["endfor", "else"], Slot::Body).as_deref() {
        p.advance_into(node, None); // {%
        p.advance_into(node, None); // else
        p.expect(node, TokenKind::CloseStatement, None, "'%}'");
        parse_body(p, node, &["endfor"], Slot::Alternate);
    }
    p.expect_closer_statement(node, "endfor");
}

/// The loop variable: an identifier, or a comma-separated tuple of them.
fn parse_loop_variable(p: &mut Parser, node: NodeId) {
    if !p.at(TokenKind::Identifier) || p.at_ident("in") {
        p.missing(
            node,
            "identifier/tuple for the loop variable",
            Some(Slot::LoopVariable),
        );
        return;
    }
    let first = expressions::make_identifier(p);
    if !p.at(TokenKind::Comma) {
        p.tree.add_child(node, first, Some(Slot::LoopVariable));
        return;
    }
    let tuple = p.tree.push(NodeKind::TupleLiteral);
    p.tree.add_child(tuple, first, Some(Slot::Item));
    while p.at(TokenKind::Comma) {
        p.advance_into(tuple, None);
        if p.at(TokenKind::Identifier) && !p.at_ident("in") {
            let item = expressions::make_identifier(p);
            p.tree.add_child(tuple, item, Some(Slot::Item));
        } else {
            break;
        }
    }
    p.tree.add_child(node, tuple, Some(Slot::LoopVariable));
}

// ── Definitions ────────────────────────────────────────────────────────

fn parse_macro(p: &mut Parser, parent: NodeId, slot: Slot) {
    let node = begin_statement(p, parent, slot, NodeKind::Macro);
    if p.at(TokenKind::Identifier) {
        let name = expressions::make_identifier(p);
        p.tree.add_child(node, name, Some(Slot::Name));
    } else {
        p.missing(node, "macro name", Some(Slot::Name));
    }
    p.expect(node, TokenKind::OpenParen, None, "'('");
    loop {
        if p.at(TokenKind::CloseParen) || p.at_expression_end() {
            break;
        }
        parse_macro_arg(p, node);
        if p.at(TokenKind::Comma) {
            p.advance_into(node, None);
        } else {
            break;
        }
    }
    p.expect(node, TokenKind::CloseParen, None, "')'");
    p.expect(node, TokenKind::CloseStatement, Some(Slot::CloseToken), "'%}'");
    parse_body(p, node, &["endmacro"], Slot::Body);
    p.expect_closer_statement(node, "endmacro");
}

/// One macro argument: `name`, `name=default`, `*args`, or `**kwargs`.
fn parse_macro_arg(p: &mut Parser, node: NodeId) {
    let is_star = (p.at(TokenKind::MultiplicativeBinaryOperator)
        && p.current_value() == Some("*"))
        || p.at(TokenKind::PowerBinaryOperator);
    if is_star {
        let spread = p.tree.push(NodeKind::SpreadExpression);
        p.advance_into(spread, Some(Slot::Operator));
        if p.at(TokenKind::Identifier) {
            let name = expressions::make_identifier(p);
            p.tree.add_child(spread, name, Some(Slot::Operand));
        } else {
            p.missing(spread, "identifier", Some(Slot::Operand));
        }
        p.tree.add_child(node, spread, Some(Slot::Arg));
        return;
    }

    if p.at(TokenKind::Identifier) {
        let name = expressions::make_identifier(p);
        if p.at(TokenKind::Equals) {
            let kwarg = p.tree.push(NodeKind::KeywordArgumentExpression);
            p.tree.add_child(kwarg, name, Some(Slot::Key));
            p.advance_into(kwarg, None); // =
            let default = expressions::parse_expression(p);
            p.tree.add_child(kwarg, default, Some(Slot::Value));
            p.tree.add_child(node, kwarg, Some(Slot::Arg));
        } else {
            p.tree.add_child(node, name, Some(Slot::Arg));
        }
    } else {
        p.missing(node, "identifier", Some(Slot::Arg));
    }
}

fn parse_block(p: &mut Parser, parent: NodeId, slot: Slot) {
    let node = begin_statement(p, parent, slot, NodeKind::Block);
    if p.at(TokenKind::Identifier) {
        let name = expressions::make_identifier(p);
        p.tree.add_child(node, name, Some(Slot::Name));
    } else {
        p.missing(node, "identifier", Some(Slot::Name));
    }
    loop {
        if p.at_ident("scoped") {
            p.advance_into(node, Some(Slot::Scoped));
        } else if p.at_ident("required") {
            p.advance_into(node, Some(Slot::Required));
        } else {
            break;
        }
    }
    p.expect(node, TokenKind::CloseStatement, Some(Slot::CloseToken), "'%}'");
    parse_body(p, node, &["endblock"], Slot::Body);

    // The closer may repeat the block name; a different name is flagged.
    if p.at(TokenKind::OpenStatement) && p.peek_ident_is(1, "endblock") {
        p.advance_into(node, Some(Slot::CloserOpenToken));
        p.advance_into(node, Some(Slot::CloserIdentifier));
        if p.at(TokenKind::Identifier) {
            let declared = p
                .tree
                .slot(node, Slot::Name)
                .and_then(|n| p.tree.ident_value(n))
                .map(str::to_owned);
            let got = p.current_value().unwrap_or_default().to_owned();
            match declared {
                Some(declared) if declared != got => {
                    let message = format!("Expected '{declared}', got '{got}' instead");
                    let _ = p.unexpected_here(node, message);
                }
                _ => {
                    p.advance_into(node, Some(Slot::CloserName));
                }
            }
        }
        p.expect(
            node,
            TokenKind::CloseStatement,
            Some(Slot::CloserCloseToken),
            "'%}'",
        );
    } else {
        p.missing(node, "'{% endblock %}'", None);
    }
}

// ── Assignment and wrapping statements ─────────────────────────────────

fn parse_set(p: &mut Parser, parent: NodeId, slot: Slot) {
    let node = begin_statement(p, parent, slot, NodeKind::SetStatement);
    let assignee = parse_assignment_target(p);
    p.tree.add_child(node, assignee, Some(Slot::Assignee));
    if p.at(TokenKind::Equals) {
        p.advance_into(node, None); // =
        let value = expressions::parse_expression(p);
        p.tree.add_child(node, value, Some(Slot::Value));
        p.expect(node, TokenKind::CloseStatement, Some(Slot::CloseToken), "'%}'");
    } else {
        p.expect(node, TokenKind::CloseStatement, Some(Slot::CloseToken), "'%}'");
        parse_body(p, node, &["endset"], Slot::Body);
        p.expect_closer_statement(node, "endset");
    }
}

/// The target of a `set`: an identifier, attribute path, or bare tuple.
fn parse_assignment_target(p: &mut Parser) -> NodeId {
    let first = expressions::parse_postfix(p);
    if !p.at(TokenKind::Comma) {
        return first;
    }
    let tuple = p.tree.push(NodeKind::TupleLiteral);
    p.tree.add_child(tuple, first, Some(Slot::Item));
    while p.at(TokenKind::Comma) {
        p.advance_into(tuple, None);
        if p.at(TokenKind::Equals) || p.at_expression_end() {
            break;
        }
        let item = expressions::parse_postfix(p);
        p.tree.add_child(tuple, item, Some(Slot::Item));
    }
    tuple
}

fn parse_call_statement(p: &mut Parser, parent: NodeId, slot: Slot) {
    let node = begin_statement(p, parent, slot, NodeKind::CallStatement);
    if p.at(TokenKind::OpenParen) {
        p.advance_into(node, None); // (
        loop {
            if p.at(TokenKind::CloseParen) || p.at_expression_end() {
                break;
            }
            let arg = expressions::parse_expression(p);
            p.tree.add_child(node, arg, Some(Slot::CallerArg));
            if p.at(TokenKind::Comma) {
                p.advance_into(node, None);
            } else {
                break;
            }
        }
        p.expect(node, TokenKind::CloseParen, None, "')'");
    }
    let call = expressions::parse_postfix(p);
    p.tree.add_child(node, call, Some(Slot::Call));
    p.expect(node, TokenKind::CloseStatement, Some(Slot::CloseToken), "'%}'");
    parse_body(p, node, &["endcall"], Slot::Body);
    p.expect_closer_statement(node, "endcall");
}

fn parse_filter_statement(p: &mut Parser, parent: NodeId, slot: Slot) {
    let node = begin_statement(p, parent, slot, NodeKind::FilterStatement);
    if p.at(TokenKind::Identifier) {
        let name = expressions::make_identifier(p);
        let filter = if p.at(TokenKind::OpenParen) {
            expressions::wrap_call(p, name)
        } else {
            name
        };
        p.tree.add_child(node, filter, Some(Slot::Filter));
    } else {
        p.missing(node, "identifier for the filter", Some(Slot::Filter));
    }
    p.expect(node, TokenKind::CloseStatement, Some(Slot::CloseToken), "'%}'");
    parse_body(p, node, &["endfilter"], Slot::Body);
    p.expect_closer_statement(node, "endfilter");
}

fn parse_raw(p: &mut Parser, parent: NodeId, slot: Slot) {
    let node = begin_statement(p, parent, slot, NodeKind::Raw);
    p.expect(node, TokenKind::CloseStatement, Some(Slot::CloseToken), "'%}'");

    // The body is opaque: everything up to `{% endraw %}` collapses into
    // one text span, whatever the lexer made of it.
    let mut first: Option<u32> = None;
    let mut last: Option<u32> = None;
    loop {
        let Some(tok) = p.current() else { break };
        if tok.kind == TokenKind::OpenStatement && p.peek_ident_is(1, "endraw") {
            break;
        }
        let span = tok.span;
        first.get_or_insert(span.start);
        last = Some(span.end);
        p.skip_token();
    }
    if let (Some(start), Some(end)) = (first, last) {
        let value = p.source_slice(start, end).to_string();
        let body = p.tree.push(NodeKind::Token(Token::new(
            TokenKind::Text,
            value,
            start,
            end,
        )));
        p.tree.add_child(node, body, Some(Slot::Body));
    }
    p.expect_closer_statement(node, "endraw");
}

// ── Imports ────────────────────────────────────────────────────────────

fn parse_include(p: &mut Parser, parent: NodeId, slot: Slot) {
    let node = begin_statement(p, parent, slot, NodeKind::Include);
    let source = expressions::parse_primary(p);
    p.tree.add_child(node, source, Some(Slot::Source));
    if p.at_ident("ignore") && p.peek_ident_is(1, "missing") {
        p.advance_into(node, None);
        p.advance_into(node, None);
    }
    parse_context_modifier(p, node);
    p.expect(node, TokenKind::CloseStatement, Some(Slot::CloseToken), "'%}'");
}

fn parse_import(p: &mut Parser, parent: NodeId, slot: Slot) {
    let node = begin_statement(p, parent, slot, NodeKind::Import);
    let source = expressions::parse_primary(p);
    p.tree.add_child(node, source, Some(Slot::Source));
    p.expect_identifier(node, "as", Some(Slot::AsToken), "'as'");
    if p.at(TokenKind::Identifier) {
        let name = expressions::make_identifier(p);
        p.tree.add_child(node, name, Some(Slot::Name));
    } else {
        p.missing(node, "identifier", Some(Slot::Name));
    }
    parse_context_modifier(p, node);
    p.expect(node, TokenKind::CloseStatement, Some(Slot::CloseToken), "'%}'");
}

fn parse_from_import(p: &mut Parser, parent: NodeId, slot: Slot) {
    let node = begin_statement(p, parent, slot, NodeKind::FromImport);
    let source = expressions::parse_primary(p);
    p.tree.add_child(node, source, Some(Slot::Source));
    p.expect_identifier(node, "import", None, "'import'");

    loop {
        if p.at(TokenKind::Identifier) && !p.at_ident("with") && !p.at_ident("without") {
            let name = expressions::make_identifier(p);
            p.tree.add_child(node, name, Some(Slot::ImportName));
        } else {
            p.missing(node, "identifier to import", None);
            // Keep the offending token in the tree and move on.
            if !p.at(TokenKind::Comma) && !p.at_expression_end() {
                p.advance_into(node, None);
            }
        }
        if p.at_ident("as") {
            p.advance_into(node, None);
            if p.at(TokenKind::Identifier) {
                let alias = expressions::make_identifier(p);
                p.tree.add_child(node, alias, Some(Slot::ImportAlias));
            } else {
                p.missing(node, "identifier for imported name", None);
            }
        }
        if p.at(TokenKind::Comma) {
            p.advance_into(node, None);
        } else {
            break;
        }
    }

    parse_context_modifier(p, node);
    p.expect(node, TokenKind::CloseStatement, Some(Slot::CloseToken), "'%}'");
}

fn parse_extends(p: &mut Parser, parent: NodeId, slot: Slot) {
    let node = begin_statement(p, parent, slot, NodeKind::Extends);
    let source = expressions::parse_primary(p);
    p.tree.add_child(node, source, Some(Slot::Source));
    p.expect(node, TokenKind::CloseStatement, Some(Slot::CloseToken), "'%}'");
}

/// Optional `with context` / `without context` trailer.
fn parse_context_modifier(p: &mut Parser, node: NodeId) {
    if (p.at_ident("with") || p.at_ident("without")) && p.peek_ident_is(1, "context") {
        p.advance_into(node, Some(Slot::Context));
        p.advance_into(node, None);
    }
}
