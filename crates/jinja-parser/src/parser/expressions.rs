//! Expression parsing: a precedence cascade from ternaries down to
//! primaries, with postfix call/member/subscript handling.
//!
//! Every function builds detached nodes and returns the root; the caller
//! attaches it with the slot it belongs to. Token leaves always end up in
//! the tree, so child lists stay source-ordered even when a wrapper node
//! is created after its first operand (the tree inserts by span).

use jinja_common::token::TokenKind;

use crate::tree::{NodeId, NodeKind, Slot};

use super::{ExprMissingGuard, Parser};

/// Parse one expression at the lowest precedence level.
pub(crate) fn parse_expression(p: &mut Parser) -> NodeId {
    parse_ternary(p)
}

/// `A if B else C` (right-associative) and the else-less `A if B` select.
fn parse_ternary(p: &mut Parser) -> NodeId {
    let operand = parse_or(p);
    if !p.at_ident("if") {
        return operand;
    }
    let if_tok = p.take_token();
    let test = parse_or(p);
    if p.at_ident("else") {
        let else_tok = p.take_token();
        let alternate = parse_ternary(p);
        let node = p.tree.push(NodeKind::Ternary);
        p.tree.add_child(node, operand, Some(Slot::Operand));
        p.tree.add_child(node, if_tok, None);
        p.tree.add_child(node, test, Some(Slot::Test));
        p.tree.add_child(node, else_tok, None);
        p.tree.add_child(node, alternate, Some(Slot::Else));
        node
    } else {
        let node = p.tree.push(NodeKind::SelectExpression);
        p.tree.add_child(node, operand, Some(Slot::Operand));
        p.tree.add_child(node, if_tok, None);
        p.tree.add_child(node, test, Some(Slot::Test));
        node
    }
}

fn make_binary(p: &mut Parser, left: NodeId, op: NodeId, right: NodeId) -> NodeId {
    let node = p.tree.push(NodeKind::BinaryExpression);
    p.tree.add_child(node, left, Some(Slot::Left));
    p.tree.add_child(node, op, Some(Slot::Operator));
    p.tree.add_child(node, right, Some(Slot::Right));
    node
}

fn parse_or(p: &mut Parser) -> NodeId {
    let mut left = parse_and(p);
    while p.at_ident("or") {
        let op = p.take_token();
        let right = parse_and(p);
        left = make_binary(p, left, op, right);
    }
    left
}

fn parse_and(p: &mut Parser) -> NodeId {
    let mut left = parse_not(p);
    while p.at_ident("and") {
        let op = p.take_token();
        let right = parse_not(p);
        left = make_binary(p, left, op, right);
    }
    left
}

/// Unary `not`, right-associative and chainable.
fn parse_not(p: &mut Parser) -> NodeId {
    if p.at_ident("not") {
        let op = p.take_token();
        let operand = parse_not(p);
        let node = p.tree.push(NodeKind::UnaryExpression);
        p.tree.add_child(node, op, Some(Slot::Operator));
        p.tree.add_child(node, operand, Some(Slot::Operand));
        node
    } else {
        parse_comparison(p)
    }
}

/// Comparison and membership: `< > <= >= == != in, not in`, all at one
/// level, left-associative.
fn parse_comparison(p: &mut Parser) -> NodeId {
    let mut left = parse_additive(p);
    loop {
        if p.at(TokenKind::ComparisonBinaryOperator) || p.at_ident("in") {
            let op = p.take_token();
            let right = parse_additive(p);
            left = make_binary(p, left, op, right);
        } else if p.at_ident("not") && p.peek_ident_is(1, "in") {
            let op = p.take_token();
            let in_tok = p.take_token();
            let right = parse_additive(p);
            let node = make_binary(p, left, op, right);
            p.tree.add_child(node, in_tok, None);
            left = node;
        } else {
            break;
        }
    }
    left
}

fn parse_additive(p: &mut Parser) -> NodeId {
    let mut left = parse_multiplicative(p);
    while p.at(TokenKind::AdditiveBinaryOperator) {
        let op = p.take_token();
        let right = parse_multiplicative(p);
        left = make_binary(p, left, op, right);
    }
    left
}

fn parse_multiplicative(p: &mut Parser) -> NodeId {
    let mut left = parse_power(p);
    while p.at(TokenKind::MultiplicativeBinaryOperator) {
        let op = p.take_token();
        let right = parse_power(p);
        left = make_binary(p, left, op, right);
    }
    left
}

fn parse_power(p: &mut Parser) -> NodeId {
    let mut left = parse_test(p);
    while p.at(TokenKind::PowerBinaryOperator) {
        let op = p.take_token();
        let right = parse_test(p);
        left = make_binary(p, left, op, right);
    }
    left
}

/// `x is [not] name[(args)]`.
fn parse_test(p: &mut Parser) -> NodeId {
    let mut left = parse_filter(p);
    while p.at_ident("is") {
        let is_tok = p.take_token();
        let not_tok = if p.at_ident("not") {
            Some(p.take_token())
        } else {
            None
        };
        let test = if p.at(TokenKind::Identifier) {
            let name = make_identifier(p);
            if p.at(TokenKind::OpenParen) {
                wrap_call(p, name)
            } else {
                name
            }
        } else {
            p.missing_detached("identifier for the test")
        };
        let node = p.tree.push(NodeKind::TestExpression);
        p.tree.add_child(node, left, Some(Slot::Operand));
        p.tree.add_child(node, is_tok, None);
        if let Some(not_tok) = not_tok {
            p.tree.add_child(node, not_tok, None);
        }
        p.tree.add_child(node, test, Some(Slot::Test));
        left = node;
    }
    left
}

/// `x | name` or `x | name(args)`, chainable.
fn parse_filter(p: &mut Parser) -> NodeId {
    let mut left = parse_postfix(p);
    while p.at(TokenKind::Pipe) {
        let pipe = p.take_token();
        let filter = if p.at(TokenKind::Identifier) {
            let name = make_identifier(p);
            if p.at(TokenKind::OpenParen) {
                wrap_call(p, name)
            } else {
                name
            }
        } else {
            p.missing_detached("identifier for the filter")
        };
        let node = p.tree.push(NodeKind::FilterExpression);
        p.tree.add_child(node, left, Some(Slot::Operand));
        p.tree.add_child(node, pipe, None);
        p.tree.add_child(node, filter, Some(Slot::Filter));
        left = node;
    }
    left
}

/// Calls, member access, and subscripts, applied repeatedly.
pub(crate) fn parse_postfix(p: &mut Parser) -> NodeId {
    let mut expr = parse_primary(p);
    loop {
        if p.at(TokenKind::OpenParen) {
            expr = wrap_call(p, expr);
        } else if p.at(TokenKind::Dot) {
            let dot = p.take_token();
            let property = if p.at(TokenKind::Identifier) {
                make_identifier(p)
            } else {
                p.missing_detached("identifier for member expression")
            };
            let node = p.tree.push(NodeKind::MemberExpression);
            p.tree.add_child(node, expr, Some(Slot::Object));
            p.tree.add_child(node, dot, None);
            p.tree.add_child(node, property, Some(Slot::Property));
            expr = node;
        } else if p.at(TokenKind::OpenSquareBracket) {
            expr = parse_subscript(p, expr);
        } else {
            break;
        }
    }
    expr
}

/// Wrap an already-parsed callee in a `CallExpression` with its argument
/// list. The cursor sits on `(`.
pub(crate) fn wrap_call(p: &mut Parser, callee: NodeId) -> NodeId {
    let node = p.tree.push(NodeKind::CallExpression);
    p.tree.add_child(node, callee, Some(Slot::Callee));
    p.advance_into(node, None); // (
    loop {
        if p.at(TokenKind::CloseParen) || p.at_expression_end() {
            break;
        }
        let arg = parse_call_arg(p);
        p.tree.add_child(node, arg, Some(Slot::Argument));
        if p.at(TokenKind::Comma) {
            p.advance_into(node, None);
        } else {
            break;
        }
    }
    p.expect(node, TokenKind::CloseParen, None, "')'");
    node
}

/// One call argument: expression, `name=value`, or `*`/`**` spread.
fn parse_call_arg(p: &mut Parser) -> NodeId {
    let is_star = (p.at(TokenKind::MultiplicativeBinaryOperator) && p.current_value() == Some("*"))
        || p.at(TokenKind::PowerBinaryOperator);
    if is_star {
        let star = p.take_token();
        let operand = parse_expression(p);
        let node = p.tree.push(NodeKind::SpreadExpression);
        p.tree.add_child(node, star, Some(Slot::Operator));
        p.tree.add_child(node, operand, Some(Slot::Operand));
        return node;
    }

    let expr = parse_expression(p);
    if p.at(TokenKind::Equals) {
        let eq = p.take_token();
        let value = parse_expression(p);
        let node = p.tree.push(NodeKind::KeywordArgumentExpression);
        if matches!(p.tree.kind(expr), NodeKind::Identifier) {
            p.tree.add_child(node, expr, Some(Slot::Key));
        } else {
            let key = p.missing_detached("identifier for keyword argument");
            p.tree.add_child(node, key, Some(Slot::Key));
            p.tree.add_child(node, expr, None);
        }
        p.tree.add_child(node, eq, None);
        p.tree.add_child(node, value, Some(Slot::Value));
        node
    } else {
        expr
    }
}

/// `x[i]`, `x[i:j]`, `x[i:j:k]` -- a member expression whose property may
/// be a slice. The cursor sits on `[`.
fn parse_subscript(p: &mut Parser, object: NodeId) -> NodeId {
    let node = p.tree.push(NodeKind::MemberExpression);
    p.tree.add_child(node, object, Some(Slot::Object));
    p.advance_into(node, None); // [

    if p.at(TokenKind::CloseSquareBracket) {
        p.missing(
            node,
            "at least one argument for member/slice expression",
            Some(Slot::Property),
        );
        p.advance_into(node, None); // ]
        return node;
    }

    let first = if p.at(TokenKind::Colon) {
        None
    } else {
        Some(parse_expression(p))
    };

    if p.at(TokenKind::Colon) {
        let slice = p.tree.push(NodeKind::SliceExpression);
        if let Some(first) = first {
            p.tree.add_child(slice, first, Some(Slot::Start));
        }
        let mut next_part = 1usize;
        let mut overflow_reported = false;
        while p.at(TokenKind::Colon) {
            if next_part > 2 && !overflow_reported {
                p.missing(slice, "at most three argument for slice expression", None);
                overflow_reported = true;
            }
            p.advance_into(slice, None); // :
            if !p.at(TokenKind::Colon)
                && !p.at(TokenKind::CloseSquareBracket)
                && !p.at_expression_end()
            {
                let part = parse_expression(p);
                let slot = match next_part {
                    1 => Some(Slot::Stop),
                    2 => Some(Slot::Step),
                    _ => None,
                };
                p.tree.add_child(slice, part, slot);
            }
            next_part += 1;
        }
        p.tree.add_child(node, slice, Some(Slot::Property));
    } else if let Some(first) = first {
        p.tree.add_child(node, first, Some(Slot::Property));
    }

    p.expect(node, TokenKind::CloseSquareBracket, None, "']'");
    node
}

/// An `Identifier` expression node wrapping the current identifier token.
pub(crate) fn make_identifier(p: &mut Parser) -> NodeId {
    let node = p.tree.push(NodeKind::Identifier);
    p.advance_into(node, None);
    node
}

/// Literals, identifiers, groups, and container literals.
pub(crate) fn parse_primary(p: &mut Parser) -> NodeId {
    let kind = match p.current_kind() {
        Some(kind) => kind,
        None => return missing_expression(p),
    };
    match kind {
        TokenKind::NumericLiteral => {
            let is_float = p
                .current_value()
                .map(|v| v.contains('.'))
                .unwrap_or(false);
            let node = p.tree.push(if is_float {
                NodeKind::FloatLiteral
            } else {
                NodeKind::IntegerLiteral
            });
            p.advance_into(node, None);
            node
        }
        TokenKind::StringLiteral => {
            let node = p.tree.push(NodeKind::StringLiteral);
            p.advance_into(node, None);
            node
        }
        TokenKind::Identifier => make_identifier(p),
        TokenKind::OpenParen => parse_group(p),
        TokenKind::OpenSquareBracket => parse_array(p),
        TokenKind::OpenCurlyBracket => parse_object(p),
        _ => missing_expression(p),
    }
}

/// Emit an `expression` recovery point, advancing the cursor when one was
/// already emitted at this exact position so the parser cannot spin.
fn missing_expression(p: &mut Parser) -> NodeId {
    match p.expr_missing_guard() {
        ExprMissingGuard::EmitMissing => p.missing_detached("expression"),
        ExprMissingGuard::AdvanceCursor => {
            let message = format!(
                "Unexpected token '{}'",
                p.current_value().unwrap_or_default()
            );
            match p.unexpected_detached(message) {
                Some(node) => node,
                None => p.missing_detached("expression"),
            }
        }
    }
}

/// `( ... )`: a parenthesized group, or a tuple when commas follow.
fn parse_group(p: &mut Parser) -> NodeId {
    let open = p.take_token();
    if p.at(TokenKind::CloseParen) {
        let node = p.tree.push(NodeKind::TupleLiteral);
        p.tree.add_child(node, open, None);
        p.advance_into(node, None); // )
        return node;
    }

    let first = parse_expression(p);
    if p.at(TokenKind::Comma) {
        let node = p.tree.push(NodeKind::TupleLiteral);
        p.tree.add_child(node, open, None);
        p.tree.add_child(node, first, Some(Slot::Item));
        while p.at(TokenKind::Comma) {
            p.advance_into(node, None);
            if p.at(TokenKind::CloseParen) || p.at_expression_end() {
                break;
            }
            let item = parse_expression(p);
            p.tree.add_child(node, item, Some(Slot::Item));
        }
        p.expect(node, TokenKind::CloseParen, None, "')'");
        node
    } else {
        // A plain group: the parens belong to the inner expression.
        p.tree.add_child(first, open, None);
        p.expect(first, TokenKind::CloseParen, None, "')'");
        first
    }
}

fn parse_array(p: &mut Parser) -> NodeId {
    let node = p.tree.push(NodeKind::ArrayLiteral);
    p.advance_into(node, None); // [
    loop {
        if p.at(TokenKind::CloseSquareBracket) || p.at_expression_end() {
            break;
        }
        let item = parse_expression(p);
        p.tree.add_child(node, item, Some(Slot::Item));
        if p.at(TokenKind::Comma) {
            p.advance_into(node, None);
        } else {
            break;
        }
    }
    p.expect(node, TokenKind::CloseSquareBracket, None, "']'");
    node
}

fn parse_object(p: &mut Parser) -> NodeId {
    let node = p.tree.push(NodeKind::ObjectLiteral);
    p.advance_into(node, None); // {
    loop {
        if p.at(TokenKind::CloseCurlyBracket) || p.at_expression_end() {
            break;
        }
        let key = parse_expression(p);
        p.tree.add_child(node, key, Some(Slot::Key));
        p.expect(node, TokenKind::Colon, None, "':'");
        let value = if p.at(TokenKind::CloseCurlyBracket)
            || p.at(TokenKind::Comma)
            || p.at_expression_end()
        {
            p.missing_detached("expression")
        } else {
            parse_expression(p)
        };
        p.tree.add_child(node, value, Some(Slot::EntryValue));
        if p.at(TokenKind::Comma) {
            p.advance_into(node, None);
        } else {
            break;
        }
    }
    p.expect(node, TokenKind::CloseCurlyBracket, None, "'}'");
    node
}
