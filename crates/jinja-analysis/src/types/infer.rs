//! Expression type inference.
//!
//! Types are computed on demand and memoized per `(document, node)`; the
//! cache is dropped whenever the document changes. Inference never
//! fails loudly: `None` means "no information" and consumers skip
//! rendering.

use std::collections::BTreeMap;

use jinja_common::token::{Token, TokenKind};
use jinja_parser::{NodeId, NodeKind, Slot, SyntaxTree};

use crate::document::Document;
use crate::host::Uri;
use crate::symbols::{self, FoundSymbol, LookupOptions, TypeSource};
use crate::workspace::Workspace;

use super::builtins::{builtin_type, resolve_type, special_symbols, ScopeKind};
use super::ty::{Argument, Signature, TypeInfo, TypeOrRef};

/// Infer the type of an expression node.
pub fn infer_type(workspace: &Workspace, uri: &Uri, node: NodeId) -> Option<TypeInfo> {
    let doc = workspace.document(uri)?;
    if let Some(cached) = doc.type_cache.borrow().get(&node) {
        return cached.clone();
    }
    // Seed the cache so self-referential definitions terminate.
    doc.type_cache.borrow_mut().insert(node, None);
    let result = compute_type(workspace, uri, doc, node);
    doc.type_cache.borrow_mut().insert(node, result.clone());
    result
}

fn compute_type(
    workspace: &Workspace,
    uri: &Uri,
    doc: &Document,
    node: NodeId,
) -> Option<TypeInfo> {
    let tree = &doc.tree;
    match tree.kind(node) {
        NodeKind::StringLiteral => {
            let mut info = builtin_type("str").unwrap_or_else(|| TypeInfo::named("str"));
            info.literal_value =
                literal_token(tree, node).map(|tok| format!("{:?}", tok.value));
            Some(info)
        }
        NodeKind::IntegerLiteral => literal_number(tree, node, "int"),
        NodeKind::FloatLiteral => literal_number(tree, node, "float"),
        NodeKind::ArrayLiteral => Some(container_type(workspace, uri, tree, node, "list")),
        NodeKind::TupleLiteral => Some(container_type(workspace, uri, tree, node, "tuple")),
        NodeKind::ObjectLiteral => Some(object_type(workspace, uri, tree, node)),
        NodeKind::MemberExpression => member_type(workspace, uri, tree, node),
        NodeKind::CallExpression => {
            let callee = tree.slot(node, Slot::Callee)?;
            let callee_type = infer_type(workspace, uri, callee)?;
            let signature = callee_type.signature?;
            resolve_type(signature.return_type.as_deref()?)
        }
        NodeKind::BinaryExpression => binary_type(workspace, uri, tree, node),
        NodeKind::UnaryExpression => {
            let op = tree.slot(node, Slot::Operator).and_then(|o| tree.token(o))?;
            (op.value == "not").then(|| TypeInfo::named("bool"))
        }
        NodeKind::FilterExpression => {
            let filter = tree.slot(node, Slot::Filter)?;
            let name = filter_name(tree, filter)?;
            let filter_type = workspace.filter_type(name)?;
            let signature = filter_type.signature?;
            resolve_type(signature.return_type.as_deref()?)
        }
        NodeKind::TestExpression => Some(TypeInfo::named("bool")),
        NodeKind::SelectExpression => {
            let operand = tree.slot(node, Slot::Operand)?;
            infer_type(workspace, uri, operand)
        }
        NodeKind::Ternary => {
            let operand = tree.slot(node, Slot::Operand)?;
            let first = infer_type(workspace, uri, operand)?;
            let alternate = tree.slot(node, Slot::Else)?;
            let second = infer_type(workspace, uri, alternate)?;
            (first.name == second.name).then_some(TypeInfo {
                literal_value: None,
                ..first
            })
        }
        NodeKind::Identifier => identifier_type(workspace, uri, doc, node),
        _ => None,
    }
}

fn literal_number(tree: &SyntaxTree, node: NodeId, name: &str) -> Option<TypeInfo> {
    let token = literal_token(tree, node)?;
    Some(TypeInfo::literal(name, token.value.clone()))
}

/// The literal-valued token of a literal node, parens skipped.
fn literal_token<'t>(tree: &'t SyntaxTree, node: NodeId) -> Option<&'t Token> {
    tree.children(node).iter().find_map(|&child| {
        tree.token(child).filter(|tok| {
            matches!(tok.kind, TokenKind::NumericLiteral | TokenKind::StringLiteral)
        })
    })
}

/// The name of a filter/test position: a bare identifier or the callee
/// of a call.
pub fn filter_name(tree: &SyntaxTree, filter: NodeId) -> Option<&str> {
    match tree.kind(filter) {
        NodeKind::Identifier => tree.ident_value(filter),
        NodeKind::CallExpression => {
            let callee = tree.slot(filter, Slot::Callee)?;
            tree.ident_value(callee)
        }
        _ => None,
    }
}

fn container_type(
    workspace: &Workspace,
    uri: &Uri,
    tree: &SyntaxTree,
    node: NodeId,
    name: &str,
) -> TypeInfo {
    let items = tree.slot_all(node, Slot::Item);
    let mut info = TypeInfo::named(name);
    let mut properties = BTreeMap::new();
    let mut element_names: Vec<Option<String>> = Vec::new();
    for (index, item) in items.iter().enumerate() {
        let item_type = infer_type(workspace, uri, *item);
        element_names.push(item_type.as_ref().and_then(|t| t.name.clone()));
        if let Some(item_type) = item_type {
            properties.insert(index.to_string(), TypeOrRef::Info(item_type));
        }
    }
    if !properties.is_empty() {
        info.properties = Some(properties);
    }
    // A common element type only when every element agrees.
    if let Some(Some(first)) = element_names.first() {
        if element_names.len() == items.len()
            && element_names
                .iter()
                .all(|n| n.as_deref() == Some(first.as_str()))
        {
            info.element_type = Some(Box::new(TypeOrRef::Name(first.clone())));
        }
    }
    info
}

fn object_type(workspace: &Workspace, uri: &Uri, tree: &SyntaxTree, node: NodeId) -> TypeInfo {
    let keys = tree.slot_all(node, Slot::Key);
    let values = tree.slot_all(node, Slot::EntryValue);
    let mut properties = BTreeMap::new();
    for (key, value) in keys.iter().zip(values.iter()) {
        let key_text = match tree.kind(*key) {
            NodeKind::StringLiteral | NodeKind::IntegerLiteral => {
                literal_token(tree, *key).map(|tok| tok.value.clone())
            }
            NodeKind::Identifier => tree.ident_value(*key).map(str::to_string),
            _ => None,
        };
        let Some(key_text) = key_text else { continue };
        if let Some(value_type) = infer_type(workspace, uri, *value) {
            properties.insert(key_text, TypeOrRef::Info(value_type));
        }
    }
    TypeInfo {
        name: Some("dict".to_string()),
        properties: (!properties.is_empty()).then_some(properties),
        ..TypeInfo::default()
    }
}

fn member_type(
    workspace: &Workspace,
    uri: &Uri,
    tree: &SyntaxTree,
    node: NodeId,
) -> Option<TypeInfo> {
    let object = tree.slot(node, Slot::Object)?;
    let object_type = infer_type(workspace, uri, object)?;
    let property = tree.slot(node, Slot::Property)?;

    // Slicing keeps the container type.
    if matches!(tree.kind(property), NodeKind::SliceExpression) {
        return Some(TypeInfo {
            literal_value: None,
            ..object_type
        });
    }

    let key = match tree.kind(property) {
        NodeKind::Identifier => tree.ident_value(property).map(str::to_string),
        NodeKind::StringLiteral => literal_token(tree, property).map(|tok| tok.value.clone()),
        NodeKind::IntegerLiteral => {
            let raw = literal_token(tree, property)?.value.parse::<i64>().ok()?;
            let len = object_type.properties.as_ref().map(BTreeMap::len).unwrap_or(0) as i64;
            // Negative indices wrap around modulo the property count.
            let index = if raw < 0 && len > 0 {
                ((raw % len) + len) % len
            } else {
                raw
            };
            Some(index.to_string())
        }
        _ => None,
    };

    if let Some(key) = key {
        if let Some(properties) = &object_type.properties {
            if let Some(found) = properties.get(&key) {
                return resolve_type(found);
            }
        }
    }
    // Unknown or dynamic key: fall back to the element type.
    object_type
        .element_type
        .as_deref()
        .and_then(resolve_type)
}

fn binary_type(
    workspace: &Workspace,
    uri: &Uri,
    tree: &SyntaxTree,
    node: NodeId,
) -> Option<TypeInfo> {
    let op = tree
        .slot(node, Slot::Operator)
        .and_then(|o| tree.token(o))?
        .value
        .clone();
    match op.as_str() {
        "~" => Some(TypeInfo::named("str")),
        "and" | "or" | "not" | "in" | "==" | "!=" | "<" | ">" | "<=" | ">=" => {
            Some(TypeInfo::named("bool"))
        }
        "/" => Some(TypeInfo::named("float")),
        "//" => Some(TypeInfo::named("int")),
        "+" | "-" | "*" | "%" | "**" => {
            let left = tree.slot(node, Slot::Left)?;
            let right = tree.slot(node, Slot::Right)?;
            let left_name = infer_type(workspace, uri, left).and_then(|t| t.name);
            let right_name = infer_type(workspace, uri, right).and_then(|t| t.name);
            let left_name = left_name.as_deref();
            let right_name = right_name.as_deref();
            if op == "*"
                && ((left_name == Some("str") && right_name == Some("int"))
                    || (left_name == Some("int") && right_name == Some("str")))
            {
                return Some(TypeInfo::named("str"));
            }
            match (left_name, right_name) {
                (Some("float"), Some("int" | "float")) | (Some("int" | "float"), Some("float")) => {
                    Some(TypeInfo::named("float"))
                }
                (Some("int"), Some("int")) => Some(TypeInfo::named("int")),
                _ => None,
            }
        }
        _ => None,
    }
}

fn identifier_type(
    workspace: &Workspace,
    uri: &Uri,
    doc: &Document,
    node: NodeId,
) -> Option<TypeInfo> {
    let name = doc.tree.ident_value(node)?.to_string();

    if let Some(found) = symbols::find_symbol(
        workspace,
        uri,
        node,
        &name,
        None,
        &LookupOptions::default(),
    ) {
        if let Some(info) = symbol_type(workspace, &found) {
            return Some(info);
        }
    }

    if let Some(info) = symbols::find_special_symbol(&doc.tree, node, &name) {
        return Some(info);
    }

    workspace.globals.lookup(uri, &name).cloned()
}

/// The type a symbol supplies, computed against its defining document.
pub fn symbol_type(workspace: &Workspace, found: &FoundSymbol) -> Option<TypeInfo> {
    let doc = workspace.document(&found.uri)?;
    let tree = &doc.tree;
    let node = found.symbol.node;
    match found.symbol.source {
        TypeSource::Macro => Some(macro_type(workspace, &found.uri, doc, node)),
        TypeSource::Block => None,
        TypeSource::SetValue => match tree.slot(node, Slot::Value) {
            Some(value) => infer_type(workspace, &found.uri, value),
            // The block form renders its body to a string.
            None => Some(TypeInfo::named("str")),
        },
        TypeSource::LoopVariable { index } => {
            let iterable = tree.slot(node, Slot::Iterable)?;
            let iterable_type = infer_type(workspace, &found.uri, iterable)?;
            let element = iterable_type.element_type.as_deref().and_then(resolve_type)?;
            match index {
                None => Some(element),
                Some(i) => element
                    .properties
                    .as_ref()
                    .and_then(|props| props.get(&i.to_string()))
                    .and_then(resolve_type),
            }
        }
        TypeSource::MacroArgument { index } => {
            let arg = tree.slot_all(node, Slot::Arg).into_iter().nth(index)?;
            match tree.kind(arg) {
                NodeKind::KeywordArgumentExpression => {
                    let default = tree.slot(arg, Slot::Value)?;
                    infer_type(workspace, &found.uri, default)
                }
                _ => None,
            }
        }
        TypeSource::SpreadArgument { kwargs } => {
            Some(TypeInfo::named(if kwargs { "dict" } else { "tuple" }))
        }
        TypeSource::ImportedNamespace => {
            let target = doc
                .imports
                .iter()
                .find(|(stmt, _)| *stmt == node)
                .and_then(|(_, target)| target.clone())?;
            namespace_type(workspace, &target)
        }
        TypeSource::None => None,
    }
}

/// The callable type of a macro definition.
pub fn macro_type(workspace: &Workspace, uri: &Uri, doc: &Document, node: NodeId) -> TypeInfo {
    let tree = &doc.tree;
    let name = tree
        .slot(node, Slot::Name)
        .and_then(|n| tree.ident_value(n))
        .map(str::to_string);
    let mut arguments = Vec::new();
    let mut varargs_name = None;
    let mut kwargs_name = None;
    for arg in tree.slot_all(node, Slot::Arg) {
        match tree.kind(arg) {
            NodeKind::Identifier => {
                if let Some(arg_name) = tree.ident_value(arg) {
                    arguments.push(Argument {
                        name: arg_name.to_string(),
                        ..Argument::default()
                    });
                }
            }
            NodeKind::KeywordArgumentExpression => {
                let arg_name = tree
                    .slot(arg, Slot::Key)
                    .and_then(|key| tree.ident_value(key));
                let default = tree.slot(arg, Slot::Value);
                if let Some(arg_name) = arg_name {
                    let default_text = default.map(|d| {
                        let span = tree.span(d);
                        doc.source[span.start as usize..span.end as usize].to_string()
                    });
                    let default_type = default
                        .and_then(|d| infer_type(workspace, uri, d))
                        .and_then(|t| t.name)
                        .map(TypeOrRef::Name);
                    arguments.push(Argument {
                        name: arg_name.to_string(),
                        argument_type: default_type,
                        default: default_text,
                        ..Argument::default()
                    });
                }
            }
            NodeKind::SpreadExpression => {
                let is_kwargs = tree
                    .slot(arg, Slot::Operator)
                    .and_then(|op| tree.token(op))
                    .map(|tok| tok.value == "**")
                    .unwrap_or(false);
                let spread_name = tree
                    .slot(arg, Slot::Operand)
                    .and_then(|n| tree.ident_value(n))
                    .map(str::to_string);
                if is_kwargs {
                    kwargs_name = spread_name;
                } else {
                    varargs_name = spread_name;
                }
            }
            _ => {}
        }
    }
    TypeInfo {
        name,
        signature: Some(Signature {
            arguments,
            return_type: Some(Box::new(TypeOrRef::name("str"))),
            varargs_name,
            kwargs_name,
            ..Signature::default()
        }),
        ..TypeInfo::default()
    }
}

/// The namespace type an `import ... as ns` binds: the target document's
/// top-level macros and variables as properties.
fn namespace_type(workspace: &Workspace, target: &Uri) -> Option<TypeInfo> {
    let doc = workspace.document(target)?;
    let mut properties = BTreeMap::new();
    for symbol in doc.symbols.scope_entries(SyntaxTree::ROOT) {
        // Nested namespaces are not expanded; mutually importing
        // templates would otherwise never finish.
        if matches!(symbol.source, TypeSource::ImportedNamespace) {
            continue;
        }
        let found = FoundSymbol {
            uri: target.clone(),
            symbol: symbol.clone(),
        };
        if let Some(info) = symbol_type(workspace, &found) {
            properties.insert(symbol.name.clone(), TypeOrRef::Info(info));
        }
    }
    Some(TypeInfo {
        name: Some(target.file_name().to_string()),
        properties: (!properties.is_empty()).then_some(properties),
        ..TypeInfo::default()
    })
}

/// The special symbols visible from `anchor`, for completion.
pub fn visible_special_symbols(
    tree: &SyntaxTree,
    anchor: NodeId,
) -> Vec<(&'static str, &'static TypeInfo)> {
    let mut out = Vec::new();
    let mut kinds: Vec<ScopeKind> = Vec::new();
    let mut scope = symbols::enclosing_scope(tree, anchor);
    loop {
        let kind = symbols::scope_kind(tree, scope);
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
        if scope == SyntaxTree::ROOT {
            break;
        }
        scope = symbols::enclosing_scope(tree, scope);
    }
    for kind in kinds {
        for (name, info) in special_symbols(kind) {
            out.push((*name, info));
        }
    }
    out
}
