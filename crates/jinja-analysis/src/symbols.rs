//! Symbol collection and cross-document lookup.
//!
//! A single bottom-up pass over the tree records macros, blocks, and
//! variables into per-container scope maps. Lookup walks the enclosing
//! scopes outward, then follows the document's imports; a visited-URI set
//! keeps mutually importing templates from looping.

use rustc_hash::{FxHashMap, FxHashSet};

use jinja_parser::{NodeId, NodeKind, Slot, SyntaxTree};

use crate::host::Uri;
use crate::types::builtins::{special_symbols, ScopeKind};
use crate::types::ty::TypeInfo;
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Macro,
    Block,
    Variable,
}

/// How a symbol's type is derived when someone asks for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeSource {
    /// `node` is a `Macro`; the type is its callable signature.
    Macro,
    /// `node` is a `Block`; blocks carry no value type.
    Block,
    /// `node` is a `SetStatement`; infer the assigned value (the block
    /// form renders to a string).
    SetValue,
    /// `node` is a `For`; the type is the iterable's element type, or
    /// the element's indexed property for tuple loop variables.
    LoopVariable { index: Option<usize> },
    /// `node` is a `Macro`; the type comes from the argument's default.
    MacroArgument { index: usize },
    /// `node` is a `Macro`; a `*args` / `**kwargs` parameter.
    SpreadArgument { kwargs: bool },
    /// `node` is an `Import`; the alias names the imported template.
    ImportedNamespace,
    /// No type information.
    None,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub name: String,
    /// The defining node.
    pub node: NodeId,
    /// The token leaf holding the name, for ranges.
    pub identifier: Option<NodeId>,
    pub source: TypeSource,
}

/// A symbol found somewhere in the workspace.
#[derive(Debug, Clone)]
pub struct FoundSymbol {
    pub uri: Uri,
    pub symbol: Symbol,
}

/// Which paths a lookup is allowed to take.
#[derive(Debug, Clone, Copy)]
pub struct LookupOptions {
    pub check_current: bool,
    pub follow_extends: bool,
    pub follow_imports: bool,
    pub follow_includes: bool,
}

impl Default for LookupOptions {
    fn default() -> Self {
        Self {
            check_current: true,
            follow_extends: true,
            follow_imports: true,
            follow_includes: true,
        }
    }
}

/// Name → definitions, keyed by lexical container.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    scopes: FxHashMap<NodeId, FxHashMap<String, Vec<Symbol>>>,
}

impl SymbolTable {
    /// Collect every definition in the tree.
    pub fn collect(tree: &SyntaxTree) -> Self {
        let mut table = SymbolTable::default();
        for id in tree.ids() {
            match tree.kind(id) {
                NodeKind::Macro => table.collect_macro(tree, id),
                NodeKind::Block => {
                    if let Some(symbol) = named_symbol(tree, id, SymbolKind::Block, TypeSource::Block)
                    {
                        table.add(enclosing_scope(tree, id), symbol);
                    }
                }
                NodeKind::SetStatement => table.collect_set(tree, id),
                NodeKind::For => table.collect_loop_variables(tree, id),
                NodeKind::Import => {
                    if let Some(symbol) =
                        named_symbol(tree, id, SymbolKind::Variable, TypeSource::ImportedNamespace)
                    {
                        table.add(enclosing_scope(tree, id), symbol);
                    }
                }
                _ => {}
            }
        }
        table
    }

    fn collect_macro(&mut self, tree: &SyntaxTree, id: NodeId) {
        if let Some(symbol) = named_symbol(tree, id, SymbolKind::Macro, TypeSource::Macro) {
            self.add(enclosing_scope(tree, id), symbol);
        }
        // Arguments are variables inside the macro body.
        for (index, arg) in tree.slot_all(id, Slot::Arg).into_iter().enumerate() {
            let symbol = match tree.kind(arg) {
                NodeKind::Identifier => symbol_from_ident(tree, arg, id, TypeSource::MacroArgument { index }),
                NodeKind::KeywordArgumentExpression => tree
                    .slot(arg, Slot::Key)
                    .and_then(|key| symbol_from_ident(tree, key, id, TypeSource::MacroArgument { index })),
                NodeKind::SpreadExpression => {
                    let kwargs = tree
                        .slot(arg, Slot::Operator)
                        .and_then(|op| tree.token(op))
                        .map(|tok| tok.value == "**")
                        .unwrap_or(false);
                    tree.slot(arg, Slot::Operand)
                        .and_then(|name| symbol_from_ident(tree, name, id, TypeSource::SpreadArgument { kwargs }))
                }
                _ => None,
            };
            if let Some(symbol) = symbol {
                self.add(id, symbol);
            }
        }
    }

    fn collect_set(&mut self, tree: &SyntaxTree, id: NodeId) {
        let Some(assignee) = tree.slot(id, Slot::Assignee) else {
            return;
        };
        let scope = enclosing_scope(tree, id);
        match tree.kind(assignee) {
            NodeKind::Identifier => {
                if let Some(symbol) = symbol_from_ident(tree, assignee, id, TypeSource::SetValue) {
                    self.add(scope, symbol);
                }
            }
            NodeKind::TupleLiteral => {
                for item in tree.slot_all(assignee, Slot::Item) {
                    if let Some(symbol) = symbol_from_ident(tree, item, id, TypeSource::None) {
                        self.add(scope, symbol);
                    }
                }
            }
            _ => {}
        }
    }

    fn collect_loop_variables(&mut self, tree: &SyntaxTree, id: NodeId) {
        let Some(var) = tree.slot(id, Slot::LoopVariable) else {
            return;
        };
        match tree.kind(var) {
            NodeKind::Identifier => {
                if let Some(symbol) =
                    symbol_from_ident(tree, var, id, TypeSource::LoopVariable { index: None })
                {
                    self.add(id, symbol);
                }
            }
            NodeKind::TupleLiteral => {
                for (index, item) in tree.slot_all(var, Slot::Item).into_iter().enumerate() {
                    if let Some(symbol) = symbol_from_ident(
                        tree,
                        item,
                        id,
                        TypeSource::LoopVariable { index: Some(index) },
                    ) {
                        self.add(id, symbol);
                    }
                }
            }
            _ => {}
        }
    }

    fn add(&mut self, scope: NodeId, symbol: Symbol) {
        self.scopes
            .entry(scope)
            .or_default()
            .entry(symbol.name.clone())
            .or_default()
            .push(symbol);
    }

    /// Definitions of `name` directly in `scope`.
    pub fn lookup(&self, scope: NodeId, name: &str) -> &[Symbol] {
        self.scopes
            .get(&scope)
            .and_then(|names| names.get(name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All symbols registered directly in `scope`.
    pub fn scope_entries(&self, scope: NodeId) -> impl Iterator<Item = &Symbol> {
        self.scopes
            .get(&scope)
            .into_iter()
            .flat_map(|names| names.values())
            .flatten()
    }

    /// Every symbol of the given kind anywhere in the document.
    pub fn all_of_kind(&self, kind: SymbolKind) -> Vec<&Symbol> {
        self.scopes
            .values()
            .flat_map(|names| names.values())
            .flatten()
            .filter(|symbol| symbol.kind == kind)
            .collect()
    }
}

fn named_symbol(
    tree: &SyntaxTree,
    node: NodeId,
    kind: SymbolKind,
    source: TypeSource,
) -> Option<Symbol> {
    let name_node = tree.slot(node, Slot::Name)?;
    let name = tree.ident_value(name_node)?.to_string();
    Some(Symbol {
        kind,
        name,
        node,
        identifier: tree.ident_token(name_node),
        source,
    })
}

fn symbol_from_ident(
    tree: &SyntaxTree,
    ident: NodeId,
    node: NodeId,
    source: TypeSource,
) -> Option<Symbol> {
    let name = tree.ident_value(ident)?.to_string();
    Some(Symbol {
        kind: SymbolKind::Variable,
        name,
        node,
        identifier: tree.ident_token(ident),
        source,
    })
}

/// The nearest enclosing scope container strictly above `node`.
pub fn enclosing_scope(tree: &SyntaxTree, node: NodeId) -> NodeId {
    for ancestor in tree.ancestors(node) {
        if is_scope(tree.kind(ancestor)) {
            return ancestor;
        }
    }
    SyntaxTree::ROOT
}

fn is_scope(kind: &NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::Program | NodeKind::Macro | NodeKind::For | NodeKind::Block
    )
}

/// The scope kind of a container node.
pub fn scope_kind(tree: &SyntaxTree, scope: NodeId) -> ScopeKind {
    match tree.kind(scope) {
        NodeKind::Macro => ScopeKind::Macro,
        NodeKind::For => ScopeKind::For,
        NodeKind::Block => ScopeKind::Block,
        _ => ScopeKind::Program,
    }
}

/// Look up a special symbol (`loop`, `super`, `varargs`, the globals
/// namespace, ...) visible from `anchor` through its scope chain.
pub fn find_special_symbol(tree: &SyntaxTree, anchor: NodeId, name: &str) -> Option<TypeInfo> {
    let mut scope = enclosing_scope(tree, anchor);
    loop {
        if let Some(info) = special_symbols(scope_kind(tree, scope)).get(name) {
            return Some(info.clone());
        }
        if scope == SyntaxTree::ROOT {
            return None;
        }
        scope = enclosing_scope(tree, scope);
    }
}

/// Resolve `name` from `anchor` in the given document, walking enclosing
/// scopes outward and then the document's imports.
pub fn find_symbol(
    workspace: &Workspace,
    uri: &Uri,
    anchor: NodeId,
    name: &str,
    kind: Option<SymbolKind>,
    options: &LookupOptions,
) -> Option<FoundSymbol> {
    let mut visited = FxHashSet::default();
    find_symbol_inner(workspace, uri, Some(anchor), name, kind, options, &mut visited)
}

fn find_symbol_inner(
    workspace: &Workspace,
    uri: &Uri,
    anchor: Option<NodeId>,
    name: &str,
    kind: Option<SymbolKind>,
    options: &LookupOptions,
    visited: &mut FxHashSet<Uri>,
) -> Option<FoundSymbol> {
    if !visited.insert(uri.clone()) {
        return None;
    }
    let doc = workspace.document(uri)?;
    let tree = &doc.tree;

    if options.check_current {
        let mut scope = enclosing_scope(tree, anchor.unwrap_or(SyntaxTree::ROOT));
        loop {
            let matched = doc
                .symbols
                .lookup(scope, name)
                .iter()
                .find(|symbol| kind.map_or(true, |k| symbol.kind == k));
            if let Some(symbol) = matched {
                return Some(FoundSymbol {
                    uri: uri.clone(),
                    symbol: symbol.clone(),
                });
            }
            if scope == SyntaxTree::ROOT {
                break;
            }
            scope = enclosing_scope(tree, scope);
        }
    }

    // Imports visible above the anchor, extends chain first for blocks.
    let anchor_start = anchor.map(|a| tree.span(a).start);
    let mut statements: Vec<(NodeId, Uri)> = doc
        .imports
        .iter()
        .filter_map(|(stmt, target)| target.clone().map(|t| (*stmt, t)))
        .filter(|(stmt, _)| match anchor_start {
            Some(start) => tree.span(*stmt).start < start || matches!(tree.kind(*stmt), NodeKind::Extends),
            None => true,
        })
        .collect();
    if kind == Some(SymbolKind::Block) {
        statements.sort_by_key(|(stmt, _)| !matches!(tree.kind(*stmt), NodeKind::Extends));
    }

    // Imported documents are searched from their program scope inward,
    // whatever the caller's own check_current said.
    let nested = LookupOptions {
        check_current: true,
        ..*options
    };
    for (stmt, target) in statements {
        match tree.kind(stmt) {
            NodeKind::Extends if options.follow_extends => {
                if let Some(found) =
                    find_symbol_inner(workspace, &target, None, name, kind, &nested, visited)
                {
                    return Some(found);
                }
            }
            NodeKind::FromImport if options.follow_imports => {
                for (name_node, alias_node) in from_import_entries(tree, stmt) {
                    let original = tree.ident_value(name_node);
                    let visible = alias_node
                        .and_then(|alias| tree.ident_value(alias))
                        .or(original);
                    if visible != Some(name) {
                        continue;
                    }
                    let Some(original) = original else { continue };
                    if let Some(found) = find_symbol_inner(
                        workspace, &target, None, original, kind, &nested, visited,
                    ) {
                        return Some(found);
                    }
                }
            }
            NodeKind::Include if options.follow_includes => {
                if let Some(found) =
                    find_symbol_inner(workspace, &target, None, name, kind, &nested, visited)
                {
                    return Some(found);
                }
            }
            _ => {}
        }
    }

    None
}

/// The `(name, alias)` pairs of a `from ... import` statement, in source
/// order.
pub fn from_import_entries(tree: &SyntaxTree, stmt: NodeId) -> Vec<(NodeId, Option<NodeId>)> {
    let mut entries: Vec<(NodeId, Option<NodeId>)> = Vec::new();
    for (slot, child) in tree.slots(stmt) {
        match slot {
            Slot::ImportName => entries.push((*child, None)),
            Slot::ImportAlias => {
                if let Some(last) = entries.last_mut() {
                    last.1 = Some(*child);
                }
            }
            _ => {}
        }
    }
    entries
}

/// Every symbol visible from `anchor`: local scopes outward, then the
/// names brought in by imports. Nearest definition wins per name.
pub fn visible_symbols(workspace: &Workspace, uri: &Uri, anchor: NodeId) -> Vec<FoundSymbol> {
    let mut out: Vec<FoundSymbol> = Vec::new();
    let mut seen: FxHashSet<String> = FxHashSet::default();
    let Some(doc) = workspace.document(uri) else {
        return out;
    };
    let tree = &doc.tree;

    let mut scope = enclosing_scope(tree, anchor);
    loop {
        for symbol in doc.symbols.scope_entries(scope) {
            if seen.insert(symbol.name.clone()) {
                out.push(FoundSymbol {
                    uri: uri.clone(),
                    symbol: symbol.clone(),
                });
            }
        }
        if scope == SyntaxTree::ROOT {
            break;
        }
        scope = enclosing_scope(tree, scope);
    }

    let anchor_start = tree.span(anchor).start;
    for (stmt, target) in &doc.imports {
        let Some(target) = target else { continue };
        let visible = tree.span(*stmt).start < anchor_start
            || matches!(tree.kind(*stmt), NodeKind::Extends);
        if !visible {
            continue;
        }
        match tree.kind(*stmt) {
            NodeKind::FromImport => {
                for (name_node, alias_node) in from_import_entries(tree, *stmt) {
                    let shown = alias_node.unwrap_or(name_node);
                    let Some(shown_name) = tree.ident_value(shown) else {
                        continue;
                    };
                    let Some(original) = tree.ident_value(name_node) else {
                        continue;
                    };
                    if !seen.insert(shown_name.to_string()) {
                        continue;
                    }
                    let resolved = find_symbol(
                        workspace,
                        target,
                        SyntaxTree::ROOT,
                        original,
                        None,
                        &LookupOptions {
                            check_current: true,
                            ..LookupOptions::default()
                        },
                    );
                    if let Some(found) = resolved {
                        out.push(FoundSymbol {
                            uri: found.uri,
                            symbol: Symbol {
                                name: shown_name.to_string(),
                                ..found.symbol
                            },
                        });
                    }
                }
            }
            NodeKind::Include | NodeKind::Extends => {
                if let Some(target_doc) = workspace.document(target) {
                    for symbol in target_doc.symbols.scope_entries(SyntaxTree::ROOT) {
                        if seen.insert(symbol.name.clone()) {
                            out.push(FoundSymbol {
                                uri: target.clone(),
                                symbol: symbol.clone(),
                            });
                        }
                    }
                }
            }
            _ => {}
        }
    }

    out
}
