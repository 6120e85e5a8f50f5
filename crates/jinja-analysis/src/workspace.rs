//! The document store and analysis driver.
//!
//! The workspace owns every loaded document, the user globals, and the
//! reverse-import map used for invalidation. Analysis is synchronous;
//! when the host cannot answer a read yet (`ReadOutcome::Unknown`), the
//! URI is reported back so the async driver can fetch it and re-run.

use rustc_hash::{FxHashMap, FxHashSet};

use jinja_parser::NodeId;

use crate::document::Document;
use crate::host::{ReadOutcome, ReadUri, Uri};
use crate::imports::{self, candidate_uris};
use crate::settings::Settings;
use crate::types::builtins::{BUILTIN_FILTERS, BUILTIN_TESTS};
use crate::types::globals::{
    is_json_schema, parse_globals_file, scan_ls_commands, schema_to_type, GlobalsStore,
};
use crate::types::ty::{Signature, TypeInfo};

/// Everything the language server knows about the project.
#[derive(Default)]
pub struct Workspace {
    documents: FxHashMap<Uri, Document>,
    pub settings: Settings,
    pub globals: GlobalsStore,
    /// Workspace folder roots.
    pub roots: Vec<Uri>,
    /// target → set of documents importing it, for invalidation.
    reverse_imports: FxHashMap<Uri, FxHashSet<Uri>>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document(&self, uri: &Uri) -> Option<&Document> {
        self.documents.get(uri)
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.values()
    }

    pub fn add_root(&mut self, root: Uri) {
        if !self.roots.contains(&root) {
            self.roots.push(root);
        }
    }

    /// Replace the configuration and drop every memoized type (the
    /// filter/test tables just changed shape).
    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
        self.clear_type_caches();
    }

    /// Open or replace a document from the editor and analyze it.
    /// Returns the URIs the host still has to provide.
    pub fn open_document(
        &mut self,
        uri: Uri,
        text: String,
        version: i32,
        host: &dyn ReadUri,
    ) -> Vec<Uri> {
        self.documents
            .insert(uri.clone(), Document::new(uri.clone(), text, version, true));
        self.clear_type_caches();
        self.analyze_with_dependents(&uri, host)
    }

    /// Apply a full-text change to an open document.
    pub fn update_document(
        &mut self,
        uri: &Uri,
        text: String,
        version: i32,
        host: &dyn ReadUri,
    ) -> Vec<Uri> {
        self.documents.insert(
            uri.clone(),
            Document::new(uri.clone(), text, version, true),
        );
        self.clear_type_caches();
        self.analyze_with_dependents(uri, host)
    }

    /// Re-run analysis after the host learned more files.
    pub fn reanalyze(&mut self, uri: &Uri, host: &dyn ReadUri) -> Vec<Uri> {
        self.clear_type_caches();
        self.analyze_with_dependents(uri, host)
    }

    /// Close a document. It is destroyed only when nothing imports it.
    pub fn close_document(&mut self, uri: &Uri) {
        let imported = self
            .reverse_imports
            .get(uri)
            .map(|importers| !importers.is_empty())
            .unwrap_or(false);
        if imported {
            if let Some(doc) = self.documents.get_mut(uri) {
                doc.open = false;
            }
        } else {
            self.documents.remove(uri);
        }
    }

    fn clear_type_caches(&self) {
        for doc in self.documents.values() {
            doc.clear_type_cache();
        }
    }

    fn analyze_with_dependents(&mut self, uri: &Uri, host: &dyn ReadUri) -> Vec<Uri> {
        let mut pending = Vec::new();
        let mut visited = FxHashSet::default();
        self.analyze(uri, host, &mut visited, &mut pending);

        // Documents importing this one see its new symbols through their
        // own import lists; re-resolve them too.
        let dependents: Vec<Uri> = self
            .reverse_imports
            .get(uri)
            .map(|importers| importers.iter().cloned().collect())
            .unwrap_or_default();
        for dependent in dependents {
            self.analyze(&dependent, host, &mut visited, &mut pending);
        }

        pending.sort();
        pending.dedup();
        pending
    }

    /// Resolve one document's imports and LS commands, loading imported
    /// documents as the host confirms them. Re-entrance is guarded by
    /// `visited`, which tolerates import cycles.
    fn analyze(
        &mut self,
        uri: &Uri,
        host: &dyn ReadUri,
        visited: &mut FxHashSet<Uri>,
        pending: &mut Vec<Uri>,
    ) {
        if !visited.insert(uri.clone()) {
            return;
        }
        if !self.documents.contains_key(uri) {
            return;
        }

        self.run_ls_commands(uri, host, pending);

        // This document's outgoing edges are about to be recomputed.
        for importers in self.reverse_imports.values_mut() {
            importers.remove(uri);
        }

        let statements: Vec<(NodeId, Option<String>)> = match self.documents.get(uri) {
            Some(doc) => doc
                .import_statement_nodes()
                .into_iter()
                .map(|stmt| {
                    let source = imports::import_source(&doc.tree, stmt).map(|(s, _)| s);
                    (stmt, source)
                })
                .collect(),
            None => return,
        };

        let mut resolved: Vec<(NodeId, Option<Uri>)> = Vec::new();
        let mut to_load: Vec<(Uri, String)> = Vec::new();
        for (stmt, source) in statements {
            let target = source.and_then(|source| {
                let candidates = candidate_uris(&source, uri, &self.roots, &self.settings);
                let mut hit = None;
                for candidate in candidates {
                    if self.documents.contains_key(&candidate) {
                        hit = Some(candidate);
                        break;
                    }
                    match host.read(&candidate) {
                        ReadOutcome::Found(contents) => {
                            to_load.push((candidate.clone(), contents));
                            hit = Some(candidate);
                            break;
                        }
                        ReadOutcome::Missing => {}
                        ReadOutcome::Unknown => pending.push(candidate),
                    }
                }
                hit
            });
            if let Some(target) = &target {
                self.reverse_imports
                    .entry(target.clone())
                    .or_default()
                    .insert(uri.clone());
            }
            resolved.push((stmt, target));
        }

        if let Some(doc) = self.documents.get_mut(uri) {
            doc.imports = resolved;
            doc.clear_type_cache();
        }

        for (target, contents) in to_load {
            self.documents
                .entry(target.clone())
                .or_insert_with(|| Document::new(target.clone(), contents, 0, false));
            self.analyze(&target, host, visited, pending);
        }
    }

    /// Execute `jinja-ls:` comment commands. Only `globals <pathOrUrl>`
    /// exists; parse failures are logged and skipped.
    fn run_ls_commands(&mut self, uri: &Uri, host: &dyn ReadUri, pending: &mut Vec<Uri>) {
        let commands = match self.documents.get(uri) {
            Some(doc) => scan_ls_commands(&doc.tree),
            None => return,
        };
        for command in commands {
            if command.directive != "globals" {
                log::warn!("unknown jinja-ls command: {}", command.directive);
                continue;
            }
            let targets: Vec<Uri> = if command.argument.contains("://") {
                vec![Uri::new(command.argument.clone())]
            } else {
                imports::resolution_bases(uri, &self.roots, &self.settings)
                    .into_iter()
                    .map(|base| base.join(&command.argument))
                    .collect()
            };
            let mut contents = None;
            for target in targets {
                match host.read(&target) {
                    ReadOutcome::Found(text) => {
                        contents = Some(text);
                        break;
                    }
                    ReadOutcome::Missing => {}
                    ReadOutcome::Unknown => pending.push(target),
                }
            }
            let Some(contents) = contents else { continue };
            let Some(value) = parse_globals_file(&command.argument, &contents) else {
                log::warn!("could not parse globals file {}", command.argument);
                continue;
            };
            if is_json_schema(&value) {
                let info = schema_to_type(&value, &value);
                if let Some(properties) = info.properties {
                    for (name, prop) in properties {
                        if let Some(prop_type) =
                            crate::types::builtins::resolve_type(&prop)
                        {
                            self.globals.set_typed(&name, prop_type, Some(uri));
                        }
                    }
                }
            } else if !self.globals.set_globals(&value, Some(uri), true) {
                log::warn!("globals file {} is not an object", command.argument);
            }
        }
    }

    // ── Filter and test tables (built-ins + configuration) ─────────────

    /// The type of a filter by name, configuration first.
    pub fn filter_type(&self, name: &str) -> Option<TypeInfo> {
        if let Some(signature) = self.settings.extra_filters.get(name) {
            return Some(signature_type(signature));
        }
        BUILTIN_FILTERS.get(name).cloned()
    }

    /// The type of a test by name, configuration first.
    pub fn test_type(&self, name: &str) -> Option<TypeInfo> {
        if let Some(signature) = self.settings.extra_tests.get(name) {
            return Some(signature_type(signature));
        }
        BUILTIN_TESTS.get(name).cloned()
    }

    /// All filters available, for completion.
    pub fn filter_names(&self) -> Vec<(String, TypeInfo)> {
        let mut out: Vec<(String, TypeInfo)> = BUILTIN_FILTERS
            .iter()
            .filter(|(name, _)| !self.settings.extra_filters.contains_key(**name))
            .map(|(name, info)| (name.to_string(), info.clone()))
            .collect();
        for (name, signature) in &self.settings.extra_filters {
            out.push((name.clone(), signature_type(signature)));
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// All tests available, for completion.
    pub fn test_names(&self) -> Vec<(String, TypeInfo)> {
        let mut out: Vec<(String, TypeInfo)> = BUILTIN_TESTS
            .iter()
            .filter(|(name, _)| !self.settings.extra_tests.contains_key(**name))
            .map(|(name, info)| (name.to_string(), info.clone()))
            .collect();
        for (name, signature) in &self.settings.extra_tests {
            out.push((name.clone(), signature_type(signature)));
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

fn signature_type(signature: &Signature) -> TypeInfo {
    TypeInfo {
        signature: Some(signature.clone()),
        documentation: signature.documentation.clone(),
        ..TypeInfo::default()
    }
}

/// A resolved import target's element for document links and warnings.
pub struct ImportView<'d> {
    pub statement: NodeId,
    pub source: String,
    pub literal: NodeId,
    pub target: Option<&'d Uri>,
}

/// The imports of a document with their source literals, for diagnostics
/// and document links.
pub fn import_views<'d>(doc: &'d Document) -> Vec<ImportView<'d>> {
    let mut out = Vec::new();
    for (stmt, target) in &doc.imports {
        let Some((source, literal)) = imports::import_source(&doc.tree, *stmt) else {
            continue;
        };
        out.push(ImportView {
            statement: *stmt,
            source,
            literal,
            target: target.as_ref(),
        });
    }
    out
}
