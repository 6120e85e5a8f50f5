//! Import resolution: candidate URI computation and path completion.
//!
//! A source string is joined against the importing document's parent,
//! every workspace root, and every configured import URI; the first
//! candidate the host confirms wins. The workspace drives the probing so
//! it can track pending reads and loaded documents.

use jinja_parser::{NodeId, NodeKind, Slot, SyntaxTree};

use crate::host::{DirEntry, ReadUri, Uri};
use crate::settings::Settings;

/// The source string of an import statement, with the literal node for
/// diagnostics ranges. `None` when the source is not a string literal.
pub fn import_source(tree: &SyntaxTree, stmt: NodeId) -> Option<(String, NodeId)> {
    let source = tree.slot(stmt, Slot::Source)?;
    if !matches!(tree.kind(source), NodeKind::StringLiteral) {
        return None;
    }
    let token = tree.children(source).first().and_then(|&c| tree.token(c))?;
    Some((token.value.clone(), source))
}

/// All base URIs imports are resolved against, most specific first.
pub fn resolution_bases(doc_uri: &Uri, roots: &[Uri], settings: &Settings) -> Vec<Uri> {
    let mut bases = Vec::new();
    if let Some(parent) = doc_uri.parent() {
        bases.push(parent);
    }
    for root in roots {
        if !bases.contains(root) {
            bases.push(root.clone());
        }
    }
    for extra in &settings.import_uris {
        let uri = Uri::new(extra.trim_end_matches('/'));
        if !bases.contains(&uri) {
            bases.push(uri);
        }
    }
    bases
}

/// Candidate URIs for a source string, in resolution order.
pub fn candidate_uris(source: &str, doc_uri: &Uri, roots: &[Uri], settings: &Settings) -> Vec<Uri> {
    if source.is_empty() || source.ends_with('/') {
        return Vec::new();
    }
    let mut candidates = Vec::new();
    for base in resolution_bases(doc_uri, roots, settings) {
        let candidate = base.join(source);
        if !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    }
    candidates
}

/// Directory entries offered while typing an import source string.
///
/// `partial` is the string typed so far; its directory part is listed
/// across all resolution bases, files filtered to template extensions.
pub fn path_completion_entries(
    partial: &str,
    doc_uri: &Uri,
    roots: &[Uri],
    settings: &Settings,
    host: &dyn ReadUri,
) -> Vec<DirEntry> {
    let dir_end = partial.rfind('/').map(|i| i + 1).unwrap_or(0);
    let dir = &partial[..dir_end];
    let extensions = settings.template_extensions();

    let mut entries: Vec<DirEntry> = Vec::new();
    for base in resolution_bases(doc_uri, roots, settings) {
        let target = if dir.is_empty() { base } else { base.join(dir) };
        let Some(listed) = host.list_dir(&target) else {
            continue;
        };
        for entry in listed {
            if !entry.is_dir && !Uri::new(&entry.name).has_extension(&extensions) {
                continue;
            }
            if !entries.iter().any(|e| e.name == entry.name) {
                entries.push(entry);
            }
        }
    }
    entries.sort_by(|a, b| (!a.is_dir, &a.name).cmp(&(!b.is_dir, &b.name)));
    entries
}
