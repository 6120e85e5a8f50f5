//! Server configuration recognized by the analysis core.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::types::ty::Signature;

/// Options the editor can configure, usually via initialization options
/// or `workspace/didChangeConfiguration`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Additional roots for import resolution.
    #[serde(rename = "importURIs")]
    pub import_uris: Vec<String>,
    /// Additional suffixes treated as template files during path
    /// completion, on top of `.jinja` and `.j2`.
    pub extra_file_extensions: Vec<String>,
    /// User-defined tests, merged over the built-ins.
    pub extra_tests: BTreeMap<String, Signature>,
    /// User-defined filters, merged over the built-ins.
    pub extra_filters: BTreeMap<String, Signature>,
}

impl Settings {
    /// All file extensions accepted as templates.
    pub fn template_extensions(&self) -> Vec<String> {
        let mut extensions = vec![".jinja".to_string(), ".j2".to_string()];
        for extra in &self.extra_file_extensions {
            let ext = if extra.starts_with('.') {
                extra.clone()
            } else {
                format!(".{extra}")
            };
            if !extensions.contains(&ext) {
                extensions.push(ext);
            }
        }
        extensions
    }
}
