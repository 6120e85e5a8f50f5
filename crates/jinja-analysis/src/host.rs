//! The host capability the analysis core reads the world through.
//!
//! The core never opens files itself. Every read goes through [`ReadUri`];
//! the LSP server implements it over the `jinja/readFile` client request
//! plus a local cache, while tests implement it over an in-memory map.

use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// A document identifier. Kept as a plain string so the core does not
/// depend on any transport's URL type; joining and parent computation are
/// the only operations the resolver needs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Uri(String);

impl Uri {
    pub fn new(s: impl Into<String>) -> Self {
        Uri(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The URI with the last path segment removed, or `None` at a root.
    pub fn parent(&self) -> Option<Uri> {
        let rest = self.0.trim_end_matches('/');
        let cut = rest.rfind('/')?;
        // Never cut into the scheme's `//`.
        if rest[..cut].ends_with(':') || rest[..cut].ends_with('/') {
            return None;
        }
        Some(Uri(rest[..cut].to_string()))
    }

    /// Join a relative path onto this URI (treated as a directory),
    /// resolving `.` and `..` segments without crossing the authority.
    pub fn join(&self, rel: &str) -> Uri {
        let base = self.0.trim_end_matches('/');
        let (prefix, path) = match base.find("://") {
            Some(i) => {
                let after = &base[i + 3..];
                match after.find('/') {
                    Some(j) => (&base[..i + 3 + j], &base[i + 3 + j..]),
                    None => (base, ""),
                }
            }
            None => ("", base),
        };
        let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        for segment in rel.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                other => segments.push(other),
            }
        }
        let mut joined = String::from(prefix);
        for segment in &segments {
            joined.push('/');
            joined.push_str(segment);
        }
        if joined.is_empty() {
            joined = rel.trim_start_matches("./").to_string();
        }
        Uri(joined)
    }

    /// The last path segment.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Whether the URI names a file with one of the given extensions.
    pub fn has_extension(&self, extensions: &[String]) -> bool {
        let name = self.file_name();
        extensions.iter().any(|ext| name.ends_with(ext.as_str()))
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The result of asking the host for a file.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    /// The file exists; here are its contents.
    Found(String),
    /// The host is sure the file does not exist.
    Missing,
    /// The host has not been asked yet. The workspace records the URI as
    /// pending and the driver re-runs analysis once it has an answer.
    Unknown,
}

/// One directory entry reported by the host for path completion.
#[derive(Debug, Clone, PartialEq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Read access to the world, granted by the embedding server.
pub trait ReadUri {
    /// Fetch the contents of a document.
    fn read(&self, uri: &Uri) -> ReadOutcome;

    /// List a directory for import-path completion. `None` when the host
    /// cannot list this URI.
    fn list_dir(&self, uri: &Uri) -> Option<Vec<DirEntry>>;
}

/// An in-memory host: every URI not present is `Missing`.
///
/// Used by tests and as the building block of the server's file cache.
#[derive(Default)]
pub struct MemoryHost {
    files: FxHashMap<Uri, String>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, uri: impl Into<String>, contents: impl Into<String>) {
        self.files.insert(Uri::new(uri), contents.into());
    }
}

impl ReadUri for MemoryHost {
    fn read(&self, uri: &Uri) -> ReadOutcome {
        match self.files.get(uri) {
            Some(contents) => ReadOutcome::Found(contents.clone()),
            None => ReadOutcome::Missing,
        }
    }

    fn list_dir(&self, uri: &Uri) -> Option<Vec<DirEntry>> {
        let prefix = format!("{}/", uri.as_str().trim_end_matches('/'));
        let mut entries: Vec<DirEntry> = Vec::new();
        for file in self.files.keys() {
            let Some(rest) = file.as_str().strip_prefix(&prefix) else {
                continue;
            };
            let entry = match rest.split_once('/') {
                Some((dir, _)) => DirEntry {
                    name: dir.to_string(),
                    is_dir: true,
                },
                None => DirEntry {
                    name: rest.to_string(),
                    is_dir: false,
                },
            };
            if !entries.iter().any(|e| e.name == entry.name) {
                entries.push(entry);
            }
        }
        if entries.is_empty() {
            None
        } else {
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            Some(entries)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_strips_last_segment() {
        assert_eq!(
            Uri::new("file:///a/b/c.jinja").parent(),
            Some(Uri::new("file:///a/b"))
        );
        assert_eq!(Uri::new("file:///a").parent(), None);
    }

    #[test]
    fn join_resolves_relative_segments() {
        let base = Uri::new("file:///templates");
        assert_eq!(base.join("lib.jinja"), Uri::new("file:///templates/lib.jinja"));
        assert_eq!(base.join("./x/y.j2"), Uri::new("file:///templates/x/y.j2"));
        assert_eq!(base.join("../shared/z.jinja"), Uri::new("file:///shared/z.jinja"));
    }

    #[test]
    fn join_does_not_cross_authority() {
        let base = Uri::new("file:///a");
        assert_eq!(base.join("../../../x"), Uri::new("file:///x"));
    }

    #[test]
    fn memory_host_reads_and_lists() {
        let mut host = MemoryHost::new();
        host.insert("file:///t/lib.jinja", "{% macro m() %}{% endmacro %}");
        host.insert("file:///t/sub/a.jinja", "");
        assert!(matches!(
            host.read(&Uri::new("file:///t/lib.jinja")),
            ReadOutcome::Found(_)
        ));
        assert_eq!(host.read(&Uri::new("file:///t/nope.jinja")), ReadOutcome::Missing);

        let entries = host.list_dir(&Uri::new("file:///t")).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "lib.jinja");
        assert!(!entries[0].is_dir);
        assert_eq!(entries[1].name, "sub");
        assert!(entries[1].is_dir);
    }
}
