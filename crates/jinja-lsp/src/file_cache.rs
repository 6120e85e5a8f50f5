//! The server's [`ReadUri`] implementation.
//!
//! File contents arrive asynchronously through `jinja/readFile`; the
//! synchronous analysis core sees them through this cache. A URI that
//! has not been fetched yet reads as `Unknown`, which the server's fetch
//! loop turns into a client request before re-running analysis.
//! Directory listing (path completion) uses the local filesystem for
//! `file://` roots, the custom protocol has no listing request.

use rustc_hash::FxHashMap;

use jinja_analysis::host::{DirEntry, ReadOutcome, ReadUri, Uri};

#[derive(Default)]
pub struct FileCache {
    entries: FxHashMap<Uri, Option<String>>,
}

impl FileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the client's answer for a URI (`None` = file absent).
    pub fn store(&mut self, uri: Uri, contents: Option<String>) {
        self.entries.insert(uri, contents);
    }

    /// Whether the client has been asked about this URI already.
    pub fn knows(&self, uri: &Uri) -> bool {
        self.entries.contains_key(uri)
    }

    /// Forget a URI so the next analysis fetches it again.
    pub fn invalidate(&mut self, uri: &Uri) {
        self.entries.remove(uri);
    }
}

impl ReadUri for FileCache {
    fn read(&self, uri: &Uri) -> ReadOutcome {
        match self.entries.get(uri) {
            Some(Some(contents)) => ReadOutcome::Found(contents.clone()),
            Some(None) => ReadOutcome::Missing,
            None => ReadOutcome::Unknown,
        }
    }

    fn list_dir(&self, uri: &Uri) -> Option<Vec<DirEntry>> {
        let path = uri.as_str().strip_prefix("file://")?;
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path).ok()? {
            let entry = entry.ok()?;
            let name = entry.file_name().to_string_lossy().to_string();
            let is_dir = entry.file_type().ok()?.is_dir();
            entries.push(DirEntry { name, is_dir });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Some(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_until_stored() {
        let mut cache = FileCache::new();
        let uri = Uri::new("file:///t/a.jinja");
        assert_eq!(cache.read(&uri), ReadOutcome::Unknown);
        assert!(!cache.knows(&uri));

        cache.store(uri.clone(), Some("text".into()));
        assert_eq!(cache.read(&uri), ReadOutcome::Found("text".into()));
        assert!(cache.knows(&uri));

        cache.store(uri.clone(), None);
        assert_eq!(cache.read(&uri), ReadOutcome::Missing);

        cache.invalidate(&uri);
        assert_eq!(cache.read(&uri), ReadOutcome::Unknown);
    }
}
