//! Document links: one link per import statement whose source resolves.

use tower_lsp::lsp_types::{DocumentLink, Url};

use jinja_analysis::workspace::import_views;
use jinja_analysis::Document;

use crate::convert;

pub fn links(doc: &Document) -> Vec<DocumentLink> {
    let mut links = Vec::new();
    for import in import_views(doc) {
        let Some(target) = import.target else { continue };
        let Ok(target) = Url::parse(target.as_str()) else {
            continue;
        };
        links.push(DocumentLink {
            range: convert::range(&doc.line_index, doc.tree.span(import.literal)),
            target: Some(target),
            tooltip: None,
            data: None,
        });
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;
    use jinja_analysis::host::{MemoryHost, Uri};
    use jinja_analysis::Workspace;

    #[test]
    fn resolved_imports_become_links() {
        let mut host = MemoryHost::new();
        host.insert("file:///t/lib.jinja", "");
        let mut ws = Workspace::new();
        let uri = Uri::new("file:///t/main.jinja");
        let source = "{% include \"lib.jinja\" %}{% include \"missing.jinja\" %}";
        ws.open_document(uri.clone(), source.to_string(), 1, &host);

        let links = links(ws.document(&uri).unwrap());
        assert_eq!(links.len(), 1);
        assert_eq!(
            links[0].target.as_ref().unwrap().as_str(),
            "file:///t/lib.jinja"
        );
    }
}
