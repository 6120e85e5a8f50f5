//! Language Server Protocol implementation for Jinja templates.
//!
//! Editors get diagnostics, hover, go-to-definition, completion,
//! signature help, semantic tokens, document links, and quick fixes,
//! all computed by the `jinja-analysis` core. The server speaks stdio
//! JSON-RPC via the `tower-lsp` framework and extends the protocol with
//! `jinja/readFile` (server → client file reads) and `jinja/setGlobals`
//! (client-supplied template globals).

pub mod code_actions;
pub mod completion;
pub mod convert;
pub mod definition;
pub mod diagnostics;
pub mod document_links;
pub mod file_cache;
pub mod hover;
pub mod protocol;
pub mod semantic_tokens;
pub mod server;
pub mod signature_help;

use tower_lsp::{LspService, Server};

use server::JinjaBackend;

/// Run the Jinja LSP server on stdin/stdout.
///
/// Sets up the tower-lsp service with the custom `jinja/setGlobals`
/// method and runs the event loop until the client disconnects.
pub async fn run_server() {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::build(JinjaBackend::new)
        .custom_method("jinja/setGlobals", JinjaBackend::set_globals)
        .finish();
    Server::new(stdin, stdout, socket).serve(service).await;
}
