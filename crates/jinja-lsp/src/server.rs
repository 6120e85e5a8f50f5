//! Tower-lsp backend for the Jinja language server.
//!
//! The analysis core is synchronous; this backend owns it behind one
//! async mutex, fetches the files analysis asks for through the
//! `jinja/readFile` client request, and re-runs analysis until nothing
//! is pending. Handlers run to completion in dispatch order.

use tokio::sync::Mutex;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};

use jinja_analysis::host::Uri;
use jinja_analysis::{Settings, Workspace};

use crate::file_cache::FileCache;
use crate::protocol::{ReadFileParams, ReadFileRequest, SetGlobalsParams, SetGlobalsResult};
use crate::{
    code_actions, completion, convert, definition, diagnostics, document_links, hover,
    semantic_tokens, signature_help,
};

struct State {
    workspace: Workspace,
    files: FileCache,
}

/// The Jinja LSP backend.
pub struct JinjaBackend {
    client: Client,
    state: Mutex<State>,
}

impl JinjaBackend {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            state: Mutex::new(State {
                workspace: Workspace::new(),
                files: FileCache::new(),
            }),
        }
    }

    /// `jinja/setGlobals`: install user globals globally or per document.
    pub async fn set_globals(&self, params: SetGlobalsParams) -> Result<SetGlobalsResult> {
        let uri = params.uri.map(Uri::new);
        let success = {
            let mut state = self.state.lock().await;
            state
                .workspace
                .globals
                .set_globals(&params.globals, uri.as_ref(), params.merge)
        };
        if let Some(uri) = uri {
            self.reanalyze_and_publish(uri).await;
        }
        Ok(SetGlobalsResult { success })
    }

    /// Analyze a document, fetching whatever the host needs, and publish
    /// its diagnostics.
    async fn analyze_and_publish(&self, url: Url, text: String, version: i32) {
        let uri = Uri::new(url.to_string());
        let mut pending = {
            let mut state = self.state.lock().await;
            let state = &mut *state;
            state
                .workspace
                .open_document(uri.clone(), text, version, &state.files)
        };
        self.drain_pending(&uri, &mut pending).await;
        self.publish(&uri, url, Some(version)).await;
    }

    async fn reanalyze_and_publish(&self, uri: Uri) {
        let mut pending = {
            let mut state = self.state.lock().await;
            let state = &mut *state;
            state.workspace.reanalyze(&uri, &state.files)
        };
        self.drain_pending(&uri, &mut pending).await;
        if let Ok(url) = Url::parse(uri.as_str()) {
            self.publish(&uri, url, None).await;
        }
    }

    /// Fetch pending URIs from the client and re-run analysis until the
    /// workspace stops asking for more.
    async fn drain_pending(&self, uri: &Uri, pending: &mut Vec<Uri>) {
        while !pending.is_empty() {
            let mut fetched = false;
            for requested in pending.iter() {
                let known = self.state.lock().await.files.knows(requested);
                if known {
                    continue;
                }
                let contents = match self
                    .client
                    .send_request::<ReadFileRequest>(ReadFileParams {
                        uri: requested.to_string(),
                    })
                    .await
                {
                    Ok(result) => result.contents,
                    // A rejected read means the file is absent.
                    Err(_) => None,
                };
                self.state
                    .lock()
                    .await
                    .files
                    .store(requested.clone(), contents);
                fetched = true;
            }
            if !fetched {
                break;
            }
            let mut state = self.state.lock().await;
            let state = &mut *state;
            *pending = state.workspace.reanalyze(uri, &state.files);
        }
    }

    async fn publish(&self, uri: &Uri, url: Url, version: Option<i32>) {
        let diagnostics = {
            let state = self.state.lock().await;
            state
                .workspace
                .document(uri)
                .map(diagnostics::collect)
                .unwrap_or_default()
        };
        self.client.publish_diagnostics(url, diagnostics, version).await;
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for JinjaBackend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        {
            let mut state = self.state.lock().await;
            if let Some(options) = params.initialization_options {
                if let Ok(settings) = serde_json::from_value::<Settings>(options) {
                    state.workspace.set_settings(settings);
                }
            }
            if let Some(folders) = params.workspace_folders {
                for folder in folders {
                    state.workspace.add_root(Uri::new(folder.uri.to_string()));
                }
            } else if let Some(root) = params.root_uri {
                state.workspace.add_root(Uri::new(root.to_string()));
            }
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                definition_provider: Some(OneOf::Left(true)),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(
                        [".", "(", ",", "|", "\"", "/", " "]
                            .iter()
                            .map(|s| s.to_string())
                            .collect(),
                    ),
                    resolve_provider: Some(false),
                    ..CompletionOptions::default()
                }),
                signature_help_provider: Some(SignatureHelpOptions {
                    trigger_characters: Some(vec!["(".to_string(), ",".to_string()]),
                    retrigger_characters: None,
                    work_done_progress_options: WorkDoneProgressOptions::default(),
                }),
                semantic_tokens_provider: Some(
                    SemanticTokensServerCapabilities::SemanticTokensOptions(
                        SemanticTokensOptions {
                            legend: semantic_tokens::legend(),
                            full: Some(SemanticTokensFullOptions::Bool(true)),
                            range: None,
                            work_done_progress_options: WorkDoneProgressOptions::default(),
                        },
                    ),
                ),
                document_link_provider: Some(DocumentLinkOptions {
                    resolve_provider: Some(false),
                    work_done_progress_options: WorkDoneProgressOptions::default(),
                }),
                code_action_provider: Some(CodeActionProviderCapability::Options(
                    CodeActionOptions {
                        code_action_kinds: Some(vec![CodeActionKind::QUICKFIX]),
                        ..CodeActionOptions::default()
                    },
                )),
                ..ServerCapabilities::default()
            },
            ..InitializeResult::default()
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "Jinja language server initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        let value = params
            .settings
            .get("jinja-ls")
            .cloned()
            .unwrap_or(params.settings);
        if let Ok(settings) = serde_json::from_value::<Settings>(value) {
            let mut state = self.state.lock().await;
            state.workspace.set_settings(settings);
        }
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;
        let text = params.text_document.text;
        let version = params.text_document.version;
        self.analyze_and_publish(uri, text, version).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let version = params.text_document.version;
        // FULL sync: the first change carries the whole document.
        if let Some(change) = params.content_changes.into_iter().next() {
            self.analyze_and_publish(uri, change.text, version).await;
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = Uri::new(params.text_document.uri.to_string());
        {
            let mut state = self.state.lock().await;
            state.workspace.close_document(&uri);
            state.files.invalidate(&uri);
        }
        self.client
            .publish_diagnostics(params.text_document.uri, vec![], None)
            .await;
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let position = params.text_document_position_params.position;
        let uri = Uri::new(
            params
                .text_document_position_params
                .text_document
                .uri
                .to_string(),
        );
        let state = self.state.lock().await;
        let Some(doc) = state.workspace.document(&uri) else {
            return Ok(None);
        };
        let offset = convert::offset(&doc.line_index, &position);
        Ok(hover::hover(&state.workspace, &uri, offset).map(|(value, span)| Hover {
            contents: HoverContents::Markup(MarkupContent {
                kind: MarkupKind::Markdown,
                value,
            }),
            range: Some(convert::range(&doc.line_index, span)),
        }))
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let position = params.text_document_position_params.position;
        let uri = Uri::new(
            params
                .text_document_position_params
                .text_document
                .uri
                .to_string(),
        );
        let state = self.state.lock().await;
        let Some(doc) = state.workspace.document(&uri) else {
            return Ok(None);
        };
        let offset = convert::offset(&doc.line_index, &position);
        let Some((target, span)) = definition::find_definition(&state.workspace, &uri, offset)
        else {
            return Ok(None);
        };
        let Some(target_doc) = state.workspace.document(&target) else {
            return Ok(None);
        };
        let Ok(target_url) = Url::parse(target.as_str()) else {
            return Ok(None);
        };
        Ok(Some(GotoDefinitionResponse::Scalar(Location {
            uri: target_url,
            range: convert::range(&target_doc.line_index, span),
        })))
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let position = params.text_document_position.position;
        let uri = Uri::new(params.text_document_position.text_document.uri.to_string());
        let state = self.state.lock().await;
        let Some(doc) = state.workspace.document(&uri) else {
            return Ok(None);
        };
        let offset = convert::offset(&doc.line_index, &position);
        let items = completion::completions(&state.workspace, &uri, offset, &state.files);
        if items.is_empty() {
            return Ok(None);
        }
        Ok(Some(CompletionResponse::Array(items)))
    }

    async fn signature_help(&self, params: SignatureHelpParams) -> Result<Option<SignatureHelp>> {
        let position = params.text_document_position_params.position;
        let uri = Uri::new(
            params
                .text_document_position_params
                .text_document
                .uri
                .to_string(),
        );
        let state = self.state.lock().await;
        let Some(doc) = state.workspace.document(&uri) else {
            return Ok(None);
        };
        let offset = convert::offset(&doc.line_index, &position);
        Ok(signature_help::signature_help(&state.workspace, &uri, offset))
    }

    async fn semantic_tokens_full(
        &self,
        params: SemanticTokensParams,
    ) -> Result<Option<SemanticTokensResult>> {
        let uri = Uri::new(params.text_document.uri.to_string());
        let state = self.state.lock().await;
        let Some(doc) = state.workspace.document(&uri) else {
            return Ok(None);
        };
        Ok(Some(SemanticTokensResult::Tokens(SemanticTokens {
            result_id: None,
            data: semantic_tokens::full(doc),
        })))
    }

    async fn document_link(
        &self,
        params: DocumentLinkParams,
    ) -> Result<Option<Vec<DocumentLink>>> {
        let uri = Uri::new(params.text_document.uri.to_string());
        let state = self.state.lock().await;
        let Some(doc) = state.workspace.document(&uri) else {
            return Ok(None);
        };
        Ok(Some(document_links::links(doc)))
    }

    async fn code_action(&self, params: CodeActionParams) -> Result<Option<CodeActionResponse>> {
        let url = params.text_document.uri;
        let uri = Uri::new(url.to_string());
        let state = self.state.lock().await;
        let Some(doc) = state.workspace.document(&uri) else {
            return Ok(None);
        };
        let diagnostics = diagnostics::collect(doc);
        let actions = code_actions::quick_fixes(&url, &diagnostics, params.range);
        if actions.is_empty() {
            return Ok(None);
        }
        Ok(Some(actions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn server_capabilities() {
        let (service, _) = tower_lsp::LspService::new(JinjaBackend::new);
        let server = service.inner();
        let result = server.initialize(InitializeParams::default()).await.unwrap();

        let caps = result.capabilities;
        assert!(caps.hover_provider.is_some());
        assert!(caps.definition_provider.is_some());
        assert!(caps.completion_provider.is_some());
        assert!(caps.signature_help_provider.is_some());
        assert!(caps.semantic_tokens_provider.is_some());
        assert!(caps.document_link_provider.is_some());
        assert!(caps.code_action_provider.is_some());

        let triggers = caps
            .completion_provider
            .unwrap()
            .trigger_characters
            .unwrap();
        for trigger in [".", "(", ",", "|", "\"", "/", " "] {
            assert!(triggers.contains(&trigger.to_string()));
        }
    }
}
