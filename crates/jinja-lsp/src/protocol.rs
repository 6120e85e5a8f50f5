//! Custom protocol extensions between the server and its client.

use serde::{Deserialize, Serialize};
use tower_lsp::lsp_types::request::Request;

/// `jinja/readFile` (server → client): every file the analysis needs is
/// read through the editor, including imports and globals documents.
pub enum ReadFileRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadFileParams {
    pub uri: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadFileResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contents: Option<String>,
}

impl Request for ReadFileRequest {
    type Params = ReadFileParams;
    type Result = ReadFileResult;
    const METHOD: &'static str = "jinja/readFile";
}

/// `jinja/setGlobals` (client → server): install user globals, globally
/// or for a single document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetGlobalsParams {
    pub globals: serde_json::Value,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub merge: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetGlobalsResult {
    pub success: bool,
}
