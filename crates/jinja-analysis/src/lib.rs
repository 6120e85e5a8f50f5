//! The analysis core of the Jinja language server.
//!
//! Everything here is synchronous and host-agnostic: file contents come
//! in through the [`host::ReadUri`] capability, and the [`Workspace`]
//! reports which URIs it still needs so an async driver can fetch them
//! and re-run. Editor features query documents through the workspace;
//! nothing in this crate touches the LSP transport.

pub mod document;
pub mod host;
pub mod imports;
pub mod settings;
pub mod symbols;
pub mod types;
pub mod workspace;

pub use document::Document;
pub use host::{ReadOutcome, ReadUri, Uri};
pub use settings::Settings;
pub use workspace::Workspace;
