//! Collaborator seams: launching servers and talking to them.
//!
//! Process spawning, JSON-RPC framing and message routing live behind these two traits. A
//! [`ServerLauncher`] turns a [`ServerDefinition`] and a workspace root into a connected
//! [`LanguageClient`]; the connection pool then drives the `initialize` handshake through it.
//!
//! Both traits are object safe so the pool can hold `Arc<dyn ServerLauncher>` and tests can inject
//! scripted servers without spawning processes.

mod capabilities;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use lsp_types::{
	CompletionParams, CompletionResponse, Hover, HoverParams, InitializeParams, InitializeResult, SignatureHelp, SignatureHelpParams,
};

pub use capabilities::{client_capabilities, initialize_params};

use crate::Result;
use crate::definition::ServerDefinition;

/// Async request stub for one connected language server.
///
/// Every method resolves to a single result or fails with a transport/protocol error. Methods may
/// be called concurrently from several tasks.
#[async_trait]
pub trait LanguageClient: Send + Sync {
	/// Performs the `initialize`/`initialized` exchange.
	async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult>;

	/// `textDocument/completion`.
	async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>>;

	/// `textDocument/hover`.
	async fn hover(&self, params: HoverParams) -> Result<Option<Hover>>;

	/// `textDocument/signatureHelp`.
	async fn signature_help(&self, params: SignatureHelpParams) -> Result<Option<SignatureHelp>>;

	/// `shutdown` followed by `exit`.
	async fn shutdown(&self) -> Result<()>;
}

/// Factory for server processes.
#[async_trait]
pub trait ServerLauncher: Send + Sync {
	/// Spawns the server described by `definition` for the workspace at `root`.
	///
	/// The returned client must accept the `initialize` request; no other request is issued before
	/// the handshake completes.
	async fn launch(&self, definition: &ServerDefinition, root: &Path) -> Result<Arc<dyn LanguageClient>>;
}
