//! Scripted launcher and client used by unit tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lsp_types::{
	CompletionItem, CompletionOptions, CompletionParams, CompletionResponse, Hover, HoverParams, HoverProviderCapability, InitializeParams,
	InitializeResult, ServerCapabilities, SignatureHelp, SignatureHelpOptions, SignatureHelpParams,
};
use parking_lot::Mutex;

use crate::binding::BindingRegistry;
use crate::client::{LanguageClient, ServerLauncher};
use crate::definition::{ServerCatalog, ServerDefinition};
use crate::pool::ConnectionPool;
use crate::{Error, Result};

pub(crate) fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().with_max_level(tracing::Level::DEBUG).try_init();
}

/// Scripted reply: an optional delay, then a value or an error message.
#[derive(Clone)]
pub(crate) struct Reply<T> {
	delay: Duration,
	result: std::result::Result<T, String>,
}

impl<T: Clone> Reply<T> {
	pub(crate) fn ok(value: T) -> Self {
		Self {
			delay: Duration::ZERO,
			result: Ok(value),
		}
	}

	pub(crate) fn err(message: &str) -> Self {
		Self {
			delay: Duration::ZERO,
			result: Err(message.to_string()),
		}
	}

	pub(crate) fn after(mut self, delay: Duration) -> Self {
		self.delay = delay;
		self
	}

	async fn resolve(&self) -> Result<T> {
		if !self.delay.is_zero() {
			tokio::time::sleep(self.delay).await;
		}
		self.result.clone().map_err(|message| Error::Response { code: -32603, message })
	}
}

#[derive(Default)]
pub(crate) struct CallCounts {
	pub(crate) completion: AtomicUsize,
	pub(crate) hover: AtomicUsize,
	pub(crate) signature_help: AtomicUsize,
	pub(crate) shutdown: AtomicUsize,
}

/// Behaviour of one fake server.
#[derive(Clone)]
pub(crate) struct FakeServer {
	capabilities: ServerCapabilities,
	launch_delay: Duration,
	launch_error: Option<String>,
	initialize_error: Option<String>,
	completion: Reply<Option<CompletionResponse>>,
	hover: Reply<Option<Hover>>,
	signature_help: Reply<Option<SignatureHelp>>,
	pub(crate) calls: Arc<CallCounts>,
}

impl FakeServer {
	pub(crate) fn new() -> Self {
		Self {
			capabilities: all_features(),
			launch_delay: Duration::ZERO,
			launch_error: None,
			initialize_error: None,
			completion: Reply::ok(None),
			hover: Reply::ok(None),
			signature_help: Reply::ok(None),
			calls: Arc::default(),
		}
	}

	pub(crate) fn capabilities(mut self, capabilities: ServerCapabilities) -> Self {
		self.capabilities = capabilities;
		self
	}

	pub(crate) fn launch_delay(mut self, delay: Duration) -> Self {
		self.launch_delay = delay;
		self
	}

	pub(crate) fn launch_error(mut self, reason: &str) -> Self {
		self.launch_error = Some(reason.to_string());
		self
	}

	pub(crate) fn initialize_error(mut self, reason: &str) -> Self {
		self.initialize_error = Some(reason.to_string());
		self
	}

	pub(crate) fn completion(mut self, reply: Reply<Option<CompletionResponse>>) -> Self {
		self.completion = reply;
		self
	}

	pub(crate) fn completion_items(self, items: Vec<CompletionItem>) -> Self {
		self.completion(Reply::ok(Some(CompletionResponse::Array(items))))
	}

	pub(crate) fn hover(mut self, reply: Reply<Option<Hover>>) -> Self {
		self.hover = reply;
		self
	}

	pub(crate) fn signature_help(mut self, reply: Reply<Option<SignatureHelp>>) -> Self {
		self.signature_help = reply;
		self
	}
}

struct FakeClient {
	server: FakeServer,
}

#[async_trait]
impl LanguageClient for FakeClient {
	async fn initialize(&self, _params: InitializeParams) -> Result<InitializeResult> {
		if let Some(reason) = &self.server.initialize_error {
			return Err(Error::Response {
				code: -32002,
				message: reason.clone(),
			});
		}
		Ok(InitializeResult {
			capabilities: self.server.capabilities.clone(),
			server_info: None,
		})
	}

	async fn completion(&self, _params: CompletionParams) -> Result<Option<CompletionResponse>> {
		self.server.calls.completion.fetch_add(1, Ordering::SeqCst);
		self.server.completion.resolve().await
	}

	async fn hover(&self, _params: HoverParams) -> Result<Option<Hover>> {
		self.server.calls.hover.fetch_add(1, Ordering::SeqCst);
		self.server.hover.resolve().await
	}

	async fn signature_help(&self, _params: SignatureHelpParams) -> Result<Option<SignatureHelp>> {
		self.server.calls.signature_help.fetch_add(1, Ordering::SeqCst);
		self.server.signature_help.resolve().await
	}

	async fn shutdown(&self) -> Result<()> {
		self.server.calls.shutdown.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}

/// Launcher serving [`FakeServer`] scripts by definition id.
#[derive(Default)]
pub(crate) struct FakeLauncher {
	servers: Mutex<HashMap<String, FakeServer>>,
	launches: Mutex<Vec<String>>,
}

impl FakeLauncher {
	pub(crate) fn new() -> Self {
		Self::default()
	}

	pub(crate) fn with(self, id: &str, server: FakeServer) -> Self {
		self.set(id, server);
		self
	}

	pub(crate) fn set(&self, id: &str, server: FakeServer) {
		self.servers.lock().insert(id.to_string(), server);
	}

	pub(crate) fn launches(&self, id: &str) -> usize {
		self.launches.lock().iter().filter(|launched| launched.as_str() == id).count()
	}
}

#[async_trait]
impl ServerLauncher for FakeLauncher {
	async fn launch(&self, definition: &ServerDefinition, _root: &Path) -> Result<Arc<dyn LanguageClient>> {
		let id = definition.id.to_string();
		self.launches.lock().push(id.clone());
		let server = self.servers.lock().get(&id).cloned().ok_or_else(|| Error::Launch {
			server: id.clone(),
			reason: "no such executable".into(),
		})?;

		if !server.launch_delay.is_zero() {
			tokio::time::sleep(server.launch_delay).await;
		}
		if let Some(reason) = &server.launch_error {
			return Err(Error::Launch {
				server: id,
				reason: reason.clone(),
			});
		}
		Ok(Arc::new(FakeClient { server }))
	}
}

pub(crate) fn all_features() -> ServerCapabilities {
	ServerCapabilities {
		completion_provider: Some(CompletionOptions {
			trigger_characters: Some(vec![".".into()]),
			..Default::default()
		}),
		hover_provider: Some(HoverProviderCapability::Simple(true)),
		signature_help_provider: Some(SignatureHelpOptions {
			trigger_characters: Some(vec!["(".into()]),
			..Default::default()
		}),
		..Default::default()
	}
}

/// Definition serving `.rs` files with a one second startup bound.
pub(crate) fn rust_definition(id: &str) -> ServerDefinition {
	ServerDefinition::new(id, id).extensions(["rs"]).startup_timeout(Duration::from_secs(1))
}

pub(crate) fn registry(launcher: &Arc<FakeLauncher>, definitions: Vec<ServerDefinition>) -> BindingRegistry {
	let catalog = ServerCatalog::new(definitions).expect("unique ids");
	BindingRegistry::new(ConnectionPool::new(launcher.clone()), Arc::new(catalog))
}

pub(crate) fn item(label: &str, sort_text: Option<&str>) -> CompletionItem {
	CompletionItem {
		label: label.to_string(),
		sort_text: sort_text.map(String::from),
		..Default::default()
	}
}
