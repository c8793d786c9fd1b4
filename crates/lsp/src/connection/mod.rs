//! Server connections and their lifecycle.
//!
//! A [`ServerConnection`] is a cheap, clonable handle to one server session bound to a workspace
//! root. The lifecycle is a small state machine:
//!
//! ```text
//! Starting ──► Initializing ──► Running ──► Stopped
//!     │              │             │
//!     └──────────────┴─────────────┴──────► Failed
//! ```
//!
//! `Stopped` and `Failed` are terminal: once reached, the state never changes again. Only the
//! [`ConnectionPool`](crate::pool::ConnectionPool) drives transitions; everything else observes.

mod state;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use lsp_types::{
	CompletionParams, CompletionResponse, Hover, HoverParams, ServerCapabilities, SignatureHelp, SignatureHelpParams,
};
use parking_lot::Mutex;
use tokio::sync::watch;

pub use state::ConnectionState;

use crate::capability::CapabilityPredicate;
use crate::client::LanguageClient;
use crate::definition::{ServerDefinition, ServerDefinitionId};
use crate::document::OffsetEncoding;
use crate::{Error, Result};

/// Identity of a connection: a stable slot per key plus a generation per launch.
///
/// A new generation is allocated every time a key is launched afresh, so reports about a
/// superseded launch can be told apart from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId {
	/// Slot assigned to the `(definition, root)` key.
	pub slot: u32,
	/// Launch generation within the slot, starting at 1.
	pub generation: u32,
}

impl fmt::Display for ConnectionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "LSP#{}.{}", self.slot, self.generation)
	}
}

/// Pool key: one live connection per server definition and workspace root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
	/// Server definition identifier.
	pub definition: ServerDefinitionId,
	/// Workspace root.
	pub root: PathBuf,
}

struct Inner {
	id: ConnectionId,
	key: ConnectionKey,
	definition: Arc<ServerDefinition>,
	state_tx: watch::Sender<ConnectionState>,
	capabilities: OnceLock<ServerCapabilities>,
	client: OnceLock<Arc<dyn LanguageClient>>,
	failure: Mutex<Option<Error>>,
}

/// Handle to one language server session.
#[derive(Clone)]
pub struct ServerConnection {
	inner: Arc<Inner>,
}

impl fmt::Debug for ServerConnection {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ServerConnection")
			.field("id", &self.inner.id)
			.field("server", &self.inner.key.definition)
			.field("root", &self.inner.key.root)
			.field("state", &self.state())
			.finish_non_exhaustive()
	}
}

impl ServerConnection {
	pub(crate) fn new(id: ConnectionId, definition: Arc<ServerDefinition>, root: PathBuf) -> Self {
		let (state_tx, _) = watch::channel(ConnectionState::Starting);
		Self {
			inner: Arc::new(Inner {
				id,
				key: ConnectionKey {
					definition: definition.id.clone(),
					root,
				},
				definition,
				state_tx,
				capabilities: OnceLock::new(),
				client: OnceLock::new(),
				failure: Mutex::new(None),
			}),
		}
	}

	/// Connection identity.
	pub fn id(&self) -> ConnectionId {
		self.inner.id
	}

	/// Pool key.
	pub fn key(&self) -> &ConnectionKey {
		&self.inner.key
	}

	/// Server definition this connection was launched from.
	pub fn definition(&self) -> &Arc<ServerDefinition> {
		&self.inner.definition
	}

	/// Workspace root.
	pub fn root(&self) -> &Path {
		&self.inner.key.root
	}

	/// Current lifecycle state.
	pub fn state(&self) -> ConnectionState {
		*self.inner.state_tx.borrow()
	}

	/// Check if the connection accepts requests (non-blocking).
	pub fn is_running(&self) -> bool {
		self.state() == ConnectionState::Running
	}

	/// Subscribe to state changes.
	pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
		self.inner.state_tx.subscribe()
	}

	/// Cause recorded when the connection failed.
	pub fn failure(&self) -> Option<Error> {
		self.inner.failure.lock().clone()
	}

	/// Capability snapshot, available only while running.
	pub fn capabilities(&self) -> Option<&ServerCapabilities> {
		if self.is_running() { self.inner.capabilities.get() } else { None }
	}

	/// Evaluates `predicate` against the capability snapshot.
	///
	/// A connection that is not running is judged as if it advertised nothing.
	pub fn matches(&self, predicate: CapabilityPredicate) -> bool {
		match self.capabilities() {
			Some(capabilities) => predicate(capabilities),
			None => predicate(&ServerCapabilities::default()),
		}
	}

	/// Offset encoding negotiated with the server.
	pub fn offset_encoding(&self) -> OffsetEncoding {
		self.capabilities()
			.and_then(|capabilities| capabilities.position_encoding.as_ref())
			.and_then(OffsetEncoding::from_lsp)
			.unwrap_or_default()
	}

	/// Waits until the connection is running.
	///
	/// # Errors
	///
	/// Returns the recorded failure (or [`Error::ServiceStopped`]) if the connection reaches a
	/// terminal state first, and [`Error::RequestTimeout`] once `timeout` elapses.
	pub async fn wait_running(&self, timeout: Duration) -> Result<()> {
		let mut state_rx = self.inner.state_tx.subscribe();
		let wait = async {
			loop {
				let state = *state_rx.borrow_and_update();
				match state {
					ConnectionState::Running => return Ok(()),
					ConnectionState::Failed => return Err(self.failure().unwrap_or(Error::ServiceStopped)),
					ConnectionState::Stopped => return Err(Error::ServiceStopped),
					ConnectionState::Starting | ConnectionState::Initializing => {
						if state_rx.changed().await.is_err() {
							return Err(Error::ServiceStopped);
						}
					}
				}
			}
		};

		match tokio::time::timeout(timeout, wait).await {
			Ok(result) => result,
			Err(_) => Err(Error::RequestTimeout(format!("{} to start", self.inner.key.definition))),
		}
	}

	/// `textDocument/completion`.
	pub async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
		self.running_client()?.completion(params).await
	}

	/// `textDocument/hover`.
	pub async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
		self.running_client()?.hover(params).await
	}

	/// `textDocument/signatureHelp`.
	pub async fn signature_help(&self, params: SignatureHelpParams) -> Result<Option<SignatureHelp>> {
		self.running_client()?.signature_help(params).await
	}

	fn running_client(&self) -> Result<Arc<dyn LanguageClient>> {
		match (self.state(), self.inner.client.get()) {
			(ConnectionState::Running, Some(client)) => Ok(Arc::clone(client)),
			_ => Err(Error::NotRunning(self.inner.key.definition.to_string())),
		}
	}

	pub(crate) fn client(&self) -> Option<Arc<dyn LanguageClient>> {
		self.inner.client.get().cloned()
	}

	pub(crate) fn attach_client(&self, client: Arc<dyn LanguageClient>) {
		let _ = self.inner.client.set(client);
	}

	/// Applies `next` if the state machine allows it. Returns whether the state changed.
	pub(crate) fn transition(&self, next: ConnectionState) -> bool {
		self.inner.state_tx.send_if_modified(|state| {
			if state.can_transition_to(next) {
				*state = next;
				true
			} else {
				false
			}
		})
	}

	/// Publishes the handshake result and enters `Running`.
	pub(crate) fn mark_running(&self, capabilities: ServerCapabilities) -> bool {
		let _ = self.inner.capabilities.set(capabilities);
		self.transition(ConnectionState::Running)
	}

	/// Records `cause` and enters `Failed`. A terminal connection keeps its original cause.
	pub(crate) fn fail(&self, cause: Error) -> bool {
		let mut failure = self.inner.failure.lock();
		if self.state().is_terminal() {
			return false;
		}
		*failure = Some(cause);
		self.transition(ConnectionState::Failed)
	}
}

#[cfg(test)]
mod tests;
