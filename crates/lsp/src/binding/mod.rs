//! Document binding registry.
//!
//! Maps each open document to the connections that serve it. Resolution (starting servers and
//! waiting for their handshakes) runs in a background task per document slot, so a feature
//! request never blocks longer than the wait it asks for.
//!
//! # Slots and identities
//!
//! Bindings are cached per document path (the slot). Each slot remembers the
//! [`DocumentIdentity`] it was resolved for:
//!
//! - A request with the same identity reuses the cached binding, or joins the in-flight
//!   resolution.
//! - A request with a different identity cancels the in-flight resolution and starts a new one.
//!   The superseded task publishes only into its own channel, which the slot no longer references,
//!   so it can never overwrite the newer binding.
//! - Requests for other paths never touch the slot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use lsp_types::{TextDocumentIdentifier, TextDocumentPositionParams, Uri};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::Result;
use crate::capability::CapabilityPredicate;
use crate::connection::ServerConnection;
use crate::definition::{ContentTypeResolver, ServerDefinition};
use crate::document::{Document, DocumentIdentity, OffsetEncoding};
use crate::pool::ConnectionPool;

/// Per-connection data needed to address a document in requests.
#[derive(Debug, Clone)]
pub struct RequestContext {
	uri: Uri,
}

impl RequestContext {
	/// URI of the bound document.
	pub fn uri(&self) -> &Uri {
		&self.uri
	}

	/// Builds position parameters for `offset` in `document`.
	///
	/// # Errors
	///
	/// Returns [`crate::Error::InvalidOffset`] if `offset` lies outside the document.
	pub fn position_params(&self, document: &Document, offset: usize, encoding: OffsetEncoding) -> Result<TextDocumentPositionParams> {
		Ok(TextDocumentPositionParams {
			text_document: TextDocumentIdentifier { uri: self.uri.clone() },
			position: document.position_at(offset, encoding)?,
		})
	}
}

/// A connection bound to a document.
#[derive(Debug, Clone)]
pub struct BoundConnection {
	connection: ServerConnection,
	context: RequestContext,
}

impl BoundConnection {
	/// The bound connection.
	pub fn connection(&self) -> &ServerConnection {
		&self.connection
	}

	/// Request context for the bound document.
	pub fn context(&self) -> &RequestContext {
		&self.context
	}

	/// Position parameters using the connection's negotiated encoding.
	///
	/// # Errors
	///
	/// Returns [`crate::Error::InvalidOffset`] if `offset` lies outside the document.
	pub fn position_params(&self, document: &Document, offset: usize) -> Result<TextDocumentPositionParams> {
		self.context.position_params(document, offset, self.connection.offset_encoding())
	}
}

/// Published state of one resolution.
///
/// Connections appear as soon as they run, ordered by the configuration order of their
/// definitions; `complete` flips once every definition has been tried.
#[derive(Debug, Clone, Default)]
struct Resolution {
	connections: Arc<[BoundConnection]>,
	complete: bool,
}

struct Slot {
	identity: DocumentIdentity,
	progress: watch::Receiver<Resolution>,
	cancel: CancellationToken,
}

impl Slot {
	/// A finished binding holding a dead connection is rebuilt so a relaunch can supersede it.
	fn is_reusable_for(&self, identity: DocumentIdentity) -> bool {
		if self.identity != identity {
			return false;
		}
		let resolution = self.progress.borrow();
		!(resolution.complete && resolution.connections.iter().any(|bound| bound.connection.state().is_terminal()))
	}
}

/// Document → connections registry.
pub struct BindingRegistry {
	pool: ConnectionPool,
	resolver: Arc<dyn ContentTypeResolver>,
	slots: Mutex<HashMap<PathBuf, Slot>>,
}

impl BindingRegistry {
	/// Creates a registry over `pool`, using `resolver` to pick definitions.
	pub fn new(pool: ConnectionPool, resolver: Arc<dyn ContentTypeResolver>) -> Self {
		Self {
			pool,
			resolver,
			slots: Mutex::new(HashMap::new()),
		}
	}

	/// The underlying connection pool.
	pub fn pool(&self) -> &ConnectionPool {
		&self.pool
	}

	/// Connections serving `document` whose capabilities satisfy `predicate`.
	///
	/// Waits at most `wait` for the binding to resolve. On timeout, returns the connections known
	/// so far (possibly none) while resolution continues in the background for later callers.
	/// Connections are ordered by configuration order of their definitions and are running at the
	/// time of the call. Must be called from within a Tokio runtime.
	pub async fn resolve(&self, document: &Document, predicate: CapabilityPredicate, wait: Duration) -> Vec<BoundConnection> {
		let mut progress = self.progress_for(document);

		if tokio::time::timeout(wait, progress.wait_for(|resolution| resolution.complete)).await.is_err() {
			debug!(uri = document.uri().as_str(), "Binding resolution still pending, using partial result");
		}

		let resolution = progress.borrow().clone();
		resolution
			.connections
			.iter()
			.filter(|bound| bound.connection.is_running() && bound.connection.matches(predicate))
			.cloned()
			.collect()
	}

	/// Drops the binding for the document at `path`, cancelling any in-flight resolution.
	pub fn invalidate(&self, path: &Path) {
		if let Some(slot) = self.slots.lock().remove(path) {
			slot.cancel.cancel();
		}
	}

	/// Identity the binding at `path` was resolved for.
	pub fn bound_identity(&self, path: &Path) -> Option<DocumentIdentity> {
		self.slots.lock().get(path).map(|slot| slot.identity)
	}

	/// Whether the binding at `path` is still being resolved.
	pub fn is_resolving(&self, path: &Path) -> bool {
		self.slots.lock().get(path).is_some_and(|slot| !slot.progress.borrow().complete)
	}

	/// Returns the progress channel for `document`, starting a resolution when needed.
	fn progress_for(&self, document: &Document) -> watch::Receiver<Resolution> {
		let (tx, rx, cancel) = {
			let mut slots = self.slots.lock();
			if let Some(slot) = slots.get(document.path()) {
				if slot.is_reusable_for(document.identity()) {
					return slot.progress.clone();
				}
				debug!(uri = document.uri().as_str(), stale = %slot.identity, current = %document.identity(), "Superseding document binding");
				slot.cancel.cancel();
			}

			let (tx, rx) = watch::channel(Resolution::default());
			let cancel = CancellationToken::new();
			slots.insert(
				document.path().to_path_buf(),
				Slot {
					identity: document.identity(),
					progress: rx.clone(),
					cancel: cancel.clone(),
				},
			);
			(tx, rx, cancel)
		};

		let definitions = self.resolver.definitions_for(document);
		trace!(uri = document.uri().as_str(), candidates = definitions.len(), "Resolving document binding");
		tokio::spawn(resolve_binding(
			self.pool.clone(),
			definitions,
			document.path().to_path_buf(),
			document.uri().clone(),
			tx,
			cancel,
		));
		rx
	}
}

/// Acquires a connection for every definition and publishes the running ones in order.
///
/// Connections are published as they come up, so a server stuck in startup never hides siblings
/// that are already running.
async fn resolve_binding(
	pool: ConnectionPool,
	definitions: Vec<Arc<ServerDefinition>>,
	path: PathBuf,
	uri: Uri,
	tx: watch::Sender<Resolution>,
	cancel: CancellationToken,
) {
	let mut slots: Vec<Option<BoundConnection>> = vec![None; definitions.len()];
	let mut pending: FuturesUnordered<_> = definitions
		.into_iter()
		.enumerate()
		.map(|(index, definition)| {
			let pool = pool.clone();
			let root = definition.root_for(&path);
			async move { (index, pool.acquire(&definition, &root).await, definition) }
		})
		.collect();

	loop {
		let next = tokio::select! {
			_ = cancel.cancelled() => {
				debug!(uri = uri.as_str(), "Binding resolution cancelled");
				return;
			}
			next = pending.next() => next,
		};

		match next {
			Some((index, Ok(connection), _)) => {
				slots[index] = Some(BoundConnection {
					connection,
					context: RequestContext { uri: uri.clone() },
				});
				tx.send_replace(Resolution {
					connections: ordered(&slots),
					complete: false,
				});
			}
			Some((_, Err(error), definition)) => {
				debug!(uri = uri.as_str(), server = %definition.id, %error, "Server excluded from binding");
			}
			None => break,
		}
	}

	let connections = ordered(&slots);
	debug!(uri = uri.as_str(), servers = connections.len(), "Document binding resolved");
	tx.send_replace(Resolution {
		connections,
		complete: true,
	});
}

/// Acquired connections in definition order.
fn ordered(slots: &[Option<BoundConnection>]) -> Arc<[BoundConnection]> {
	slots.iter().flatten().cloned().collect()
}
