//! Process-wide connection pool.
//!
//! Ensures exactly one live connection per `(definition, root)` key. The connection is inserted
//! into the pool in the `Starting` state before the launch begins, so every concurrent caller for
//! the same key converges on the same handle; the launch and handshake then run in a background
//! task that owns the lifecycle transitions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::client::{ServerLauncher, initialize_params};
use crate::connection::{ConnectionId, ConnectionKey, ConnectionState, ServerConnection};
use crate::definition::ServerDefinition;
use crate::{Error, Result};

/// Pool indices, always updated under one lock.
///
/// Slot/generation tracking provides stable, generation-aware [`ConnectionId`] values so failure
/// reports about a superseded launch can be detected and discarded.
#[derive(Default)]
struct PoolState {
	/// Live (non-terminal) connections keyed by `(definition, root)`.
	connections: HashMap<ConnectionKey, ServerConnection>,
	/// Mapping from key to its stable slot number.
	slots: HashMap<ConnectionKey, u32>,
	/// Generation counter per key.
	generations: HashMap<ConnectionKey, u32>,
	/// Next available slot number.
	next_slot: u32,
}

impl PoolState {
	/// Allocates the identity for a fresh launch of `key`.
	fn next_id(&mut self, key: &ConnectionKey) -> ConnectionId {
		let slot = match self.slots.get(key) {
			Some(&slot) => slot,
			None => {
				let slot = self.next_slot;
				self.next_slot += 1;
				self.slots.insert(key.clone(), slot);
				slot
			}
		};
		let generation = self.generations.get(key).copied().unwrap_or(0) + 1;
		self.generations.insert(key.clone(), generation);
		ConnectionId { slot, generation }
	}

	/// Removes `connection` if it is still the live entry for its key.
	fn evict(&mut self, connection: &ServerConnection) -> bool {
		let current = self.connections.get(connection.key()).map(ServerConnection::id);
		if current == Some(connection.id()) {
			self.connections.remove(connection.key());
			true
		} else {
			false
		}
	}
}

struct PoolInner {
	launcher: Arc<dyn ServerLauncher>,
	state: Mutex<PoolState>,
}

/// Shared pool of server connections.
///
/// Cloning yields another handle to the same pool.
#[derive(Clone)]
pub struct ConnectionPool {
	inner: Arc<PoolInner>,
}

impl ConnectionPool {
	/// Creates an empty pool backed by `launcher`.
	pub fn new(launcher: Arc<dyn ServerLauncher>) -> Self {
		Self {
			inner: Arc::new(PoolInner {
				launcher,
				state: Mutex::new(PoolState::default()),
			}),
		}
	}

	/// Returns the live connection for `(definition, root)`, launching one if needed.
	///
	/// The returned connection may still be starting; use
	/// [`ServerConnection::wait_running`] or [`Self::acquire`] to wait for the handshake. Must be
	/// called from within a Tokio runtime.
	pub fn get_or_start(&self, definition: &Arc<ServerDefinition>, root: &Path) -> ServerConnection {
		let key = ConnectionKey {
			definition: definition.id.clone(),
			root: root.to_path_buf(),
		};

		let connection = {
			let mut state = self.inner.state.lock();
			if let Some(existing) = state.connections.get(&key) {
				if !existing.state().is_terminal() {
					return existing.clone();
				}
			}
			let id = state.next_id(&key);
			let connection = ServerConnection::new(id, Arc::clone(definition), key.root.clone());
			state.connections.insert(key, connection.clone());
			connection
		};

		info!(server = %definition.id, command = %definition.launch.command, root = ?root, connection = %connection.id(), "Starting language server");
		tokio::spawn(self.clone().drive_startup(connection.clone()));
		connection
	}

	/// Like [`Self::get_or_start`], then waits for the connection to run.
	///
	/// The wait is bounded by the definition's startup timeout.
	///
	/// # Errors
	///
	/// Returns the launch/handshake failure, [`Error::ServiceStopped`] if the connection was
	/// stopped meanwhile, or [`Error::RequestTimeout`].
	pub async fn acquire(&self, definition: &Arc<ServerDefinition>, root: &Path) -> Result<ServerConnection> {
		let connection = self.get_or_start(definition, root);
		connection.wait_running(definition.launch.startup_timeout()).await?;
		Ok(connection)
	}

	/// Live connection for `key`, if any.
	pub fn connection(&self, key: &ConnectionKey) -> Option<ServerConnection> {
		self.inner.state.lock().connections.get(key).cloned()
	}

	/// Number of live connections.
	pub fn active_count(&self) -> usize {
		self.inner.state.lock().connections.len()
	}

	/// Records a crash or I/O failure detected by the transport for connection `id`.
	///
	/// Reports for a connection that already left the pool are ignored. Returns whether a live
	/// connection was failed.
	pub fn report_failure(&self, id: ConnectionId, cause: Error) -> bool {
		let connection = {
			let mut state = self.inner.state.lock();
			let Some(connection) = state.connections.values().find(|c| c.id() == id).cloned() else {
				debug!(connection = %id, "Ignoring failure report for inactive connection");
				return false;
			};
			state.evict(&connection);
			connection
		};

		warn!(server = %connection.key().definition, connection = %id, error = %cause, "Language server failed");
		connection.fail(cause)
	}

	/// Stops every connection rooted at `root`.
	///
	/// Each stopped server receives a best-effort `shutdown`; errors are logged. Returns the ids of
	/// the stopped connections.
	pub async fn close_workspace(&self, root: &Path) -> Vec<ConnectionId> {
		stop_all(self.take_where(|key| key.root == root)).await
	}

	/// Stops every connection in the pool.
	pub async fn shutdown_all(&self) -> Vec<ConnectionId> {
		stop_all(self.take_where(|_| true)).await
	}

	fn take_where(&self, mut predicate: impl FnMut(&ConnectionKey) -> bool) -> Vec<ServerConnection> {
		let mut state = self.inner.state.lock();
		let keys: Vec<ConnectionKey> = state.connections.keys().filter(|key| predicate(*key)).cloned().collect();
		keys.iter().filter_map(|key| state.connections.remove(key)).collect()
	}

	/// Drives `connection` through launch and handshake.
	async fn drive_startup(self, connection: ServerConnection) {
		let definition = Arc::clone(connection.definition());
		let root: PathBuf = connection.root().to_path_buf();
		let launcher = Arc::clone(&self.inner.launcher);

		let handshake = async {
			let client = launcher.launch(&definition, &root).await?;
			connection.attach_client(Arc::clone(&client));
			if !connection.transition(ConnectionState::Initializing) {
				return Err(Error::ServiceStopped);
			}
			let result = client.initialize(initialize_params(&definition, &root)).await?;
			Ok(result.capabilities)
		};

		let outcome = match tokio::time::timeout(definition.launch.startup_timeout(), handshake).await {
			Ok(outcome) => outcome,
			Err(_) => Err(Error::RequestTimeout(format!("{} to initialize", definition.id))),
		};

		match outcome {
			Ok(capabilities) => {
				if connection.mark_running(capabilities) {
					info!(server = %definition.id, connection = %connection.id(), "Language server running");
				} else {
					debug!(server = %definition.id, connection = %connection.id(), state = %connection.state(), "Handshake finished after shutdown");
					shutdown_client(&connection).await;
				}
			}
			Err(error) => {
				if connection.state().is_terminal() {
					debug!(server = %definition.id, connection = %connection.id(), %error, "Startup abandoned");
					shutdown_client(&connection).await;
					return;
				}
				warn!(server = %definition.id, connection = %connection.id(), %error, "Language server failed to start");
				connection.fail(error);
				self.inner.state.lock().evict(&connection);
				shutdown_client(&connection).await;
			}
		}
	}
}

async fn stop_all(connections: Vec<ServerConnection>) -> Vec<ConnectionId> {
	let stops = connections.into_iter().map(|connection| async move {
		let was_running = connection.is_running();
		connection.transition(ConnectionState::Stopped);
		info!(server = %connection.key().definition, connection = %connection.id(), "Stopping language server");

		if was_running {
			shutdown_client(&connection).await;
		}
		connection.id()
	});
	join_all(stops).await
}

/// Best-effort `shutdown`, bounded by the definition's startup timeout.
async fn shutdown_client(connection: &ServerConnection) {
	let Some(client) = connection.client() else {
		return;
	};
	let timeout = connection.definition().launch.startup_timeout();
	match tokio::time::timeout(timeout, client.shutdown()).await {
		Ok(Ok(())) => {}
		Ok(Err(error)) => debug!(connection = %connection.id(), %error, "Shutdown request failed"),
		Err(_) => debug!(connection = %connection.id(), "Shutdown request timed out"),
	}
}

#[cfg(test)]
mod tests;
