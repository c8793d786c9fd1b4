//! Multi-server [Language Server Protocol][lsp] routing for editor features.
//!
//! [lsp]: https://microsoft.github.io/language-server-protocol/overviews/lsp/overview/
//!
//! An editor feature (completion, hover, signature help) rarely talks to a single server: a
//! document may be served by a language server, a linter and a spell checker at once. This crate
//! resolves which servers apply to a document, queries them concurrently, and merges what comes
//! back before a deadline.
//!
//! The pieces, leaf first:
//! - [`capability`]: pure predicates over advertised [`lsp_types::ServerCapabilities`].
//! - [`connection::ServerConnection`]: one server session and its lifecycle state machine.
//! - [`pool::ConnectionPool`]: process-wide connections keyed by `(definition, root)`, started
//!   lazily and at most once per key.
//! - [`binding::BindingRegistry`]: document to connection-set association, resolved in the
//!   background and invalidated when the document identity changes.
//! - [`dispatch`]: the fan-out/fan-in engine shared by every feature.
//! - [`completion`], [`hover`] and [`signature`]: feature entry points and their mergers.
//!
//! Process launch and wire framing stay outside of this crate: callers provide a
//! [`client::ServerLauncher`] that yields [`client::LanguageClient`] stubs.

#![warn(missing_docs)]

/// Re-export of the [`lsp_types`] dependency of this crate.
pub use lsp_types;

pub mod binding;
pub mod capability;
pub mod client;
pub mod completion;
pub mod config;
pub mod connection;
pub mod definition;
pub mod dispatch;
pub mod document;
pub mod hover;
pub mod pool;
pub mod signature;

#[cfg(test)]
mod testing;

pub use binding::{BindingRegistry, BoundConnection, RequestContext};
pub use capability::CapabilityPredicate;
pub use client::{LanguageClient, ServerLauncher};
pub use completion::{CompletionEntry, CompletionOutcome, CompletionProposal};
pub use config::{Config, FeatureTimeouts};
pub use connection::{ConnectionId, ConnectionKey, ConnectionState, ServerConnection};
pub use definition::{ContentTypeResolver, LaunchConfig, ServerCatalog, ServerDefinition, ServerDefinitionId};
pub use dispatch::{Dispatched, Outcome, dispatch};
pub use document::{Document, DocumentIdentity, OffsetEncoding};
pub use hover::{HoverRegion, HoverSession, MergedHover};
pub use pool::ConnectionPool;
pub use signature::ContextInformation;

/// A convenient type alias for `Result` with `E` = [`enum@crate::Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible errors.
///
/// Errors are cloned into every waiter of a shared startup or resolution, so sources from other
/// crates are flattened into strings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The server session ended before the request could be answered.
	#[error("service stopped")]
	ServiceStopped,
	/// A request was issued to a connection that is not in the running state.
	#[error("language server {0} is not running")]
	NotRunning(String),
	/// The launcher could not start the server process.
	#[error("failed to launch {server}: {reason}")]
	Launch {
		/// Identifier of the server definition.
		server: String,
		/// Human-readable cause.
		reason: String,
	},
	/// The peer violates the Language Server Protocol.
	#[error("protocol error: {0}")]
	Protocol(String),
	/// The peer replied with an error.
	#[error("server error {code}: {message}")]
	Response {
		/// JSON-RPC error code.
		code: i64,
		/// Error message sent by the server.
		message: String,
	},
	/// A bounded wait elapsed.
	#[error("timed out waiting for {0}")]
	RequestTimeout(String),
	/// A character offset does not address the document.
	#[error("offset {offset} is outside the document ({len} chars)")]
	InvalidOffset {
		/// Offending offset.
		offset: usize,
		/// Document length in chars.
		len: usize,
	},
	/// An LSP position does not address the document.
	#[error("position {line}:{character} is outside the document")]
	InvalidPosition {
		/// Zero-based line.
		line: u32,
		/// Zero-based column in the negotiated encoding.
		character: u32,
	},
	/// The server configuration is malformed.
	#[error("invalid configuration: {0}")]
	Config(String),
	/// A document path cannot be expressed as a `file://` URI.
	#[error("invalid document path {0}")]
	InvalidPath(String),
	/// Input/output errors while reading configuration.
	#[error("{0}")]
	Io(String),
}

impl From<std::io::Error> for Error {
	fn from(err: std::io::Error) -> Self {
		Self::Io(err.to_string())
	}
}

impl From<toml::de::Error> for Error {
	fn from(err: toml::de::Error) -> Self {
		Self::Config(err.to_string())
	}
}

/// Converts a filesystem path to an LSP URI.
///
/// Relative paths are resolved against the current directory. The path is not required to exist.
pub fn uri_from_path(path: &std::path::Path) -> Option<lsp_types::Uri> {
	use std::str::FromStr;

	let abs_path = if path.is_absolute() {
		path.to_path_buf()
	} else {
		std::env::current_dir().ok()?.join(path)
	};

	let url = url::Url::from_file_path(abs_path).ok()?;
	lsp_types::Uri::from_str(url.as_str()).ok()
}
