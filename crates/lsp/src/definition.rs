//! Server definitions and the content-type resolver.
//!
//! Definitions are loaded once from configuration and never mutated afterwards; they are shared as
//! `Arc<ServerDefinition>`. The order of a [`ServerCatalog`] is the configuration order, which is
//! also the order in which bound servers are queried and their results merged.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Document;
use crate::{Error, Result};

/// Identifier of a server definition, unique within a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerDefinitionId(String);

impl ServerDefinitionId {
	/// Creates an identifier.
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	/// String form of the identifier.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for ServerDefinitionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// How to start a server process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LaunchConfig {
	/// Command to run the language server.
	pub command: String,
	/// Arguments to pass to the command.
	#[serde(default)]
	pub args: Vec<String>,
	/// Environment variables to set.
	#[serde(default)]
	pub env: HashMap<String, String>,
	/// Bound on launch plus `initialize`, in milliseconds.
	#[serde(default = "default_startup_timeout_ms")]
	pub startup_timeout_ms: u64,
	/// Server-specific initialization options.
	#[serde(default)]
	pub initialization_options: Option<Value>,
}

fn default_startup_timeout_ms() -> u64 {
	5_000
}

impl LaunchConfig {
	/// Startup bound as a [`Duration`].
	pub fn startup_timeout(&self) -> Duration {
		Duration::from_millis(self.startup_timeout_ms)
	}
}

/// Immutable descriptor of a language server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerDefinition {
	/// Unique identifier.
	pub id: ServerDefinitionId,
	/// Declared content types (language ids) served.
	#[serde(default)]
	pub content_types: Vec<String>,
	/// File extensions served, without the leading dot.
	#[serde(default)]
	pub extensions: Vec<String>,
	/// Files/directories that mark the workspace root.
	/// The root is found by walking up from the document path.
	#[serde(default)]
	pub root_markers: Vec<String>,
	/// Launch configuration.
	#[serde(flatten)]
	pub launch: LaunchConfig,
}

impl ServerDefinition {
	/// Creates a definition with no associations.
	pub fn new(id: impl Into<String>, command: impl Into<String>) -> Self {
		Self {
			id: ServerDefinitionId::new(id),
			content_types: Vec::new(),
			extensions: Vec::new(),
			root_markers: Vec::new(),
			launch: LaunchConfig {
				command: command.into(),
				args: Vec::new(),
				env: HashMap::new(),
				startup_timeout_ms: default_startup_timeout_ms(),
				initialization_options: None,
			},
		}
	}

	/// Set served content types.
	pub fn content_types(mut self, content_types: impl IntoIterator<Item = impl Into<String>>) -> Self {
		self.content_types = content_types.into_iter().map(Into::into).collect();
		self
	}

	/// Set served file extensions.
	pub fn extensions(mut self, extensions: impl IntoIterator<Item = impl Into<String>>) -> Self {
		self.extensions = extensions.into_iter().map(Into::into).collect();
		self
	}

	/// Set root markers.
	pub fn root_markers(mut self, markers: impl IntoIterator<Item = impl Into<String>>) -> Self {
		self.root_markers = markers.into_iter().map(Into::into).collect();
		self
	}

	/// Set the startup bound.
	pub fn startup_timeout(mut self, timeout: Duration) -> Self {
		self.launch.startup_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
		self
	}

	/// Set server-specific initialization options.
	pub fn initialization_options(mut self, options: Value) -> Self {
		self.launch.initialization_options = Some(options);
		self
	}

	/// Whether this server applies to `document`.
	///
	/// A declared content type matches exactly; extensions match case-insensitively.
	pub fn matches(&self, document: &Document) -> bool {
		let by_type = document
			.content_type()
			.is_some_and(|content_type| self.content_types.iter().any(|ct| ct == content_type));
		let by_extension = document
			.extension()
			.is_some_and(|ext| self.extensions.iter().any(|candidate| candidate.eq_ignore_ascii_case(ext)));
		by_type || by_extension
	}

	/// Workspace root for a document at `document_path`.
	pub fn root_for(&self, document_path: &Path) -> PathBuf {
		find_root_path(document_path, &self.root_markers)
	}
}

/// Resolves which server definitions apply to a document.
pub trait ContentTypeResolver: Send + Sync {
	/// Matching definitions, in configuration order.
	fn definitions_for(&self, document: &Document) -> Vec<Arc<ServerDefinition>>;
}

/// Ordered set of server definitions.
#[derive(Debug, Clone, Default)]
pub struct ServerCatalog {
	definitions: Vec<Arc<ServerDefinition>>,
}

impl ServerCatalog {
	/// Builds a catalog, preserving the given order.
	///
	/// # Errors
	///
	/// Returns [`Error::Config`] if two definitions share an identifier.
	pub fn new(definitions: impl IntoIterator<Item = ServerDefinition>) -> Result<Self> {
		let mut seen = HashSet::new();
		let mut ordered = Vec::new();
		for definition in definitions {
			if !seen.insert(definition.id.clone()) {
				return Err(Error::Config(format!("duplicate server id `{}`", definition.id)));
			}
			ordered.push(Arc::new(definition));
		}
		Ok(Self { definitions: ordered })
	}

	/// Looks up a definition by identifier.
	pub fn get(&self, id: &ServerDefinitionId) -> Option<&Arc<ServerDefinition>> {
		self.definitions.iter().find(|definition| &definition.id == id)
	}

	/// All definitions in configuration order.
	pub fn iter(&self) -> impl Iterator<Item = &Arc<ServerDefinition>> {
		self.definitions.iter()
	}

	/// Number of definitions.
	pub fn len(&self) -> usize {
		self.definitions.len()
	}

	/// Whether the catalog is empty.
	pub fn is_empty(&self) -> bool {
		self.definitions.is_empty()
	}
}

impl ContentTypeResolver for ServerCatalog {
	fn definitions_for(&self, document: &Document) -> Vec<Arc<ServerDefinition>> {
		self.definitions.iter().filter(|definition| definition.matches(document)).cloned().collect()
	}
}

/// Find the workspace root by walking up from the document path.
///
/// Falls back to the document's directory when no marker is found.
pub fn find_root_path(document_path: &Path, root_markers: &[String]) -> PathBuf {
	let start_dir = document_path.parent().unwrap_or(document_path);

	for dir in start_dir.ancestors() {
		if root_markers.iter().any(|marker| dir.join(marker).exists()) {
			return dir.to_path_buf();
		}
	}

	start_dir.to_path_buf()
}
