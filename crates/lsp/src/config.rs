//! TOML configuration: server definitions and feature deadlines.
//!
//! ```toml
//! [timeouts]
//! completion-ms = 1000
//!
//! [[server]]
//! id = "rust-analyzer"
//! extensions = ["rs"]
//! root-markers = ["Cargo.toml"]
//! command = "rust-analyzer"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::definition::{ServerCatalog, ServerDefinition};

/// Deadlines applied by the feature entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FeatureTimeouts {
	/// Wait for binding resolution before a feature request proceeds.
	pub binding_ms: u64,
	/// Fan-out deadline for completion.
	pub completion_ms: u64,
	/// Wait for binding resolution when collecting trigger characters.
	pub triggers_ms: u64,
	/// Fan-out deadline for computing the hover region.
	pub hover_region_ms: u64,
	/// Fan-out deadline for computing hover contents.
	pub hover_info_ms: u64,
	/// Fan-out deadline for signature help.
	pub signature_help_ms: u64,
}

impl Default for FeatureTimeouts {
	fn default() -> Self {
		Self {
			binding_ms: 1_000,
			completion_ms: 1_000,
			triggers_ms: 50,
			hover_region_ms: 800,
			hover_info_ms: 500,
			signature_help_ms: 1_000,
		}
	}
}

impl FeatureTimeouts {
	/// Binding resolution wait.
	pub fn binding(&self) -> Duration {
		Duration::from_millis(self.binding_ms)
	}

	/// Completion fan-out deadline.
	pub fn completion(&self) -> Duration {
		Duration::from_millis(self.completion_ms)
	}

	/// Trigger-character wait.
	pub fn triggers(&self) -> Duration {
		Duration::from_millis(self.triggers_ms)
	}

	/// Hover region fan-out deadline.
	pub fn hover_region(&self) -> Duration {
		Duration::from_millis(self.hover_region_ms)
	}

	/// Hover contents fan-out deadline.
	pub fn hover_info(&self) -> Duration {
		Duration::from_millis(self.hover_info_ms)
	}

	/// Signature help fan-out deadline.
	pub fn signature_help(&self) -> Duration {
		Duration::from_millis(self.signature_help_ms)
	}
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
	/// Feature deadlines.
	#[serde(default)]
	pub timeouts: FeatureTimeouts,
	/// Server definitions, in file order.
	#[serde(default, rename = "server")]
	pub servers: Vec<ServerDefinition>,
}

impl Config {
	/// Parses configuration from TOML text.
	///
	/// # Errors
	///
	/// Returns [`crate::Error::Config`] on malformed TOML or unknown value types.
	pub fn from_toml_str(text: &str) -> Result<Self> {
		Ok(toml::from_str(text)?)
	}

	/// Reads and parses a configuration file.
	///
	/// # Errors
	///
	/// Returns [`crate::Error::Io`] if the file cannot be read, or a parse error.
	pub fn load(path: &Path) -> Result<Self> {
		let text = std::fs::read_to_string(path)?;
		let config = Self::from_toml_str(&text)?;
		tracing::debug!(path = %path.display(), servers = config.servers.len(), "loaded server configuration");
		Ok(config)
	}

	/// Splits into a validated catalog and the deadlines.
	///
	/// # Errors
	///
	/// Returns [`crate::Error::Config`] if server ids collide.
	pub fn into_parts(self) -> Result<(ServerCatalog, FeatureTimeouts)> {
		Ok((ServerCatalog::new(self.servers)?, self.timeouts))
	}
}
