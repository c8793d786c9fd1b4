//! Open-document snapshots.
//!
//! A [`Document`] is an immutable view of one open editor document: its location, content type,
//! text, and an identity that survives edits but not reopening. Bindings are cached per path and
//! invalidated whenever the identity seen by a request differs from the cached one.

mod position;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use lsp_types::{Position, Uri};
use ropey::Rope;

pub use position::{OffsetEncoding, char_to_lsp_position, lsp_position_to_char};

use crate::{Error, Result};

static NEXT_IDENTITY: AtomicU64 = AtomicU64::new(1);

/// Stable identity of an open document.
///
/// Two snapshots with the same identity describe the same editor document, possibly at different
/// edit states. Replacing the document (close and reopen, or swapping the editor input) yields a
/// fresh identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentIdentity(u64);

impl DocumentIdentity {
	fn next() -> Self {
		Self(NEXT_IDENTITY.fetch_add(1, Ordering::Relaxed))
	}
}

impl fmt::Display for DocumentIdentity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "doc#{}", self.0)
	}
}

/// Snapshot of an open document.
#[derive(Debug, Clone)]
pub struct Document {
	identity: DocumentIdentity,
	path: PathBuf,
	uri: Uri,
	content_type: Option<String>,
	text: Rope,
}

impl Document {
	/// Opens a document at `path` with the given contents.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidPath`] if `path` cannot be expressed as a `file://` URI.
	pub fn open(path: impl Into<PathBuf>, text: &str) -> Result<Self> {
		let path = path.into();
		let uri = crate::uri_from_path(&path).ok_or_else(|| Error::InvalidPath(path.display().to_string()))?;
		Ok(Self {
			identity: DocumentIdentity::next(),
			path,
			uri,
			content_type: None,
			text: Rope::from_str(text),
		})
	}

	/// Declares the content type (language id) of the document.
	pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
		self.content_type = Some(content_type.into());
		self
	}

	/// Returns a snapshot of the same document with new contents.
	pub fn edited(&self, text: &str) -> Self {
		Self {
			text: Rope::from_str(text),
			..self.clone()
		}
	}

	/// Returns a snapshot standing for a replaced document at the same location.
	pub fn reopened(&self, text: &str) -> Self {
		Self {
			identity: DocumentIdentity::next(),
			..self.edited(text)
		}
	}

	/// Identity of the document.
	pub fn identity(&self) -> DocumentIdentity {
		self.identity
	}

	/// Filesystem location.
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Canonical URI used in requests.
	pub fn uri(&self) -> &Uri {
		&self.uri
	}

	/// Declared content type, if any.
	pub fn content_type(&self) -> Option<&str> {
		self.content_type.as_deref()
	}

	/// File extension without the leading dot.
	pub fn extension(&self) -> Option<&str> {
		self.path.extension().and_then(|ext| ext.to_str())
	}

	/// Document text.
	pub fn text(&self) -> &Rope {
		&self.text
	}

	/// Length of the document in chars.
	pub fn len_chars(&self) -> usize {
		self.text.len_chars()
	}

	/// Char at `offset`, if any.
	pub fn char_at(&self, offset: usize) -> Option<char> {
		(offset < self.text.len_chars()).then(|| self.text.char(offset))
	}

	/// Text between two char offsets.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidOffset`] if the range does not lie inside the document.
	pub fn slice(&self, start: usize, end: usize) -> Result<String> {
		let len = self.text.len_chars();
		if start > end || end > len {
			return Err(Error::InvalidOffset { offset: end.max(start), len });
		}
		Ok(self.text.slice(start..end).to_string())
	}

	/// Converts a char offset into an LSP position.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidOffset`] if `offset` lies past the end of the document.
	pub fn position_at(&self, offset: usize, encoding: OffsetEncoding) -> Result<Position> {
		char_to_lsp_position(&self.text, offset, encoding).ok_or(Error::InvalidOffset {
			offset,
			len: self.text.len_chars(),
		})
	}

	/// Converts an LSP position into a char offset.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidPosition`] if the position does not address the document.
	pub fn offset_at(&self, position: Position, encoding: OffsetEncoding) -> Result<usize> {
		lsp_position_to_char(&self.text, position, encoding).ok_or(Error::InvalidPosition {
			line: position.line,
			character: position.character,
		})
	}
}
