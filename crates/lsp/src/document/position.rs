//! Conversions between rope char indices and LSP positions.

use lsp_types::{Position, PositionEncodingKind};
use ropey::Rope;

/// Offset encoding for LSP positions.
///
/// LSP uses UTF-16 by default, but servers can negotiate different encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffsetEncoding {
	/// UTF-8 byte offsets.
	Utf8,
	/// UTF-16 code unit offsets (LSP default).
	#[default]
	Utf16,
	/// UTF-32 / Unicode codepoint offsets.
	Utf32,
}

impl OffsetEncoding {
	/// Parse from LSP position encoding kind.
	pub fn from_lsp(kind: &PositionEncodingKind) -> Option<Self> {
		match kind.as_str() {
			"utf-8" => Some(Self::Utf8),
			"utf-16" => Some(Self::Utf16),
			"utf-32" => Some(Self::Utf32),
			_ => None,
		}
	}
}

/// Converts a char index into an LSP position.
///
/// Returns `None` when `char_idx` lies past the end of `text`.
pub fn char_to_lsp_position(text: &Rope, char_idx: usize, encoding: OffsetEncoding) -> Option<Position> {
	if char_idx > text.len_chars() {
		return None;
	}

	let line = text.char_to_line(char_idx);
	let line_start = text.line_to_char(line);
	let character = match encoding {
		OffsetEncoding::Utf8 => text.char_to_byte(char_idx) - text.char_to_byte(line_start),
		OffsetEncoding::Utf16 => text.char_to_utf16_cu(char_idx) - text.char_to_utf16_cu(line_start),
		OffsetEncoding::Utf32 => char_idx - line_start,
	};

	Some(Position {
		line: u32::try_from(line).ok()?,
		character: u32::try_from(character).ok()?,
	})
}

/// Converts an LSP position into a char index.
///
/// Returns `None` when the line does not exist or the column runs past the end of the line
/// (including its line terminator).
pub fn lsp_position_to_char(text: &Rope, position: Position, encoding: OffsetEncoding) -> Option<usize> {
	let line = position.line as usize;
	if line >= text.len_lines() {
		return None;
	}

	let line_start = text.line_to_char(line);
	let line_end = line_start + text.line(line).len_chars();
	let column = position.character as usize;

	match encoding {
		OffsetEncoding::Utf8 => {
			let start = text.char_to_byte(line_start);
			let end = text.char_to_byte(line_end);
			(column <= end - start).then(|| text.byte_to_char(start + column))
		}
		OffsetEncoding::Utf16 => {
			let start = text.char_to_utf16_cu(line_start);
			let end = text.char_to_utf16_cu(line_end);
			(column <= end - start).then(|| text.utf16_cu_to_char(start + column))
		}
		OffsetEncoding::Utf32 => (column <= line_end - line_start).then_some(line_start + column),
	}
}
