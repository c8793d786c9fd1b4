//! Completion across every server bound to a document.
//!
//! [`complete`] fans `textDocument/completion` out to the bound servers that advertise a
//! completion provider, validates every returned item against the document, and merges the
//! survivors into one ranked list.
//!
//! # Ranking
//!
//! Proposals are sorted ascending by:
//! 1. best-match offset: start of the text the item replaces, earlier first;
//! 2. modifications: characters before the cursor the item would rewrite, fewer first;
//! 3. sort text, compared case-insensitively, with items lacking sort text first.
//!
//! The sort is stable and bindings are visited in configuration order, so equal proposals keep
//! their server order and the merged list does not depend on reply arrival order.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use lsp_types::{
	CompletionContext, CompletionItem, CompletionParams, CompletionResponse, CompletionTextEdit, CompletionTriggerKind, Range,
};
use tracing::{debug, trace, warn};

use crate::binding::{BindingRegistry, BoundConnection};
use crate::capability::{completion_triggers, has_completion};
use crate::config::FeatureTimeouts;
use crate::definition::ServerDefinitionId;
use crate::dispatch::{Dispatched, Outcome, dispatch};
use crate::document::{Document, OffsetEncoding};
use crate::{Error, Result};

/// Label shown for the synthetic entry reporting a total completion failure.
pub const COMPLETION_ERROR_LABEL: &str = "Error while computing completion";

/// A completion item that passed validation at the request offset.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionProposal {
	item: CompletionItem,
	server: ServerDefinitionId,
	best_offset: usize,
	replace_end: usize,
	insert_text: String,
	modifications: usize,
}

impl CompletionProposal {
	/// Validates `item` for a request at `offset`.
	///
	/// Returns `None` when the item does not make sense at `offset`: its edit range does not
	/// contain the offset or cannot be resolved in the document, or the text typed since the
	/// replaced range starts does not match the item's filter text.
	pub fn validate(item: CompletionItem, server: ServerDefinitionId, document: &Document, offset: usize, encoding: OffsetEncoding) -> Option<Self> {
		let (best_offset, replace_end, insert_text) = match &item.text_edit {
			Some(CompletionTextEdit::Edit(edit)) => {
				let (start, end) = resolve_range(document, edit.range, encoding)?;
				(start, end, edit.new_text.clone())
			}
			Some(CompletionTextEdit::InsertAndReplace(edit)) => {
				let (start, end) = resolve_range(document, edit.insert, encoding)?;
				(start, end, edit.new_text.clone())
			}
			None => {
				let insert_text = item.insert_text.clone().unwrap_or_else(|| item.label.clone());
				(word_start(document, offset), offset, insert_text)
			}
		};

		if best_offset > offset || replace_end < offset {
			return None;
		}

		let typed = document.slice(best_offset, offset).ok()?;
		let filter = item.filter_text.as_deref().unwrap_or(&item.label);
		if !is_fuzzy_match(&typed, filter) {
			return None;
		}

		let modifications = count_modifications(&typed, &insert_text);
		Some(Self {
			item,
			server,
			best_offset,
			replace_end,
			insert_text,
			modifications,
		})
	}

	/// The item as returned by the server.
	pub fn item(&self) -> &CompletionItem {
		&self.item
	}

	/// Server that produced the item.
	pub fn server(&self) -> &ServerDefinitionId {
		&self.server
	}

	/// Display label.
	pub fn label(&self) -> &str {
		&self.item.label
	}

	/// Text inserted when the proposal is applied.
	pub fn insert_text(&self) -> &str {
		&self.insert_text
	}

	/// Start offset of the replaced text.
	pub fn best_offset(&self) -> usize {
		self.best_offset
	}

	/// End offset of the replaced text.
	pub fn replace_end(&self) -> usize {
		self.replace_end
	}

	/// Number of chars before the cursor that applying the proposal rewrites.
	pub fn modifications(&self) -> usize {
		self.modifications
	}

	/// Server-provided sort key.
	pub fn sort_text(&self) -> Option<&str> {
		self.item.sort_text.as_deref()
	}
}

/// Entry of a merged completion list.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionEntry {
	/// A validated proposal.
	Proposal(CompletionProposal),
	/// Placeholder reporting that completion failed altogether.
	Error {
		/// Request offset; applying the entry inserts nothing there.
		offset: usize,
		/// Failure message.
		message: String,
	},
}

impl CompletionEntry {
	/// Display label of the entry.
	pub fn label(&self) -> &str {
		match self {
			Self::Proposal(proposal) => proposal.label(),
			Self::Error { .. } => COMPLETION_ERROR_LABEL,
		}
	}

	/// The proposal, unless this is the error placeholder.
	pub fn as_proposal(&self) -> Option<&CompletionProposal> {
		match self {
			Self::Proposal(proposal) => Some(proposal),
			Self::Error { .. } => None,
		}
	}
}

/// Merged completion result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionOutcome {
	/// Ranked entries.
	pub entries: Vec<CompletionEntry>,
	/// Message of the last failed server call, if any failed.
	pub error_message: Option<String>,
	/// Whether any server reported an incomplete list.
	pub incomplete: bool,
}

impl CompletionOutcome {
	fn failed(offset: usize, error: &Error) -> Self {
		let message = error.to_string();
		Self {
			entries: vec![CompletionEntry::Error {
				offset,
				message: message.clone(),
			}],
			error_message: Some(message),
			incomplete: false,
		}
	}
}

/// Completion at `offset`, optionally fired by typing `trigger`.
///
/// Never fails: server errors surface through [`CompletionOutcome::error_message`] and, when
/// every server failed, as a single [`CompletionEntry::Error`].
pub async fn complete(
	registry: &BindingRegistry,
	document: &Document,
	offset: usize,
	trigger: Option<char>,
	timeouts: &FeatureTimeouts,
) -> CompletionOutcome {
	if offset > document.len_chars() {
		let error = Error::InvalidOffset {
			offset,
			len: document.len_chars(),
		};
		warn!(uri = document.uri().as_str(), %error, "Completion requested outside the document");
		return CompletionOutcome::failed(offset, &error);
	}

	let bindings = registry.resolve(document, has_completion, timeouts.binding()).await;
	if bindings.is_empty() {
		trace!(uri = document.uri().as_str(), "No completion servers");
		return CompletionOutcome::default();
	}

	let request_document = document.clone();
	let results = dispatch(
		&bindings,
		move |bound| {
			let document = request_document.clone();
			async move {
				let params = completion_params(&bound, &document, offset, trigger)?;
				bound.connection().completion(params).await
			}
		},
		timeouts.completion(),
	)
	.await;

	merge_completions(document, offset, results)
}

fn completion_params(bound: &BoundConnection, document: &Document, offset: usize, trigger: Option<char>) -> Result<CompletionParams> {
	let context = match trigger {
		Some(c) => CompletionContext {
			trigger_kind: CompletionTriggerKind::TRIGGER_CHARACTER,
			trigger_character: Some(c.to_string()),
		},
		None => CompletionContext {
			trigger_kind: CompletionTriggerKind::INVOKED,
			trigger_character: None,
		},
	};
	Ok(CompletionParams {
		text_document_position: bound.position_params(document, offset)?,
		work_done_progress_params: Default::default(),
		partial_result_params: Default::default(),
		context: Some(context),
	})
}

/// Validates and ranks per-server completion results.
pub fn merge_completions(document: &Document, offset: usize, results: Vec<Dispatched<Option<CompletionResponse>>>) -> CompletionOutcome {
	let calls = results.len();
	let mut failures = 0usize;
	let mut outcome = CompletionOutcome::default();
	let mut proposals = Vec::new();

	for Dispatched { binding, outcome: call } in results {
		let connection = binding.connection();
		match call {
			Outcome::Completed(response) => {
				let items = match response {
					None => Vec::new(),
					Some(CompletionResponse::Array(items)) => items,
					Some(CompletionResponse::List(list)) => {
						outcome.incomplete |= list.is_incomplete;
						list.items
					}
				};
				let received = items.len();
				let encoding = connection.offset_encoding();
				let server = &connection.key().definition;
				let before = proposals.len();
				proposals.extend(
					items
						.into_iter()
						.filter_map(|item| CompletionProposal::validate(item, server.clone(), document, offset, encoding)),
				);
				trace!(server = %server, received, valid = proposals.len() - before, "Completion items");
			}
			Outcome::Failed(error) => {
				failures += 1;
				warn!(server = %connection.key().definition, %error, "Completion request failed");
				outcome.error_message = Some(error.to_string());
			}
			Outcome::Abandoned => {
				debug!(server = %connection.key().definition, "Completion request missed the deadline");
			}
		}
	}

	proposals.sort_by(compare_proposals);
	outcome.entries = proposals.into_iter().map(CompletionEntry::Proposal).collect();

	if calls > 0 && failures == calls {
		let message = outcome.error_message.clone().unwrap_or_default();
		outcome.entries.insert(0, CompletionEntry::Error { offset, message });
	}
	outcome
}

/// Ranking order of merged proposals.
pub fn compare_proposals(a: &CompletionProposal, b: &CompletionProposal) -> Ordering {
	a.best_offset
		.cmp(&b.best_offset)
		.then(a.modifications.cmp(&b.modifications))
		.then_with(|| match (a.sort_text(), b.sort_text()) {
			(None, None) => Ordering::Equal,
			(None, Some(_)) => Ordering::Less,
			(Some(_), None) => Ordering::Greater,
			(Some(a), Some(b)) => a.chars().flat_map(char::to_lowercase).cmp(b.chars().flat_map(char::to_lowercase)),
		})
}

/// Single-character completion triggers advertised by the servers bound to `document`.
///
/// Waits at most the short trigger deadline for the binding.
pub async fn completion_trigger_characters(registry: &BindingRegistry, document: &Document, timeouts: &FeatureTimeouts) -> BTreeSet<char> {
	let bindings = registry.resolve(document, has_completion, timeouts.triggers()).await;
	bindings
		.iter()
		.filter_map(|bound| bound.connection().capabilities())
		.flat_map(completion_triggers)
		.collect()
}

fn resolve_range(document: &Document, range: Range, encoding: OffsetEncoding) -> Option<(usize, usize)> {
	let start = document.offset_at(range.start, encoding).ok()?;
	let end = document.offset_at(range.end, encoding).ok()?;
	(start <= end).then_some((start, end))
}

/// Start of the identifier ending at `offset`.
fn word_start(document: &Document, offset: usize) -> usize {
	let mut start = offset;
	while start > 0 {
		match document.char_at(start - 1) {
			Some(c) if c.is_alphanumeric() || c == '_' => start -= 1,
			_ => break,
		}
	}
	start
}

/// Whether `typed` occurs in `candidate` as an ordered, case-insensitive subsequence.
fn is_fuzzy_match(typed: &str, candidate: &str) -> bool {
	let mut candidate = candidate.chars().flat_map(char::to_lowercase);
	typed
		.chars()
		.flat_map(char::to_lowercase)
		.all(|wanted| candidate.any(|c| c == wanted))
}

/// Chars of `typed` that differ from `insert_text` at the same position.
fn count_modifications(typed: &str, insert_text: &str) -> usize {
	let mut inserted = insert_text.chars();
	typed.chars().filter(|&c| inserted.next() != Some(c)).count()
}
