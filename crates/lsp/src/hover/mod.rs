//! Hover across every server bound to a document.
//!
//! Hover is computed in two steps, matching how editors drive it: first the region the hover
//! applies to (which decides whether an already visible hover can stay), then its contents.
//! [`HoverSession`] issues one fan-out for the region and reuses those replies for the contents
//! when asked about the same region of the same document.

use std::sync::Arc;
use std::time::Duration;

use lsp_types::{Hover, HoverContents, HoverParams, MarkedString, Range};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::binding::BindingRegistry;
use crate::capability::has_hover;
use crate::config::FeatureTimeouts;
use crate::dispatch::dispatch;
use crate::document::{Document, DocumentIdentity, OffsetEncoding};

/// A span of chars in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HoverRegion {
	/// Start offset.
	pub offset: usize,
	/// Length in chars.
	pub length: usize,
}

impl HoverRegion {
	/// Empty region at `offset`.
	pub fn point(offset: usize) -> Self {
		Self { offset, length: 0 }
	}

	/// Single-char region at `offset`.
	pub fn character(offset: usize) -> Self {
		Self { offset, length: 1 }
	}

	/// End offset (exclusive).
	pub fn end(&self) -> usize {
		self.offset + self.length
	}
}

/// Hover region plus the merged contents for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedHover {
	/// Region the contents apply to.
	pub region: HoverRegion,
	/// Markdown contents, one block per server separated by blank lines.
	pub contents: String,
}

/// Text of one hover, or `None` when it carries nothing to show.
///
/// Parts are joined with blank lines; language-tagged strings become fenced code blocks.
pub fn hover_text(hover: &Hover) -> Option<String> {
	let parts: Vec<String> = match &hover.contents {
		HoverContents::Scalar(marked) => vec![marked_text(marked)],
		HoverContents::Array(marked) => marked.iter().map(marked_text).collect(),
		HoverContents::Markup(markup) => vec![markup.value.clone()],
	};
	join_blocks(parts)
}

fn marked_text(marked: &MarkedString) -> String {
	match marked {
		MarkedString::String(text) => text.clone(),
		MarkedString::LanguageString(code) if code.language.is_empty() => code.value.clone(),
		MarkedString::LanguageString(code) => format!("```{}\n{}\n```", code.language, code.value),
	}
}

fn join_blocks(blocks: impl IntoIterator<Item = String>) -> Option<String> {
	let blocks: Vec<String> = blocks.into_iter().filter(|block| !block.is_empty()).collect();
	(!blocks.is_empty()).then(|| blocks.join("\n\n"))
}

/// Contents of several hovers, in the given order.
pub fn merge_contents<'a>(hovers: impl IntoIterator<Item = &'a Hover>) -> Option<String> {
	join_blocks(hovers.into_iter().filter_map(hover_text))
}

/// Folds the ranges reported for a hover at `offset` into one region.
///
/// Each range is resolved with the encoding of the server that reported it. Without ranges the
/// region is a point at `offset`. Otherwise the region starts at the latest range start and is as
/// wide as the narrowest range. A range that does not resolve in the document collapses the
/// region to the character at `offset`.
pub fn merge_region(document: &Document, offset: usize, ranges: impl IntoIterator<Item = (Range, OffsetEncoding)>) -> HoverRegion {
	let mut merged: Option<HoverRegion> = None;

	for (range, encoding) in ranges {
		let start = document.offset_at(range.start, encoding);
		let end = document.offset_at(range.end, encoding);
		let (start, end) = match (start, end) {
			(Ok(start), Ok(end)) if start <= end => (start, end),
			(Err(error), _) | (_, Err(error)) => {
				debug!(uri = document.uri().as_str(), %error, "Unresolvable hover range");
				return HoverRegion::character(offset);
			}
			(Ok(start), Ok(end)) => {
				debug!(uri = document.uri().as_str(), start, end, "Reversed hover range");
				return HoverRegion::character(offset);
			}
		};

		let current = merged.unwrap_or(HoverRegion {
			offset: 0,
			length: document.len_chars(),
		});
		merged = Some(HoverRegion {
			offset: current.offset.max(start),
			length: current.length.min(end - start),
		});
	}

	merged.unwrap_or_else(|| HoverRegion::point(offset))
}

/// A hover reply with the encoding of the server that sent it.
#[derive(Debug, Clone)]
struct ServerHover {
	encoding: OffsetEncoding,
	hover: Hover,
}

/// Replies gathered for the last computed region.
struct HoverSnapshot {
	identity: DocumentIdentity,
	region: HoverRegion,
	hovers: Arc<[ServerHover]>,
}

/// Hover state for one editor view.
///
/// Remembers the replies used to compute the last region, so asking for the contents of that
/// region does not query the servers again.
pub struct HoverSession {
	registry: Arc<BindingRegistry>,
	timeouts: FeatureTimeouts,
	last: Mutex<Option<HoverSnapshot>>,
}

impl HoverSession {
	/// Creates a session over `registry`.
	pub fn new(registry: Arc<BindingRegistry>, timeouts: FeatureTimeouts) -> Self {
		Self {
			registry,
			timeouts,
			last: Mutex::new(None),
		}
	}

	/// Region a hover at `offset` applies to.
	///
	/// Returns `None` if `offset` lies outside the document.
	pub async fn hover_region(&self, document: &Document, offset: usize) -> Option<HoverRegion> {
		if offset > document.len_chars() {
			debug!(uri = document.uri().as_str(), offset, len = document.len_chars(), "Hover requested outside the document");
			return None;
		}

		let hovers = self.request_hovers(document, offset, self.timeouts.hover_region()).await;
		let region = merge_region(
			document,
			offset,
			hovers.iter().filter_map(|reply| reply.hover.range.map(|range| (range, reply.encoding))),
		);
		trace!(uri = document.uri().as_str(), offset, replies = hovers.len(), ?region, "Hover region");

		*self.last.lock() = Some(HoverSnapshot {
			identity: document.identity(),
			region,
			hovers,
		});
		Some(region)
	}

	/// Merged contents for `region`.
	///
	/// Reuses the replies of the last [`Self::hover_region`] call when it computed this region for
	/// the same document; otherwise queries the servers at the region start.
	pub async fn hover_info(&self, document: &Document, region: HoverRegion) -> Option<String> {
		let cached = self
			.last
			.lock()
			.as_ref()
			.filter(|snapshot| snapshot.identity == document.identity() && snapshot.region == region)
			.map(|snapshot| Arc::clone(&snapshot.hovers));

		let hovers = match cached {
			Some(hovers) => hovers,
			None => {
				if region.offset > document.len_chars() {
					return None;
				}
				self.request_hovers(document, region.offset, self.timeouts.hover_info()).await
			}
		};

		merge_contents(hovers.iter().map(|reply| &reply.hover))
	}

	/// Region and contents of a hover at `offset`.
	pub async fn hover(&self, document: &Document, offset: usize) -> Option<MergedHover> {
		let region = self.hover_region(document, offset).await?;
		let contents = self.hover_info(document, region).await?;
		Some(MergedHover { region, contents })
	}

	async fn request_hovers(&self, document: &Document, offset: usize, deadline: Duration) -> Arc<[ServerHover]> {
		let bindings = self.registry.resolve(document, has_hover, self.timeouts.binding()).await;
		if bindings.is_empty() {
			return Arc::from([]);
		}

		let request_document = document.clone();
		let results = dispatch(
			&bindings,
			move |bound| {
				let document = request_document.clone();
				async move {
					let params = HoverParams {
						text_document_position_params: bound.position_params(&document, offset)?,
						work_done_progress_params: Default::default(),
					};
					bound.connection().hover(params).await
				}
			},
			deadline,
		)
		.await;

		results
			.into_iter()
			.filter_map(|dispatched| {
				let encoding = dispatched.binding.connection().offset_encoding();
				let hover = dispatched.outcome.completed().flatten()?;
				Some(ServerHover { encoding, hover })
			})
			.collect()
	}
}
