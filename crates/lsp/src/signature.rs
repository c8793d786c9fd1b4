//! Signature help (context information) across every server bound to a document.

use std::collections::BTreeSet;

use lsp_types::{Documentation, SignatureHelp, SignatureHelpParams, SignatureInformation};
use tracing::{debug, warn};

use crate::binding::BindingRegistry;
use crate::capability::{has_signature_help, signature_triggers};
use crate::config::FeatureTimeouts;
use crate::dispatch::{Dispatched, Outcome, dispatch};
use crate::document::Document;

/// One signature to show while typing a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextInformation {
	/// Signature label.
	pub label: String,
	/// Label followed by the documentation, when there is any.
	pub display: String,
}

impl From<&SignatureInformation> for ContextInformation {
	fn from(signature: &SignatureInformation) -> Self {
		let documentation = match &signature.documentation {
			Some(Documentation::String(text)) => text.as_str(),
			Some(Documentation::MarkupContent(markup)) => markup.value.as_str(),
			None => "",
		};
		let display = if documentation.is_empty() {
			signature.label.clone()
		} else {
			format!("{}\n{}", signature.label, documentation)
		};
		Self {
			label: signature.label.clone(),
			display,
		}
	}
}

/// Signatures applicable at `offset`, from every bound server in configuration order.
///
/// Failed and late servers are skipped.
pub async fn context_information(registry: &BindingRegistry, document: &Document, offset: usize, timeouts: &FeatureTimeouts) -> Vec<ContextInformation> {
	if offset > document.len_chars() {
		debug!(uri = document.uri().as_str(), offset, "Signature help requested outside the document");
		return Vec::new();
	}

	let bindings = registry.resolve(document, has_signature_help, timeouts.binding()).await;
	if bindings.is_empty() {
		return Vec::new();
	}

	let request_document = document.clone();
	let results = dispatch(
		&bindings,
		move |bound| {
			let document = request_document.clone();
			async move {
				let params = SignatureHelpParams {
					context: None,
					text_document_position_params: bound.position_params(&document, offset)?,
					work_done_progress_params: Default::default(),
				};
				bound.connection().signature_help(params).await
			}
		},
		timeouts.signature_help(),
	)
	.await;

	merge_signatures(results)
}

/// Flattens per-server signature help into context information.
pub fn merge_signatures(results: Vec<Dispatched<Option<SignatureHelp>>>) -> Vec<ContextInformation> {
	let mut merged = Vec::new();
	for Dispatched { binding, outcome } in results {
		match outcome {
			Outcome::Completed(Some(help)) => merged.extend(help.signatures.iter().map(ContextInformation::from)),
			Outcome::Completed(None) => {}
			Outcome::Failed(error) => warn!(server = %binding.connection().key().definition, %error, "Signature help failed"),
			Outcome::Abandoned => debug!(server = %binding.connection().key().definition, "Signature help missed the deadline"),
		}
	}
	merged
}

/// Single-character signature help triggers advertised by the servers bound to `document`.
pub async fn signature_trigger_characters(registry: &BindingRegistry, document: &Document, timeouts: &FeatureTimeouts) -> BTreeSet<char> {
	let bindings = registry.resolve(document, has_signature_help, timeouts.triggers()).await;
	bindings
		.iter()
		.filter_map(|bound| bound.connection().capabilities())
		.flat_map(signature_triggers)
		.collect()
}
