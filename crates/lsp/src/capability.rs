//! Capability predicates used to route feature requests.
//!
//! A predicate is a plain function pointer so it cannot capture state: the same predicate applied
//! to the same capability snapshot always gives the same answer.

use lsp_types::{HoverProviderCapability, ServerCapabilities};

/// Decides whether a server may serve a feature, given its advertised capabilities.
pub type CapabilityPredicate = fn(&ServerCapabilities) -> bool;

/// Server advertises `textDocument/completion`.
pub fn has_completion(capabilities: &ServerCapabilities) -> bool {
	capabilities.completion_provider.is_some()
}

/// Server advertises `textDocument/hover`.
pub fn has_hover(capabilities: &ServerCapabilities) -> bool {
	match &capabilities.hover_provider {
		Some(HoverProviderCapability::Simple(enabled)) => *enabled,
		Some(HoverProviderCapability::Options(_)) => true,
		None => false,
	}
}

/// Server advertises `textDocument/signatureHelp`.
pub fn has_signature_help(capabilities: &ServerCapabilities) -> bool {
	capabilities.signature_help_provider.is_some()
}

/// Matches every server regardless of capabilities.
pub fn any(_: &ServerCapabilities) -> bool {
	true
}

/// Single-character completion triggers advertised by a server.
pub fn completion_triggers(capabilities: &ServerCapabilities) -> impl Iterator<Item = char> + '_ {
	let triggers = capabilities
		.completion_provider
		.as_ref()
		.and_then(|provider| provider.trigger_characters.as_deref());
	single_chars(triggers)
}

/// Single-character signature help triggers advertised by a server.
pub fn signature_triggers(capabilities: &ServerCapabilities) -> impl Iterator<Item = char> + '_ {
	let triggers = capabilities
		.signature_help_provider
		.as_ref()
		.and_then(|provider| provider.trigger_characters.as_deref());
	single_chars(triggers)
}

/// Triggers longer than one char cannot fire on a keystroke and are skipped.
fn single_chars(triggers: Option<&[String]>) -> impl Iterator<Item = char> + '_ {
	triggers.unwrap_or_default().iter().filter_map(|trigger| {
		let mut chars = trigger.chars();
		match (chars.next(), chars.next()) {
			(Some(c), None) => Some(c),
			_ => None,
		}
	})
}
