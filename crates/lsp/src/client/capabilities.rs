//! Client side of the `initialize` handshake.

use std::path::Path;

use lsp_types::{
	ClientCapabilities, ClientInfo, CompletionClientCapabilities, CompletionItemCapability, CompletionItemCapabilityResolveSupport,
	CompletionItemKindCapability, GeneralClientCapabilities, HoverClientCapabilities, InitializeParams, MarkupKind, PositionEncodingKind,
	SignatureHelpClientCapabilities, SignatureInformationSettings, TagSupport, TextDocumentClientCapabilities, WorkspaceFolder,
};

use crate::definition::ServerDefinition;

/// Build client capabilities for initialization.
///
/// Only the features routed by this crate are advertised.
pub fn client_capabilities() -> ClientCapabilities {
	ClientCapabilities {
		text_document: Some(TextDocumentClientCapabilities {
			completion: Some(CompletionClientCapabilities {
				completion_item: Some(CompletionItemCapability {
					snippet_support: Some(false),
					resolve_support: Some(CompletionItemCapabilityResolveSupport {
						properties: vec![String::from("documentation"), String::from("detail")],
					}),
					insert_replace_support: Some(true),
					deprecated_support: Some(true),
					tag_support: Some(TagSupport {
						value_set: vec![lsp_types::CompletionItemTag::DEPRECATED],
					}),
					..Default::default()
				}),
				completion_item_kind: Some(CompletionItemKindCapability::default()),
				context_support: Some(true),
				..Default::default()
			}),
			hover: Some(HoverClientCapabilities {
				content_format: Some(vec![MarkupKind::Markdown, MarkupKind::PlainText]),
				..Default::default()
			}),
			signature_help: Some(SignatureHelpClientCapabilities {
				signature_information: Some(SignatureInformationSettings {
					documentation_format: Some(vec![MarkupKind::Markdown, MarkupKind::PlainText]),
					parameter_information: None,
					active_parameter_support: Some(true),
				}),
				..Default::default()
			}),
			..Default::default()
		}),
		general: Some(GeneralClientCapabilities {
			position_encodings: Some(vec![PositionEncodingKind::UTF8, PositionEncodingKind::UTF32, PositionEncodingKind::UTF16]),
			..Default::default()
		}),
		..Default::default()
	}
}

/// Builds the `initialize` parameters for a server rooted at `root`.
pub fn initialize_params(definition: &ServerDefinition, root: &Path) -> InitializeParams {
	let root_uri = crate::uri_from_path(root);
	let workspace_folders = root_uri.clone().map(|uri| {
		vec![WorkspaceFolder {
			uri,
			name: root
				.file_name()
				.map_or_else(|| root.display().to_string(), |name| name.to_string_lossy().into_owned()),
		}]
	});

	#[allow(deprecated, reason = "root_path and root_uri are deprecated but still read by some servers")]
	let params = InitializeParams {
		process_id: Some(std::process::id()),
		root_path: root.to_str().map(String::from),
		root_uri,
		initialization_options: definition.launch.initialization_options.clone(),
		capabilities: client_capabilities(),
		trace: None,
		workspace_folders,
		client_info: Some(ClientInfo {
			name: String::from("relay"),
			version: Some(String::from(env!("CARGO_PKG_VERSION"))),
		}),
		locale: None,
		work_done_progress_params: Default::default(),
	};
	params
}
