use std::sync::Arc;
use std::time::Duration;

use lsp_types::{PositionEncodingKind, ServerCapabilities};
use rstest::rstest;

use super::*;
use crate::capability::{any, has_completion};
use crate::testing::{all_features, rust_definition};

fn connection() -> ServerConnection {
	let id = ConnectionId { slot: 3, generation: 1 };
	ServerConnection::new(id, Arc::new(rust_definition("ra")), PathBuf::from("/work"))
}

#[rstest]
#[case(ConnectionState::Starting, ConnectionState::Initializing, true)]
#[case(ConnectionState::Initializing, ConnectionState::Running, true)]
#[case(ConnectionState::Starting, ConnectionState::Running, false)]
#[case(ConnectionState::Running, ConnectionState::Initializing, false)]
#[case(ConnectionState::Initializing, ConnectionState::Failed, true)]
#[case(ConnectionState::Running, ConnectionState::Stopped, true)]
#[case(ConnectionState::Running, ConnectionState::Failed, true)]
#[case(ConnectionState::Stopped, ConnectionState::Failed, false)]
#[case(ConnectionState::Failed, ConnectionState::Running, false)]
#[case(ConnectionState::Failed, ConnectionState::Stopped, false)]
fn test_transitions(#[case] from: ConnectionState, #[case] to: ConnectionState, #[case] allowed: bool) {
	assert_eq!(from.can_transition_to(to), allowed);
}

#[test]
fn test_capabilities_hidden_until_running() {
	let connection = connection();
	assert!(connection.transition(ConnectionState::Initializing));
	assert!(connection.capabilities().is_none());
	assert!(!connection.matches(has_completion));
	assert!(connection.matches(any));

	assert!(connection.mark_running(all_features()));
	assert!(connection.matches(has_completion));
	assert_eq!(connection.offset_encoding(), OffsetEncoding::Utf16);
}

#[test]
fn test_negotiated_encoding() {
	let connection = connection();
	connection.transition(ConnectionState::Initializing);
	connection.mark_running(ServerCapabilities {
		position_encoding: Some(PositionEncodingKind::UTF8),
		..Default::default()
	});
	assert_eq!(connection.offset_encoding(), OffsetEncoding::Utf8);
}

#[test]
fn test_terminal_state_is_immutable() {
	let connection = connection();
	assert!(connection.fail(Error::Protocol("first".into())));
	assert!(!connection.fail(Error::Protocol("second".into())));
	assert!(!connection.transition(ConnectionState::Stopped));

	assert_eq!(connection.state(), ConnectionState::Failed);
	assert_eq!(connection.failure(), Some(Error::Protocol("first".into())));
}

#[tokio::test(start_paused = true)]
async fn test_wait_running_is_bounded() {
	let connection = connection();
	let err = connection.wait_running(Duration::from_millis(50)).await.unwrap_err();
	assert!(matches!(err, Error::RequestTimeout(_)));
}

#[tokio::test]
async fn test_wait_running_observes_transitions() {
	let connection = connection();
	let waiter = {
		let connection = connection.clone();
		tokio::spawn(async move { connection.wait_running(Duration::from_secs(5)).await })
	};

	connection.transition(ConnectionState::Initializing);
	connection.mark_running(ServerCapabilities::default());

	waiter.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_wait_running_reports_failure_cause() {
	let connection = connection();
	connection.fail(Error::Launch {
		server: "ra".into(),
		reason: "not found".into(),
	});

	let err = connection.wait_running(Duration::from_secs(1)).await.unwrap_err();
	assert!(matches!(err, Error::Launch { .. }));
}

#[tokio::test]
async fn test_requests_require_running_state() {
	let connection = connection();
	let params = lsp_types::SignatureHelpParams {
		context: None,
		text_document_position_params: lsp_types::TextDocumentPositionParams {
			text_document: lsp_types::TextDocumentIdentifier {
				uri: crate::uri_from_path(std::path::Path::new("/work/main.rs")).unwrap(),
			},
			position: lsp_types::Position::default(),
		},
		work_done_progress_params: Default::default(),
	};

	let err = connection.signature_help(params).await.unwrap_err();
	assert_eq!(err, Error::NotRunning("ra".into()));
}
