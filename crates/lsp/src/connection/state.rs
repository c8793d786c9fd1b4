//! Connection lifecycle state management.

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ConnectionState {
	/// Process launch in progress.
	Starting,
	/// Process running, `initialize` handshake in progress.
	Initializing,
	/// Handshake complete, ready for requests.
	Running,
	/// Shut down on request or because its workspace closed.
	Stopped,
	/// Launch, handshake, or transport failed.
	Failed,
}

impl ConnectionState {
	/// Whether no further transition is possible.
	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Stopped | Self::Failed)
	}

	/// Whether the state machine allows moving from `self` to `next`.
	///
	/// Any live state may fail or be stopped; otherwise states only move forward one step.
	pub fn can_transition_to(self, next: Self) -> bool {
		match (self, next) {
			(Self::Starting, Self::Initializing) | (Self::Initializing, Self::Running) => true,
			(from, Self::Failed | Self::Stopped) => !from.is_terminal(),
			_ => false,
		}
	}
}

impl std::fmt::Display for ConnectionState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let label = match self {
			Self::Starting => "starting",
			Self::Initializing => "initializing",
			Self::Running => "running",
			Self::Stopped => "stopped",
			Self::Failed => "failed",
		};
		f.write_str(label)
	}
}
