//! Fan-out/fan-in over bound connections.
//!
//! [`dispatch`] issues one call per binding on its own task, then collects results until every
//! call settles or the deadline passes, whichever comes first. Results land in a slot keyed by the
//! binding's index, so the output order is the binding order no matter when each reply arrives.
//!
//! # Failure isolation
//!
//! A failing (or panicking) call only marks its own slot [`Outcome::Failed`]. Calls still pending
//! at the deadline are marked [`Outcome::Abandoned`] and detached: their tasks keep running to
//! completion, but nobody reads their results.

use std::future::Future;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::binding::BoundConnection;
use crate::{Error, Result};

/// Settled state of one per-connection call.
#[derive(Debug)]
pub enum Outcome<T> {
	/// The call returned a value in time.
	Completed(T),
	/// The call returned an error in time.
	Failed(Error),
	/// The deadline passed first.
	Abandoned,
}

impl<T> Outcome<T> {
	/// The value, if the call completed.
	pub fn completed(self) -> Option<T> {
		match self {
			Self::Completed(value) => Some(value),
			Self::Failed(_) | Self::Abandoned => None,
		}
	}

	/// Whether the call failed.
	pub fn is_failed(&self) -> bool {
		matches!(self, Self::Failed(_))
	}
}

/// Result of one call, attributed to its binding.
#[derive(Debug)]
pub struct Dispatched<T> {
	/// The binding the call was issued to.
	pub binding: BoundConnection,
	/// How the call settled.
	pub outcome: Outcome<T>,
}

/// Runs `operation` against every binding concurrently and waits at most `deadline`.
///
/// The returned vector has one entry per binding, in binding order. Must be called from within a
/// Tokio runtime.
pub async fn dispatch<T, F, Fut>(bindings: &[BoundConnection], operation: F, deadline: Duration) -> Vec<Dispatched<T>>
where
	T: Send + 'static,
	F: Fn(BoundConnection) -> Fut,
	Fut: Future<Output = Result<T>> + Send + 'static,
{
	let deadline = Instant::now() + deadline;
	let mut outcomes: Vec<Outcome<T>> = bindings.iter().map(|_| Outcome::Abandoned).collect();

	let mut pending: FuturesUnordered<_> = bindings
		.iter()
		.enumerate()
		.map(|(index, binding)| {
			let call = tokio::spawn(operation(binding.clone()));
			async move { (index, call.await) }
		})
		.collect();

	let mut settled = 0usize;
	loop {
		match tokio::time::timeout_at(deadline, pending.next()).await {
			Ok(Some((index, joined))) => {
				settled += 1;
				outcomes[index] = match joined {
					Ok(Ok(value)) => Outcome::Completed(value),
					Ok(Err(error)) => {
						debug!(server = %bindings[index].connection().key().definition, %error, "Request failed");
						Outcome::Failed(error)
					}
					Err(join_error) => {
						debug!(server = %bindings[index].connection().key().definition, %join_error, "Request task aborted");
						Outcome::Failed(Error::Protocol(format!("request task aborted: {join_error}")))
					}
				};
			}
			Ok(None) => break,
			Err(_) => {
				trace!(settled, abandoned = bindings.len() - settled, "Fan-out deadline reached");
				break;
			}
		}
	}

	bindings
		.iter()
		.cloned()
		.zip(outcomes)
		.map(|(binding, outcome)| Dispatched { binding, outcome })
		.collect()
}

#[cfg(test)]
mod tests;
