use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::*;
use crate::capability::any;
use crate::document::Document;
use crate::testing::{FakeLauncher, FakeServer, init_tracing, registry, rust_definition};

async fn bindings(ids: &[&str]) -> Vec<BoundConnection> {
	init_tracing();
	let mut launcher = FakeLauncher::new();
	for id in ids {
		launcher = launcher.with(id, FakeServer::new());
	}
	let registry = registry(&Arc::new(launcher), ids.iter().copied().map(rust_definition).collect());
	let document = Document::open("/work/src/lib.rs", "").unwrap();
	registry.resolve(&document, any, Duration::from_secs(1)).await
}

fn server(binding: &BoundConnection) -> String {
	binding.connection().key().definition.to_string()
}

#[tokio::test(start_paused = true)]
async fn test_results_follow_binding_order() {
	let bound = bindings(&["a", "b", "c"]).await;

	let results = dispatch(
		&bound,
		|binding| async move {
			let name = server(&binding);
			let delay = match name.as_str() {
				"a" => 300,
				"b" => 100,
				_ => 200,
			};
			tokio::time::sleep(Duration::from_millis(delay)).await;
			Ok(name)
		},
		Duration::from_secs(1),
	)
	.await;

	let values: Vec<_> = results.into_iter().map(|d| d.outcome.completed()).collect();
	assert_eq!(values, [Some("a".to_string()), Some("b".to_string()), Some("c".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn test_failure_does_not_affect_siblings() {
	let bound = bindings(&["ok", "broken"]).await;

	let results = dispatch(
		&bound,
		|binding| async move {
			match server(&binding).as_str() {
				"broken" => Err(Error::Protocol("connection reset".into())),
				name => Ok(name.len()),
			}
		},
		Duration::from_secs(1),
	)
	.await;

	assert!(matches!(results[0].outcome, Outcome::Completed(2)));
	assert!(results[1].outcome.is_failed());
	assert_eq!(server(&results[1].binding), "broken");
}

#[tokio::test(start_paused = true)]
async fn test_deadline_abandons_slow_call_without_cancelling_it() {
	let bound = bindings(&["fast", "slow"]).await;
	let finished = Arc::new(AtomicBool::new(false));

	let started = Instant::now();
	let results = dispatch(
		&bound,
		|binding| {
			let finished = finished.clone();
			async move {
				if server(&binding) == "slow" {
					tokio::time::sleep(Duration::from_millis(500)).await;
					finished.store(true, Ordering::SeqCst);
				}
				Ok(())
			}
		},
		Duration::from_millis(100),
	)
	.await;

	assert!(started.elapsed() < Duration::from_millis(500));
	assert!(matches!(results[0].outcome, Outcome::Completed(())));
	assert!(matches!(results[1].outcome, Outcome::Abandoned));

	tokio::time::sleep(Duration::from_secs(1)).await;
	assert!(finished.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_panicking_call_is_captured() {
	let bound = bindings(&["a", "b"]).await;

	let results = dispatch(
		&bound,
		|binding| async move {
			if server(&binding) == "a" {
				panic!("server stub bug");
			}
			Ok(1)
		},
		Duration::from_secs(1),
	)
	.await;

	assert!(results[0].outcome.is_failed());
	assert!(matches!(results[1].outcome, Outcome::Completed(1)));
}

#[tokio::test]
async fn test_empty_bindings_return_immediately() {
	let results = dispatch(&[], |_| async { Ok(()) }, Duration::from_secs(60)).await;
	assert!(results.is_empty());
}
