use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::*;
use crate::testing::{FakeLauncher, FakeServer, init_tracing, rust_definition};

fn setup(server: FakeServer) -> (Arc<FakeLauncher>, ConnectionPool, Arc<ServerDefinition>) {
	init_tracing();
	let launcher = Arc::new(FakeLauncher::new().with("ra", server));
	let pool = ConnectionPool::new(launcher.clone());
	(launcher, pool, Arc::new(rust_definition("ra")))
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_acquire_launches_once() {
	let (launcher, pool, definition) = setup(FakeServer::new().launch_delay(Duration::from_millis(100)));
	let root = Path::new("/work/project");

	let (a, b) = tokio::join!(pool.acquire(&definition, root), pool.acquire(&definition, root));
	let (a, b) = (a.unwrap(), b.unwrap());

	assert_eq!(launcher.launches("ra"), 1);
	assert_eq!(a.id(), b.id());
	assert!(a.is_running());
	assert_eq!(pool.active_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_get_or_start_caches_before_running() {
	let (launcher, pool, definition) = setup(FakeServer::new().launch_delay(Duration::from_millis(100)));
	let root = Path::new("/work/project");

	let first = pool.get_or_start(&definition, root);
	assert_eq!(first.state(), ConnectionState::Starting);
	let second = pool.get_or_start(&definition, root);
	assert_eq!(first.id(), second.id());

	first.wait_running(Duration::from_secs(1)).await.unwrap();
	assert_eq!(launcher.launches("ra"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_distinct_roots_get_distinct_connections() {
	let (launcher, pool, definition) = setup(FakeServer::new());

	let a = pool.acquire(&definition, Path::new("/a")).await.unwrap();
	let b = pool.acquire(&definition, Path::new("/b")).await.unwrap();

	assert_ne!(a.id().slot, b.id().slot);
	assert_eq!(launcher.launches("ra"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_initialize_evicts_and_relaunches() {
	let (launcher, pool, definition) = setup(FakeServer::new().initialize_error("bad handshake"));
	let root = Path::new("/work/project");

	let err = pool.acquire(&definition, root).await.unwrap_err();
	assert!(matches!(err, Error::Response { ref message, .. } if message == "bad handshake"));
	assert_eq!(pool.active_count(), 0);

	launcher.set("ra", FakeServer::new());
	let connection = pool.acquire(&definition, root).await.unwrap();

	assert_eq!(launcher.launches("ra"), 2);
	assert_eq!(connection.id(), ConnectionId { slot: 0, generation: 2 });
}

#[tokio::test(start_paused = true)]
async fn test_slow_launch_fails_with_timeout() {
	let (_launcher, pool, definition) = setup(FakeServer::new().launch_delay(Duration::from_secs(5)));
	let root = Path::new("/work/project");

	let connection = pool.get_or_start(&definition, root);
	let err = connection.wait_running(Duration::from_secs(10)).await.unwrap_err();

	assert!(matches!(err, Error::RequestTimeout(_)));
	assert_eq!(connection.state(), ConnectionState::Failed);
	assert_eq!(connection.failure(), Some(err));
	assert_eq!(pool.active_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_report_failure_ignores_superseded_connection() {
	let (_launcher, pool, definition) = setup(FakeServer::new());
	let root = Path::new("/work/project");

	let first = pool.acquire(&definition, root).await.unwrap();
	assert!(pool.report_failure(first.id(), Error::Protocol("broken pipe".into())));
	assert_eq!(first.state(), ConnectionState::Failed);
	assert!(first.capabilities().is_none());

	let second = pool.acquire(&definition, root).await.unwrap();
	assert_eq!(second.id().generation, 2);
	assert!(!pool.report_failure(first.id(), Error::ServiceStopped));
	assert!(second.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_close_workspace_stops_only_that_root() {
	let server = FakeServer::new();
	let calls = server.calls.clone();
	let (_launcher, pool, definition) = setup(server);

	let a = pool.acquire(&definition, Path::new("/a")).await.unwrap();
	let b = pool.acquire(&definition, Path::new("/b")).await.unwrap();

	let stopped = pool.close_workspace(Path::new("/a")).await;

	assert_eq!(stopped, vec![a.id()]);
	assert_eq!(a.state(), ConnectionState::Stopped);
	assert!(b.is_running());
	assert_eq!(calls.shutdown.load(Ordering::SeqCst), 1);
	assert!(!a.matches(crate::capability::has_hover));
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_launch_stays_stopped() {
	let server = FakeServer::new().launch_delay(Duration::from_millis(200));
	let calls = server.calls.clone();
	let (_launcher, pool, definition) = setup(server);

	let connection = pool.get_or_start(&definition, Path::new("/a"));
	assert_eq!(pool.shutdown_all().await, vec![connection.id()]);

	tokio::time::sleep(Duration::from_millis(500)).await;

	assert_eq!(connection.state(), ConnectionState::Stopped);
	assert_eq!(calls.shutdown.load(Ordering::SeqCst), 1);
	assert_eq!(pool.active_count(), 0);
}
