// std
use std::time::Duration as StdDuration;
// crates.io
use futures::future;
// self
use oauth2_gateway::{
	_preludet::*,
	auth::Credential,
	http::HttpResponse,
	store::{CredentialCache, FileStore, MemoryStore},
	token::TokenManager,
};

const TOKEN_PATH: &str = "/oauth/token";

fn manager(
	transport: &Arc<ScriptedTransport>,
	cache: Arc<dyn CredentialCache>,
) -> TokenManager<ScriptedTransport> {
	TokenManager::new(Arc::new(test_config()), transport.clone(), cache)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_trigger_one_exchange() {
	let transport = Arc::new(ScriptedTransport::default().with_delay(StdDuration::from_millis(50)));

	transport.push(TOKEN_PATH, token_response("shared-token", Some("r1"), 3_600));

	let manager = manager(&transport, Arc::new(MemoryStore::default()));
	let callers = (0..16).map(|_| {
		let manager = manager.clone();

		tokio::spawn(async move { manager.ensure_authenticated().await })
	});
	let credentials = future::join_all(callers).await;

	for credential in credentials {
		let credential = credential
			.expect("Caller task should not panic.")
			.expect("Every caller should receive the shared credential.");

		assert_eq!(credential.access_token.expose(), "shared-token");
	}

	assert_eq!(transport.calls(TOKEN_PATH), 1);
	assert_eq!(manager.metrics().exchanges(), 1);
	assert!(manager.metrics().joins() <= 15);
}

#[tokio::test]
async fn concurrent_failures_are_shared_and_retryable() {
	let transport = Arc::new(ScriptedTransport::default().with_delay(StdDuration::from_millis(20)));

	transport.push(
		TOKEN_PATH,
		HttpResponse::new(401).with_json(&serde_json::json!({ "error": "invalid_client" })),
	);
	transport.push(TOKEN_PATH, token_response("second-try", None, 3_600));

	let manager = manager(&transport, Arc::new(MemoryStore::default()));
	let (a, b) = tokio::join!(manager.authenticate(), manager.authenticate());

	assert_eq!(a.expect_err("First caller should see the failure.").status, Some(401));
	assert_eq!(b.expect_err("Second caller should see the same failure.").status, Some(401));
	assert_eq!(transport.calls(TOKEN_PATH), 1);

	let credential = manager.authenticate().await.expect("A later attempt should run again.");

	assert_eq!(credential.access_token.expose(), "second-try");
	assert_eq!(transport.calls(TOKEN_PATH), 2);
}

#[tokio::test]
async fn valid_credentials_are_never_refetched() {
	let transport = Arc::new(ScriptedTransport::default());

	transport.push(TOKEN_PATH, token_response("a1", None, 3_600));

	let manager = manager(&transport, Arc::new(MemoryStore::default()));

	for _ in 0..5 {
		manager.ensure_authenticated().await.expect("Credential should be reused.");
	}

	assert_eq!(transport.calls(TOKEN_PATH), 1);
}

#[tokio::test]
async fn credentials_inside_the_safety_margin_are_replaced() {
	let transport = Arc::new(ScriptedTransport::default());

	// Thirty seconds is inside the default sixty-second margin.
	transport.push(TOKEN_PATH, token_response("short-lived", None, 30));
	transport.push(TOKEN_PATH, token_response("long-lived", None, 3_600));

	let manager = manager(&transport, Arc::new(MemoryStore::default()));

	manager.authenticate().await.expect("First exchange should succeed.");

	let credential = manager.ensure_authenticated().await.expect("Replacement should succeed.");

	assert_eq!(credential.access_token.expose(), "long-lived");
	assert_eq!(transport.calls(TOKEN_PATH), 2);
}

#[tokio::test]
async fn managers_sharing_a_cache_share_the_credential() {
	let transport = Arc::new(ScriptedTransport::default());
	let cache = Arc::new(MemoryStore::default());

	transport.push(TOKEN_PATH, token_response("from-first", None, 3_600));

	let first = manager(&transport, cache.clone());
	let second = manager(&transport, cache);

	first.ensure_authenticated().await.expect("First manager should authenticate.");

	let reused = second.ensure_authenticated().await.expect("Second manager should hit the cache.");

	assert_eq!(reused.access_token.expose(), "from-first");
	assert_eq!(transport.calls(TOKEN_PATH), 1);
	assert_eq!(second.metrics().cache_hits(), 1);
}

#[tokio::test]
async fn file_cache_survives_a_restart() {
	let path = std::env::temp_dir()
		.join(format!("oauth2-gateway-it-{}.json", unique_suffix()));
	let transport = Arc::new(ScriptedTransport::default());

	transport.push(TOKEN_PATH, token_response("persisted", None, 3_600));

	{
		let cache = Arc::new(FileStore::open(&path).expect("File store should open."));

		manager(&transport, cache).ensure_authenticated().await.expect("Authentication should succeed.");
	}

	let cache = Arc::new(FileStore::open(&path).expect("File store should reopen."));
	let restarted = manager(&transport, cache);
	let credential: Credential =
		restarted.ensure_authenticated().await.expect("Restarted manager should reuse the file.");

	assert_eq!(credential.access_token.expose(), "persisted");
	assert_eq!(transport.calls(TOKEN_PATH), 1);

	let _ = std::fs::remove_file(path);
}

#[tokio::test]
async fn revoke_clears_memory_and_cache() {
	let transport = Arc::new(ScriptedTransport::default());
	let cache = Arc::new(MemoryStore::default());

	transport.push(TOKEN_PATH, token_response("a1", None, 3_600));
	transport.push("/oauth/revoke", HttpResponse::new(503));
	transport.push(TOKEN_PATH, token_response("a2", None, 3_600));

	let manager = manager(&transport, cache.clone());

	manager.ensure_authenticated().await.expect("Authentication should succeed.");
	// The revocation endpoint fails; revoke still completes quietly.
	manager.revoke().await;

	assert!(manager.current().is_none());
	assert_eq!(transport.calls("/oauth/revoke"), 1);

	let fresh = manager.ensure_authenticated().await.expect("Re-authentication should succeed.");

	assert_eq!(fresh.access_token.expose(), "a2");
	assert_eq!(manager.metrics().cache_hits(), 0);
}

fn unique_suffix() -> String {
	format!(
		"{}-{}",
		std::process::id(),
		OffsetDateTime::now_utc().unix_timestamp_nanos()
	)
}
