#![cfg(all(feature = "test", feature = "reqwest"))]

// crates.io
use time::macros;
// self
use marketplace_gate::{
	_preludet::*,
	auth::{Credential, TokenGrant},
	clock::{Clock, ManualClock},
	store::{CompareAndSwapOutcome, CredentialStore, MemoryStore, StoreFuture},
	token::{RefreshCounts, TokenManager},
};

const NOW: OffsetDateTime = macros::datetime!(2025-06-01 12:00 UTC);

fn manager(
	store: Arc<dyn CredentialStore>,
	authenticator: Arc<ScriptedAuthenticator>,
) -> TokenManager {
	TokenManager::new(store, authenticator, test_scope())
		.with_clock(Arc::new(ManualClock::new(NOW)))
}

#[tokio::test]
async fn fresh_token_is_served_without_authenticator_calls() {
	let store = Arc::new(MemoryStore::with_credential(test_credential(
		"access-cached",
		"refresh-cached",
		NOW - Duration::minutes(10),
		Duration::hours(2),
	)));
	let authenticator = Arc::new(ScriptedAuthenticator::default());
	let manager = manager(store.clone(), authenticator.clone());

	for _ in 0..3 {
		let token = manager.valid_access_token().await.expect("Cached token should be served.");

		assert_eq!(token.expose(), "access-cached");
	}

	assert_eq!(authenticator.refresh_calls(), 0);
	assert_eq!(manager.refresh_metrics().snapshot(), RefreshCounts::default());
}

#[tokio::test]
async fn hour_long_token_issued_ten_minutes_ago_is_cached() {
	let store = Arc::new(MemoryStore::with_credential(test_credential(
		"access-cached",
		"refresh-cached",
		NOW - Duration::minutes(10),
		Duration::seconds(3600),
	)));
	let authenticator = Arc::new(ScriptedAuthenticator::default());
	let manager = manager(store, authenticator.clone());
	let token = manager.valid_access_token().await.expect("Cached token should be served.");

	assert_eq!(token.expose(), "access-cached");
	assert_eq!(authenticator.refresh_calls(), 0);
}

#[tokio::test]
async fn hour_long_token_issued_an_hour_ago_is_refreshed_without_rotation() {
	let store = Arc::new(MemoryStore::with_credential(test_credential(
		"access-old",
		"refresh-old",
		NOW - Duration::minutes(60),
		Duration::seconds(3600),
	)));
	let authenticator = Arc::new(
		ScriptedAuthenticator::default()
			.push_refresh(Ok(TokenGrant::access_only("new", Duration::seconds(3600)))),
	);
	let manager = manager(store.clone(), authenticator.clone());
	let token = manager.valid_access_token().await.expect("Refresh should succeed.");

	assert_eq!(token.expose(), "new");
	assert_eq!(authenticator.refresh_calls(), 1);

	let stored = store
		.load()
		.await
		.expect("Store load should succeed.")
		.expect("Credential should remain stored.");

	assert_eq!(stored.access_token.expose(), "new");
	assert_eq!(stored.refresh_token.expose(), "refresh-old");
	assert_eq!(stored.refresh_token_expires_in, Some(Duration::days(547)));
}

#[tokio::test]
async fn token_inside_safety_margin_is_refreshed() {
	let store = Arc::new(MemoryStore::with_credential(test_credential(
		"access-old",
		"refresh-old",
		NOW - Duration::minutes(116),
		Duration::hours(2),
	)));
	let authenticator = Arc::new(
		ScriptedAuthenticator::default()
			.push_refresh(Ok(TokenGrant::access_only("access-new", Duration::hours(2)))),
	);
	let manager = manager(store.clone(), authenticator.clone());
	let token = manager.valid_access_token().await.expect("Refresh should succeed.");

	assert_eq!(token.expose(), "access-new");
	assert_eq!(authenticator.seen_refresh_tokens(), vec!["refresh-old".to_owned()]);

	let stored = store
		.load()
		.await
		.expect("Store load should succeed.")
		.expect("Credential should remain stored.");

	// No rotation in the response: the old refresh token and its lifetime stay.
	assert_eq!(stored.access_token.expose(), "access-new");
	assert_eq!(stored.refresh_token.expose(), "refresh-old");
	assert_eq!(stored.refresh_token_expires_in, Some(Duration::days(547)));
	assert_eq!(stored.updated_at, NOW);
	assert_eq!(stored.access_token_expires_in, Duration::hours(2));
	assert_eq!(
		manager.refresh_metrics().snapshot(),
		RefreshCounts { attempts: 1, successes: 1, failures: 0 }
	);
}

#[tokio::test]
async fn rotated_refresh_token_replaces_the_stored_one() {
	let store = Arc::new(MemoryStore::with_credential(test_credential(
		"access-old",
		"refresh-old",
		NOW - Duration::hours(3),
		Duration::hours(2),
	)));
	let authenticator = Arc::new(ScriptedAuthenticator::default().push_refresh(Ok(
		TokenGrant::access_only("access-new", Duration::hours(2))
			.with_refresh_token("refresh-new", Some(Duration::days(30))),
	)));
	let manager = manager(store.clone(), authenticator);

	manager.valid_access_token().await.expect("Refresh should succeed.");

	let stored = manager.current_credential().await.expect("Credential should be stored.");

	assert_eq!(stored.refresh_token.expose(), "refresh-new");
	assert_eq!(stored.refresh_token_expires_in, Some(Duration::days(30)));
}

#[tokio::test]
async fn refresh_failure_is_reported_and_store_is_untouched() {
	let original =
		test_credential("access-old", "refresh-old", NOW - Duration::hours(3), Duration::hours(2));
	let store = Arc::new(MemoryStore::with_credential(original.clone()));
	let authenticator = Arc::new(
		ScriptedAuthenticator::default()
			.push_refresh(Err(Error::InvalidGrant { reason: "refresh token expired".into() })),
	);
	let manager = manager(store.clone(), authenticator);
	let err = manager.valid_access_token().await.expect_err("Refresh failure should surface.");

	assert!(matches!(err, Error::RefreshFailed { source: Some(ref inner), .. }
		if matches!(**inner, Error::InvalidGrant { .. })));
	assert_eq!(
		store.load().await.expect("Store load should succeed."),
		Some(original),
		"Failed refresh must not modify the stored credential."
	);
	assert_eq!(manager.refresh_metrics().failures(), 1);
}

#[tokio::test]
async fn empty_access_token_in_response_is_a_refresh_failure() {
	let store = Arc::new(MemoryStore::with_credential(test_credential(
		"access-old",
		"refresh-old",
		NOW - Duration::hours(3),
		Duration::hours(2),
	)));
	let authenticator = Arc::new(
		ScriptedAuthenticator::default()
			.push_refresh(Ok(TokenGrant::access_only("", Duration::hours(2)))),
	);
	let err = manager(store, authenticator)
		.valid_access_token()
		.await
		.expect_err("Blank access tokens should be rejected.");

	assert!(matches!(err, Error::RefreshFailed { source: None, .. }));
}

#[tokio::test]
async fn unrepresentable_lifetime_in_response_is_a_refresh_failure() {
	let store = Arc::new(MemoryStore::with_credential(test_credential(
		"access-old",
		"refresh-old",
		NOW - Duration::hours(3),
		Duration::hours(2),
	)));
	let authenticator = Arc::new(ScriptedAuthenticator::default().push_refresh(Ok(
		TokenGrant::access_only("access-new", Duration::seconds(10_000_000_000_000)),
	)));
	let manager = manager(store.clone(), authenticator);
	let err = manager
		.valid_access_token()
		.await
		.expect_err("Oversized lifetimes should be rejected.");

	assert!(matches!(err, Error::RefreshFailed { source: None, .. }));

	let stored = store
		.load()
		.await
		.expect("Store load should succeed.")
		.expect("Credential should remain stored.");

	assert_eq!(stored.access_token.expose(), "access-old");
	assert_eq!(stored.access_token_expires_in, Duration::hours(2));
}

#[tokio::test]
async fn missing_credential_is_reported() {
	let authenticator = Arc::new(ScriptedAuthenticator::default());
	let err = manager(Arc::new(MemoryStore::default()), authenticator.clone())
		.valid_access_token()
		.await
		.expect_err("An empty store should fail.");

	assert!(matches!(err, Error::NoCredential));
	assert_eq!(authenticator.refresh_calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_refresh() {
	let store = Arc::new(MemoryStore::with_credential(test_credential(
		"access-old",
		"refresh-old",
		NOW - Duration::hours(3),
		Duration::hours(2),
	)));
	let authenticator = Arc::new(
		ScriptedAuthenticator::default()
			.push_refresh(Ok(TokenGrant::access_only("access-new", Duration::hours(2)))),
	);
	let manager = manager(store, authenticator.clone());
	let tasks: Vec<_> = (0..16)
		.map(|_| {
			let manager = manager.clone();

			tokio::spawn(async move { manager.valid_access_token().await })
		})
		.collect();

	for task in tasks {
		let token = task
			.await
			.expect("Refresh task should not panic.")
			.expect("Every caller should receive a token.");

		assert_eq!(token.expose(), "access-new");
	}

	assert_eq!(authenticator.refresh_calls(), 1);

	let counts = manager.refresh_metrics().snapshot();

	assert_eq!(counts.attempts, 1);
	assert_eq!(counts.failures, 0);
}

/// Store whose compare-and-swap always loses to a writer in another process.
struct RacingStore {
	inner: MemoryStore,
	winner: Credential,
}
impl CredentialStore for RacingStore {
	fn load(&self) -> StoreFuture<'_, Option<Credential>> {
		self.inner.load()
	}

	fn save(&self, credential: Credential) -> StoreFuture<'_, ()> {
		self.inner.save(credential)
	}

	fn compare_and_swap_refresh<'a>(
		&'a self,
		_expected_refresh: &'a str,
		_replacement: Credential,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		let winner = self.winner.clone();

		Box::pin(async move {
			self.inner.save(winner).await?;

			Ok(CompareAndSwapOutcome::RefreshMismatch)
		})
	}
}

#[tokio::test]
async fn losing_compare_and_swap_returns_the_winners_token() {
	let winner = test_credential("access-winner", "refresh-winner", NOW, Duration::hours(2));
	let store = Arc::new(RacingStore {
		inner: MemoryStore::with_credential(test_credential(
			"access-old",
			"refresh-old",
			NOW - Duration::hours(3),
			Duration::hours(2),
		)),
		winner: winner.clone(),
	});
	let authenticator = Arc::new(
		ScriptedAuthenticator::default()
			.push_refresh(Ok(TokenGrant::access_only("access-loser", Duration::hours(2)))),
	);
	let token = manager(store.clone(), authenticator)
		.valid_access_token()
		.await
		.expect("Losing the race should still yield a token.");

	assert_eq!(token.expose(), "access-winner");
	assert_eq!(store.load().await.expect("Store load should succeed."), Some(winner));
}

#[tokio::test]
async fn initial_exchange_creates_then_overwrites_keeping_created_at() {
	let clock = Arc::new(ManualClock::new(NOW));
	let store = Arc::new(MemoryStore::default());
	let authenticator = Arc::new(
		ScriptedAuthenticator::default()
			.push_code(Ok(TokenGrant::access_only("access-1", Duration::hours(2))
				.with_refresh_token("refresh-1", Some(Duration::days(547)))))
			.push_code(Ok(TokenGrant::access_only("access-2", Duration::hours(2))
				.with_refresh_token("refresh-2", None)))
			.push_code(Ok(TokenGrant::access_only("access-3", Duration::hours(2)))),
	);
	let manager = TokenManager::new(store.clone(), authenticator.clone(), test_scope())
		.with_clock(clock.clone());
	let first =
		manager.store_initial_credential("code-1").await.expect("First exchange should succeed.");

	assert_eq!(first.created_at, NOW);
	assert_eq!(first.refresh_token.expose(), "refresh-1");

	clock.advance(Duration::days(3));

	let second =
		manager.store_initial_credential("code-2").await.expect("Second exchange should succeed.");

	assert_eq!(second.created_at, NOW);
	assert_eq!(second.updated_at, clock.now());
	assert_eq!(second.access_token.expose(), "access-2");
	assert_eq!(second.refresh_token_expires_in, None);

	let err = manager
		.store_initial_credential("code-3")
		.await
		.expect_err("A code exchange without a refresh token should be rejected.");

	assert!(matches!(err, Error::Config(_)));
	assert_eq!(
		store.load().await.expect("Store load should succeed."),
		Some(second),
		"A rejected exchange must keep the previous credential."
	);
	assert_eq!(authenticator.code_calls(), 3);
}
