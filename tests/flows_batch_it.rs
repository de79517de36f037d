#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
// self
use guild_join_broker::{
	_preludet::*,
	auth::{CredentialPair, ProviderId, TargetId, UserId},
	config::BrokerSettings,
	flows::{FailureReason, JoinFailure, JoinOutcome},
	provider::{ClientAuthMethod, ProviderDescriptor},
	store::{CredentialStore, MemoryStore},
	throttle::ThrottleScope,
};

const TARGET: &str = "guild-1";

fn build_descriptor(server: &MockServer) -> ProviderDescriptor {
	let provider_id =
		ProviderId::new("mock-batch").expect("Provider identifier should be valid for batch test.");

	ProviderDescriptor::builder(provider_id)
		.authorization_endpoint(
			Url::parse(&server.url("/authorize"))
				.expect("Mock authorize endpoint should parse successfully."),
		)
		.token_endpoint(
			Url::parse(&server.url("/token")).expect("Mock token endpoint should parse successfully."),
		)
		.api_base(Url::parse(&server.url("/api")).expect("Mock API base should parse successfully."))
		.preferred_client_auth_method(ClientAuthMethod::ClientSecretPost)
		.build()
		.expect("Provider descriptor should build successfully.")
}

fn target() -> TargetId {
	TargetId::new(TARGET).expect("Target fixture should be valid.")
}

fn user(id: impl Display) -> UserId {
	UserId::new(id.to_string()).expect("User fixture should be valid.")
}

fn member_path(user: impl Display) -> String {
	format!("/api/guilds/{TARGET}/members/{user}")
}

async fn seed(store: &MemoryStore, id: impl Display) {
	let pair = CredentialPair::new(user(&id), format!("access-{id}"), format!("refresh-{id}"));

	store.upsert(pair).await.expect("Seeding a credential pair should succeed.");
}

async fn mock_added(server: &MockServer, id: impl Display) -> httpmock::Mock<'_> {
	let path = member_path(id);

	server
		.mock_async(|when, then| {
			when.method(PUT).path(path).header("authorization", format!("Bot {TEST_BOT_TOKEN}"));
			then.status(201).header("content-type", "application/json").body("{\"user\":{}}");
		})
		.await
}

#[tokio::test]
async fn empty_batch_returns_zero_result_without_calls() {
	let server = MockServer::start_async().await;
	let (broker, _) = build_reqwest_test_broker(build_descriptor(&server), Default::default());
	let result = broker
		.join_many(&target(), Vec::<UserId>::new())
		.await
		.expect("Empty batch should succeed.");

	assert_eq!(result.success_count, 0);
	assert!(result.failures.is_empty());
	assert_eq!(broker.join_metrics.calls(), 0);
}

#[tokio::test]
async fn unauthorized_users_are_reported_in_input_order() {
	let server = MockServer::start_async().await;
	let (broker, store) = build_reqwest_test_broker(build_descriptor(&server), Default::default());
	let missing = [3, 7, 11];
	let mut mocks = Vec::new();

	for id in 1..=12 {
		if !missing.contains(&id) {
			seed(&store, id).await;
			mocks.push(mock_added(&server, id).await);
		}
	}

	let result = broker
		.join_many(&target(), (1..=12).map(user))
		.await
		.expect("Batch should run when no block is active.");

	assert_eq!(result.success_count, 9);
	assert_eq!(
		result.failures,
		missing
			.iter()
			.map(|id| JoinFailure { user: user(id), reason: FailureReason::Unauthorized })
			.collect::<Vec<_>>()
	);
	assert_eq!(broker.join_metrics.calls(), 9);

	for mock in mocks {
		mock.assert_calls_async(1).await;
	}
}

#[tokio::test]
async fn active_target_block_refuses_batch_before_any_call() {
	let server = MockServer::start_async().await;
	let (broker, store) = build_reqwest_test_broker(build_descriptor(&server), Default::default());

	seed(&store, 1).await;

	let mock = mock_added(&server, 1).await;

	broker.throttle.mark_target_blocked(&target(), Duration::seconds(60));

	let err = broker
		.join_many(&target(), [user(1)])
		.await
		.expect_err("Batch should be refused while the target is blocked.");

	match err {
		Error::Throttled { scope, .. } => assert_eq!(scope, ThrottleScope::Target(target())),
		other => panic!("Unexpected error variant: {other:?}."),
	}

	assert_eq!(broker.join_metrics.calls(), 0);
	mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn global_block_refuses_every_target() {
	let server = MockServer::start_async().await;
	let (broker, store) = build_reqwest_test_broker(build_descriptor(&server), Default::default());

	seed(&store, 1).await;
	broker.throttle.mark_global_blocked(Duration::seconds(60));

	let other = TargetId::new("guild-2").expect("Target fixture should be valid.");
	let err = broker
		.join_many(&other, [user(1)])
		.await
		.expect_err("Batch should be refused while globally blocked.");

	assert!(matches!(err, Error::Throttled { scope: ThrottleScope::Global, .. }));
	assert_eq!(broker.join_metrics.calls(), 0);
}

#[tokio::test]
async fn rate_limited_join_blocks_the_next_batch() {
	let server = MockServer::start_async().await;
	let (broker, store) = build_reqwest_test_broker(build_descriptor(&server), Default::default());
	let mut mocks = Vec::new();

	for id in 1..=10 {
		seed(&store, id).await;

		if id != 5 {
			mocks.push(mock_added(&server, id).await);
		}
	}

	let limited = server
		.mock_async(|when, then| {
			when.method(PUT).path(member_path(5));
			then.status(429)
				.header("content-type", "application/json")
				.header("retry-after", "30")
				.body("{\"message\":\"You are being rate limited.\",\"retry_after\":30.0,\"global\":false}");
		})
		.await;
	let result = broker
		.join_many(&target(), (1..=10).map(user))
		.await
		.expect("First batch should run.");

	limited.assert_calls_async(1).await;

	assert_eq!(
		result.failures,
		vec![JoinFailure { user: user(5), reason: FailureReason::RateLimited }]
	);
	assert_eq!(result.attempted(), 10);
	assert!(broker.throttle.is_target_blocked(&target()));
	assert!(!broker.throttle.is_globally_blocked());

	let calls = broker.join_metrics.calls();
	let err = broker
		.join_many(&target(), (11..=13).map(user))
		.await
		.expect_err("Follow-up batch should be throttled.");

	assert!(err.is_throttled());
	assert_eq!(broker.join_metrics.calls(), calls);
}

#[tokio::test]
async fn global_rate_limit_blocks_other_targets() {
	let server = MockServer::start_async().await;
	let (broker, store) = build_reqwest_test_broker(build_descriptor(&server), Default::default());

	seed(&store, 1).await;

	let limited = server
		.mock_async(|when, then| {
			when.method(PUT).path(member_path(1));
			then.status(429)
				.header("content-type", "application/json")
				.header("x-ratelimit-global", "true")
				.body("{\"message\":\"You are being rate limited.\",\"retry_after\":12.5,\"global\":true}");
		})
		.await;
	let outcome = broker.join_target_outcome(&target(), &user(1)).await;

	limited.assert_async().await;

	assert_eq!(outcome, JoinOutcome::RateLimited);
	assert!(broker.throttle.is_globally_blocked());

	let other = TargetId::new("guild-2").expect("Target fixture should be valid.");

	assert!(broker.join_many(&other, [user(1)]).await.is_err());
}

#[tokio::test]
async fn already_member_counts_as_failure() {
	let server = MockServer::start_async().await;
	let (broker, store) = build_reqwest_test_broker(build_descriptor(&server), Default::default());

	seed(&store, 1).await;
	seed(&store, 2).await;

	let added = mock_added(&server, 1).await;
	let present = server
		.mock_async(|when, then| {
			when.method(PUT).path(member_path(2));
			then.status(204);
		})
		.await;
	let result = broker
		.join_many(&target(), [user(1), user(2), user(1)])
		.await
		.expect("Batch should run.");

	added.assert_calls_async(1).await;
	present.assert_calls_async(1).await;

	assert_eq!(result.success_count, 1);
	assert_eq!(
		result.failures,
		vec![JoinFailure { user: user(2), reason: FailureReason::AlreadyMember }]
	);
}

#[tokio::test]
async fn rejected_access_token_is_refreshed_once_before_retry() {
	let server = MockServer::start_async().await;
	let (broker, store) = build_reqwest_test_broker(build_descriptor(&server), Default::default());

	seed(&store, 1).await;

	let rejected = server
		.mock_async(|when, then| {
			when.method(PUT).path(member_path(1)).body_includes("access-1");
			then.status(401)
				.header("content-type", "application/json")
				.body("{\"message\":\"Invalid OAuth2 access token\",\"code\":50025}");
		})
		.await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/token").body_includes("refresh-1");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"access-new\",\"refresh_token\":\"refresh-new\",\"token_type\":\"bearer\",\"expires_in\":604800}",
			);
		})
		.await;
	let accepted = server
		.mock_async(|when, then| {
			when.method(PUT).path(member_path(1)).body_includes("access-new");
			then.status(201).header("content-type", "application/json").body("{\"user\":{}}");
		})
		.await;

	assert!(broker.join_target(&target(), &user(1)).await);

	rejected.assert_calls_async(1).await;
	token.assert_calls_async(1).await;
	accepted.assert_calls_async(1).await;

	let stored = store
		.fetch(&user(1))
		.await
		.expect("Store fetch should succeed.")
		.expect("Rotated pair should be persisted.");

	assert_eq!(stored.access_token.expose(), "access-new");
	assert_eq!(stored.refresh_token.expose(), "refresh-new");
	assert_eq!(broker.refresh_metrics.attempts(), 1);
	assert_eq!(broker.join_metrics.calls(), 2);
}

#[tokio::test]
async fn concurrent_joins_share_one_refresh() {
	let server = MockServer::start_async().await;
	let (broker, store) = build_reqwest_test_broker(build_descriptor(&server), Default::default());

	seed(&store, 1).await;

	let rejected = server
		.mock_async(|when, then| {
			when.method(PUT).path(member_path(1)).body_includes("access-1");
			then.status(401)
				.header("content-type", "application/json")
				.body("{\"message\":\"401: Unauthorized\",\"code\":0}");
		})
		.await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/token").body_includes("refresh-1");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"access-new\",\"refresh_token\":\"refresh-new\",\"token_type\":\"bearer\",\"expires_in\":604800}",
			);
		})
		.await;
	let accepted = server
		.mock_async(|when, then| {
			when.method(PUT).path(member_path(1)).body_includes("access-new");
			then.status(204);
		})
		.await;
	let (target, user) = (target(), user(1));
	let (first, second) = tokio::join!(
		broker.join_target_outcome(&target, &user),
		broker.join_target_outcome(&target, &user),
	);

	assert_eq!(first, JoinOutcome::AlreadyMember);
	assert_eq!(second, JoinOutcome::AlreadyMember);

	rejected.assert_calls_async(2).await;
	token.assert_calls_async(1).await;
	accepted.assert_calls_async(2).await;

	assert_eq!(broker.refresh_metrics.attempts(), 1);
	assert_eq!(broker.refresh_metrics.reused(), 1);
}

#[tokio::test]
async fn dead_refresh_token_reports_unauthorized() {
	let server = MockServer::start_async().await;
	let (broker, store) = build_reqwest_test_broker(build_descriptor(&server), Default::default());

	seed(&store, 1).await;

	let rejected = server
		.mock_async(|when, then| {
			when.method(PUT).path(member_path(1));
			then.status(401)
				.header("content-type", "application/json")
				.body("{\"message\":\"401: Unauthorized\",\"code\":0}");
		})
		.await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(400)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_grant\"}");
		})
		.await;
	let outcome = broker.join_target_outcome(&target(), &user(1)).await;

	rejected.assert_calls_async(1).await;
	token.assert_calls_async(1).await;

	assert_eq!(outcome, JoinOutcome::Unauthorized);

	let stored = store
		.fetch(&user(1))
		.await
		.expect("Store fetch should succeed.")
		.expect("Pair should remain after a failed refresh.");

	assert_eq!(stored.access_token.expose(), "access-1");
}

#[tokio::test]
async fn disjoint_batches_add_up() {
	let server = MockServer::start_async().await;
	let (broker, store) = build_reqwest_test_broker(build_descriptor(&server), Default::default());
	let mut mocks = Vec::new();

	for id in [1, 2, 4, 5] {
		seed(&store, id).await;
		mocks.push(mock_added(&server, id).await);
	}

	let first = broker
		.join_many(&target(), [1, 2, 3].into_iter().map(user))
		.await
		.expect("First batch should run.");
	let second = broker
		.join_many(&target(), [4, 5, 6].into_iter().map(user))
		.await
		.expect("Second batch should run.");
	let combined = broker
		.join_many(&target(), (1..=6).map(user))
		.await
		.expect("Combined batch should run.");

	assert_eq!(first.success_count + second.success_count, combined.success_count);
	assert_eq!(
		first.failures.iter().chain(&second.failures).cloned().collect::<Vec<_>>(),
		combined.failures
	);
}

#[tokio::test]
async fn bounded_concurrency_still_joins_everyone() {
	let server = MockServer::start_async().await;
	let settings = BrokerSettings::default().with_max_concurrent_joins(2);
	let (broker, store) = build_reqwest_test_broker(build_descriptor(&server), settings);
	let mut mocks = Vec::new();

	for id in 1..=5 {
		seed(&store, id).await;
		mocks.push(mock_added(&server, id).await);
	}

	let result =
		broker.join_many(&target(), (1..=5).map(user)).await.expect("Bounded batch should run.");

	assert_eq!(result.success_count, 5);
	assert!(result.failures.is_empty());
}

#[tokio::test]
async fn malformed_raw_input_is_rejected_before_any_call() {
	let server = MockServer::start_async().await;
	let (broker, _) = build_reqwest_test_broker(build_descriptor(&server), Default::default());

	broker.throttle.mark_global_blocked(Duration::seconds(60));

	let err = broker
		.join_many_raw("", ["1"])
		.await
		.expect_err("A blank target should be rejected.");

	assert!(matches!(err, Error::InvalidInput(_)));

	let err = broker
		.join_many_raw(TARGET, ["1", "two words"])
		.await
		.expect_err("A malformed user id should be rejected.");

	assert!(matches!(err, Error::InvalidInput(_)));
	assert_eq!(broker.join_metrics.calls(), 0);
}

#[tokio::test]
async fn linked_users_are_pulled_into_the_target() {
	let server = MockServer::start_async().await;
	let (broker, store) = build_reqwest_test_broker(build_descriptor(&server), Default::default());
	let owner = user("owner");

	seed(&store, 1).await;
	store.link(owner.clone(), user(1));
	store.link(owner.clone(), user(2));

	let mock = mock_added(&server, 1).await;
	let result = broker
		.pull_linked(&target(), &owner, store.as_ref())
		.await
		.expect("Pull should run.");

	mock.assert_calls_async(1).await;

	assert_eq!(result.success_count, 1);
	assert_eq!(result.failed_with(FailureReason::Unauthorized).collect::<Vec<_>>(), vec![&user(2)]);
}
