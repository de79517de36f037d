#![cfg(feature = "reqwest")]

// self
use guild_join_broker::{
	_preludet::*,
	auth::{CredentialPair, ProviderId, TargetId, UserId},
	config::BrokerSettings,
	flows::{Broker, FailureReason},
	oauth::ReqwestTransportErrorMapper,
	provider::{DefaultProviderStrategy, ProviderDescriptor, ProviderStrategy},
	store::{CredentialStore, LinkStore, MemoryStore, StoreError, StoreFuture},
};

fn user(id: &str) -> UserId {
	UserId::new(id).expect("User fixture should be valid.")
}

#[tokio::test]
async fn upsert_keeps_one_pair_per_user() {
	let store = MemoryStore::default();

	store
		.upsert(CredentialPair::new(user("1"), "access-1", "refresh-1"))
		.await
		.expect("Saving pair fixture into memory store should succeed.");
	store
		.upsert(CredentialPair::new(user("1"), "access-2", "refresh-2"))
		.await
		.expect("Overwriting pair fixture should succeed.");
	store
		.upsert(CredentialPair::new(user("2"), "access-3", "refresh-3"))
		.await
		.expect("Saving a second user should succeed.");

	let fetched = store
		.fetch(&user("1"))
		.await
		.expect("Fetching pair from memory store should succeed.")
		.expect("Stored pair should remain present.");

	assert_eq!(store.len(), 2);
	assert_eq!(fetched.access_token.expose(), "access-2");
	assert_eq!(fetched.refresh_token.expose(), "refresh-2");
}

#[tokio::test]
async fn concurrent_upserts_for_one_user_leave_a_single_pair() {
	let store = Arc::new(MemoryStore::default());
	let tasks = (0..16)
		.map(|n| {
			let store = store.clone();

			tokio::spawn(async move {
				store
					.upsert(CredentialPair::new(user("1"), format!("access-{n}"), "refresh"))
					.await
			})
		})
		.collect::<Vec<_>>();

	for task in tasks {
		task.await.expect("Upsert task should not panic.").expect("Upsert should succeed.");
	}

	let fetched = store
		.fetch(&user("1"))
		.await
		.expect("Fetching pair from memory store should succeed.")
		.expect("Stored pair should remain present.");

	assert_eq!(store.len(), 1);
	assert!(fetched.access_token.expose().starts_with("access-"));
}

#[tokio::test]
async fn links_preserve_order_and_ignore_repeats() {
	let store = MemoryStore::default();
	let owner = user("owner");

	store.link(owner.clone(), user("b"));
	store.link(owner.clone(), user("a"));
	store.link(owner.clone(), user("b"));

	assert_eq!(
		store.linked_users(&owner).await.expect("Listing links should succeed."),
		vec![user("b"), user("a")]
	);
	assert!(store.linked_users(&user("nobody")).await.expect("Listing links should succeed.").is_empty());
}

struct BrokenStore;
impl CredentialStore for BrokenStore {
	fn fetch<'a>(&'a self, _user: &'a UserId) -> StoreFuture<'a, Option<CredentialPair>> {
		Box::pin(async { Err(StoreError::Backend { message: "disk on fire".into() }) })
	}

	fn upsert(&self, _pair: CredentialPair) -> StoreFuture<'_, ()> {
		Box::pin(async { Err(StoreError::Backend { message: "disk on fire".into() }) })
	}
}

#[tokio::test]
async fn store_failures_are_reported_as_provider_errors() {
	let descriptor = ProviderDescriptor::builder(
		ProviderId::new("mock-broken-store").expect("Provider identifier should be valid."),
	)
	.authorization_endpoint(Url::parse("https://mock.example.com/authorize").expect("URL should parse."))
	.token_endpoint(Url::parse("https://mock.example.com/token").expect("URL should parse."))
	.api_base(Url::parse("https://mock.example.com/api").expect("URL should parse."))
	.build()
	.expect("Provider descriptor should build successfully.");
	let settings = BrokerSettings::default();
	let store: Arc<dyn CredentialStore> = Arc::new(BrokenStore);
	let strategy: Arc<dyn ProviderStrategy> = Arc::new(DefaultProviderStrategy);
	let broker: ReqwestTestBroker = Broker::with_http_client(
		store,
		descriptor,
		strategy,
		TEST_CLIENT_ID,
		settings.clone(),
		test_reqwest_http_client(&settings),
		ReqwestTransportErrorMapper,
	)
	.with_bot_token(TEST_BOT_TOKEN);
	let target = TargetId::new("guild-1").expect("Target fixture should be valid.");
	let result =
		broker.join_many(&target, [user("1"), user("2")]).await.expect("Batch should run.");

	assert_eq!(result.success_count, 0);
	assert_eq!(result.failed_with(FailureReason::ProviderError).count(), 2);
	assert_eq!(broker.join_metrics.calls(), 0);
	assert!(matches!(broker.refresh_user(&user("1")).await, Err(Error::Storage(_))));
}
