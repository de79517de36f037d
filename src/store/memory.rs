//! Thread-safe in-memory [`CredentialStore`] and [`LinkStore`] for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::{CredentialPair, UserId},
	store::{CredentialStore, LinkStore, StoreFuture},
};

/// Thread-safe storage backend that keeps pairs and links in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
	credentials: Arc<RwLock<HashMap<UserId, CredentialPair>>>,
	links: Arc<RwLock<HashMap<UserId, Vec<UserId>>>>,
}
impl MemoryStore {
	/// Records that `owner` may pull `user`; repeated links are ignored.
	pub fn link(&self, owner: UserId, user: UserId) {
		let mut links = self.links.write();
		let linked = links.entry(owner).or_default();

		if !linked.contains(&user) {
			linked.push(user);
		}
	}

	/// Number of stored credential pairs.
	pub fn len(&self) -> usize {
		self.credentials.read().len()
	}

	/// Returns `true` when no credential pair is stored.
	pub fn is_empty(&self) -> bool {
		self.credentials.read().is_empty()
	}
}
impl CredentialStore for MemoryStore {
	fn fetch<'a>(&'a self, user: &'a UserId) -> StoreFuture<'a, Option<CredentialPair>> {
		let pair = self.credentials.read().get(user).cloned();

		Box::pin(async move { Ok(pair) })
	}

	fn upsert(&self, pair: CredentialPair) -> StoreFuture<'_, ()> {
		self.credentials.write().insert(pair.user.clone(), pair);

		Box::pin(async { Ok(()) })
	}
}
impl LinkStore for MemoryStore {
	fn linked_users<'a>(&'a self, owner: &'a UserId) -> StoreFuture<'a, Vec<UserId>> {
		let users = self.links.read().get(owner).cloned().unwrap_or_default();

		Box::pin(async move { Ok(users) })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn user(id: &str) -> UserId {
		UserId::new(id).expect("User fixture should be valid.")
	}

	#[tokio::test]
	async fn upsert_overwrites_in_place() {
		let store = MemoryStore::default();

		store.upsert(CredentialPair::new(user("1"), "a1", "r1")).await.expect("Upsert should succeed.");
		store.upsert(CredentialPair::new(user("1"), "a2", "r2")).await.expect("Upsert should succeed.");

		let pair = store.fetch(&user("1")).await.expect("Fetch should succeed.");

		assert_eq!(store.len(), 1);
		assert_eq!(pair.map(|pair| pair.access_token.expose().to_owned()), Some("a2".into()));
		assert_eq!(store.fetch(&user("2")).await.expect("Fetch should succeed."), None);
	}

	#[tokio::test]
	async fn links_keep_order_and_skip_duplicates() {
		let store = MemoryStore::default();

		store.link(user("owner"), user("b"));
		store.link(user("owner"), user("a"));
		store.link(user("owner"), user("b"));

		assert_eq!(
			store.linked_users(&user("owner")).await.expect("Links should load."),
			vec![user("b"), user("a")]
		);
		assert!(store.linked_users(&user("nobody")).await.expect("Links should load.").is_empty());
	}
}
