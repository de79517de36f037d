//! Storage contracts and built-in store implementations for credential pairs and link records.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{CredentialPair, UserId},
};

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Keyed storage for [`CredentialPair`] values.
///
/// Exactly one pair exists per [`UserId`]. No delete operation is exposed; removal belongs to
/// account-management code outside the broker.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Fetches the pair stored for `user`, if any.
	fn fetch<'a>(&'a self, user: &'a UserId) -> StoreFuture<'a, Option<CredentialPair>>;

	/// Inserts the pair, or overwrites the tokens of the existing pair for the same user.
	fn upsert(&self, pair: CredentialPair) -> StoreFuture<'_, ()>;
}

/// Read-only source of users a target owner has authorized for pulling.
pub trait LinkStore
where
	Self: Send + Sync,
{
	/// Lists the users linked to `owner`, in the order they were linked.
	fn linked_users<'a>(&'a self, owner: &'a UserId) -> StoreFuture<'a, Vec<UserId>>;
}

/// Error type produced by store implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
