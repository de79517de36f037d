//! Shared helpers for flow implementations (facade/API construction, guards, rate-limit notes).

// crates.io
use async_lock::MutexGuardArc;
// self
use crate::{
	_prelude::*,
	api::ApiClient,
	auth::{TargetId, UserId},
	error::TransientError,
	flows::Broker,
	http::ProviderHttpClient,
	oauth::{BasicFacade, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome},
	throttle::ThrottleScope,
};

impl<C, M> Broker<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn facade(&self, redirect_uri: Option<&Url>) -> Result<BasicFacade<C, M>> {
		BasicFacade::from_descriptor(
			&self.descriptor,
			&self.client_id,
			self.client_secret.as_deref(),
			redirect_uri,
			self.http_client.clone(),
			self.transport_mapper.clone(),
		)
	}

	pub(crate) fn api(&self) -> ApiClient<'_, C, M> {
		ApiClient {
			descriptor: &self.descriptor,
			strategy: self.strategy.as_ref(),
			http_client: self.http_client.as_ref(),
			mapper: self.transport_mapper.as_ref(),
		}
	}

	/// Converts a provider rate-limit failure into [`Error::Throttled`], marking the tracker
	/// first so every later check observes the block.
	///
	/// Signals flagged global, and token-grant limits, block the global scope. A non-global limit
	/// on a target-scoped call blocks that target. A non-global limit on an identity lookup belongs
	/// to one user's bucket, so it leaves the tracker alone and passes through unchanged, as does
	/// every other error.
	pub(crate) fn note_rate_limit(&self, err: Error, target: Option<&TargetId>) -> Error {
		let Error::Transient(TransientError::RateLimited { call, retry_after, global }) = err else {
			return err;
		};
		let scope = match target {
			_ if global || call.is_token_grant() => ThrottleScope::Global,
			Some(target) => ThrottleScope::Target(target.clone()),
			None => return TransientError::RateLimited { call, retry_after, global }.into(),
		};
		let duration = retry_after.unwrap_or(self.settings.default_retry_after);
		let until = self.throttle.mark_at(scope.clone(), duration, OffsetDateTime::now_utc());

		obs::record_throttle_trip(&scope, until);

		Error::Throttled { scope, retry_at: until }
	}
}

type GuardMap = Arc<Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>>;

/// Held singleflight lock for one user.
///
/// Dropping it releases the lock and removes the user's entry once nobody else holds or awaits it.
pub(crate) struct FlowGuard {
	guards: GuardMap,
	user: UserId,
	lock: Option<MutexGuardArc<()>>,
}
impl Drop for FlowGuard {
	fn drop(&mut self) {
		drop(self.lock.take());

		let mut guards = self.guards.lock();

		if guards.get(&self.user).is_some_and(|entry| Arc::strong_count(entry) == 1) {
			guards.remove(&self.user);
		}
	}
}

/// Waits for the user's singleflight lock, creating it on demand.
pub(crate) async fn flow_guard<C, M>(broker: &Broker<C, M>, user: &UserId) -> FlowGuard
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let entry = broker
		.flow_guards
		.lock()
		.entry(user.clone())
		.or_insert_with(|| Arc::new(AsyncMutex::new(())))
		.clone();
	let lock = entry.lock_arc().await;

	FlowGuard { guards: broker.flow_guards.clone(), user: user.clone(), lock: Some(lock) }
}

/// Records the terminal outcome of a fallible flow.
pub(crate) fn record_result<T>(kind: FlowKind, result: &Result<T>) {
	match result {
		Ok(_) => obs::record_flow_outcome(kind, FlowOutcome::Success),
		Err(_) => obs::record_flow_outcome(kind, FlowOutcome::Failure),
	}
}
