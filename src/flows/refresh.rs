//! Refresh token orchestration with per-user singleflight guards.
//!
//! [`Broker::refresh_user`] mints a new access token for a stored pair. Concurrent callers for
//! the same user serialize on a guard; whoever enters second re-reads the store and reuses the
//! pair the first caller persisted instead of spending the refresh token again. Every minted
//! pair is persisted before it is returned.

mod metrics;

pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::{CredentialPair, TokenGrant, TokenSecret, UserId},
	flows::{Broker, common},
	http::ProviderHttpClient,
	oauth::{OAuth2Facade, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

impl<C, M> Broker<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Refreshes the stored pair for `user` and persists the rotated pair.
	///
	/// Fails with [`Error::Unauthenticated`] when no pair is stored and with
	/// [`Error::InvalidGrant`] when the provider rejects the refresh token; the stored pair is
	/// left untouched in both cases.
	pub async fn refresh_user(&self, user: &UserId) -> Result<CredentialPair> {
		let stale = self.store.fetch(user).await?.ok_or(Error::Unauthenticated)?;

		self.refresh_stored(&stale).await
	}

	/// Refreshes `stale` under the user's singleflight guard.
	pub(crate) async fn refresh_stored(&self, stale: &CredentialPair) -> Result<CredentialPair> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "refresh_stored");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result: Result<CredentialPair> = span
			.instrument(async move {
				let _singleflight = common::flow_guard(self, &stale.user).await;

				if let Some(current) = self.store.fetch(&stale.user).await?
					&& current.access_token != stale.access_token
				{
					self.refresh_metrics.record_reuse();

					return Ok(current);
				}

				let grant = self.refresh_grant(&stale.refresh_token).await?;
				let rotated = stale.rotated(&grant);

				self.store.upsert(rotated.clone()).await?;
				obs::record_refresh_rotation(&rotated.user);

				Ok(rotated)
			})
			.await;

		common::record_result(KIND, &result);

		result
	}

	/// Runs a bare `refresh_token` grant without touching the store.
	///
	/// Used directly when the owning user is not known yet (identity lookups).
	pub(crate) async fn refresh_grant(&self, refresh_token: &TokenSecret) -> Result<TokenGrant> {
		self.refresh_metrics.record_attempt();

		let result = match self.facade(None) {
			Ok(facade) => facade
				.refresh_token(self.strategy.as_ref(), refresh_token)
				.await
				.map_err(|err| self.note_rate_limit(err, None)),
			Err(err) => Err(err),
		};

		match &result {
			Ok(_) => self.refresh_metrics.record_success(),
			Err(_) => self.refresh_metrics.record_failure(),
		}

		result
	}
}
