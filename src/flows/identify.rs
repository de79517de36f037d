//! Identity resolution for a presented credential pair.
//!
//! A rejected access token triggers exactly one refresh and one retry. Refresh failures are
//! an expected "please log in again" state, so these operations answer `None` instead of
//! propagating errors.

// self
use crate::{
	_prelude::*,
	auth::{CredentialPair, Identity, TokenSecret},
	flows::{Broker, common},
	http::ProviderHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Identity resolved for a credential pair, with the pair that is now current.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatedUser {
	/// Resolved external identity.
	pub identity: Identity,
	/// Pair that resolved the identity; differs from the presented one when `rotated`.
	pub credentials: CredentialPair,
	/// The presented access token was rejected and a refresh minted `credentials`.
	pub rotated: bool,
}

impl<C, M> Broker<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Resolves the identity behind `access_token`, refreshing once if the token is rejected.
	///
	/// A rotated pair is persisted before it is returned. Returns `None` when the refresh (or
	/// any other step) fails; the store is never partially updated.
	pub async fn identify(
		&self,
		access_token: &TokenSecret,
		refresh_token: &TokenSecret,
	) -> Option<AuthenticatedUser> {
		const KIND: FlowKind = FlowKind::Identify;

		let span = FlowSpan::new(KIND, "identify");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.identify_inner(access_token, refresh_token)).await;

		common::record_result(KIND, &result);

		result.ok()
	}

	/// Same as [`identify`](Self::identify), and additionally upserts the presented pair when
	/// the store holds different tokens for the resolved user.
	pub async fn current_user(
		&self,
		access_token: impl Into<TokenSecret>,
		refresh_token: impl Into<TokenSecret>,
	) -> Option<AuthenticatedUser> {
		let access_token = access_token.into();
		let refresh_token = refresh_token.into();
		let user = self.identify(&access_token, &refresh_token).await?;

		if !user.rotated {
			let stored = self.store.fetch(&user.identity.id).await.ok()?;

			if stored.is_none_or(|stored| !stored.same_tokens(&user.credentials)) {
				self.store.upsert(user.credentials.clone()).await.ok()?;
			}
		}

		Some(user)
	}

	async fn identify_inner(
		&self,
		access_token: &TokenSecret,
		refresh_token: &TokenSecret,
	) -> Result<AuthenticatedUser> {
		match self.api().fetch_identity(access_token).await {
			Ok(identity) => {
				let credentials = CredentialPair::new(
					identity.id.clone(),
					access_token.clone(),
					refresh_token.clone(),
				);

				return Ok(AuthenticatedUser { identity, credentials, rotated: false });
			},
			Err(Error::Unauthenticated) => {},
			Err(err) => return Err(self.note_rate_limit(err, None)),
		}

		let grant = self.refresh_grant(refresh_token).await?;
		let identity = self
			.api()
			.fetch_identity(&grant.access_token)
			.await
			.map_err(|err| self.note_rate_limit(err, None))?;
		let credentials = grant.into_pair(identity.id.clone());

		self.store.upsert(credentials.clone()).await?;
		obs::record_refresh_rotation(&credentials.user);

		Ok(AuthenticatedUser { identity, credentials, rotated: true })
	}
}
