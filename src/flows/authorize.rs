//! Authorization start and authorization-code exchange.
//!
//! [`Broker::start_authorization`] builds the provider's authorize URL with a random `state`;
//! [`Broker::authorize`] trades the returned code for a credential pair, resolves who it belongs
//! to, and persists it. Rejected codes surface as [`Error::InvalidGrant`] and are never retried.

// crates.io
use rand::{Rng, distr::Alphanumeric};
// self
use crate::{
	_prelude::*,
	auth::{CredentialPair, ScopeSet, TokenGrant},
	flows::{Broker, common},
	http::ProviderHttpClient,
	oauth::{OAuth2Facade, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

const STATE_LEN: usize = 32;

/// Authorization handshake metadata returned by [`Broker::start_authorization`].
#[derive(Clone, Debug)]
pub struct AuthorizationSession {
	/// Requested scope set.
	pub scope: ScopeSet,
	/// Opaque state value that must round-trip via the redirect handler.
	pub state: String,
	/// Redirect URI the provider will call back.
	pub redirect_uri: Url,
	/// Fully-formed authorize URL that callers should send end users to.
	pub authorize_url: Url,
}
impl AuthorizationSession {
	/// Validates the returned `state` parameter after the authorization redirect.
	pub fn validate_state(&self, returned_state: &str) -> Result<()> {
		let matches = returned_state.len() == self.state.len()
			&& returned_state.bytes().zip(self.state.bytes()).fold(0, |acc, (a, b)| acc | (a ^ b))
				== 0;

		if matches {
			Ok(())
		} else {
			Err(Error::InvalidGrant { reason: "Authorization state mismatch".into() })
		}
	}
}

impl<C, M> Broker<C, M>
where
	C: ?Sized + ProviderHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Builds the authorize URL for the configured scopes and redirect URI.
	pub fn start_authorization(&self) -> Result<AuthorizationSession> {
		let redirect_uri = self.settings.require_redirect_uri()?.clone();
		let state = random_state();
		let authorize_url = self.facade(Some(&redirect_uri))?.authorize_url(
			&self.settings.scopes,
			self.descriptor.quirks.scope_delimiter,
			&state,
		);

		Ok(AuthorizationSession {
			scope: self.settings.scopes.clone(),
			state,
			redirect_uri,
			authorize_url,
		})
	}

	/// Trades a one-time authorization code for a token grant.
	///
	/// Does not touch the store; see [`Broker::authorize`].
	pub async fn exchange_code(&self, code: &str) -> Result<TokenGrant> {
		const KIND: FlowKind = FlowKind::Authorize;

		let span = FlowSpan::new(KIND, "exchange_code");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result: Result<TokenGrant> = span
			.instrument(async move {
				let redirect_uri = self.settings.require_redirect_uri()?;
				let facade = self.facade(Some(redirect_uri))?;

				facade
					.exchange_authorization_code(self.strategy.as_ref(), code)
					.await
					.map_err(|err| self.note_rate_limit(err, None))
			})
			.await;

		common::record_result(KIND, &result);

		result
	}

	/// Exchanges `code`, resolves the identity owning the new tokens, and persists the pair.
	pub async fn authorize(&self, code: &str) -> Result<CredentialPair> {
		let grant = self.exchange_code(code).await?;
		let identity = self
			.api()
			.fetch_identity(&grant.access_token)
			.await
			.map_err(|err| self.note_rate_limit(err, None))?;
		let pair = grant.into_pair(identity.id);

		self.store.upsert(pair.clone()).await?;

		Ok(pair)
	}
}

fn random_state() -> String {
	rand::rng().sample_iter(Alphanumeric).take(STATE_LEN).map(char::from).collect()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn session(state: &str) -> AuthorizationSession {
		AuthorizationSession {
			scope: ScopeSet::guild_join(),
			state: state.into(),
			redirect_uri: Url::parse("https://example.com/cb")
				.expect("Redirect URL fixture should parse successfully."),
			authorize_url: Url::parse("https://example.com/auth?state=abc")
				.expect("Authorization URL fixture should parse successfully."),
		}
	}

	#[test]
	fn state_validation_errors_on_mismatch() {
		let session = session("expected");

		assert!(session.validate_state("expected").is_ok());

		let err = session.validate_state("expectes").expect_err("State mismatch should fail.");

		assert!(matches!(err, Error::InvalidGrant { .. }));
		assert!(session.validate_state("exp").is_err());
	}

	#[test]
	fn random_states_are_alphanumeric_and_distinct() {
		let a = random_state();
		let b = random_state();

		assert_eq!(a.len(), STATE_LEN);
		assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
		assert_ne!(a, b);
	}
}
