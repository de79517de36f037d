//! Credential pairs persisted per user and the raw grants the token endpoint returns.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret, UserId},
};

/// Access/refresh token pair tied to one external identity.
///
/// At most one live pair exists per [`UserId`]; refreshes overwrite the tokens in place and
/// never change the key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
	/// Stable external identity that owns the pair.
	pub user: UserId,
	/// Short-lived bearer credential.
	pub access_token: TokenSecret,
	/// Long-lived credential used to mint new access tokens.
	pub refresh_token: TokenSecret,
}
impl CredentialPair {
	/// Creates a pair for `user`.
	pub fn new(
		user: UserId,
		access_token: impl Into<TokenSecret>,
		refresh_token: impl Into<TokenSecret>,
	) -> Self {
		Self { user, access_token: access_token.into(), refresh_token: refresh_token.into() }
	}

	/// Returns a copy carrying the tokens from `grant`, keeping the identity.
	pub fn rotated(&self, grant: &TokenGrant) -> Self {
		Self {
			user: self.user.clone(),
			access_token: grant.access_token.clone(),
			refresh_token: grant.refresh_token.clone(),
		}
	}

	/// Returns `true` when both tokens match `other`.
	pub fn same_tokens(&self, other: &Self) -> bool {
		self.access_token == other.access_token && self.refresh_token == other.refresh_token
	}
}
impl Debug for CredentialPair {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialPair")
			.field("user", &self.user)
			.field("access_token", &"<redacted>")
			.field("refresh_token", &"<redacted>")
			.finish()
	}
}

/// Tokens minted by an `authorization_code` or `refresh_token` grant, before they are bound
/// to an identity.
#[derive(Clone)]
pub struct TokenGrant {
	/// Fresh access token.
	pub access_token: TokenSecret,
	/// Refresh token (rotated by the provider, or the previous one when it was not rotated).
	pub refresh_token: TokenSecret,
	/// Instant the grant was received.
	pub issued_at: OffsetDateTime,
	/// Access token lifetime reported by `expires_in`.
	pub expires_in: Option<Duration>,
	/// Scopes reported by the provider, when echoed.
	pub scope: Option<ScopeSet>,
}
impl TokenGrant {
	/// Instant the access token stops being valid, if the provider reported a lifetime.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		self.expires_in.map(|lifetime| self.issued_at + lifetime)
	}

	/// Binds the grant to `user`.
	pub fn into_pair(self, user: UserId) -> CredentialPair {
		CredentialPair { user, access_token: self.access_token, refresh_token: self.refresh_token }
	}
}
impl Debug for TokenGrant {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenGrant")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &"<redacted>")
			.field("issued_at", &self.issued_at)
			.field("expires_in", &self.expires_in)
			.field("scope", &self.scope)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn grant() -> TokenGrant {
		TokenGrant {
			access_token: TokenSecret::new("access-2"),
			refresh_token: TokenSecret::new("refresh-2"),
			issued_at: macros::datetime!(2025-01-01 00:00 UTC),
			expires_in: Some(Duration::days(7)),
			scope: None,
		}
	}

	#[test]
	fn rotation_keeps_identity() {
		let user = UserId::new("1").expect("User fixture should be valid.");
		let pair = CredentialPair::new(user.clone(), "access-1", "refresh-1");
		let rotated = pair.rotated(&grant());

		assert_eq!(rotated.user, user);
		assert_eq!(rotated.access_token.expose(), "access-2");
		assert!(!rotated.same_tokens(&pair));
		assert_eq!(grant().expires_at(), Some(macros::datetime!(2025-01-08 00:00 UTC)));
	}

	#[test]
	fn debug_output_redacts_tokens() {
		let user = UserId::new("1").expect("User fixture should be valid.");
		let rendered = format!("{:?}", CredentialPair::new(user, "access-1", "refresh-1"));

		assert!(!rendered.contains("access-1"));
		assert!(!format!("{:?}", grant()).contains("refresh-2"));
	}
}
